pub mod config;
pub mod control;
pub mod error;
pub mod lighting;
pub mod sampling;
pub mod topics;
pub mod types;

pub use config::{
    Configuration, HardwareConfig, NetworkConfig, RuntimeConfig, TaskConfig,
    WaterLevelCalibration,
};
pub use control::{ActuatorCommand, ClimateEngine};
pub use error::{ConfigError, InvalidStateError, SensorError};
pub use lighting::{LightingWindow, TimeOfDay};
pub use sampling::{ClimateAggregate, SensorSample};
pub use topics::*;
pub use types::{Actuator, ActuatorStates, BinaryState, DeviceState, Readings, StatusSnapshot};
