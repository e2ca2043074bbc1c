pub mod actuators;
pub mod adjust;
pub mod camera;
pub mod hardware;
pub mod publish;
pub mod scheduler;
pub mod sensors;
pub mod store;

pub use actuators::{ActuatorDriver, ActuatorPins, DriverError};
pub use adjust::{ActuationController, Clock, FixedClock, ZonedClock};
pub use camera::{CaptureTask, Frame};
pub use publish::SnapshotPublisher;
pub use scheduler::{compensated_delay, PeriodicTask, Scheduler};
pub use sensors::{MeasurementTask, ReaderSettings, RetryPolicy, SensorReader};
pub use store::{DeviceStateStore, Measurement};
