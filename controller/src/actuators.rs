use std::sync::Arc;

use greenhouse_common::{Actuator, BinaryState, InvalidStateError};
use thiserror::Error;
use tracing::{info, warn};

use crate::{
    hardware::{OutputError, OutputPin},
    store::DeviceStateStore,
};

#[derive(Debug, Error)]
pub enum DriverError {
    #[error(transparent)]
    InvalidState(#[from] InvalidStateError),
    #[error(transparent)]
    Output(#[from] OutputError),
}

pub struct ActuatorPins {
    pub led_first: Box<dyn OutputPin>,
    pub led_second: Box<dyn OutputPin>,
    pub heater: Box<dyn OutputPin>,
    pub pump: Box<dyn OutputPin>,
}

/// Sole owner of the output pins. Every successful write is mirrored into the
/// store; a failed write leaves the recorded state untouched.
pub struct ActuatorDriver {
    pins: ActuatorPins,
    active_low: bool,
    store: Arc<DeviceStateStore>,
}

impl ActuatorDriver {
    pub fn new(pins: ActuatorPins, active_low: bool, store: Arc<DeviceStateStore>) -> Self {
        Self {
            pins,
            active_low,
            store,
        }
    }

    pub async fn set(&mut self, actuator: Actuator, state: BinaryState) -> Result<(), DriverError> {
        let level = state.is_on() != self.active_low;
        self.pin_mut(actuator).write(level)?;
        self.store.apply_actuator_state(actuator, state).await;
        info!("{actuator} -> {state}");
        Ok(())
    }

    /// Validates an untyped state string before touching the hardware.
    pub async fn set_raw(&mut self, actuator: Actuator, state: &str) -> Result<(), DriverError> {
        let state = state.parse::<BinaryState>()?;
        self.set(actuator, state).await
    }

    pub async fn set_heater(&mut self, state: BinaryState) -> Result<(), DriverError> {
        self.set(Actuator::Heater, state).await
    }

    pub async fn set_led_first(&mut self, state: BinaryState) -> Result<(), DriverError> {
        self.set(Actuator::LedFirst, state).await
    }

    pub async fn set_led_second(&mut self, state: BinaryState) -> Result<(), DriverError> {
        self.set(Actuator::LedSecond, state).await
    }

    pub async fn set_pump(&mut self, state: BinaryState) -> Result<(), DriverError> {
        self.set(Actuator::Pump, state).await
    }

    /// Drives every output OFF so the relays match the store's initial
    /// record.
    pub async fn initialize(&mut self) -> Result<(), DriverError> {
        for actuator in Actuator::ALL {
            self.set(actuator, BinaryState::Off).await?;
        }
        Ok(())
    }

    /// Best effort: one stuck relay does not keep the others on.
    pub async fn all_off(&mut self) -> usize {
        let mut failures = 0;
        for actuator in Actuator::ALL {
            if let Err(err) = self.set(actuator, BinaryState::Off).await {
                warn!("failed to switch {actuator} off: {err}");
                failures += 1;
            }
        }
        failures
    }

    fn pin_mut(&mut self, actuator: Actuator) -> &mut Box<dyn OutputPin> {
        match actuator {
            Actuator::LedFirst => &mut self.pins.led_first,
            Actuator::LedSecond => &mut self.pins.led_second,
            Actuator::Heater => &mut self.pins.heater,
            Actuator::Pump => &mut self.pins.pump,
        }
    }
}
