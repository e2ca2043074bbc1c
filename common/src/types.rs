use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{config::Configuration, error::InvalidStateError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BinaryState {
    On,
    #[default]
    Off,
}

impl BinaryState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::On => "ON",
            Self::Off => "OFF",
        }
    }

    pub fn is_on(self) -> bool {
        self == Self::On
    }
}

impl From<bool> for BinaryState {
    fn from(on: bool) -> Self {
        if on {
            Self::On
        } else {
            Self::Off
        }
    }
}

impl FromStr for BinaryState {
    type Err = InvalidStateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_uppercase().as_str() {
            "ON" => Ok(Self::On),
            "OFF" => Ok(Self::Off),
            _ => Err(InvalidStateError(value.to_string())),
        }
    }
}

impl fmt::Display for BinaryState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Actuator {
    LedFirst,
    LedSecond,
    Heater,
    Pump,
}

impl Actuator {
    pub const ALL: [Actuator; 4] = [
        Actuator::LedFirst,
        Actuator::LedSecond,
        Actuator::Heater,
        Actuator::Pump,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::LedFirst => "led_first",
            Self::LedSecond => "led_second",
            Self::Heater => "heater",
            Self::Pump => "pump",
        }
    }
}

impl fmt::Display for Actuator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Last successfully measured environment values. `None` until the first
/// successful measurement of that quantity.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Readings {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub water_level: Option<f32>,
    pub ph: Option<f32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ActuatorStates {
    pub led_first: BinaryState,
    pub led_second: BinaryState,
    pub heater: BinaryState,
    pub pump: BinaryState,
}

impl ActuatorStates {
    pub fn get(&self, actuator: Actuator) -> BinaryState {
        match actuator {
            Actuator::LedFirst => self.led_first,
            Actuator::LedSecond => self.led_second,
            Actuator::Heater => self.heater,
            Actuator::Pump => self.pump,
        }
    }

    pub fn set(&mut self, actuator: Actuator, state: BinaryState) {
        match actuator {
            Actuator::LedFirst => self.led_first = state,
            Actuator::LedSecond => self.led_second = state,
            Actuator::Heater => self.heater = state,
            Actuator::Pump => self.pump = state,
        }
    }
}

/// Point-in-time copy of everything the controller knows.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DeviceState {
    pub readings: Readings,
    pub actuators: ActuatorStates,
    pub config: Configuration,
}

impl DeviceState {
    pub fn snapshot(&self, timestamp: i64) -> StatusSnapshot {
        StatusSnapshot {
            timestamp,
            humidity: self.readings.humidity,
            temperature: self.readings.temperature,
            water_level: self.readings.water_level,
            ph: self.readings.ph,
            led_first_state: self.actuators.led_first.as_str(),
            led_second_state: self.actuators.led_second.as_str(),
            heater_state: self.actuators.heater.as_str(),
            pump_state: self.actuators.pump.as_str(),
        }
    }
}

/// Published once per measurement cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StatusSnapshot {
    pub timestamp: i64,
    pub humidity: Option<f32>,
    pub temperature: Option<f32>,
    #[serde(rename = "waterLevel")]
    pub water_level: Option<f32>,
    pub ph: Option<f32>,
    #[serde(rename = "ledFirstState")]
    pub led_first_state: &'static str,
    #[serde(rename = "ledSecondState")]
    pub led_second_state: &'static str,
    #[serde(rename = "heaterState")]
    pub heater_state: &'static str,
    #[serde(rename = "pumpState")]
    pub pump_state: &'static str,
}
