use std::{fmt, str::FromStr};

use chrono::{NaiveTime, Timelike};
use serde::{Deserialize, Serialize};

use crate::{error::ConfigError, types::BinaryState};

/// Minute-resolution time of day, rendered as "HH:MM".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct TimeOfDay(pub(crate) u16);

impl TimeOfDay {
    pub const MINUTES_PER_DAY: u16 = 24 * 60;

    pub fn new(hour: u8, minute: u8) -> Option<Self> {
        if hour < 24 && minute < 60 {
            Some(Self(hour as u16 * 60 + minute as u16))
        } else {
            None
        }
    }

    pub fn from_minutes(minutes: u16) -> Option<Self> {
        (minutes < Self::MINUTES_PER_DAY).then_some(Self(minutes))
    }

    pub fn from_chrono(time: NaiveTime) -> Self {
        Self(time.hour() as u16 * 60 + time.minute() as u16)
    }

    pub fn minutes(self) -> u16 {
        self.0
    }

    pub fn hour(self) -> u16 {
        self.0 / 60
    }

    pub fn minute(self) -> u16 {
        self.0 % 60
    }
}

impl FromStr for TimeOfDay {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let invalid = || ConfigError::InvalidTime(value.to_string());
        let (hour, minute) = value.trim().split_once(':').ok_or_else(invalid)?;
        if hour.is_empty() || hour.len() > 2 || minute.len() != 2 {
            return Err(invalid());
        }
        let hour = hour.parse::<u8>().map_err(|_| invalid())?;
        let minute = minute.parse::<u8>().map_err(|_| invalid())?;
        Self::new(hour, minute).ok_or_else(invalid)
    }
}

impl TryFrom<String> for TimeOfDay {
    type Error = ConfigError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<TimeOfDay> for String {
    fn from(time: TimeOfDay) -> Self {
        time.to_string()
    }
}

impl fmt::Display for TimeOfDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}

/// Daily lighting window. `on > off` means the window spans midnight.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightingWindow {
    pub on: TimeOfDay,
    pub off: TimeOfDay,
}

impl LightingWindow {
    pub fn new(on: TimeOfDay, off: TimeOfDay) -> Result<Self, ConfigError> {
        if on == off {
            return Err(ConfigError::EmptyWindow(on.to_string()));
        }
        Ok(Self { on, off })
    }

    pub fn contains(&self, now: TimeOfDay) -> bool {
        if self.on < self.off {
            self.on <= now && now < self.off
        } else {
            now >= self.on || now < self.off
        }
    }

    pub fn target(&self, now: TimeOfDay) -> BinaryState {
        BinaryState::from(self.contains(now))
    }
}
