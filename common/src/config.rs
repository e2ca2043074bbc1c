use serde::{Deserialize, Serialize};

use crate::{
    error::ConfigError,
    lighting::{LightingWindow, TimeOfDay},
};

/// Operator settings. Always valid: every constructor, mutator and the serde
/// path go through [`Configuration::new`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "SettingsFile", into = "SettingsFile")]
pub struct Configuration {
    min_temperature: f32,
    window: LightingWindow,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct SettingsFile {
    #[serde(rename = "minTemperature")]
    min_temperature: f32,
    #[serde(rename = "onTime")]
    on_time: TimeOfDay,
    #[serde(rename = "offTime")]
    off_time: TimeOfDay,
}

impl TryFrom<SettingsFile> for Configuration {
    type Error = ConfigError;

    fn try_from(file: SettingsFile) -> Result<Self, Self::Error> {
        Self::new(file.min_temperature, file.on_time, file.off_time)
    }
}

impl From<Configuration> for SettingsFile {
    fn from(config: Configuration) -> Self {
        Self {
            min_temperature: config.min_temperature,
            on_time: config.window.on,
            off_time: config.window.off,
        }
    }
}

impl Default for Configuration {
    fn default() -> Self {
        Self {
            min_temperature: 18.0,
            window: LightingWindow {
                on: TimeOfDay(5 * 60),
                off: TimeOfDay(19 * 60),
            },
        }
    }
}

impl Configuration {
    pub fn new(
        min_temperature: f32,
        on_time: TimeOfDay,
        off_time: TimeOfDay,
    ) -> Result<Self, ConfigError> {
        if !min_temperature.is_finite() {
            return Err(ConfigError::InvalidNumber(min_temperature.to_string()));
        }
        Ok(Self {
            min_temperature,
            window: LightingWindow::new(on_time, off_time)?,
        })
    }

    pub fn min_temperature(&self) -> f32 {
        self.min_temperature
    }

    pub fn on_time(&self) -> TimeOfDay {
        self.window.on
    }

    pub fn off_time(&self) -> TimeOfDay {
        self.window.off
    }

    pub fn lighting_window(&self) -> LightingWindow {
        self.window
    }

    pub fn with_min_temperature(self, min_temperature: f32) -> Result<Self, ConfigError> {
        Self::new(min_temperature, self.window.on, self.window.off)
    }

    pub fn with_on_time(self, on_time: TimeOfDay) -> Result<Self, ConfigError> {
        Self::new(self.min_temperature, on_time, self.window.off)
    }

    pub fn with_off_time(self, off_time: TimeOfDay) -> Result<Self, ConfigError> {
        Self::new(self.min_temperature, self.window.on, off_time)
    }
}

/// Parses an operator-entered setpoint.
pub fn parse_temperature(raw: &str) -> Result<f32, ConfigError> {
    raw.trim()
        .parse::<f32>()
        .ok()
        .filter(|value| value.is_finite())
        .ok_or_else(|| ConfigError::InvalidNumber(raw.to_string()))
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskConfig {
    pub adjust_interval_ms: u64,
    pub measure_interval_ms: u64,
    pub capture_interval_ms: u64,
    pub sensor_retry_budget: u32,
    pub sensor_retry_delay_ms: u64,
    pub min_valid_temp_c: f32,
    pub max_valid_temp_c: f32,
    pub ph_samples: u32,
    pub ph_sample_delay_ms: u64,
    pub heater_deadband_c: f32,
}

impl Default for TaskConfig {
    fn default() -> Self {
        Self {
            adjust_interval_ms: 1_000,
            measure_interval_ms: 30_000,
            capture_interval_ms: 6_000,
            sensor_retry_budget: 15,
            sensor_retry_delay_ms: 2_000,
            min_valid_temp_c: -40.0,
            max_valid_temp_c: 80.0,
            ph_samples: 10,
            ph_sample_delay_ms: 100,
            heater_deadband_c: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct HardwareConfig {
    pub climate_sensor_pins: Vec<u8>,
    pub led_first_pin: u8,
    pub led_second_pin: u8,
    pub heater_pin: u8,
    pub pump_pin: u8,
    pub water_level_channel: u8,
    pub ph_channel: u8,
    pub relay_active_low: bool,
    pub camera_enabled: bool,
}

impl Default for HardwareConfig {
    fn default() -> Self {
        Self {
            climate_sensor_pins: vec![4, 17, 27, 22],
            led_first_pin: 1,
            led_second_pin: 2,
            heater_pin: 3,
            pump_pin: 5,
            water_level_channel: 0,
            ph_channel: 1,
            relay_active_low: false,
            camera_enabled: false,
        }
    }
}

impl HardwareConfig {
    pub fn sanitize(&mut self) {
        if self.climate_sensor_pins.is_empty() {
            self.climate_sensor_pins = HardwareConfig::default().climate_sensor_pins;
        }
        if self.water_level_channel > 7 {
            self.water_level_channel = 0;
        }
        if self.ph_channel > 7 {
            self.ph_channel = 1;
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfig {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_user: String,
    pub mqtt_pass: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            mqtt_host: "127.0.0.1".to_string(),
            mqtt_port: 1883,
            mqtt_user: String::new(),
            mqtt_pass: String::new(),
        }
    }
}

/// Maps the water-level probe voltage to a level.
///
/// The probe and tank geometry have not been characterised, so the default is
/// `Uncalibrated`: the published "level" is the raw probe voltage.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WaterLevelCalibration {
    #[default]
    Uncalibrated,
    Linear {
        offset: f32,
        scale: f32,
    },
}

impl WaterLevelCalibration {
    pub fn level(self, volts: f32) -> f32 {
        match self {
            Self::Uncalibrated => volts,
            Self::Linear { offset, scale } => (volts - offset) * scale,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    pub tasks: TaskConfig,
    pub hardware: HardwareConfig,
    pub timezone: String,
    pub network: NetworkConfig,
    #[serde(default)]
    pub water_level: WaterLevelCalibration,
    #[serde(default = "default_adc_reference_volts")]
    pub adc_reference_volts: f32,
}

fn default_adc_reference_volts() -> f32 {
    5.0
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tasks: TaskConfig::default(),
            hardware: HardwareConfig::default(),
            timezone: "Asia/Seoul".to_string(),
            network: NetworkConfig::default(),
            water_level: WaterLevelCalibration::default(),
            adc_reference_volts: default_adc_reference_volts(),
        }
    }
}
