use greenhouse_common::{
    Actuator, ActuatorStates, BinaryState, ClimateAggregate, ConfigError, Configuration,
    DeviceState, Readings, TimeOfDay,
};
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Measurement {
    Temperature(f32),
    Humidity(f32),
    WaterLevel(f32),
    Ph(f32),
}

/// Single source of truth for readings, actuator states and operator
/// settings.
///
/// Readings, actuator states and settings are three independent lock groups;
/// each write is atomic within its group. Actuator states can only be written
/// from inside this crate, by [`crate::actuators::ActuatorDriver`].
#[derive(Debug, Default)]
pub struct DeviceStateStore {
    readings: RwLock<Readings>,
    actuators: RwLock<ActuatorStates>,
    config: RwLock<Configuration>,
}

impl DeviceStateStore {
    pub fn new(config: Configuration) -> Self {
        Self {
            readings: RwLock::new(Readings::default()),
            actuators: RwLock::new(ActuatorStates::default()),
            config: RwLock::new(config),
        }
    }

    pub async fn read(&self) -> DeviceState {
        DeviceState {
            readings: *self.readings.read().await,
            actuators: *self.actuators.read().await,
            config: *self.config.read().await,
        }
    }

    pub async fn readings(&self) -> Readings {
        *self.readings.read().await
    }

    pub async fn actuators(&self) -> ActuatorStates {
        *self.actuators.read().await
    }

    pub async fn temperature(&self) -> Option<f32> {
        self.readings.read().await.temperature
    }

    pub async fn humidity(&self) -> Option<f32> {
        self.readings.read().await.humidity
    }

    pub async fn water_level(&self) -> Option<f32> {
        self.readings.read().await.water_level
    }

    pub async fn ph(&self) -> Option<f32> {
        self.readings.read().await.ph
    }

    pub async fn led_first_state(&self) -> BinaryState {
        self.actuators.read().await.led_first
    }

    pub async fn led_second_state(&self) -> BinaryState {
        self.actuators.read().await.led_second
    }

    pub async fn heater_state(&self) -> BinaryState {
        self.actuators.read().await.heater
    }

    pub async fn pump_state(&self) -> BinaryState {
        self.actuators.read().await.pump
    }

    pub async fn config(&self) -> Configuration {
        *self.config.read().await
    }

    pub async fn set_min_temperature(
        &self,
        min_temperature: f32,
    ) -> Result<Configuration, ConfigError> {
        let mut config = self.config.write().await;
        *config = config.with_min_temperature(min_temperature)?;
        Ok(*config)
    }

    pub async fn set_on_time(&self, on_time: TimeOfDay) -> Result<Configuration, ConfigError> {
        let mut config = self.config.write().await;
        *config = config.with_on_time(on_time)?;
        Ok(*config)
    }

    pub async fn set_off_time(&self, off_time: TimeOfDay) -> Result<Configuration, ConfigError> {
        let mut config = self.config.write().await;
        *config = config.with_off_time(off_time)?;
        Ok(*config)
    }

    pub async fn write_config(
        &self,
        min_temperature: f32,
        on_time: TimeOfDay,
        off_time: TimeOfDay,
    ) -> Result<Configuration, ConfigError> {
        let next = Configuration::new(min_temperature, on_time, off_time)?;
        *self.config.write().await = next;
        Ok(next)
    }

    pub(crate) async fn apply_measurement(&self, measurement: Measurement) {
        let mut readings = self.readings.write().await;
        match measurement {
            Measurement::Temperature(value) => readings.temperature = Some(value),
            Measurement::Humidity(value) => readings.humidity = Some(value),
            Measurement::WaterLevel(value) => readings.water_level = Some(value),
            Measurement::Ph(value) => readings.ph = Some(value),
        }
    }

    /// Applies whichever quantities the pass produced; the rest keep their
    /// last known value.
    pub(crate) async fn apply_climate(&self, aggregate: &ClimateAggregate) {
        let mut readings = self.readings.write().await;
        if let Some(temperature) = aggregate.temperature {
            readings.temperature = Some(temperature);
        }
        if let Some(humidity) = aggregate.humidity {
            readings.humidity = Some(humidity);
        }
    }

    pub(crate) async fn apply_actuator_state(&self, actuator: Actuator, state: BinaryState) {
        self.actuators.write().await.set(actuator, state);
    }
}
