use std::{ops::RangeInclusive, sync::Arc, time::Duration};

use anyhow::Context;
use greenhouse_common::{
    sampling::{self, SensorSample},
    ClimateAggregate, SensorError, TaskConfig, WaterLevelCalibration,
};
use tokio::task::JoinSet;
use tracing::{debug, info, warn};

use crate::{
    hardware::{AdcChannel, ThermoHygrometer},
    publish::SnapshotPublisher,
    scheduler::PeriodicTask,
    store::{DeviceStateStore, Measurement},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(attempts: u32, delay: Duration) -> Self {
        Self {
            attempts: attempts.max(1),
            delay,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ReaderSettings {
    pub retry: RetryPolicy,
    pub valid_temperature_c: RangeInclusive<f32>,
    pub adc_reference_volts: f32,
    pub water_level: WaterLevelCalibration,
    pub ph_samples: u32,
    pub ph_sample_delay: Duration,
}

impl ReaderSettings {
    pub fn from_config(
        tasks: &TaskConfig,
        water_level: WaterLevelCalibration,
        adc_reference_volts: f32,
    ) -> Self {
        Self {
            retry: RetryPolicy::new(
                tasks.sensor_retry_budget,
                Duration::from_millis(tasks.sensor_retry_delay_ms),
            ),
            valid_temperature_c: tasks.min_valid_temp_c..=tasks.max_valid_temp_c,
            adc_reference_volts,
            water_level,
            ph_samples: tasks.ph_samples.max(1),
            ph_sample_delay: Duration::from_millis(tasks.ph_sample_delay_ms),
        }
    }
}

impl Default for ReaderSettings {
    fn default() -> Self {
        Self::from_config(&TaskConfig::default(), WaterLevelCalibration::default(), 5.0)
    }
}

/// Owns every sensor handle. One pass per sensor class.
pub struct SensorReader {
    climate: Vec<Arc<dyn ThermoHygrometer>>,
    water_level: Arc<dyn AdcChannel>,
    ph: Arc<dyn AdcChannel>,
    settings: ReaderSettings,
}

impl SensorReader {
    pub fn new(
        climate: Vec<Arc<dyn ThermoHygrometer>>,
        water_level: Arc<dyn AdcChannel>,
        ph: Arc<dyn AdcChannel>,
        settings: ReaderSettings,
    ) -> Self {
        Self {
            climate,
            water_level,
            ph,
            settings,
        }
    }

    pub fn climate_sensor_count(&self) -> usize {
        self.climate.len()
    }

    /// Reads every climate sensor concurrently and waits for all of them.
    pub async fn sample_climate(&self) -> Vec<SensorSample> {
        let mut reads = JoinSet::new();
        for (index, sensor) in self.climate.iter().enumerate() {
            let sensor = Arc::clone(sensor);
            let retry = self.settings.retry;
            reads.spawn(async move { (index, read_with_retry(sensor, retry).await) });
        }

        let mut samples = Vec::with_capacity(self.climate.len());
        while let Some(joined) = reads.join_next().await {
            match joined {
                Ok((index, result)) => samples.push(self.to_sample(index, result)),
                Err(err) => warn!("climate sensor read task failed: {err}"),
            }
        }
        samples.sort_by_key(|sample| sample.sensor);
        samples
    }

    pub async fn measure_climate(&self, store: &DeviceStateStore) -> ClimateAggregate {
        let samples = self.sample_climate().await;
        let aggregate = sampling::aggregate(&samples);

        if aggregate.temperature.is_none() {
            warn!(
                "no climate sensor produced a temperature ({} sensors), keeping last value",
                samples.len()
            );
        }
        if aggregate.humidity.is_none() {
            warn!(
                "no climate sensor produced a humidity ({} sensors), keeping last value",
                samples.len()
            );
        }

        store.apply_climate(&aggregate).await;
        debug!(
            "climate pass: temperature {:?} from {} sensor(s), humidity {:?} from {} sensor(s)",
            aggregate.temperature,
            aggregate.temperature_sources,
            aggregate.humidity,
            aggregate.humidity_sources
        );
        aggregate
    }

    pub async fn measure_water_level(&self, store: &DeviceStateStore) -> Result<f32, SensorError> {
        let channel = Arc::clone(&self.water_level);
        let raw = on_bus(move || channel.read_raw()).await?;
        let volts = sampling::raw_to_volts(raw, self.settings.adc_reference_volts);
        let level = self.settings.water_level.level(volts);
        store.apply_measurement(Measurement::WaterLevel(level)).await;
        Ok(level)
    }

    /// Averages several pH samples; any failed sample fails the pass.
    pub async fn measure_ph(&self, store: &DeviceStateStore) -> Result<f32, SensorError> {
        let mut values = Vec::with_capacity(self.settings.ph_samples as usize);
        for sample in 0..self.settings.ph_samples {
            if sample > 0 {
                tokio::time::sleep(self.settings.ph_sample_delay).await;
            }
            let channel = Arc::clone(&self.ph);
            let raw = on_bus(move || channel.read_raw()).await?;
            let volts = sampling::raw_to_volts(raw, self.settings.adc_reference_volts);
            values.push(sampling::volts_to_ph(volts));
        }

        let ph = sampling::mean(&values).ok_or(SensorError::NoResponse)?;
        store.apply_measurement(Measurement::Ph(ph)).await;
        Ok(ph)
    }

    fn to_sample(&self, sensor: usize, result: Result<(f32, f32), SensorError>) -> SensorSample {
        match result {
            Ok((temperature, humidity)) => SensorSample {
                sensor,
                temperature: self.validate_temperature(temperature),
                humidity: validate_humidity(humidity),
            },
            Err(err) => SensorSample::failed(sensor, err),
        }
    }

    fn validate_temperature(&self, temperature: f32) -> Result<f32, SensorError> {
        if temperature.is_finite() && self.settings.valid_temperature_c.contains(&temperature) {
            Ok(temperature)
        } else {
            Err(SensorError::OutOfRange(temperature))
        }
    }
}

fn validate_humidity(humidity: f32) -> Result<f32, SensorError> {
    if humidity.is_finite() && (0.0..=100.0).contains(&humidity) {
        Ok(humidity)
    } else {
        Err(SensorError::OutOfRange(humidity))
    }
}

/// Runs one blocking bus transaction on the blocking pool.
async fn on_bus<T, F>(transaction: F) -> Result<T, SensorError>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T, SensorError> + Send + 'static,
{
    tokio::task::spawn_blocking(transaction)
        .await
        .unwrap_or_else(|err| Err(SensorError::Bus(format!("bus task failed: {err}"))))
}

async fn read_with_retry(
    sensor: Arc<dyn ThermoHygrometer>,
    retry: RetryPolicy,
) -> Result<(f32, f32), SensorError> {
    for attempt in 1..=retry.attempts {
        let handle = Arc::clone(&sensor);
        match on_bus(move || handle.read()).await {
            Ok(reading) => return Ok(reading),
            Err(err) => debug!(
                "climate read attempt {attempt}/{} failed: {err}",
                retry.attempts
            ),
        }
        if attempt < retry.attempts {
            tokio::time::sleep(retry.delay).await;
        }
    }
    Err(SensorError::RetriesExhausted(retry.attempts))
}

/// Periodic measurement pass: climate, then water level, then pH, then one
/// snapshot to the publisher.
pub struct MeasurementTask {
    reader: SensorReader,
    store: Arc<DeviceStateStore>,
    publisher: Option<SnapshotPublisher>,
    period: Duration,
}

impl MeasurementTask {
    pub fn new(reader: SensorReader, store: Arc<DeviceStateStore>, period: Duration) -> Self {
        Self {
            reader,
            store,
            publisher: None,
            period,
        }
    }

    pub fn with_publisher(mut self, publisher: SnapshotPublisher) -> Self {
        self.publisher = Some(publisher);
        self
    }
}

impl PeriodicTask for MeasurementTask {
    fn name(&self) -> &'static str {
        "measure"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn run_once(&mut self) -> anyhow::Result<()> {
        let climate = self.reader.measure_climate(&self.store).await;
        let water_level = self.reader.measure_water_level(&self.store).await;
        let ph = self.reader.measure_ph(&self.store).await;

        info!(
            "measured temperature {:?} humidity {:?} water level {:?} pH {:?}",
            climate.temperature,
            climate.humidity,
            water_level.as_ref().ok(),
            ph.as_ref().ok()
        );

        // Published even when a non-redundant sensor failed; stale values stay.
        if let Some(publisher) = &self.publisher {
            publisher.publish(&self.store).await;
        }

        water_level.context("water level measurement failed")?;
        ph.context("pH measurement failed")?;
        Ok(())
    }
}
