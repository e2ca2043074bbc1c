use crate::error::SensorError;

/// Full scale of the 16-bit ADC codes reported by the analog front end.
pub const ADC_FULL_SCALE: f32 = 65_535.0;

/// One pass over one redundant climate sensor. Temperature and humidity fail
/// independently.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSample {
    pub sensor: usize,
    pub temperature: Result<f32, SensorError>,
    pub humidity: Result<f32, SensorError>,
}

impl SensorSample {
    pub fn failed(sensor: usize, err: SensorError) -> Self {
        Self {
            sensor,
            temperature: Err(err.clone()),
            humidity: Err(err),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClimateAggregate {
    pub temperature: Option<f32>,
    pub humidity: Option<f32>,
    pub temperature_sources: usize,
    pub humidity_sources: usize,
}

#[derive(Debug, Default)]
struct Mean {
    sum: f32,
    count: usize,
}

impl Mean {
    fn push(&mut self, value: &Result<f32, SensorError>) {
        if let Ok(value) = value {
            self.sum += value;
            self.count += 1;
        }
    }

    fn value(&self) -> Option<f32> {
        (self.count > 0).then(|| self.sum / self.count as f32)
    }
}

/// Mean of the successful readings per quantity. A quantity with no
/// successful reading aggregates to `None`.
pub fn aggregate(samples: &[SensorSample]) -> ClimateAggregate {
    let (temperature, humidity) = samples.iter().fold(
        (Mean::default(), Mean::default()),
        |(mut temperature, mut humidity), sample| {
            temperature.push(&sample.temperature);
            humidity.push(&sample.humidity);
            (temperature, humidity)
        },
    );

    ClimateAggregate {
        temperature: temperature.value(),
        humidity: humidity.value(),
        temperature_sources: temperature.count,
        humidity_sources: humidity.count,
    }
}

pub fn raw_to_volts(raw: u16, reference_volts: f32) -> f32 {
    raw as f32 / ADC_FULL_SCALE * reference_volts
}

/// Linear pH probe response: 2.5 V is neutral, 3 pH units per volt.
pub fn volts_to_ph(volts: f32) -> f32 {
    7.0 - (volts - 2.5) * 3.0
}

pub fn mean(values: &[f32]) -> Option<f32> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f32>() / values.len() as f32)
}
