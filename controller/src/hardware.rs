//! Hardware seams. Only [`crate::sensors::SensorReader`] holds sensor handles
//! and only [`crate::actuators::ActuatorDriver`] holds output pins.

use greenhouse_common::SensorError;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("gpio {pin} write failed: {reason}")]
pub struct OutputError {
    pub pin: u8,
    pub reason: String,
}

pub trait OutputPin: Send {
    fn pin(&self) -> u8;
    fn write(&mut self, high: bool) -> Result<(), OutputError>;
}

/// Combined temperature (°C) and relative humidity (%) probe, one bus
/// transaction per read.
pub trait ThermoHygrometer: Send + Sync {
    fn read(&self) -> Result<(f32, f32), SensorError>;
}

/// One channel of the analog front end, reporting 16-bit codes.
pub trait AdcChannel: Send + Sync {
    fn read_raw(&self) -> Result<u16, SensorError>;
}

pub trait Camera: Send + Sync {
    fn capture(&self) -> Result<Vec<u8>, SensorError>;
}

/// Stand-ins used by the host build when no GPIO/SPI bus is present.
pub mod sim {
    use std::sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    };

    use tracing::debug;

    use super::*;

    #[derive(Debug, Clone)]
    pub struct SimulatedPin {
        pin: u8,
        level: Arc<AtomicBool>,
    }

    impl SimulatedPin {
        pub fn new(pin: u8) -> Self {
            Self {
                pin,
                level: Arc::new(AtomicBool::new(false)),
            }
        }

        pub fn level(&self) -> bool {
            self.level.load(Ordering::Relaxed)
        }
    }

    impl OutputPin for SimulatedPin {
        fn pin(&self) -> u8 {
            self.pin
        }

        fn write(&mut self, high: bool) -> Result<(), OutputError> {
            debug!("gpio {} -> {}", self.pin, if high { "HIGH" } else { "LOW" });
            self.level.store(high, Ordering::Relaxed);
            Ok(())
        }
    }

    /// Slowly drifting climate probe that drops every `fail_every`-th read,
    /// the way a DHT line occasionally misses its checksum.
    #[derive(Debug)]
    pub struct SimulatedThermoHygrometer {
        pin: u8,
        reads: AtomicU64,
        fail_every: u64,
    }

    impl SimulatedThermoHygrometer {
        pub fn new(pin: u8, fail_every: u64) -> Self {
            Self {
                pin,
                reads: AtomicU64::new(0),
                fail_every: fail_every.max(2),
            }
        }
    }

    impl ThermoHygrometer for SimulatedThermoHygrometer {
        fn read(&self) -> Result<(f32, f32), SensorError> {
            let tick = self.reads.fetch_add(1, Ordering::Relaxed) + 1;
            if tick % self.fail_every == 0 {
                return Err(SensorError::Bus(format!("checksum mismatch on gpio {}", self.pin)));
            }
            let offset = (self.pin % 4) as f32 * 0.1;
            let temperature = 17.0 + ((tick % 12) as f32 * 0.3) + offset;
            let humidity = 55.0 + ((tick % 6) as f32 * 0.5) - offset;
            Ok((temperature, humidity))
        }
    }

    #[derive(Debug)]
    pub struct SimulatedAdc {
        channel: u8,
        base: u16,
        reads: AtomicU64,
    }

    impl SimulatedAdc {
        pub fn new(channel: u8, base: u16) -> Self {
            Self {
                channel,
                base,
                reads: AtomicU64::new(0),
            }
        }
    }

    impl AdcChannel for SimulatedAdc {
        fn read_raw(&self) -> Result<u16, SensorError> {
            let tick = self.reads.fetch_add(1, Ordering::Relaxed);
            let jitter = ((tick % 5) as u16) * 64;
            debug!("adc channel {} read", self.channel);
            Ok(self.base.saturating_add(jitter))
        }
    }

    /// Produces a small binary PPM test pattern that shifts every capture.
    #[derive(Debug)]
    pub struct SimulatedCamera {
        width: usize,
        height: usize,
        frames: AtomicU64,
    }

    impl SimulatedCamera {
        pub fn new(width: usize, height: usize) -> Self {
            Self {
                width,
                height,
                frames: AtomicU64::new(0),
            }
        }
    }

    impl Camera for SimulatedCamera {
        fn capture(&self) -> Result<Vec<u8>, SensorError> {
            let frame = self.frames.fetch_add(1, Ordering::Relaxed) as usize;
            let mut image = format!("P6\n{} {}\n255\n", self.width, self.height).into_bytes();
            image.reserve(self.width * self.height * 3);
            for y in 0..self.height {
                for x in 0..self.width {
                    image.push(((x + frame) % 256) as u8);
                    image.push(((y * 2) % 256) as u8);
                    image.push(96);
                }
            }
            Ok(image)
        }
    }
}
