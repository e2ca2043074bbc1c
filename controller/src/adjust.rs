use std::{sync::Arc, time::Duration};

use chrono::Utc;
use chrono_tz::Tz;
use greenhouse_common::{ActuatorCommand, ClimateEngine, TimeOfDay};
use tracing::{info, warn};

use crate::{actuators::ActuatorDriver, scheduler::PeriodicTask, store::DeviceStateStore};

/// Local wall-clock time of day used for the lighting window.
pub trait Clock: Send + Sync {
    fn time_of_day(&self) -> TimeOfDay;
}

#[derive(Debug, Clone, Copy)]
pub struct ZonedClock {
    tz: Tz,
}

impl ZonedClock {
    pub fn new(tz: Tz) -> Self {
        Self { tz }
    }

    /// Unknown zone names fall back to UTC.
    pub fn from_name(name: &str) -> Self {
        let tz = name.parse::<Tz>().unwrap_or_else(|_| {
            warn!("unknown timezone {name:?}, using UTC");
            Tz::UTC
        });
        Self::new(tz)
    }

    pub fn tz(&self) -> Tz {
        self.tz
    }
}

impl Clock for ZonedClock {
    fn time_of_day(&self) -> TimeOfDay {
        TimeOfDay::from_chrono(Utc::now().with_timezone(&self.tz).time())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub TimeOfDay);

impl Clock for FixedClock {
    fn time_of_day(&self) -> TimeOfDay {
        self.0
    }
}

/// Runs the heater deadband and the lighting window once per cycle and pushes
/// the resulting transitions through the driver.
pub struct ActuationController {
    store: Arc<DeviceStateStore>,
    driver: ActuatorDriver,
    engine: ClimateEngine,
    clock: Box<dyn Clock>,
    period: Duration,
}

impl ActuationController {
    pub fn new(
        store: Arc<DeviceStateStore>,
        driver: ActuatorDriver,
        engine: ClimateEngine,
        clock: Box<dyn Clock>,
        period: Duration,
    ) -> Self {
        Self {
            store,
            driver,
            engine,
            clock,
            period,
        }
    }

    /// One control cycle at `now`. A rejected transition is logged and left
    /// for the next cycle; the remaining commands still run.
    pub async fn adjust(&mut self, now: TimeOfDay) -> Vec<ActuatorCommand> {
        let state = self.store.read().await;
        let commands = self
            .engine
            .evaluate(&state.readings, &state.config, &state.actuators, now);

        let mut applied = Vec::with_capacity(commands.len());
        for command in commands {
            match self.driver.set(command.actuator, command.state).await {
                Ok(()) => applied.push(command),
                Err(err) => warn!(
                    "could not switch {} {}: {err}",
                    command.actuator, command.state
                ),
            }
        }
        applied
    }
}

impl PeriodicTask for ActuationController {
    fn name(&self) -> &'static str {
        "adjust"
    }

    fn period(&self) -> Duration {
        self.period
    }

    async fn run_once(&mut self) -> anyhow::Result<()> {
        let now = self.clock.time_of_day();
        self.adjust(now).await;
        Ok(())
    }

    async fn on_stop(&mut self) {
        let failures = self.driver.all_off().await;
        if failures == 0 {
            info!("all actuators switched off");
        } else {
            warn!("{failures} actuator(s) could not be switched off");
        }
    }
}

#[cfg(test)]
mod tests {
    use greenhouse_common::{Actuator, BinaryState, Configuration};

    use super::*;
    use crate::{actuators::tests::Rig, scheduler::Scheduler, store::Measurement};

    fn at(hour: u8, minute: u8) -> TimeOfDay {
        TimeOfDay::new(hour, minute).unwrap()
    }

    fn controller(rig: &Rig, store: &Arc<DeviceStateStore>, now: TimeOfDay) -> ActuationController {
        ActuationController::new(
            Arc::clone(store),
            rig.driver(false, Arc::clone(store)),
            ClimateEngine::default(),
            Box::new(FixedClock(now)),
            Duration::from_secs(1),
        )
    }

    #[tokio::test]
    async fn cold_greenhouse_turns_heater_on() {
        let rig = Rig::new();
        let store = Arc::new(DeviceStateStore::new(Configuration::default()));
        store.apply_measurement(Measurement::Temperature(16.0)).await;
        let mut controller = controller(&rig, &store, at(12, 0));

        let applied = controller.adjust(at(12, 0)).await;

        assert!(applied.contains(&ActuatorCommand::new(Actuator::Heater, BinaryState::On)));
        assert_eq!(store.heater_state().await, BinaryState::On);
        assert_eq!(rig.heater.writes(), vec![true]);
    }

    #[tokio::test]
    async fn deadband_holds_then_releases() {
        let rig = Rig::new();
        let store = Arc::new(DeviceStateStore::new(Configuration::default()));
        let mut controller = controller(&rig, &store, at(4, 0));

        store.apply_measurement(Measurement::Temperature(17.0)).await;
        controller.adjust(at(4, 0)).await;
        store.apply_measurement(Measurement::Temperature(19.5)).await;
        controller.adjust(at(4, 0)).await;
        assert_eq!(store.heater_state().await, BinaryState::On);

        store.apply_measurement(Measurement::Temperature(20.5)).await;
        controller.adjust(at(4, 0)).await;
        assert_eq!(store.heater_state().await, BinaryState::Off);
        assert_eq!(rig.heater.writes(), vec![true, false]);
    }

    #[tokio::test]
    async fn lights_follow_window_without_rewrites() {
        let rig = Rig::new();
        let store = Arc::new(DeviceStateStore::new(Configuration::default()));
        let mut controller = controller(&rig, &store, at(4, 0));

        assert!(controller.adjust(at(4, 0)).await.is_empty());
        controller.adjust(at(6, 0)).await;
        controller.adjust(at(6, 1)).await;

        assert_eq!(store.led_first_state().await, BinaryState::On);
        assert_eq!(store.led_second_state().await, BinaryState::On);
        assert_eq!(rig.led_first.writes(), vec![true]);
        assert_eq!(rig.led_second.writes(), vec![true]);
    }

    #[tokio::test]
    async fn overnight_window() {
        let rig = Rig::new();
        let store = Arc::new(DeviceStateStore::new(
            Configuration::new(18.0, at(20, 0), at(6, 0)).unwrap(),
        ));
        let mut controller = controller(&rig, &store, at(23, 0));

        controller.adjust(at(23, 0)).await;
        assert_eq!(store.led_first_state().await, BinaryState::On);

        controller.adjust(at(10, 0)).await;
        assert_eq!(store.led_first_state().await, BinaryState::Off);
    }

    #[tokio::test]
    async fn driver_failure_is_retried_next_cycle() {
        let rig = Rig::new();
        let store = Arc::new(DeviceStateStore::new(Configuration::default()));
        store.apply_measurement(Measurement::Temperature(10.0)).await;
        let mut controller = controller(&rig, &store, at(12, 0));
        rig.heater.set_failing(true);

        let applied = controller.adjust(at(12, 0)).await;
        assert_eq!(store.heater_state().await, BinaryState::Off);
        // Lights still switched although the heater failed.
        assert_eq!(applied.len(), 2);

        rig.heater.set_failing(false);
        controller.adjust(at(12, 0)).await;
        assert_eq!(store.heater_state().await, BinaryState::On);
    }

    #[tokio::test]
    async fn unknown_temperature_leaves_heater_alone() {
        let rig = Rig::new();
        let store = Arc::new(DeviceStateStore::new(Configuration::default()));
        let mut controller = controller(&rig, &store, at(2, 0));

        assert!(controller.adjust(at(2, 0)).await.is_empty());
        assert!(rig.heater.writes().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_switches_everything_off() {
        let rig = Rig::new();
        let store = Arc::new(DeviceStateStore::new(Configuration::default()));
        store.apply_measurement(Measurement::Temperature(12.0)).await;
        let mut scheduler = Scheduler::new();
        scheduler.spawn(controller(&rig, &store, at(12, 0)));

        tokio::time::sleep(Duration::from_millis(2_500)).await;
        assert_eq!(store.heater_state().await, BinaryState::On);
        assert_eq!(store.led_first_state().await, BinaryState::On);

        scheduler.shutdown().await;

        let actuators = store.actuators().await;
        for actuator in Actuator::ALL {
            assert_eq!(actuators.get(actuator), BinaryState::Off, "{actuator}");
        }
        assert_eq!(rig.pump.writes(), vec![false]);
    }

    #[test]
    fn unknown_zone_falls_back_to_utc() {
        assert_eq!(ZonedClock::from_name("Mars/Olympus").tz(), Tz::UTC);
        assert_eq!(ZonedClock::from_name("Asia/Seoul").tz(), chrono_tz::Asia::Seoul);
    }
}
