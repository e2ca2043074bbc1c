use crate::{
    config::Configuration,
    lighting::TimeOfDay,
    types::{Actuator, ActuatorStates, BinaryState, Readings},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActuatorCommand {
    pub actuator: Actuator,
    pub state: BinaryState,
}

impl ActuatorCommand {
    pub fn new(actuator: Actuator, state: BinaryState) -> Self {
        Self { actuator, state }
    }
}

/// Heater deadband and lighting window decisions.
///
/// Stateless: every call is a function of the readings, the operator settings
/// and the recorded actuator states. Only transitions are returned, so
/// applying the commands and evaluating again yields nothing.
#[derive(Debug, Clone, Copy)]
pub struct ClimateEngine {
    heater_deadband_c: f32,
}

impl Default for ClimateEngine {
    fn default() -> Self {
        Self::new(2.0)
    }
}

impl ClimateEngine {
    pub fn new(heater_deadband_c: f32) -> Self {
        Self { heater_deadband_c }
    }

    pub fn heater_deadband_c(&self) -> f32 {
        self.heater_deadband_c
    }

    pub fn evaluate(
        &self,
        readings: &Readings,
        config: &Configuration,
        actuators: &ActuatorStates,
        now: TimeOfDay,
    ) -> Vec<ActuatorCommand> {
        let mut commands = Vec::new();

        let heater = self.heater_target(readings.temperature, config, actuators.heater);
        if heater != actuators.heater {
            commands.push(ActuatorCommand::new(Actuator::Heater, heater));
        }

        // Both banks follow the same window.
        let lights = config.lighting_window().target(now);
        for bank in [Actuator::LedFirst, Actuator::LedSecond] {
            if actuators.get(bank) != lights {
                commands.push(ActuatorCommand::new(bank, lights));
            }
        }

        commands
    }

    pub fn heater_target(
        &self,
        temperature: Option<f32>,
        config: &Configuration,
        current: BinaryState,
    ) -> BinaryState {
        let Some(temperature) = temperature else {
            return current;
        };

        let lower_bound = config.min_temperature();
        let upper_bound = lower_bound + self.heater_deadband_c;

        match current {
            BinaryState::Off if temperature < lower_bound => BinaryState::On,
            BinaryState::On if temperature > upper_bound => BinaryState::Off,
            _ => current,
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn at(hour: u8, minute: u8) -> TimeOfDay {
        TimeOfDay::new(hour, minute).unwrap()
    }

    fn readings(temperature: f32) -> Readings {
        Readings {
            temperature: Some(temperature),
            ..Readings::default()
        }
    }

    fn lights_on() -> ActuatorStates {
        ActuatorStates {
            led_first: BinaryState::On,
            led_second: BinaryState::On,
            ..ActuatorStates::default()
        }
    }

    #[test]
    fn turns_heater_on_below_setpoint() {
        let engine = ClimateEngine::default();
        let config = Configuration::default();

        let commands = engine.evaluate(&readings(16.0), &config, &lights_on(), at(12, 0));

        assert_eq!(
            commands,
            vec![ActuatorCommand::new(Actuator::Heater, BinaryState::On)]
        );
    }

    #[test]
    fn turns_heater_off_above_deadband() {
        let engine = ClimateEngine::default();
        let config = Configuration::default();
        let mut actuators = lights_on();
        actuators.heater = BinaryState::On;

        let commands = engine.evaluate(&readings(20.1), &config, &actuators, at(12, 0));

        assert_eq!(
            commands,
            vec![ActuatorCommand::new(Actuator::Heater, BinaryState::Off)]
        );
    }

    #[test]
    fn deadband_holds_either_state() {
        let engine = ClimateEngine::default();
        let config = Configuration::default();

        for tenths in 180..=200 {
            let temperature = tenths as f32 / 10.0;
            for current in [BinaryState::On, BinaryState::Off] {
                assert_eq!(
                    engine.heater_target(Some(temperature), &config, current),
                    current,
                    "{temperature} from {current}"
                );
            }
        }
    }

    #[test]
    fn heater_thresholds_follow_setpoint() {
        let engine = ClimateEngine::new(2.0);
        let config = Configuration::default().with_min_temperature(10.0).unwrap();

        for tenths in -100..=300 {
            let temperature = tenths as f32 / 10.0;
            let from_off = engine.heater_target(Some(temperature), &config, BinaryState::Off);
            let from_on = engine.heater_target(Some(temperature), &config, BinaryState::On);

            assert_eq!(from_off.is_on(), temperature < 10.0, "{temperature}");
            assert_eq!(from_on.is_on(), temperature <= 12.0, "{temperature}");
        }
    }

    #[test]
    fn unknown_temperature_holds_heater() {
        let engine = ClimateEngine::default();
        let config = Configuration::default();

        assert_eq!(
            engine.heater_target(None, &config, BinaryState::On),
            BinaryState::On
        );
        assert_eq!(
            engine.heater_target(None, &config, BinaryState::Off),
            BinaryState::Off
        );
    }

    #[test]
    fn lights_follow_window_together() {
        let engine = ClimateEngine::default();
        let config = Configuration::default();
        let idle = readings(19.0);

        let morning = engine.evaluate(&idle, &config, &ActuatorStates::default(), at(6, 0));
        assert_eq!(
            morning,
            vec![
                ActuatorCommand::new(Actuator::LedFirst, BinaryState::On),
                ActuatorCommand::new(Actuator::LedSecond, BinaryState::On),
            ]
        );

        let night = engine.evaluate(&idle, &config, &lights_on(), at(4, 0));
        assert_eq!(
            night,
            vec![
                ActuatorCommand::new(Actuator::LedFirst, BinaryState::Off),
                ActuatorCommand::new(Actuator::LedSecond, BinaryState::Off),
            ]
        );
    }

    #[test]
    fn wrapped_window_scenario() {
        let engine = ClimateEngine::default();
        let config = Configuration::default()
            .with_on_time(at(20, 0))
            .and_then(|config| config.with_off_time(at(6, 0)))
            .unwrap();
        let idle = readings(19.0);

        let late = engine.evaluate(&idle, &config, &ActuatorStates::default(), at(23, 0));
        assert_eq!(late.len(), 2);
        assert!(late.iter().all(|command| command.state == BinaryState::On));

        let day = engine.evaluate(&idle, &config, &ActuatorStates::default(), at(10, 0));
        assert!(day.is_empty());
    }

    #[test]
    fn only_diverging_bank_is_commanded() {
        let engine = ClimateEngine::default();
        let config = Configuration::default();
        let actuators = ActuatorStates {
            led_first: BinaryState::On,
            ..ActuatorStates::default()
        };

        let commands = engine.evaluate(&readings(19.0), &config, &actuators, at(12, 0));

        assert_eq!(
            commands,
            vec![ActuatorCommand::new(Actuator::LedSecond, BinaryState::On)]
        );
    }

    #[test]
    fn settled_state_produces_no_commands() {
        let engine = ClimateEngine::default();
        let config = Configuration::default();

        let commands = engine.evaluate(&readings(19.0), &config, &lights_on(), at(12, 0));

        assert!(commands.is_empty());
    }
}
