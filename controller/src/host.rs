use std::{io::ErrorKind, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use rumqttc::{AsyncClient, Event, EventLoop, Incoming, LastWill, MqttOptions, QoS};
use serde::Serialize;
use tokio::sync::{mpsc, Mutex};
use tracing::{error, info, warn};

use greenhouse_common::{
    config::parse_temperature, ClimateEngine, ConfigError, Configuration, RuntimeConfig,
    StatusSnapshot, TimeOfDay, TOPIC_CAMERA_FRAME, TOPIC_CMD_MIN_TEMPERATURE, TOPIC_CMD_OFF_TIME,
    TOPIC_CMD_ON_TIME, TOPIC_CONFIG_REJECTED, TOPIC_CONTROLLER_STATE, TOPIC_CONTROLLER_STATUS,
};
use greenhouse_controller::{
    hardware::{
        sim::{SimulatedAdc, SimulatedCamera, SimulatedPin, SimulatedThermoHygrometer},
        AdcChannel, ThermoHygrometer,
    },
    ActuationController, ActuatorDriver, ActuatorPins, CaptureTask, DeviceStateStore, Frame,
    MeasurementTask, ReaderSettings, Scheduler, SensorReader, SnapshotPublisher, ZonedClock,
};

const MAX_MQTT_PAYLOAD_BYTES: usize = 512;
const SNAPSHOT_QUEUE: usize = 8;
const FRAME_QUEUE: usize = 2;

#[derive(Clone)]
struct AppState {
    store: Arc<DeviceStateStore>,
    mqtt: AsyncClient,
    files: AppStore,
}

#[derive(Clone)]
struct AppStore {
    runtime_path: Arc<PathBuf>,
    settings_path: Arc<PathBuf>,
    lock: Arc<Mutex<()>>,
}

#[derive(Debug, Serialize)]
struct ConfigRejection {
    code: &'static str,
    message: String,
}

pub async fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let files = AppStore::new();
    let mut runtime = files.load_runtime_config().await.unwrap_or_else(|err| {
        warn!("failed to load runtime config from store: {err:#}");
        RuntimeConfig::default()
    });
    runtime.hardware.sanitize();
    apply_env_overrides(&mut runtime, |key| std::env::var(key).ok());

    let settings = files.load_settings().await;
    info!(
        "settings: min temperature {} lights {}..{}",
        settings.min_temperature(),
        settings.on_time(),
        settings.off_time()
    );
    let store = Arc::new(DeviceStateStore::new(settings));

    let mut driver = build_driver(&runtime, Arc::clone(&store));
    driver
        .initialize()
        .await
        .context("failed to switch actuators off at startup")?;

    let (mqtt, eventloop) = AsyncClient::new(mqtt_options(&runtime), 64);
    let app_state = AppState {
        store: Arc::clone(&store),
        mqtt,
        files,
    };
    spawn_mqtt_loop(app_state.clone(), eventloop);

    let (publisher, snapshots) = SnapshotPublisher::channel(SNAPSHOT_QUEUE);
    spawn_snapshot_forwarder(app_state.mqtt.clone(), snapshots);

    let mut scheduler = Scheduler::new();
    scheduler.spawn(ActuationController::new(
        Arc::clone(&store),
        driver,
        ClimateEngine::new(runtime.tasks.heater_deadband_c),
        Box::new(ZonedClock::from_name(&runtime.timezone)),
        Duration::from_millis(runtime.tasks.adjust_interval_ms),
    ));
    scheduler.spawn(
        MeasurementTask::new(
            build_reader(&runtime),
            Arc::clone(&store),
            Duration::from_millis(runtime.tasks.measure_interval_ms),
        )
        .with_publisher(publisher),
    );
    if runtime.hardware.camera_enabled {
        let (capture, frames) = CaptureTask::new(
            Arc::new(SimulatedCamera::new(64, 48)),
            Duration::from_millis(runtime.tasks.capture_interval_ms),
            FRAME_QUEUE,
        );
        scheduler.spawn(capture);
        spawn_frame_forwarder(app_state.mqtt.clone(), frames);
    }
    info!("controller running tasks {:?}", scheduler.task_names());

    wait_for_shutdown().await?;
    info!("shutdown requested");
    scheduler.shutdown().await;

    go_offline(&app_state.mqtt).await;
    Ok(())
}

/// Publishes the retained offline status and disconnects. Returns the number of failed steps.
async fn go_offline(mqtt: &AsyncClient) -> usize {
    let mut failures = 0;
    if let Err(err) = mqtt
        .publish(TOPIC_CONTROLLER_STATUS, QoS::AtLeastOnce, true, "offline")
        .await
    {
        warn!("offline status publish failed: {err}");
        failures += 1;
    }
    if let Err(err) = mqtt.disconnect().await {
        warn!("mqtt disconnect failed: {err}");
        failures += 1;
    }
    failures
}

fn apply_env_overrides(runtime: &mut RuntimeConfig, var: impl Fn(&str) -> Option<String>) {
    if let Some(host) = var("MQTT_HOST") {
        runtime.network.mqtt_host = host;
    }
    if let Some(port) = var("MQTT_PORT").and_then(|value| value.parse::<u16>().ok()) {
        runtime.network.mqtt_port = port;
    }
    if let Some(user) = var("MQTT_USER") {
        runtime.network.mqtt_user = user;
    }
    if let Some(pass) = var("MQTT_PASS") {
        runtime.network.mqtt_pass = pass;
    }
    if let Some(timezone) = var("GREENHOUSE_TZ") {
        runtime.timezone = timezone;
    }
}

fn mqtt_options(runtime: &RuntimeConfig) -> MqttOptions {
    let network = &runtime.network;
    let mut options = MqttOptions::new(
        "greenhouse-controller",
        network.mqtt_host.clone(),
        network.mqtt_port,
    );
    options.set_keep_alive(Duration::from_secs(30));
    options.set_last_will(LastWill::new(
        TOPIC_CONTROLLER_STATUS,
        b"offline".to_vec(),
        QoS::AtLeastOnce,
        true,
    ));
    if !network.mqtt_user.is_empty() {
        options.set_credentials(network.mqtt_user.clone(), network.mqtt_pass.clone());
    }
    options
}

fn build_driver(runtime: &RuntimeConfig, store: Arc<DeviceStateStore>) -> ActuatorDriver {
    let hardware = &runtime.hardware;
    let pins = ActuatorPins {
        led_first: Box::new(SimulatedPin::new(hardware.led_first_pin)),
        led_second: Box::new(SimulatedPin::new(hardware.led_second_pin)),
        heater: Box::new(SimulatedPin::new(hardware.heater_pin)),
        pump: Box::new(SimulatedPin::new(hardware.pump_pin)),
    };
    ActuatorDriver::new(pins, hardware.relay_active_low, store)
}

fn build_reader(runtime: &RuntimeConfig) -> SensorReader {
    let hardware = &runtime.hardware;
    let climate = hardware
        .climate_sensor_pins
        .iter()
        .map(|&pin| Arc::new(SimulatedThermoHygrometer::new(pin, 7)) as Arc<dyn ThermoHygrometer>)
        .collect();
    // ~1 V on the level probe, 2.5 V (neutral) on the pH probe.
    let water_level: Arc<dyn AdcChannel> =
        Arc::new(SimulatedAdc::new(hardware.water_level_channel, 13_107));
    let ph: Arc<dyn AdcChannel> = Arc::new(SimulatedAdc::new(hardware.ph_channel, 32_768));

    SensorReader::new(
        climate,
        water_level,
        ph,
        ReaderSettings::from_config(
            &runtime.tasks,
            runtime.water_level,
            runtime.adc_reference_volts,
        ),
    )
}

async fn subscribe_topics(mqtt: &AsyncClient) -> anyhow::Result<()> {
    let topics = [
        TOPIC_CMD_MIN_TEMPERATURE,
        TOPIC_CMD_ON_TIME,
        TOPIC_CMD_OFF_TIME,
    ];

    for topic in topics {
        mqtt.subscribe(topic, QoS::AtLeastOnce).await?;
    }
    Ok(())
}

fn spawn_mqtt_loop(app_state: AppState, mut eventloop: EventLoop) {
    tokio::spawn(async move {
        loop {
            match eventloop.poll().await {
                Ok(Event::Incoming(Incoming::Publish(message))) => {
                    if let Err(err) =
                        handle_mqtt_message(&app_state, &message.topic, message.payload.to_vec())
                            .await
                    {
                        warn!("mqtt message handling error: {err:#}");
                    }
                }
                Ok(Event::Incoming(Incoming::ConnAck(_))) => {
                    info!("mqtt connected");
                    if let Err(err) = subscribe_topics(&app_state.mqtt).await {
                        error!("mqtt subscribe failed: {err:#}");
                    }
                    if let Err(err) = app_state
                        .mqtt
                        .publish(TOPIC_CONTROLLER_STATUS, QoS::AtLeastOnce, true, "online")
                        .await
                    {
                        warn!("online status publish failed: {err}");
                    }
                }
                Ok(_) => {}
                Err(err) => {
                    warn!("mqtt poll error: {err}");
                    tokio::time::sleep(Duration::from_secs(2)).await;
                }
            }
        }
    });
}

fn spawn_snapshot_forwarder(mqtt: AsyncClient, mut snapshots: mpsc::Receiver<StatusSnapshot>) {
    tokio::spawn(async move {
        while let Some(snapshot) = snapshots.recv().await {
            match serde_json::to_vec(&snapshot) {
                Ok(body) => {
                    if let Err(err) = mqtt
                        .publish(TOPIC_CONTROLLER_STATE, QoS::AtLeastOnce, true, body)
                        .await
                    {
                        warn!("controller state publish failed: {err}");
                    }
                }
                Err(err) => warn!("controller state serialization failed: {err}"),
            }
        }
    });
}

fn spawn_frame_forwarder(mqtt: AsyncClient, mut frames: mpsc::Receiver<Frame>) {
    tokio::spawn(async move {
        while let Some(frame) = frames.recv().await {
            if let Err(err) = mqtt
                .publish(TOPIC_CAMERA_FRAME, QoS::AtMostOnce, false, frame.image)
                .await
            {
                warn!("camera frame {} publish failed: {err}", frame.sequence);
            }
        }
    });
}

async fn handle_mqtt_message(
    app_state: &AppState,
    topic: &str,
    payload: Vec<u8>,
) -> anyhow::Result<()> {
    if payload.len() > MAX_MQTT_PAYLOAD_BYTES {
        warn!(
            "dropping oversized MQTT payload on topic {} ({} bytes)",
            topic,
            payload.len()
        );
        return Ok(());
    }

    let message = String::from_utf8(payload).context("non utf8 mqtt payload")?;

    match apply_config_command(&app_state.store, topic, &message).await {
        Ok(Some(config)) => {
            info!("settings updated from {topic}");
            app_state.files.save_settings(&config).await?;
        }
        Ok(None) => {}
        Err(err) => {
            warn!("rejected {topic} = {message:?}: {err}");
            let body = serde_json::to_vec(&ConfigRejection {
                code: err.code(),
                message: err.to_string(),
            })?;
            app_state
                .mqtt
                .publish(TOPIC_CONFIG_REJECTED, QoS::AtLeastOnce, false, body)
                .await?;
        }
    }
    Ok(())
}

/// `Ok(None)` for topics that are not configuration commands.
async fn apply_config_command(
    store: &DeviceStateStore,
    topic: &str,
    message: &str,
) -> Result<Option<Configuration>, ConfigError> {
    let config = match topic {
        TOPIC_CMD_MIN_TEMPERATURE => store.set_min_temperature(parse_temperature(message)?).await?,
        TOPIC_CMD_ON_TIME => store.set_on_time(message.trim().parse::<TimeOfDay>()?).await?,
        TOPIC_CMD_OFF_TIME => store.set_off_time(message.trim().parse::<TimeOfDay>()?).await?,
        _ => return Ok(None),
    };
    Ok(Some(config))
}

#[cfg(unix)]
async fn wait_for_shutdown() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = signal(SignalKind::terminate()).context("failed to install SIGTERM handler")?;
    tokio::select! {
        result = tokio::signal::ctrl_c() => result.context("failed to listen for ctrl-c")?,
        _ = sigterm.recv() => {}
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown() -> anyhow::Result<()> {
    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for ctrl-c")
}

impl AppStore {
    fn new() -> Self {
        let data_dir = std::env::var("GREENHOUSE_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("./.greenhouse"));
        Self::in_dir(data_dir)
    }

    fn in_dir(data_dir: PathBuf) -> Self {
        Self {
            runtime_path: Arc::new(data_dir.join("runtime.json")),
            settings_path: Arc::new(data_dir.join("settings.json")),
            lock: Arc::new(Mutex::new(())),
        }
    }

    async fn load_runtime_config(&self) -> anyhow::Result<RuntimeConfig> {
        let _guard = self.lock.lock().await;
        match tokio::fs::read(self.runtime_path.as_ref()).await {
            Ok(raw) => Ok(serde_json::from_slice::<RuntimeConfig>(&raw)?),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(RuntimeConfig::default()),
            Err(err) => Err(err.into()),
        }
    }

    /// Never fails: a missing, unreadable or invalid file yields the defaults.
    async fn load_settings(&self) -> Configuration {
        let _guard = self.lock.lock().await;
        let path = self.settings_path.as_ref();
        match tokio::fs::read(path).await {
            Ok(raw) => serde_json::from_slice::<Configuration>(&raw).unwrap_or_else(|err| {
                warn!("invalid settings in {}: {err}, using defaults", path.display());
                Configuration::default()
            }),
            Err(err) if err.kind() == ErrorKind::NotFound => Configuration::default(),
            Err(err) => {
                warn!("failed to read {}: {err}, using defaults", path.display());
                Configuration::default()
            }
        }
    }

    async fn save_settings(&self, config: &Configuration) -> anyhow::Result<()> {
        let _guard = self.lock.lock().await;
        let path = self.settings_path.as_ref().clone();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let payload = serde_json::to_vec_pretty(config)?;
        tokio::fs::write(&path, payload)
            .await
            .with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "greenhouse-host-{}-{name}",
            std::process::id()
        ));
        let _ = std::fs::remove_dir_all(&dir);
        dir
    }

    fn at(hour: u8, minute: u8) -> TimeOfDay {
        TimeOfDay::new(hour, minute).unwrap()
    }

    #[tokio::test]
    async fn missing_files_yield_defaults() {
        let files = AppStore::in_dir(scratch_dir("missing"));

        assert_eq!(files.load_settings().await, Configuration::default());
        let runtime = files.load_runtime_config().await.unwrap();
        assert_eq!(runtime.timezone, "Asia/Seoul");
    }

    #[tokio::test]
    async fn settings_round_trip_through_disk() {
        let dir = scratch_dir("round-trip");
        let files = AppStore::in_dir(dir.clone());
        let config = Configuration::new(21.0, at(20, 0), at(6, 30)).unwrap();

        files.save_settings(&config).await.unwrap();

        let raw = std::fs::read_to_string(dir.join("settings.json")).unwrap();
        assert!(raw.contains("\"onTime\": \"20:00\""));
        assert_eq!(files.load_settings().await, config);
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn invalid_settings_file_falls_back() {
        let dir = scratch_dir("invalid");
        std::fs::create_dir_all(&dir).unwrap();
        let files = AppStore::in_dir(dir.clone());

        std::fs::write(
            dir.join("settings.json"),
            r#"{"minTemperature": 20.0, "onTime": "07:00", "offTime": "07:00"}"#,
        )
        .unwrap();
        assert_eq!(files.load_settings().await, Configuration::default());

        std::fs::write(dir.join("settings.json"), "not json").unwrap();
        assert_eq!(files.load_settings().await, Configuration::default());

        std::fs::write(
            dir.join("settings.json"),
            r#"{"minTemperature": 20.0, "onTime": "7:00", "offTime": "25:00"}"#,
        )
        .unwrap();
        assert_eq!(files.load_settings().await, Configuration::default());
        let _ = std::fs::remove_dir_all(dir);
    }

    #[tokio::test]
    async fn config_commands_update_store() {
        let store = DeviceStateStore::new(Configuration::default());

        let config = apply_config_command(&store, TOPIC_CMD_MIN_TEMPERATURE, " 16.5 ")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(config.min_temperature(), 16.5);

        apply_config_command(&store, TOPIC_CMD_ON_TIME, "6:15")
            .await
            .unwrap();
        assert_eq!(store.config().await.on_time(), at(6, 15));

        assert_eq!(
            apply_config_command(&store, "greenhouse/other", "1").await,
            Ok(None)
        );
    }

    #[tokio::test]
    async fn config_commands_reject_with_distinct_codes() {
        let store = DeviceStateStore::new(Configuration::default());

        let err = apply_config_command(&store, TOPIC_CMD_MIN_TEMPERATURE, "warm")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_number");

        let err = apply_config_command(&store, TOPIC_CMD_OFF_TIME, "7pm")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "invalid_time");

        let err = apply_config_command(&store, TOPIC_CMD_OFF_TIME, "05:00")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "empty_window");

        assert_eq!(store.config().await, Configuration::default());
    }

    #[test]
    fn rejection_body_shape() {
        let err = ConfigError::EmptyWindow("05:00".to_string());
        let body = serde_json::to_value(ConfigRejection {
            code: err.code(),
            message: err.to_string(),
        })
        .unwrap();

        assert_eq!(body["code"], "empty_window");
        assert_eq!(
            body["message"],
            "lighting on time and off time cannot both be 05:00"
        );
    }

    #[test]
    fn env_overrides_win_over_file() {
        let env: HashMap<&str, &str> = [
            ("MQTT_HOST", "broker.local"),
            ("MQTT_PORT", "8883"),
            ("GREENHOUSE_TZ", "Europe/Berlin"),
        ]
        .into_iter()
        .collect();
        let mut runtime = RuntimeConfig::default();

        apply_env_overrides(&mut runtime, |key| env.get(key).map(|v| v.to_string()));

        assert_eq!(runtime.network.mqtt_host, "broker.local");
        assert_eq!(runtime.network.mqtt_port, 8883);
        assert_eq!(runtime.network.mqtt_user, "");
        assert_eq!(runtime.timezone, "Europe/Berlin");
    }

    #[test]
    fn unparsable_port_is_ignored() {
        let mut runtime = RuntimeConfig::default();

        apply_env_overrides(&mut runtime, |key| {
            (key == "MQTT_PORT").then(|| "not-a-port".to_string())
        });

        assert_eq!(runtime.network.mqtt_port, 1883);
    }

    #[tokio::test]
    async fn built_reader_covers_configured_sensors() {
        let mut runtime = RuntimeConfig::default();
        runtime.hardware.climate_sensor_pins = vec![4, 17];

        let reader = build_reader(&runtime);

        assert_eq!(reader.climate_sensor_count(), 2);
    }

    #[tokio::test]
    async fn going_offline_without_a_connection_reports_both_failures() {
        let (mqtt, eventloop) = AsyncClient::new(MqttOptions::new("test", "localhost", 1883), 4);
        drop(eventloop);

        assert_eq!(go_offline(&mqtt).await, 2);
    }
}
