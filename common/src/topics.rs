pub const TOPIC_CONTROLLER_STATE: &str = "greenhouse/controller/state";
pub const TOPIC_CONTROLLER_STATUS: &str = "greenhouse/controller/status";
pub const TOPIC_CONFIG_REJECTED: &str = "greenhouse/controller/config/rejected";
pub const TOPIC_CAMERA_FRAME: &str = "greenhouse/camera/frame";

pub const TOPIC_CMD_MIN_TEMPERATURE: &str = "greenhouse/cmnd/min_temperature";
pub const TOPIC_CMD_ON_TIME: &str = "greenhouse/cmnd/on_time";
pub const TOPIC_CMD_OFF_TIME: &str = "greenhouse/cmnd/off_time";
