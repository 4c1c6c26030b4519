use std::time::Duration;

pub const API_KEY_HEADER: &str = "api-key";
pub const API_VERSION: &str = "2024-10-01-preview";
pub const REALTIME_PATH: &str = "openai/realtime";

pub const RECONNECT_DELAY: Duration = Duration::from_secs(1);
