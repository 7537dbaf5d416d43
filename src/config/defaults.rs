//! Default value functions referenced by the config structs' serde attributes.

pub fn default_port() -> u16 {
    8080
}

pub fn default_deploy_env() -> String {
    "dev".to_string()
}

pub fn default_app_version() -> String {
    "0.1.0".to_string()
}

pub fn default_token_valid_duration_days() -> u64 {
    365
}

pub fn default_sms_code_validity_secs() -> u64 {
    60
}

pub fn default_sms_daily_quota() -> i64 {
    5
}

pub fn default_queue_kick_secs() -> u64 {
    600
}

pub fn default_battle_off_secs() -> u64 {
    3600
}

pub fn default_lock_ttl_ms() -> u64 {
    2000
}

pub fn default_lock_retry_count() -> u32 {
    3
}

pub fn default_lock_retry_delay_ms() -> u64 {
    200
}

pub fn default_result_topic() -> String {
    "game-companion-platform-game-result-dev".to_string()
}

pub fn default_room_event_topic() -> String {
    "game-companion-platform-room-event-dev".to_string()
}

pub fn default_log_dir() -> String {
    "logs".to_string()
}

pub fn default_log_filename() -> String {
    "gateway.log".to_string()
}

pub fn default_log_rotation() -> String {
    "daily".to_string()
}
