//! Cache key builders, namespaced by deployment environment so several
//! environments can share one cache cluster.

/// Total registered users, seeded from the store at startup.
pub fn total_user_cnt(env: &str) -> String {
    format!("gcp_ags_{env}_total_user_cnt")
}

/// Device id bound to an account at SMS verification time.
pub fn device_id_for_account(env: &str, account: &str) -> String {
    format!("gcp_ags_{env}_device_id_{account}")
}

/// Push registration id bound to an account.
pub fn push_registration_id_for_account(env: &str, account: &str) -> String {
    format!("gcp_ags_{env}_push_registration_id_{account}")
}

/// Issued SMS code record (`{msg_id, issued_ts}`) for a phone number.
pub fn sms_code_record(env: &str, phone_number: &str) -> String {
    format!("gcp_ags_{env}_sms_code_{phone_number}")
}

/// Daily bucket limiting code-send requests per phone number.
pub fn sms_daily_tokens(env: &str, phone_number: &str) -> String {
    format!("gcp_ags_{env}_user_{phone_number}_daily_sms_tokens")
}

/// The room queue lock guarding seat/ready/battle transitions.
pub fn room_queue_lock(env: &str, room_id: &str) -> String {
    format!("gcp_ags_{env}_room_{room_id}_game_queue_lock")
}

/// Keyed background delay task for a user. `101` is the queue idle kick,
/// `102` the battle turn-off.
pub fn background_delay_task(env: &str, uid: &str, task_no: u32) -> String {
    format!("gcp_ags_{env}_user_{uid}_background_{task_no}_delay_task")
}
