//! Configuration loading and environment parsing.

use super::Config;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Load configuration with the following precedence (highest first):
/// 1) File pointed to by the `COMPANION_CONFIG_PATH` env var
/// 2) config.json in the current working directory
/// 3) Defaults compiled into the binary
///
/// Individual fields can then be overridden two ways:
/// - nested env vars with prefix `COMPANION` and `__` as separator, e.g.
///   `COMPANION__PORT=9090` or `COMPANION__LOGGING__FORMAT=json`;
/// - the flat deployment names the platform has always shipped with
///   (`DEPLOY_ENV`, `APP_VERSION`, `SKIP_APP_VERSION_CHECK`, ...), mapped
///   onto their nested fields by [`apply_flat_env_overrides`].
///
/// Any errors while reading/parsing are printed to stderr and defaults are
/// used; `load()` always returns a `Config`.
#[must_use]
pub fn load() -> Config {
    use std::env;
    use std::path::PathBuf;

    let defaults = Config::default();
    let mut merged =
        serde_json::to_value(&defaults).unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

    if let Ok(path) = env::var("COMPANION_CONFIG_PATH") {
        merge_file_source(&mut merged, &PathBuf::from(path));
    }

    merge_file_source(&mut merged, &PathBuf::from("config.json"));

    apply_env_overrides(&mut merged);
    apply_flat_env_overrides(&mut merged);

    match serde_json::from_value::<Config>(merged) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to deserialize config; using defaults: {e}");
            defaults
        }
    }
}

fn merge_file_source(target: &mut Value, path: &Path) {
    if path.as_os_str().is_empty() || !path.exists() {
        return;
    }

    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(value) => merge_values(target, value),
            Err(err) => eprintln!("Failed to parse config from {}: {err}", path.display()),
        },
        Err(err) => {
            eprintln!("Failed to read config from {}: {err}", path.display());
        }
    }
}

fn merge_values(target: &mut Value, source: Value) {
    match (target, source) {
        (Value::Object(target_map), Value::Object(source_map)) => {
            for (key, value) in source_map {
                match target_map.get_mut(&key) {
                    Some(existing) => merge_values(existing, value),
                    None => {
                        target_map.insert(key, value);
                    }
                }
            }
        }
        (target_slot, source_value) => {
            *target_slot = source_value;
        }
    }
}

fn apply_env_overrides(root: &mut Value) {
    for (key, raw_value) in std::env::vars() {
        let Some(stripped) = key.strip_prefix("COMPANION__") else {
            continue;
        };

        let segments: Vec<String> = stripped
            .split("__")
            .filter(|segment| !segment.is_empty())
            .map(str::to_ascii_lowercase)
            .collect();

        if segments.is_empty() {
            continue;
        }

        let value = parse_scalar(raw_value.trim());
        set_nested_value(root, &segments, value);
    }
}

/// The flat environment names recognized since the first deployment, mapped
/// onto their nested config fields.
fn apply_flat_env_overrides(root: &mut Value) {
    const FLAT_MAP: &[(&str, &[&str])] = &[
        ("DEPLOY_ENV", &["server", "deploy_env"]),
        ("APP_VERSION", &["server", "app_version"]),
        (
            "SKIP_APP_VERSION_CHECK",
            &["server", "skip_app_version_check"],
        ),
        (
            "TOKEN_VALID_DURATION_DAYS",
            &["identity", "token_valid_duration_days"],
        ),
        (
            "SM_PERIOD_OF_VALIDITY_SEC",
            &["identity", "sms_code_validity_secs"],
        ),
        (
            "SECS_OF_BEING_KICKED_OUT_FROM_THE_GAME_QUEUE",
            &["room", "queue_kick_secs"],
        ),
        (
            "SECS_OF_BEING_TURNED_OFF_IN_GAME_BATTLE",
            &["room", "battle_off_secs"],
        ),
        ("KAFKA_PRODUCER_TOPIC", &["events", "result_topic"]),
        (
            "KAFKA_PRODUCER_ROOM_EVENT_TOPIC",
            &["events", "room_event_topic"],
        ),
        ("BUSINESS_CONF_FILES", &["business_conf_path"]),
    ];

    for (name, path) in FLAT_MAP {
        if let Ok(raw) = std::env::var(name) {
            let segments: Vec<String> = path.iter().map(|s| (*s).to_string()).collect();
            set_nested_value(root, &segments, parse_scalar(raw.trim()));
        }
    }
}

fn parse_scalar(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }

    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn set_nested_value(target: &mut Value, segments: &[String], value: Value) {
    match segments {
        [] => *target = value,
        [leaf] => {
            ensure_object(target).insert(leaf.clone(), value);
        }
        [head, rest @ ..] => {
            let entry = ensure_object(target)
                .entry(head.clone())
                .or_insert_with(|| Value::Object(serde_json::Map::new()));
            set_nested_value(entry, rest, value);
        }
    }
}

fn ensure_object(value: &mut Value) -> &mut serde_json::Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(serde_json::Map::new());
    }

    // The branch above guarantees `value` is an object.
    #[allow(clippy::expect_used)]
    value
        .as_object_mut()
        .expect("value should be coerced into an object")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_merge_values_deep() {
        let mut target = serde_json::json!({"room": {"queue_kick_secs": 600, "lock": {"ttl_ms": 2000}}});
        let source = serde_json::json!({"room": {"lock": {"ttl_ms": 5000}}});
        merge_values(&mut target, source);
        assert_eq!(target["room"]["queue_kick_secs"], 600);
        assert_eq!(target["room"]["lock"]["ttl_ms"], 5000);
    }

    #[test]
    fn test_parse_scalar_types() {
        assert_eq!(parse_scalar("8080"), Value::from(8080));
        assert_eq!(parse_scalar("true"), Value::from(true));
        assert_eq!(parse_scalar("dev"), Value::from("dev"));
    }

    #[test]
    fn test_set_nested_value_creates_path() {
        let mut root = Value::Object(serde_json::Map::new());
        set_nested_value(
            &mut root,
            &["server".to_string(), "deploy_env".to_string()],
            Value::from("prod"),
        );
        assert_eq!(root["server"]["deploy_env"], "prod");
    }

    #[test]
    fn test_file_merge_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"port": 9191, "server": {"deploy_env": "staging"}}"#).unwrap();

        let mut merged = serde_json::to_value(Config::default()).unwrap();
        merge_file_source(&mut merged, &path);
        let cfg: Config = serde_json::from_value(merged).unwrap();

        assert_eq!(cfg.port, 9191);
        assert_eq!(cfg.server.deploy_env, "staging");
        // Untouched fields keep their defaults.
        assert_eq!(cfg.identity.sms_daily_quota, 5);
    }
}
