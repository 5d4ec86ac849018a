//! Configuration loading and environment parsing.

use super::validation::validate_config;
use super::Config;
use serde_json::Value;
use std::fs;
use std::path::Path;

const ENV_PREFIX: &str = "ROOM_RELAY__";

/// Load configuration with the following precedence (highest first):
/// 1) `PORT` env var (the conventional single port knob; overrides `port` only)
/// 2) Individual fields via `ROOM_RELAY__<SECTION>__<FIELD>` env vars,
///    e.g. `ROOM_RELAY__RELAY__OUTBOUND_QUEUE_CAPACITY=128`
/// 3) `ROOM_RELAY_CONFIG_JSON` env var containing raw JSON
/// 4) If `ROOM_RELAY_CONFIG_STDIN=true/1`, JSON read from stdin
/// 5) File pointed to by `ROOM_RELAY_CONFIG_PATH`
/// 6) config.json in the current working directory
/// 7) config.json next to the executable
/// 8) Defaults compiled into the binary
///
/// Read and parse failures are printed to stderr and the remaining sources still apply.
/// Validation failures are reported but not propagated; callers that need a hard failure
/// run [`validate_config`] on the result themselves.
#[must_use]
pub fn load() -> Config {
    use std::env;
    use std::io::Read;
    use std::path::PathBuf;

    let defaults = Config::default();
    let mut merged =
        serde_json::to_value(&defaults).unwrap_or_else(|_| Value::Object(serde_json::Map::new()));

    // Lowest-precedence sources are merged first so later ones win.
    if let Ok(exe_path) = env::current_exe() {
        if let Some(mut exe_dir) = exe_path.parent().map(Path::to_path_buf) {
            exe_dir.push("config.json");
            merge_file_source(&mut merged, &exe_dir);
        }
    }

    merge_file_source(&mut merged, &PathBuf::from("config.json"));

    if let Ok(path) = env::var("ROOM_RELAY_CONFIG_PATH") {
        merge_file_source(&mut merged, &PathBuf::from(path));
    }

    if let Ok(val) = env::var("ROOM_RELAY_CONFIG_STDIN") {
        if env_var_truthy(&val) {
            let mut buf = String::new();
            if let Err(e) = std::io::stdin().read_to_string(&mut buf) {
                eprintln!("Failed to read config from stdin: {e}");
            } else if let Some(value) = parse_json_document(&buf, "stdin") {
                merge_values(&mut merged, value);
            }
        }
    }

    if let Ok(json) = env::var("ROOM_RELAY_CONFIG_JSON") {
        if let Some(value) = parse_json_document(&json, "ROOM_RELAY_CONFIG_JSON") {
            merge_values(&mut merged, value);
        }
    }

    apply_env_overrides(&mut merged, env::vars());

    if let Ok(raw) = env::var("PORT") {
        apply_port_override(&mut merged, &raw);
    }

    let config = match serde_json::from_value::<Config>(merged) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Failed to deserialize config; using defaults: {e}");
            defaults
        }
    };

    if let Err(e) = validate_config(&config) {
        eprintln!("Configuration validation error: {e}");
    }

    config
}

fn parse_json_document(raw: &str, label: &str) -> Option<Value> {
    if raw.trim().is_empty() {
        return None;
    }

    match serde_json::from_str(raw) {
        Ok(value) => Some(value),
        Err(err) => {
            eprintln!("Failed to parse config from {label}: {err}");
            None
        }
    }
}

fn merge_file_source(target: &mut Value, path: &Path) {
    if path.as_os_str().is_empty() || !path.exists() {
        return;
    }

    match fs::read_to_string(path) {
        Ok(contents) => {
            if let Some(value) = parse_json_document(&contents, &format!("file {}", path.display()))
            {
                merge_values(target, value);
            }
        }
        Err(err) => {
            eprintln!("Failed to read config from {}: {}", path.display(), err);
        }
    }
}

/// Deep-merge `source` into `target`; objects merge key by key, everything else replaces.
pub(crate) fn merge_values(target: &mut Value, source: Value) {
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

pub(crate) fn apply_env_overrides<I>(root: &mut Value, vars: I)
where
    I: IntoIterator<Item = (String, String)>,
{
    for (key, raw_value) in vars {
        let Some(stripped) = key.strip_prefix(ENV_PREFIX) else {
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

        let raw = raw_value.trim();
        // Text fields keep the raw text so a numeric-looking token stays a string.
        let value = match lookup(root, &segments) {
            Some(Value::String(_) | Value::Null) => Value::String(raw.to_string()),
            _ => parse_scalar(raw),
        };
        set_nested_value(root, &segments, value);
    }
}

fn lookup<'a>(root: &'a Value, segments: &[String]) -> Option<&'a Value> {
    segments
        .iter()
        .try_fold(root, |value, segment| value.get(segment.as_str()))
}

fn apply_port_override(root: &mut Value, raw: &str) {
    match raw.trim().parse::<u16>() {
        Ok(port) => set_nested_value(root, &["port".to_string()], Value::from(port)),
        Err(_) => eprintln!("Ignoring invalid PORT value '{raw}'"),
    }
}

fn env_var_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}

fn parse_scalar(raw: &str) -> Value {
    if raw.is_empty() {
        return Value::String(String::new());
    }

    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn set_nested_value(target: &mut Value, segments: &[String], value: Value) {
    let Some((head, rest)) = segments.split_first() else {
        *target = value;
        return;
    };

    let map = ensure_object(target);
    if rest.is_empty() {
        map.insert(head.clone(), value);
        return;
    }

    let entry = map
        .entry(head.clone())
        .or_insert_with(|| Value::Object(serde_json::Map::new()));
    set_nested_value(entry, rest, value);
}

fn ensure_object(value: &mut Value) -> &mut serde_json::Map<String, Value> {
    if !value.is_object() {
        *value = Value::Object(serde_json::Map::new());
    }

    match value {
        Value::Object(map) => map,
        // The branch above guarantees an object.
        _ => unreachable!("value was coerced into an object"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::io::Write;

    fn defaults_value() -> Value {
        serde_json::to_value(Config::default()).unwrap()
    }

    #[test]
    fn env_overrides_set_nested_fields() {
        let mut merged = defaults_value();
        apply_env_overrides(
            &mut merged,
            vec![
                (
                    "ROOM_RELAY__RELAY__OUTBOUND_QUEUE_CAPACITY".to_string(),
                    "128".to_string(),
                ),
                ("ROOM_RELAY__LOGGING__FORMAT".to_string(), "json".to_string()),
                ("UNRELATED".to_string(), "ignored".to_string()),
            ],
        );

        let config: Config = serde_json::from_value(merged).unwrap();
        assert_eq!(config.relay.outbound_queue_capacity, 128);
        assert_eq!(config.logging.format, super::super::LogFormat::Json);
        assert_eq!(config.port, 8080);
    }

    #[test]
    fn numeric_looking_overrides_of_text_fields_stay_strings() {
        let mut merged = defaults_value();
        apply_env_overrides(
            &mut merged,
            vec![
                (
                    "ROOM_RELAY__SECURITY__METRICS_AUTH_TOKEN".to_string(),
                    "12345678901234567890".to_string(),
                ),
                ("ROOM_RELAY__LOGGING__DIR".to_string(), "2024".to_string()),
                (
                    "ROOM_RELAY__RELAY__MAX_MESSAGE_SIZE".to_string(),
                    "4096".to_string(),
                ),
                (
                    "ROOM_RELAY__SECURITY__CORS_ORIGINS".to_string(),
                    "true".to_string(),
                ),
            ],
        );

        let config: Config = serde_json::from_value(merged).unwrap();
        assert_eq!(
            config.security.metrics_auth_token.as_deref(),
            Some("12345678901234567890")
        );
        assert_eq!(config.logging.dir, "2024");
        assert_eq!(config.security.cors_origins, "true");
        assert_eq!(config.relay.max_message_size, 4096);
    }

    #[test]
    #[serial]
    fn numeric_token_override_keeps_other_sources() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "relay": {{ "outbound_queue_capacity": 32 }} }}"#).unwrap();

        std::env::set_var("ROOM_RELAY_CONFIG_PATH", file.path());
        std::env::set_var("ROOM_RELAY__SECURITY__METRICS_AUTH_TOKEN", "98765432109876543210");
        std::env::set_var("PORT", "7300");
        let config = load();
        std::env::remove_var("ROOM_RELAY_CONFIG_PATH");
        std::env::remove_var("ROOM_RELAY__SECURITY__METRICS_AUTH_TOKEN");
        std::env::remove_var("PORT");

        assert_eq!(config.port, 7300);
        assert_eq!(config.relay.outbound_queue_capacity, 32);
        assert_eq!(
            config.security.metrics_auth_token.as_deref(),
            Some("98765432109876543210")
        );
    }

    #[test]
    fn security_strings_tolerate_scalar_documents() {
        let config: Config = serde_json::from_value(serde_json::json!({
            "security": { "metrics_auth_token": 12345678, "cors_origins": 42 }
        }))
        .unwrap();
        assert_eq!(config.security.metrics_auth_token.as_deref(), Some("12345678"));
        assert_eq!(config.security.cors_origins, "42");
    }

    #[test]
    fn merge_values_keeps_untouched_siblings() {
        let mut merged = defaults_value();
        merge_values(
            &mut merged,
            serde_json::json!({ "relay": { "max_message_size": 1024 } }),
        );

        let config: Config = serde_json::from_value(merged).unwrap();
        assert_eq!(config.relay.max_message_size, 1024);
        assert_eq!(config.relay.outbound_queue_capacity, 64);
    }

    #[test]
    fn invalid_port_override_is_ignored() {
        let mut merged = defaults_value();
        apply_port_override(&mut merged, "not-a-port");
        apply_port_override(&mut merged, "70000");
        assert_eq!(merged["port"], Value::from(8080));

        apply_port_override(&mut merged, " 9001 ");
        assert_eq!(merged["port"], Value::from(9001));
    }

    #[test]
    fn invalid_log_level_falls_back_to_none() {
        let mut merged = defaults_value();
        merge_values(&mut merged, serde_json::json!({ "logging": { "level": "loud" } }));
        let config: Config = serde_json::from_value(merged).unwrap();
        assert!(config.logging.level.is_none());
    }

    #[test]
    #[serial]
    fn load_reads_config_path_and_port_env() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "port": 7000, "security": {{ "cors_origins": "http://localhost:5173" }} }}"#
        )
        .unwrap();

        std::env::set_var("ROOM_RELAY_CONFIG_PATH", file.path());
        std::env::set_var("PORT", "7100");
        let config = load();
        std::env::remove_var("ROOM_RELAY_CONFIG_PATH");
        std::env::remove_var("PORT");

        assert_eq!(config.port, 7100);
        assert_eq!(config.security.cors_origins, "http://localhost:5173");
    }

    #[test]
    #[serial]
    fn inline_json_beats_config_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "port": 7000 }}"#).unwrap();

        std::env::set_var("ROOM_RELAY_CONFIG_PATH", file.path());
        std::env::set_var("ROOM_RELAY_CONFIG_JSON", r#"{ "port": 7200 }"#);
        let config = load();
        std::env::remove_var("ROOM_RELAY_CONFIG_PATH");
        std::env::remove_var("ROOM_RELAY_CONFIG_JSON");

        assert_eq!(config.port, 7200);
    }
}
