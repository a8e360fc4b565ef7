//! Configuration loading from TOML files and `CTEC__*` environment variables.

use std::io::Write;
use std::time::Duration;

use ctec_server::config::loader::{environment, load_config_with_env};
use ctec_whitelist::AbsentRecordPolicy;

fn env(vars: &[(&str, &str)]) -> config::Environment {
    let source: config::Map<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    environment().source(Some(source))
}

fn toml_file(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("create temp file");
    file.write_all(contents.as_bytes()).expect("write config");
    file
}

#[test]
fn test_missing_file_uses_defaults() {
    let cfg = load_config_with_env(Some("/nonexistent/ctec.toml"), env(&[])).unwrap();
    assert!(!cfg.redis.enabled);
    assert_eq!(cfg.cache.default_ttl_secs, 120);
    assert_eq!(cfg.whitelist.ttl_secs, 300);
    assert_eq!(cfg.postgres.database, "ctec");
    assert_eq!(cfg.logging.level, "info");
}

#[test]
fn test_file_values() {
    let file = toml_file(
        r#"
        [redis]
        enabled = true
        url = "redis://cache:6380"

        [cache]
        namespace = "lobby"
        default_ttl_secs = 0

        [whitelist]
        absent_record_policy = "deny"
        ttl_secs = 60

        [postgres]
        url = "postgres://app:pw@db:5432/whitelist"
        pool_size = 3
        "#,
    );
    let path = file.path().to_str().unwrap();

    let cfg = load_config_with_env(Some(path), env(&[])).unwrap();
    assert!(cfg.redis.enabled);
    assert_eq!(cfg.redis.url, "redis://cache:6380");
    assert_eq!(cfg.cache.namespace().as_str(), "lobby");
    assert_eq!(cfg.cache.settings().default_ttl, None);

    let cascade = cfg.whitelist.cascade_config();
    assert_eq!(cascade.absent_record_policy, AbsentRecordPolicy::Deny);
    assert_eq!(cascade.ttl, Duration::from_secs(60));

    let pg = cfg.postgres.settings();
    assert_eq!(pg.url, "postgres://app:pw@db:5432/whitelist");
    assert_eq!(pg.pool_size, 3);
}

#[test]
fn test_environment_overrides_file() {
    let file = toml_file(
        r#"
        [cache]
        namespace = "from-file"

        [logging]
        level = "warn"
        "#,
    );
    let path = file.path().to_str().unwrap();

    let cfg = load_config_with_env(
        Some(path),
        env(&[
            ("CTEC__CACHE__NAMESPACE", "from-env"),
            ("CTEC__REDIS__POOL_SIZE", "4"),
            ("CTEC__WHITELIST__ABSENT_RECORD_POLICY", "deny"),
        ]),
    )
    .unwrap();

    assert_eq!(cfg.cache.namespace().as_str(), "from-env");
    assert_eq!(cfg.redis.pool_size, 4);
    assert_eq!(
        cfg.whitelist.absent_record_policy,
        AbsentRecordPolicy::Deny
    );
    assert_eq!(cfg.logging.level, "warn");
}

#[test]
fn test_invalid_values_are_rejected() {
    let file = toml_file(
        r#"
        [cache]
        read_timeout_ms = 0
        "#,
    );
    let err = load_config_with_env(Some(file.path().to_str().unwrap()), env(&[])).unwrap_err();
    assert!(err.contains("cache.read_timeout_ms"));

    let file = toml_file(
        r#"
        [whitelist]
        absent_record_policy = "sometimes"
        "#,
    );
    let err = load_config_with_env(Some(file.path().to_str().unwrap()), env(&[])).unwrap_err();
    assert!(err.starts_with("config deserialize error"));
}
