//! Configuration loading against real files and environment overrides.

use copytrader::infrastructure::EngineConfig;
use std::io::Write;

fn with_store_env<T>(f: impl FnOnce() -> T) -> T {
    std::env::set_var("DATABASE_URL", "postgres://localhost/copytrader_test");
    std::env::set_var("REDIS_URL", "redis://127.0.0.1:6379");
    f()
}

#[test]
fn test_load_from_yaml_file() {
    with_store_env(|| {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "tick_interval_ms: 2000\nworker_concurrency: 3\nlog_level: debug\n"
        )
        .unwrap();

        let config = EngineConfig::load(file.path()).unwrap();
        assert_eq!(config.tick_interval_ms, 2000);
        assert_eq!(config.worker_concurrency, 3);
        assert_eq!(config.log_level, "debug");
        // Untouched knobs keep their defaults.
        assert_eq!(config.sync_every_n_ticks, 30);
        assert_eq!(config.database_url, "postgres://localhost/copytrader_test");
    });
}

#[test]
fn test_invalid_yaml_is_rejected() {
    with_store_env(|| {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "tick_interval_ms: [not, a, number]").unwrap();
        assert!(EngineConfig::load(file.path()).is_err());
    });
}

#[test]
fn test_validation_failure_is_rejected() {
    with_store_env(|| {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        // TTL must exceed the tick cadence.
        writeln!(file, "tick_interval_ms: 5000\nlock_ttl_ms: 1000\n").unwrap();
        assert!(EngineConfig::load(file.path()).is_err());
    });
}

#[test]
fn test_from_env_uses_defaults() {
    with_store_env(|| {
        let config = EngineConfig::from_env().unwrap();
        assert_eq!(config.tick_interval_ms, 5000);
        assert_eq!(config.worker_concurrency, 5);
    });
}
