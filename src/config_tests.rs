#[cfg(test)]
mod tests {
    use crate::config::*;
    use crate::error::Result;
    use crate::systemd::{JobMode, ServiceScope};
    use serial_test::serial;
    use std::path::PathBuf;
    use std::time::Duration;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.scope, ServiceScope::System);
        assert_eq!(config.job_mode, JobMode::Replace);
        assert_eq!(config.backoff_initial(), Duration::from_secs(1));
        assert_eq!(config.backoff_max(), Duration::from_secs(60));
        assert_eq!(config.health_check_interval(), Duration::from_secs(10));
        assert_eq!(config.unit_check_timeout(), Duration::from_secs(300));
        assert_eq!(config.unit_retry_interval(), Duration::from_secs(5));
        assert_eq!(config.restart_settle(), Duration::from_secs(3));
        assert_eq!(config.connect_timeout(), Duration::from_secs(5));
        assert!(config.log_file.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_serialization() {
        let config = Config {
            scope: ServiceScope::User,
            job_mode: JobMode::IgnoreDependencies,
            unit_check_timeout_secs: 30,
            ..Config::default()
        };

        let yaml = serde_yaml::to_string(&config).unwrap();
        assert!(yaml.contains("scope: user"));
        assert!(yaml.contains("job_mode: ignore-dependencies"));

        let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(deserialized, config);
    }

    #[test]
    fn test_config_partial_file_uses_defaults() {
        let config: Config = serde_yaml::from_str("backoff_max_secs: 30\n").unwrap();
        assert_eq!(config.backoff_max_secs, 30);
        assert_eq!(config.backoff_initial_secs, 1);
        assert_eq!(config.unit_check_timeout_secs, 300);
    }

    #[test]
    fn test_config_validate_rejects_bad_backoff() {
        let config = Config {
            backoff_initial_secs: 10,
            backoff_max_secs: 5,
            ..Config::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            channel_capacity: 0,
            ..Config::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validate_rejects_zero_intervals() {
        let zeroed = [
            Config {
                health_check_secs: 0,
                ..Config::default()
            },
            Config {
                unit_retry_secs: 0,
                ..Config::default()
            },
            Config {
                unit_check_timeout_secs: 0,
                ..Config::default()
            },
            Config {
                connect_timeout_secs: 0,
                ..Config::default()
            },
        ];
        for config in zeroed {
            assert!(config.validate().is_err(), "accepted {:?}", config);
        }

        let err = Config {
            health_check_secs: 0,
            ..Config::default()
        }
        .validate()
        .unwrap_err();
        assert!(err.to_string().contains("health_check_secs"));

        // No settle delay is a valid choice
        let config = Config {
            restart_settle_secs: 0,
            ..Config::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    #[serial]
    fn test_config_default_path() {
        std::env::remove_var(CONFIG_ENV);
        let path = Config::resolve_path(None);
        assert!(path.is_ok());

        let path = path.unwrap();
        assert!(path.to_string_lossy().contains("sysguard"));
        assert!(path.to_string_lossy().ends_with("config.yaml"));
    }

    #[test]
    #[serial]
    fn test_config_env_override() {
        std::env::set_var(CONFIG_ENV, "/etc/sysguard/custom.yaml");
        let path = Config::resolve_path(None).unwrap();
        assert_eq!(path, PathBuf::from("/etc/sysguard/custom.yaml"));

        // Explicit path wins over the environment
        let path = Config::resolve_path(Some("/tmp/explicit.yaml".into())).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/explicit.yaml"));
        std::env::remove_var(CONFIG_ENV);
    }

    #[test]
    fn test_config_load_missing() -> Result<()> {
        // Test loading non-existent config (should return defaults)
        let config = Config::load(Some("/nonexistent/config.yaml".into()))?;
        assert_eq!(config, Config::default());

        Ok(())
    }

    #[test]
    fn test_config_save_load() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let config_path = temp_dir.path().join("nested").join("config.yaml");

        let original_config = Config {
            health_check_secs: 2,
            log_file: Some("/var/log/sysguard.log".into()),
            ..Config::default()
        };

        original_config.save(config_path.clone())?;
        let loaded_config = Config::load(Some(config_path))?;

        assert_eq!(loaded_config, original_config);

        Ok(())
    }

    #[test]
    fn test_config_load_invalid_is_error() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let config_path = temp_dir.path().join("config.yaml");
        std::fs::write(&config_path, "backoff_initial_secs: 0\n")?;

        assert!(Config::load(Some(config_path)).is_err());
        Ok(())
    }
}
