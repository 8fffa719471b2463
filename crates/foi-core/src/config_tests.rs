//! Tests for config module

#[cfg(test)]
mod tests {
    use crate::config::*;
    use serial_test::serial;
    use std::io::Write;
    use std::time::Duration;
    use tempfile::NamedTempFile;

    fn valid_config() -> FoiConfig {
        let mut config = FoiConfig::default();
        config
            .index_groups
            .insert("food".to_string(), GroupConfig::new("default"));
        config
    }

    // ========================================================================
    // Defaults
    // ========================================================================

    #[test]
    fn test_config_default_values() {
        // Arrange & Act
        let config = FoiConfig::default();

        // Assert
        assert!(config.tenant_namespace.is_none());
        assert_eq!(config.lock.wait_timeout_secs, 3);
        assert_eq!(config.lock.poll_interval_ms, 10);
        assert_eq!(config.temporary_key_ttl_secs, 180);
        assert!(config.index_groups.is_empty());
    }

    #[test]
    fn test_group_options_from_config() {
        // Arrange
        let mut config = valid_config();
        config.lock.poll_interval_ms = 25;
        config.temporary_key_ttl_secs = 60;

        // Act
        let options = config.group_options("food").expect("food");

        // Assert
        assert_eq!(options.object_lock_ttl, 5);
        assert_eq!(options.lock_poll_interval, Duration::from_millis(25));
        assert_eq!(options.temporary_key_ttl, 60);
        assert!(config.group_options("drinks").is_none());
    }

    // ========================================================================
    // Parsing
    // ========================================================================

    #[test]
    fn test_config_from_toml() {
        // Arrange
        let toml_str = r#"
tenant_namespace = "acme"

[lock]
wait_timeout_secs = 0

[index_groups.food]
store = "primary"
object_lock_ttl = 10

[index_groups.drinks]
store = "secondary"
"#;

        // Act
        let config = FoiConfig::from_toml(toml_str).expect("parse");

        // Assert
        assert_eq!(config.tenant_namespace.as_deref(), Some("acme"));
        assert_eq!(config.lock.wait_timeout_secs, 0);
        assert_eq!(config.lock.poll_interval_ms, 10);
        assert_eq!(config.index_groups["food"].object_lock_ttl, 10);
        assert_eq!(config.index_groups["drinks"].object_lock_ttl, 5);
        assert_eq!(config.index_groups["drinks"].store, "secondary");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_invalid_toml() {
        let result = FoiConfig::from_toml("[lock\nwait_timeout_secs = 1");

        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_group_without_store_fails_to_parse() {
        let result = FoiConfig::from_toml("[index_groups.food]\nobject_lock_ttl = 5\n");

        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_config_roundtrip_toml() {
        // Arrange
        let mut config = valid_config();
        config.tenant_namespace = Some("acme".to_string());

        // Act
        let toml_str = config.to_toml().expect("serialize");
        let parsed = FoiConfig::from_toml(&toml_str).expect("parse");

        // Assert
        assert_eq!(parsed, config);
    }

    // ========================================================================
    // Files and environment
    // ========================================================================

    #[test]
    #[serial(env)]
    fn test_load_from_file() {
        // Arrange
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "temporary_key_ttl_secs = 90\n\n[index_groups.food]\nstore = \"default\"")
            .expect("write");

        // Act
        let config = FoiConfig::load_from_path(file.path()).expect("load");

        // Assert
        assert_eq!(config.temporary_key_ttl_secs, 90);
        assert_eq!(config.index_groups["food"].store, "default");
    }

    #[test]
    #[serial(env)]
    fn test_load_missing_file_uses_defaults() {
        let dir = tempfile::tempdir().expect("temp dir");

        let config = FoiConfig::load_from_path(dir.path().join("missing.toml")).expect("load");

        assert_eq!(config, FoiConfig::default());
    }

    #[test]
    #[serial(env)]
    fn test_env_overrides_file() {
        // Arrange
        let mut file = NamedTempFile::new().expect("temp file");
        writeln!(file, "[lock]\nwait_timeout_secs = 3").expect("write");
        std::env::set_var("FOI_LOCK__WAIT_TIMEOUT_SECS", "1");
        std::env::set_var("FOI_TENANT_NAMESPACE", "acme");

        // Act
        let result = FoiConfig::load_from_path(file.path());
        std::env::remove_var("FOI_LOCK__WAIT_TIMEOUT_SECS");
        std::env::remove_var("FOI_TENANT_NAMESPACE");

        // Assert
        let config = result.expect("load");
        assert_eq!(config.lock.wait_timeout_secs, 1);
        assert_eq!(config.tenant_namespace.as_deref(), Some("acme"));
    }

    // ========================================================================
    // Validation
    // ========================================================================

    #[test]
    fn test_validate_requires_groups() {
        let result = FoiConfig::default().validate();

        assert!(matches!(
            result,
            Err(ConfigError::InvalidValue { key, .. }) if key == "index_groups"
        ));
    }

    #[test]
    fn test_validate_negative_wait_timeout() {
        let mut config = valid_config();
        config.lock.wait_timeout_secs = -1;

        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "lock.wait_timeout_secs"
        ));
        assert!(config.lock_wait().is_err());
    }

    #[test]
    fn test_validate_zero_ttls() {
        let mut config = valid_config();
        config.temporary_key_ttl_secs = 0;
        assert!(config.validate().is_err());

        let mut config = valid_config();
        if let Some(group) = config.index_groups.get_mut("food") {
            group.object_lock_ttl = 0;
        }
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "index_groups.food.object_lock_ttl"
        ));
    }

    #[test]
    fn test_validate_group_names_and_stores() {
        let mut config = valid_config();
        config
            .index_groups
            .insert("bad:name".to_string(), GroupConfig::new("default"));
        assert!(config.validate().is_err());

        let mut config = valid_config();
        config
            .index_groups
            .insert("drinks".to_string(), GroupConfig::new("  "));
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidValue { key, .. }) if key == "index_groups.drinks.store"
        ));
    }

    #[test]
    fn test_lock_wait_from_config() {
        let mut config = valid_config();
        config.lock.wait_timeout_secs = 0;

        let wait = config.lock_wait().expect("wait");

        assert_eq!(wait.as_secs(), 0);
    }

    #[test]
    fn test_config_error_converts_to_crate_error() {
        let err: crate::Error = ConfigError::ParseError("bad".to_string()).into();

        assert_eq!(err.code(), "FOI-008");
    }
}
