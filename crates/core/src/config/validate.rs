use std::collections::HashSet;

use super::{types::Config, ConfigError};

/// Validate configuration
///
/// Rejects settings that would make dispatch or governance meaningless
/// rather than failing later at runtime.
pub fn validate_config(config: &Config) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(invalid("server.port cannot be 0"));
    }

    if config.backends.is_empty() {
        return Err(invalid("at least one [[backends]] entry is required"));
    }

    let mut names = HashSet::new();
    for backend in &config.backends {
        if backend.name.trim().is_empty() {
            return Err(invalid("backends.name cannot be empty"));
        }
        if !names.insert(backend.name.as_str()) {
            return Err(invalid(&format!(
                "duplicate backend name '{}'",
                backend.name
            )));
        }
        if !backend.url.starts_with("http://") && !backend.url.starts_with("https://") {
            return Err(invalid(&format!(
                "backend '{}' url must start with http:// or https://",
                backend.name
            )));
        }
        if backend.requires_vpn && config.vpn.is_none() {
            return Err(invalid(&format!(
                "backend '{}' requires_vpn but no [vpn] section is configured",
                backend.name
            )));
        }
        if backend.timeout_secs == 0 {
            return Err(invalid(&format!(
                "backend '{}' timeout_secs cannot be 0",
                backend.name
            )));
        }
    }

    let governor = &config.governor;
    if governor.critical_threshold <= 0.0 || governor.warning_threshold <= 0.0 {
        return Err(invalid("governor thresholds must be positive"));
    }
    if governor.critical_threshold >= governor.warning_threshold {
        return Err(invalid(
            "governor.critical_threshold must be below governor.warning_threshold",
        ));
    }

    let monitor = &config.monitor;
    if monitor.poll_interval_secs == 0 {
        return Err(invalid("monitor.poll_interval_secs cannot be 0"));
    }
    if monitor.stall_window_secs < monitor.poll_interval_secs {
        return Err(invalid(
            "monitor.stall_window_secs must cover at least one poll interval",
        ));
    }

    if let Some(ref backend) = monitor.backend {
        if !names.contains(backend.as_str()) {
            return Err(invalid(&format!(
                "monitor.backend '{}' is not a configured backend",
                backend
            )));
        }
    }

    if config.queue.drain_interval_secs == 0 {
        return Err(invalid("queue.drain_interval_secs cannot be 0"));
    }

    Ok(())
}

fn invalid(msg: &str) -> ConfigError {
    ConfigError::ValidationError(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{load_config_from_str, BackendConfig, VpnConfig};

    fn base_config() -> Config {
        load_config_from_str(
            r#"
[[backends]]
name = "home"
url = "http://localhost:8080"
username = "admin"
password = "secret"
"#,
        )
        .unwrap()
    }

    #[test]
    fn test_validate_valid_config() {
        assert!(validate_config(&base_config()).is_ok());
    }

    #[test]
    fn test_validate_port_zero_fails() {
        let mut config = base_config();
        config.server.port = 0;
        let err = validate_config(&config).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError(_)));
    }

    #[test]
    fn test_validate_no_backends_fails() {
        let mut config = base_config();
        config.backends.clear();
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_duplicate_backend_names_fail() {
        let mut config = base_config();
        config
            .backends
            .push(BackendConfig::new("home", "http://other:8080"));
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate backend name"));
    }

    #[test]
    fn test_validate_vpn_backend_requires_vpn_section() {
        let mut config = base_config();
        config.backends[0].requires_vpn = true;
        assert!(validate_config(&config).is_err());

        config.vpn = Some(VpnConfig {
            gateway: "10.8.0.1:53".to_string(),
            timeout_ms: 500,
        });
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn test_validate_threshold_ordering() {
        let mut config = base_config();
        config.governor.critical_threshold = 1.2;
        config.governor.warning_threshold = 1.1;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_stall_window_shorter_than_poll_fails() {
        let mut config = base_config();
        config.monitor.poll_interval_secs = 120;
        config.monitor.stall_window_secs = 60;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn test_validate_monitor_backend_must_exist() {
        let mut config = base_config();
        config.monitor.backend = Some("seedbox".to_string());
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("monitor.backend"));

        config.monitor.backend = Some("home".to_string());
        assert!(validate_config(&config).is_ok());
    }
}
