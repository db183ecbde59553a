//! Client configuration: the raw, possibly incomplete form read from a
//! file or the command line, and the validated form a session runs with.

use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use drobots_protocol::ObjectRef;
use serde::Deserialize;

use crate::SessionError;

/// Units a session accepts when the configuration does not say otherwise.
pub const DEFAULT_MAX_UNITS: usize = 4;

/// Bound on the login call when the configuration does not say otherwise.
pub const DEFAULT_LOGIN_TIMEOUT: Duration = Duration::from_millis(5000);

// ---------------------------------------------------------------------------
// ClientConfig
// ---------------------------------------------------------------------------

/// Configuration as supplied, before validation.
///
/// Every field is optional here so that a file and command-line overrides
/// can be layered with [`merge`](Self::merge). The three required values
/// are never defaulted: [`validate`](Self::validate) rejects their absence.
///
/// ```toml
/// game_proxy = "game@ws://127.0.0.1:10000"
/// adapter_endpoint = "127.0.0.1:0"
/// player_name = "rusty"
/// max_units = 4
/// login_timeout_ms = 5000
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    /// Coordinator object reference, `identity@ws://host:port`.
    pub game_proxy: Option<String>,
    /// Local `host:port` the callback endpoint binds to. It is also the
    /// address handed to the coordinator, so it must be routable from
    /// there: wildcard addresses such as `0.0.0.0` are rejected.
    pub adapter_endpoint: Option<String>,
    pub player_name: Option<String>,
    pub max_units: Option<usize>,
    pub login_timeout_ms: Option<u64>,
}

impl ClientConfig {
    /// Parses a TOML document.
    ///
    /// # Errors
    /// [`SessionError::Configuration`] if the document is not valid TOML
    /// or has unknown keys.
    pub fn from_toml_str(text: &str) -> Result<Self, SessionError> {
        toml::from_str(text)
            .map_err(|e| SessionError::Configuration(format!("invalid config: {e}")))
    }

    /// Reads and parses a TOML file.
    pub fn load(path: &Path) -> Result<Self, SessionError> {
        let text = std::fs::read_to_string(path).map_err(|e| {
            SessionError::Configuration(format!("cannot read {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&text)
    }

    /// Layers `overrides` on top of `self`; set fields in `overrides` win.
    pub fn merge(self, overrides: ClientConfig) -> Self {
        Self {
            game_proxy: overrides.game_proxy.or(self.game_proxy),
            adapter_endpoint: overrides.adapter_endpoint.or(self.adapter_endpoint),
            player_name: overrides.player_name.or(self.player_name),
            max_units: overrides.max_units.or(self.max_units),
            login_timeout_ms: overrides.login_timeout_ms.or(self.login_timeout_ms),
        }
    }

    /// Checks that every required value is present and well formed.
    ///
    /// Blank strings count as missing. Makes no network calls.
    ///
    /// # Errors
    /// [`SessionError::Configuration`] naming the first offending key.
    pub fn validate(&self) -> Result<Configuration, SessionError> {
        let game_proxy = required("game_proxy", &self.game_proxy)?;
        let adapter_endpoint = required("adapter_endpoint", &self.adapter_endpoint)?;
        let player_name = required("player_name", &self.player_name)?;

        let coordinator: ObjectRef = game_proxy.parse().map_err(|e| {
            SessionError::Configuration(format!("game_proxy {game_proxy:?}: {e}"))
        })?;
        if !coordinator.endpoint().starts_with("ws://") {
            return Err(SessionError::Configuration(format!(
                "game_proxy {game_proxy:?}: only plain ws:// endpoints are supported"
            )));
        }

        if let Ok(addr) = adapter_endpoint.parse::<SocketAddr>() {
            if addr.ip().is_unspecified() {
                return Err(SessionError::Configuration(format!(
                    "adapter_endpoint {adapter_endpoint:?}: the coordinator cannot \
                     call back a wildcard address, bind a concrete interface"
                )));
            }
        }

        let max_units = self.max_units.unwrap_or(DEFAULT_MAX_UNITS);
        if max_units == 0 {
            return Err(SessionError::Configuration(
                "max_units must be at least 1".into(),
            ));
        }

        let login_timeout = match self.login_timeout_ms {
            Some(0) => {
                return Err(SessionError::Configuration(
                    "login_timeout_ms must be at least 1".into(),
                ));
            }
            Some(ms) => Duration::from_millis(ms),
            None => DEFAULT_LOGIN_TIMEOUT,
        };

        Ok(Configuration {
            coordinator,
            callback_binding: adapter_endpoint.to_string(),
            player_name: player_name.to_string(),
            max_units,
            login_timeout,
        })
    }
}

fn required<'a>(key: &str, value: &'a Option<String>) -> Result<&'a str, SessionError> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(SessionError::Configuration(format!("{key} is required"))),
    }
}

// ---------------------------------------------------------------------------
// Configuration
// ---------------------------------------------------------------------------

/// Validated configuration. Immutable for the life of a session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub coordinator: ObjectRef,
    pub callback_binding: String,
    pub player_name: String,
    pub max_units: usize,
    pub login_timeout: Duration,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete() -> ClientConfig {
        ClientConfig {
            game_proxy: Some("game@ws://127.0.0.1:10000".into()),
            adapter_endpoint: Some("127.0.0.1:0".into()),
            player_name: Some("rusty".into()),
            ..Default::default()
        }
    }

    #[test]
    fn test_validate_complete_config_applies_defaults() {
        let config = complete().validate().unwrap();
        assert_eq!(config.coordinator.identity().as_str(), "game");
        assert_eq!(config.coordinator.endpoint(), "ws://127.0.0.1:10000");
        assert_eq!(config.callback_binding, "127.0.0.1:0");
        assert_eq!(config.player_name, "rusty");
        assert_eq!(config.max_units, DEFAULT_MAX_UNITS);
        assert_eq!(config.login_timeout, DEFAULT_LOGIN_TIMEOUT);
    }

    #[test]
    fn test_validate_missing_player_name_returns_configuration_error() {
        let config = ClientConfig {
            player_name: None,
            ..complete()
        };
        match config.validate() {
            Err(SessionError::Configuration(msg)) => assert!(msg.contains("player_name")),
            other => panic!("expected Configuration, got {other:?}"),
        }
    }

    #[test]
    fn test_validate_blank_value_counts_as_missing() {
        let config = ClientConfig {
            adapter_endpoint: Some("   ".into()),
            ..complete()
        };
        assert!(matches!(
            config.validate(),
            Err(SessionError::Configuration(msg)) if msg.contains("adapter_endpoint")
        ));
    }

    #[test]
    fn test_validate_malformed_game_proxy_returns_configuration_error() {
        let config = ClientConfig {
            game_proxy: Some("not a proxy".into()),
            ..complete()
        };
        assert!(matches!(
            config.validate(),
            Err(SessionError::Configuration(msg)) if msg.contains("game_proxy")
        ));
    }

    #[test]
    fn test_validate_wildcard_adapter_endpoint_rejected() {
        for wildcard in ["0.0.0.0:9090", "[::]:0"] {
            let config = ClientConfig {
                adapter_endpoint: Some(wildcard.into()),
                ..complete()
            };
            assert!(
                matches!(
                    config.validate(),
                    Err(SessionError::Configuration(msg)) if msg.contains("adapter_endpoint")
                ),
                "{wildcard} should be rejected"
            );
        }
    }

    #[test]
    fn test_validate_named_adapter_host_accepted() {
        let config = ClientConfig {
            adapter_endpoint: Some("localhost:0".into()),
            ..complete()
        };
        assert_eq!(config.validate().unwrap().callback_binding, "localhost:0");
    }

    #[test]
    fn test_validate_tls_game_proxy_returns_configuration_error() {
        let config = ClientConfig {
            game_proxy: Some("game@wss://10.0.0.1:10000".into()),
            ..complete()
        };
        assert!(matches!(
            config.validate(),
            Err(SessionError::Configuration(msg)) if msg.contains("ws://")
        ));
    }

    #[test]
    fn test_validate_zero_limits_rejected() {
        let no_units = ClientConfig {
            max_units: Some(0),
            ..complete()
        };
        let no_timeout = ClientConfig {
            login_timeout_ms: Some(0),
            ..complete()
        };
        assert!(no_units.validate().is_err());
        assert!(no_timeout.validate().is_err());
    }

    #[test]
    fn test_from_toml_str_reads_all_keys() {
        let config = ClientConfig::from_toml_str(
            r#"
            game_proxy = "game@ws://10.0.0.1:10000"
            adapter_endpoint = "10.0.0.2:9090"
            player_name = "rusty"
            max_units = 2
            login_timeout_ms = 250
            "#,
        )
        .unwrap();
        let config = config.validate().unwrap();
        assert_eq!(config.max_units, 2);
        assert_eq!(config.login_timeout, Duration::from_millis(250));
    }

    #[test]
    fn test_from_toml_str_unknown_key_rejected() {
        let result = ClientConfig::from_toml_str("player = \"x\"\n");
        assert!(matches!(result, Err(SessionError::Configuration(_))));
    }

    #[test]
    fn test_merge_overrides_win() {
        let file = complete();
        let cli = ClientConfig {
            player_name: Some("override".into()),
            ..Default::default()
        };
        let merged = file.merge(cli);
        assert_eq!(merged.player_name.as_deref(), Some("override"));
        assert_eq!(merged.adapter_endpoint.as_deref(), Some("127.0.0.1:0"));
    }
}
