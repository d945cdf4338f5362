use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid configuration: {field} must be at least {min}")]
    OutOfRange { field: &'static str, min: u64 },
}

/// Handler settings. Every field has a default, so `{}` is a valid config.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Run in every new interpreter before the principal-specific script.
    pub on_init: Option<String>,
    pub on_trusted_init: Option<String>,
    pub on_untrusted_init: Option<String>,
    pub check_for_interrupts: bool,
    /// Calls and jumps executed between two interrupt checks.
    pub interrupt_interval: u64,
    /// Nested handler entries allowed before 54001 is raised.
    pub max_call_depth: usize,
    pub max_frames: usize,
    pub max_resolve_attempts: usize,
    /// Byte cap of the region error objects are built in.
    pub error_region_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            on_init: None,
            on_trusted_init: None,
            on_untrusted_init: None,
            check_for_interrupts: true,
            interrupt_interval: 100_000,
            max_call_depth: 64,
            max_frames: 200,
            max_resolve_attempts: 32,
            error_region_size: 8 * 1024,
        }
    }
}

impl Config {
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let checks: [(&'static str, u64); 4] = [
            ("interrupt_interval", self.interrupt_interval),
            ("max_call_depth", self.max_call_depth as u64),
            ("max_frames", self.max_frames as u64),
            ("max_resolve_attempts", self.max_resolve_attempts as u64),
        ];
        for (field, value) in checks {
            if value < 1 {
                return Err(ConfigError::OutOfRange { field, min: 1 });
            }
        }
        Ok(())
    }

    /// The init script for a principal class.
    pub fn principal_init(&self, trusted: bool) -> Option<&str> {
        if trusted {
            self.on_trusted_init.as_deref()
        } else {
            self.on_untrusted_init.as_deref()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_gives_defaults() {
        assert_eq!(Config::from_json("{}").unwrap(), Config::default());
    }

    #[test]
    fn fields_override_defaults() {
        let config = Config::from_json(
            r#"{"on_init": "x = 1", "max_frames": 10, "check_for_interrupts": false}"#,
        )
        .unwrap();
        assert_eq!(config.on_init.as_deref(), Some("x = 1"));
        assert_eq!(config.max_frames, 10);
        assert!(!config.check_for_interrupts);
        assert_eq!(config.max_resolve_attempts, 32);
    }

    #[test]
    fn principal_init_picks_by_trust() {
        let config = Config {
            on_trusted_init: Some("t".into()),
            on_untrusted_init: Some("u".into()),
            ..Config::default()
        };
        assert_eq!(config.principal_init(true), Some("t"));
        assert_eq!(config.principal_init(false), Some("u"));
    }

    #[test]
    fn rejects_unknown_fields_and_zero_limits() {
        assert!(matches!(
            Config::from_json(r#"{"max_depth": 3}"#),
            Err(ConfigError::Parse(_))
        ));
        insta::assert_snapshot!(
            Config::from_json(r#"{"max_frames": 0}"#).unwrap_err().to_string(),
            @"invalid configuration: max_frames must be at least 1"
        );
    }
}
