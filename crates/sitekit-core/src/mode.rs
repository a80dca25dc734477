//! Runtime mode detection.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Environment variable that selects the runtime mode.
pub const MODE_ENV_VAR: &str = "SITEKIT_ENV";

/// The mode a site is running in.
///
/// Diagnostics (error details in fallbacks, cache inspection) are only
/// exposed outside production.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeMode {
    /// Local development.
    #[default]
    Development,
    /// Automated tests.
    Test,
    /// Deployed site.
    Production,
}

impl RuntimeMode {
    /// Read the mode from `SITEKIT_ENV`, defaulting to development.
    pub fn from_env() -> Self {
        std::env::var(MODE_ENV_VAR)
            .ok()
            .and_then(|value| value.parse().ok())
            .unwrap_or_default()
    }

    /// Whether this is the production mode.
    pub fn is_production(&self) -> bool {
        matches!(self, Self::Production)
    }

    /// Whether diagnostic details may be shown to users and tools.
    pub fn exposes_diagnostics(&self) -> bool {
        !self.is_production()
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Development => "development",
            Self::Test => "test",
            Self::Production => "production",
        }
    }
}

impl fmt::Display for RuntimeMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned when a mode string is not recognized.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown runtime mode: {0}")]
pub struct UnknownMode(pub String);

impl FromStr for RuntimeMode {
    type Err = UnknownMode;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "development" | "dev" => Ok(Self::Development),
            "test" => Ok(Self::Test),
            "production" | "prod" => Ok(Self::Production),
            other => Err(UnknownMode(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_default_is_development() {
        assert_eq!(RuntimeMode::default(), RuntimeMode::Development);
    }

    #[test]
    fn test_mode_parse() {
        assert_eq!("production".parse::<RuntimeMode>().unwrap(), RuntimeMode::Production);
        assert_eq!("PROD".parse::<RuntimeMode>().unwrap(), RuntimeMode::Production);
        assert_eq!(" dev ".parse::<RuntimeMode>().unwrap(), RuntimeMode::Development);
        assert_eq!("test".parse::<RuntimeMode>().unwrap(), RuntimeMode::Test);
    }

    #[test]
    fn test_mode_parse_unknown() {
        let err = "staging".parse::<RuntimeMode>().unwrap_err();
        assert_eq!(err, UnknownMode("staging".to_string()));
    }

    #[test]
    fn test_mode_diagnostics() {
        assert!(RuntimeMode::Development.exposes_diagnostics());
        assert!(RuntimeMode::Test.exposes_diagnostics());
        assert!(!RuntimeMode::Production.exposes_diagnostics());
    }

    #[test]
    fn test_mode_display_roundtrip() {
        for mode in [RuntimeMode::Development, RuntimeMode::Test, RuntimeMode::Production] {
            assert_eq!(mode.to_string().parse::<RuntimeMode>().unwrap(), mode);
        }
    }

    #[test]
    fn test_mode_serde_lowercase() {
        let json = serde_json::to_string(&RuntimeMode::Production).unwrap();
        assert_eq!(json, r#""production""#);
    }
}
