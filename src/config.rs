//! Plugin settings, read from TOML.

use std::{path::Path, time::Duration};

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised while loading [`PluginSettings`].
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The settings file could not be read.
    #[error("failed to read settings file: {0}")]
    Io(#[from] std::io::Error),
    /// The settings file is not valid TOML for [`PluginSettings`].
    #[error("failed to parse settings: {0}")]
    Parse(#[from] toml::de::Error),
    /// The settings parsed but are not usable.
    #[error("invalid settings: {0}")]
    Invalid(String),
}

/// Settings for the migration plugin.
///
/// Every key is optional; missing keys fall back to the values WordPress
/// imports have always used.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PluginSettings {
    /// Login identifier field in the request body and in the collection.
    pub identifier_field: String,
    /// Name of the boolean "still needs migrating" field.
    pub migrate_field: String,
    /// Name of the hidden field holding the legacy hash.
    pub hash_field: String,
    /// Prefix the login route is mounted under.
    pub api_prefix: String,
    /// Route the client navigates to after a successful login.
    pub admin_route: String,
    /// How long the client stays in bypass mode after a failed JSON login.
    pub rearm_delay_ms: u64,
    /// Run a throwaway legacy verification when there is nothing to migrate.
    pub equalize_timing: bool,
    /// Largest login request body the gate will buffer, in bytes.
    pub body_limit: usize,
}

impl Default for PluginSettings {
    fn default() -> Self {
        Self {
            identifier_field: "email".into(),
            migrate_field: "wordpressPasswordMigrate".into(),
            hash_field: "wordpressPasswordHash".into(),
            api_prefix: "/api".into(),
            admin_route: "/admin".into(),
            rearm_delay_ms: 100,
            equalize_timing: true,
            body_limit: 64 * 1024,
        }
    }
}

impl PluginSettings {
    /// Parses and validates settings from a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for malformed TOML and
    /// [`ConfigError::Invalid`] for values that fail [`Self::validate`].
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let settings: Self = toml::from_str(source)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads, parses and validates a TOML settings file.
    ///
    /// # Errors
    ///
    /// See [`Self::from_toml_str`]; additionally [`ConfigError::Io`].
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    /// Checks the settings for values the plugin cannot work with.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (key, value) in [
            ("identifier_field", &self.identifier_field),
            ("migrate_field", &self.migrate_field),
            ("hash_field", &self.hash_field),
        ] {
            if value.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{key} must not be empty")));
            }
        }

        if self.migrate_field == self.hash_field {
            return Err(ConfigError::Invalid(
                "migrate_field and hash_field must differ".into(),
            ));
        }

        for (key, value) in [
            ("api_prefix", &self.api_prefix),
            ("admin_route", &self.admin_route),
        ] {
            if !value.starts_with('/') {
                return Err(ConfigError::Invalid(format!("{key} must start with '/'")));
            }
        }

        if self.body_limit == 0 {
            return Err(ConfigError::Invalid("body_limit must be positive".into()));
        }

        Ok(())
    }

    /// The login route, in axum path syntax.
    #[must_use]
    pub fn login_route(&self) -> String {
        format!("{}/:collection/login", self.api_prefix.trim_end_matches('/'))
    }

    /// [`Self::rearm_delay_ms`] as a [`Duration`].
    #[must_use]
    pub fn rearm_delay(&self) -> Duration {
        Duration::from_millis(self.rearm_delay_ms)
    }
}

#[cfg(test)]
mod test {
    use std::{io::Write, time::Duration};

    use super::{ConfigError, PluginSettings};

    #[test]
    fn empty_document_yields_defaults() {
        let settings = PluginSettings::from_toml_str("").unwrap();
        assert_eq!(settings, PluginSettings::default());
        assert_eq!(settings.login_route(), "/api/:collection/login");
        assert_eq!(settings.rearm_delay(), Duration::from_millis(100));
    }

    #[test]
    fn overrides_are_applied() {
        let settings = PluginSettings::from_toml_str(
            r#"
            identifier_field = "username"
            api_prefix = "/cms/api/"
            equalize_timing = false
            "#,
        )
        .unwrap();

        assert_eq!(settings.identifier_field, "username");
        assert!(!settings.equalize_timing);
        assert_eq!(settings.login_route(), "/cms/api/:collection/login");
        assert_eq!(settings.migrate_field, "wordpressPasswordMigrate");
    }

    #[test]
    fn rejects_bad_values() {
        for source in [
            r#"identifier_field = "  ""#,
            r#"hash_field = "wordpressPasswordMigrate""#,
            r#"admin_route = "admin""#,
            "body_limit = 0",
        ] {
            assert!(
                matches!(
                    PluginSettings::from_toml_str(source),
                    Err(ConfigError::Invalid(_))
                ),
                "{source}"
            );
        }
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(matches!(
            PluginSettings::from_toml_str("idenitfier_field = \"email\""),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn reads_from_disk() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "rearm_delay_ms = 250").unwrap();

        let settings = PluginSettings::from_path(file.path()).unwrap();
        assert_eq!(settings.rearm_delay(), Duration::from_millis(250));

        assert!(matches!(
            PluginSettings::from_path(file.path().with_extension("missing")),
            Err(ConfigError::Io(_))
        ));
    }
}
