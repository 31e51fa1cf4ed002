//! Process configuration: default encoding and resource location.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Environment variable naming the default encoding.
pub const ENV_DEFAULT_ENCODING: &str = "FILE_ENCODING";
/// Environment variable naming the persisted converter directory.
pub const ENV_RESOURCE_DIR: &str = "CHARSET_ENCODER_RESOURCES";
/// Default encoding when nothing in the environment names one.
pub const FALLBACK_ENCODING: &str = "8859_1";

/// Settings read once at start-up.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Encoding used by `Registry::get_default`.
    pub default_encoding: String,
    /// Directory holding persisted converters.
    pub resource_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_encoding: FALLBACK_ENCODING.to_owned(),
            resource_dir: None,
        }
    }
}

impl Config {
    /// Read the process environment.
    ///
    /// The default encoding comes from `FILE_ENCODING`, else from the codeset
    /// of the first set locale variable (`LC_ALL`, `LC_CTYPE`, `LANG`).
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let default_encoding = lookup(ENV_DEFAULT_ENCODING)
            .filter(|v| !v.trim().is_empty())
            .or_else(|| {
                ["LC_ALL", "LC_CTYPE", "LANG"]
                    .into_iter()
                    .filter_map(&lookup)
                    .find(|v| !v.is_empty())
                    .and_then(|locale| locale_codeset(&locale).map(str::to_owned))
            })
            .unwrap_or_else(|| FALLBACK_ENCODING.to_owned());

        Self {
            default_encoding,
            resource_dir: lookup(ENV_RESOURCE_DIR)
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
        }
    }

    /// Read a JSON configuration file; missing fields keep their defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)?;
        serde_json::from_slice(&bytes).map_err(|e| Error::Config(format!("{}: {e}", path.display())))
    }
}

/// Codeset part of a POSIX locale name: `en_US.UTF-8@euro` gives `UTF-8`.
pub fn locale_codeset(locale: &str) -> Option<&str> {
    let (_, rest) = locale.split_once('.')?;
    let codeset = rest.split('@').next().unwrap_or(rest);
    (!codeset.is_empty()).then_some(codeset)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_with(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn test_locale_codeset() {
        assert_eq!(locale_codeset("en_US.UTF-8"), Some("UTF-8"));
        assert_eq!(locale_codeset("de_DE.ISO-8859-15@euro"), Some("ISO-8859-15"));
        assert_eq!(locale_codeset("C"), None);
        assert_eq!(locale_codeset("POSIX."), None);
    }

    #[test]
    fn test_file_encoding_wins() {
        let config = config_with(&[("FILE_ENCODING", "Cp1252"), ("LANG", "en_US.UTF-8")]);
        assert_eq!(config.default_encoding, "Cp1252");
    }

    #[test]
    fn test_locale_precedence() {
        let config = config_with(&[("LC_CTYPE", "ja_JP.eucJP"), ("LANG", "en_US.UTF-8")]);
        assert_eq!(config.default_encoding, "eucJP");

        let config = config_with(&[("LANG", "en_US.UTF-8")]);
        assert_eq!(config.default_encoding, "UTF-8");
    }

    #[test]
    fn test_fallback_without_environment() {
        let config = config_with(&[("LANG", "C")]);
        assert_eq!(config, Config::default());
        assert_eq!(config.default_encoding, FALLBACK_ENCODING);
    }

    #[test]
    fn test_resource_dir_from_env() {
        let config = config_with(&[("CHARSET_ENCODER_RESOURCES", "/opt/converters")]);
        assert_eq!(config.resource_dir, Some(PathBuf::from("/opt/converters")));
    }

    #[test]
    fn test_json_file_partial() {
        let path = std::env::temp_dir().join(format!("charset-encoder-config-{}.json", std::process::id()));
        std::fs::write(&path, r#"{"default_encoding":"UTF-8"}"#).unwrap();

        let config = Config::from_json_file(&path).unwrap();
        assert_eq!(config.default_encoding, "UTF-8");
        assert_eq!(config.resource_dir, None);

        std::fs::write(&path, "[1, 2]").unwrap();
        assert!(matches!(Config::from_json_file(&path), Err(Error::Config(_))));

        std::fs::remove_file(&path).unwrap();
    }
}
