//! Configuration for iterator construction
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;
use std::str::FromStr;

/// Environment variable selecting the construction API
pub const ITERATOR_API_ENV: &str = "HYBRID_DATA_ITERATOR_API";

/// Environment variable holding the fallback drop-remainder policy
pub const DROP_REMAINDER_ENV: &str = "HYBRID_DATA_DROP_REMAINDER";

/// Which iterator construction primitive to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IteratorApi {
    /// Pick at build time from the `legacy-iterator-api` feature
    #[default]
    Auto,
    /// Free functions in `data::iterator`
    FreeFunction,
    /// Provided methods on `Dataset`
    DatasetMethod,
}

impl IteratorApi {
    /// Resolve `Auto` to a concrete strategy
    pub fn resolve(self) -> IteratorApi {
        match self {
            IteratorApi::Auto => {
                if cfg!(feature = "legacy-iterator-api") {
                    IteratorApi::DatasetMethod
                } else {
                    IteratorApi::FreeFunction
                }
            }
            api => api,
        }
    }
}

impl fmt::Display for IteratorApi {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IteratorApi::Auto => "auto",
            IteratorApi::FreeFunction => "free_function",
            IteratorApi::DatasetMethod => "dataset_method",
        };
        f.write_str(name)
    }
}

impl FromStr for IteratorApi {
    type Err = crate::DataError;

    fn from_str(s: &str) -> crate::Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" | "" => Ok(IteratorApi::Auto),
            "free_function" | "function" => Ok(IteratorApi::FreeFunction),
            "dataset_method" | "method" | "legacy" => Ok(IteratorApi::DatasetMethod),
            other => Err(crate::DataError::Config(format!(
                "Invalid iterator api: {}. Must be 'auto', 'free_function', or 'dataset_method'",
                other
            ))),
        }
    }
}

/// Data access configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DataConfig {
    /// Construction primitive for iterators
    #[serde(default)]
    pub iterator_api: IteratorApi,

    /// Drop-remainder policy used when neither the caller nor the dataset sets one
    #[serde(default)]
    pub default_drop_remainder: Option<bool>,
}

impl DataConfig {
    /// Load configuration from a JSON file
    pub fn from_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let file = File::open(path.as_ref())?;
        let config: DataConfig = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    /// Build configuration from environment variables, falling back to defaults
    pub fn from_env() -> crate::Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build configuration from `lookup`, which maps a variable name to its value
    pub fn from_lookup<F>(lookup: F) -> crate::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = DataConfig::default();

        if let Some(value) = lookup(ITERATOR_API_ENV) {
            config.iterator_api = value.parse()?;
        }

        if let Some(value) = lookup(DROP_REMAINDER_ENV) {
            config.default_drop_remainder = parse_flag(&value)?;
        }

        Ok(config)
    }
}

/// Parse a tri-state flag: empty means unset
fn parse_flag(value: &str) -> crate::Result<Option<bool>> {
    match value.trim().to_ascii_lowercase().as_str() {
        "" | "none" => Ok(None),
        "1" | "true" | "yes" => Ok(Some(true)),
        "0" | "false" | "no" => Ok(Some(false)),
        other => Err(crate::DataError::Config(format!(
            "Invalid drop remainder flag: {}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let json = r#"{
            "iterator_api": "dataset_method",
            "default_drop_remainder": true
        }"#;

        let config: DataConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.iterator_api, IteratorApi::DatasetMethod);
        assert_eq!(config.default_drop_remainder, Some(true));
    }

    #[test]
    fn test_config_defaults() {
        let config: DataConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, DataConfig::default());
        assert_eq!(config.default_drop_remainder, None);
    }

    #[test]
    fn test_auto_resolves() {
        let resolved = IteratorApi::Auto.resolve();
        if cfg!(feature = "legacy-iterator-api") {
            assert_eq!(resolved, IteratorApi::DatasetMethod);
        } else {
            assert_eq!(resolved, IteratorApi::FreeFunction);
        }
        assert_eq!(IteratorApi::FreeFunction.resolve(), IteratorApi::FreeFunction);
    }

    #[test]
    fn test_parse_api() {
        assert_eq!("legacy".parse::<IteratorApi>().unwrap(), IteratorApi::DatasetMethod);
        assert_eq!(
            " Free_Function ".parse::<IteratorApi>().unwrap(),
            IteratorApi::FreeFunction
        );
        assert!("graph".parse::<IteratorApi>().is_err());
        assert_eq!(IteratorApi::DatasetMethod.to_string(), "dataset_method");
    }

    #[test]
    fn test_parse_flag() {
        assert_eq!(parse_flag("").unwrap(), None);
        assert_eq!(parse_flag("TRUE").unwrap(), Some(true));
        assert_eq!(parse_flag("0").unwrap(), Some(false));
        assert!(parse_flag("maybe").is_err());
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.json");
        std::fs::write(&path, r#"{"iterator_api": "free_function"}"#).unwrap();

        let config = DataConfig::from_file(&path).unwrap();
        assert_eq!(config.iterator_api, IteratorApi::FreeFunction);
        assert!(DataConfig::from_file(dir.path().join("missing.json")).is_err());
    }

    #[test]
    fn test_from_lookup() {
        let config = DataConfig::from_lookup(|key| match key {
            ITERATOR_API_ENV => Some("method".to_string()),
            DROP_REMAINDER_ENV => Some("yes".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(config.iterator_api, IteratorApi::DatasetMethod);
        assert_eq!(config.default_drop_remainder, Some(true));

        assert_eq!(DataConfig::from_lookup(|_| None).unwrap(), DataConfig::default());

        let bad = DataConfig::from_lookup(|key| {
            (key == ITERATOR_API_ENV).then(|| "graph".to_string())
        });
        assert!(matches!(bad, Err(crate::DataError::Config(_))));
    }
}
