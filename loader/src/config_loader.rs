use serde::de::DeserializeOwned;
use serde::Serialize;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to open {path:?}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to write the default config to {path:?}: {source}")]
    WriteDefault {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A config that can be loaded from a JSON file.
/// A missing file is created with the default values.
pub trait LoadableConfig: Serialize + DeserializeOwned + Default {
    fn load<P>(path: P) -> Result<Self, ConfigError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();

        match std::fs::File::open(path) {
            Ok(file) => serde_json::from_reader(std::io::BufReader::new(file)).map_err(|source| {
                ConfigError::Parse {
                    path: path.to_path_buf(),
                    source,
                }
            }),
            Err(err) if path.exists() => Err(ConfigError::Open {
                path: path.to_path_buf(),
                source: err,
            }),
            Err(_) => {
                let config = Self::default();
                config.save(path)?;
                info!(?path, "wrote default config");
                Ok(config)
            }
        }
    }

    fn save<P>(&self, path: P) -> Result<(), ConfigError>
    where
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let write_error = |source| ConfigError::WriteDefault {
            path: path.to_path_buf(),
            source,
        };

        let config_file = std::fs::File::create(path).map_err(write_error)?;
        serde_json::to_writer_pretty(config_file, self)
            .map_err(|err| write_error(std::io::Error::from(err)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    #[serde(default)]
    struct TestConfig {
        resolution: (u32, u32),
        brightness: f32,
    }

    impl Default for TestConfig {
        fn default() -> Self {
            Self {
                resolution: (1280, 720),
                brightness: 1.0,
            }
        }
    }

    impl LoadableConfig for TestConfig {}

    #[test]
    fn test_missing_file_writes_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");

        let config = TestConfig::load(&path).unwrap();
        assert_eq!(config, TestConfig::default());
        assert!(path.exists());

        std::fs::write(&path, r#"{ "brightness": 0.25 }"#).unwrap();
        let config = TestConfig::load(&path).unwrap();
        assert_eq!(config.brightness, 0.25);
        assert_eq!(config.resolution, (1280, 720));
    }

    #[test]
    fn test_parse_error_names_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.json");
        std::fs::write(&path, "{ not json").unwrap();

        let err = TestConfig::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        assert!(err.to_string().contains("broken.json"));
    }
}
