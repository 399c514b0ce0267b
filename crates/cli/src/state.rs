use std::{fs, path::PathBuf};

use serde::{Deserialize, Serialize};
use store::{ObjectStoreConfig, OwnerId};

pub const APP_NAME: &str = "doctree";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DB_FILE_NAME: &str = "db.sqlite";
pub const BLOBS_DIR_NAME: &str = "blobs";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Tenant every command acts as unless `--owner` is given
    pub owner_id: OwnerId,
    /// Default log directive, overridden by RUST_LOG
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Write daily rotated log files here (optional)
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
    /// Blob payload backend (defaults to the local blobs/ directory)
    #[serde(default)]
    pub blob_store: Option<ObjectStoreConfig>,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl AppConfig {
    pub fn new(owner_id: OwnerId) -> Self {
        Self {
            owner_id,
            log_level: default_log_level(),
            log_dir: None,
            blob_store: None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the state directory (~/.doctree)
    pub app_dir: PathBuf,
    /// Path to the SQLite database
    pub db_path: PathBuf,
    /// Path to the local blobs directory
    pub blobs_path: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the state directory path (custom or default ~/.doctree)
    pub fn app_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new state directory
    pub fn init(custom_path: Option<PathBuf>, config: AppConfig) -> Result<Self, StateError> {
        let app_dir = Self::app_dir(custom_path)?;

        if app_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }

        fs::create_dir_all(&app_dir)?;

        let blobs_path = app_dir.join(BLOBS_DIR_NAME);
        fs::create_dir_all(&blobs_path)?;

        let config = AppConfig {
            blob_store: config.blob_store.or_else(|| {
                Some(ObjectStoreConfig::Local {
                    path: blobs_path.clone(),
                })
            }),
            ..config
        };
        let config_path = app_dir.join(CONFIG_FILE_NAME);
        let config_toml = toml::to_string_pretty(&config)?;
        fs::write(&config_path, config_toml)?;

        // The database itself is created and migrated on first open
        let db_path = app_dir.join(DB_FILE_NAME);

        Ok(Self {
            app_dir,
            db_path,
            blobs_path,
            config_path,
            config,
        })
    }

    /// Load existing state from the state directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let app_dir = Self::app_dir(custom_path)?;

        if !app_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let db_path = app_dir.join(DB_FILE_NAME);
        let blobs_path = app_dir.join(BLOBS_DIR_NAME);
        let config_path = app_dir.join(CONFIG_FILE_NAME);

        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }

        let config_toml = fs::read_to_string(&config_path)?;
        let config: AppConfig = toml::from_str(&config_toml)?;

        Ok(Self {
            app_dir,
            db_path,
            blobs_path,
            config_path,
            config,
        })
    }

    /// Configured blob backend, falling back to the local blobs directory
    pub fn blob_store_config(&self) -> ObjectStoreConfig {
        self.config
            .blob_store
            .clone()
            .unwrap_or_else(|| ObjectStoreConfig::Local {
                path: self.blobs_path.clone(),
            })
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("doctree directory not initialized. Run 'doctree init' first")]
    NotInitialized,

    #[error("doctree directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_then_load() {
        let temp_dir = tempfile::tempdir().unwrap();
        let dir = temp_dir.path().join("state");
        let owner = OwnerId::new();

        let state = AppState::init(Some(dir.clone()), AppConfig::new(owner)).unwrap();
        assert!(state.blobs_path.exists());
        assert!(state.config_path.exists());

        let loaded = AppState::load(Some(dir.clone())).unwrap();
        assert_eq!(loaded.config, state.config);
        assert_eq!(loaded.config.owner_id, owner);
        assert_eq!(
            loaded.blob_store_config(),
            ObjectStoreConfig::Local {
                path: dir.join(BLOBS_DIR_NAME)
            }
        );

        assert!(matches!(
            AppState::init(Some(dir), AppConfig::new(owner)),
            Err(StateError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_load_requires_init() {
        let temp_dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            AppState::load(Some(temp_dir.path().join("missing"))),
            Err(StateError::NotInitialized)
        ));
    }

    #[test]
    fn test_minimal_config_uses_defaults() {
        let owner = OwnerId::new();
        let config: AppConfig = toml::from_str(&format!("owner_id = \"{owner}\"")).unwrap();
        assert_eq!(config, AppConfig::new(owner));
    }
}
