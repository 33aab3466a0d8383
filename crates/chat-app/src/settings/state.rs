use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwap;
use figment::{
    Figment,
    providers::{Env, Format, Json, Serialized},
};
use parlor_auth::Session;
use parlor_storage::DEFAULT_COLLECTION;
use serde::{Deserialize, Serialize};
use snafu::{ResultExt, Snafu};

use crate::chat::RetryPolicy;

pub const SETTINGS_DIRECTORY_NAME: &str = "parlor";
pub const SETTINGS_FILE_NAME: &str = "settings.json";
pub const DATABASE_FILE_NAME: &str = "chat.db";
/// Environment variable that overrides the settings file location.
pub const CONFIG_PATH_ENV: &str = "PARLOR_CONFIG";
/// Prefix for per-key overrides; `__` separates nested keys.
pub const ENV_PREFIX: &str = "PARLOR_";

pub const DEFAULT_USER_ID: &str = "local-user";
pub const DEFAULT_DISPLAY_NAME: &str = "Local User";
pub const DEFAULT_HISTORY_ROWS: usize = 20;

/// Connection parameters for the hosted backend. Shipped blank.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BackendSettings {
    #[serde(default)]
    pub api_key: String,
    #[serde(default)]
    pub auth_domain: String,
    #[serde(default)]
    pub project_id: String,
    #[serde(default)]
    pub storage_bucket: String,
    #[serde(default)]
    pub messaging_sender_id: String,
    #[serde(default)]
    pub app_id: String,
}

impl BackendSettings {
    pub fn is_configured(&self) -> bool {
        self.missing_fields().is_empty()
    }

    /// Names of the parameters a hosted backend would need but that are blank.
    pub fn missing_fields(&self) -> Vec<&'static str> {
        [
            ("api_key", &self.api_key),
            ("auth_domain", &self.auth_domain),
            ("project_id", &self.project_id),
            ("app_id", &self.app_id),
        ]
        .into_iter()
        .filter(|(_, value)| value.trim().is_empty())
        .map(|(name, _)| name)
        .collect()
    }

    fn normalized(mut self) -> Self {
        for value in [
            &mut self.api_key,
            &mut self.auth_domain,
            &mut self.project_id,
            &mut self.storage_bucket,
            &mut self.messaging_sender_id,
            &mut self.app_id,
        ] {
            *value = value.trim().to_string();
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub kind: StoreKind,
    #[serde(default = "default_database_path")]
    pub database_path: String,
    #[serde(default = "default_collection")]
    pub collection: String,
    #[serde(default)]
    pub snapshot_limit: Option<usize>,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            database_path: default_database_path(),
            collection: default_collection(),
            snapshot_limit: None,
        }
    }
}

impl StoreSettings {
    fn normalized(mut self) -> Self {
        self.database_path = if self.database_path.trim().is_empty() {
            default_database_path()
        } else {
            self.database_path.trim().to_string()
        };
        self.collection = if self.collection.trim().is_empty() {
            default_collection()
        } else {
            self.collection.trim().to_string()
        };
        self.snapshot_limit = self.snapshot_limit.filter(|limit| *limit > 0);
        self
    }
}

/// Profile used by the local identity backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentitySettings {
    #[serde(default = "default_user_id")]
    pub user_id: String,
    #[serde(default = "default_display_name")]
    pub display_name: String,
    #[serde(default)]
    pub avatar_url: String,
    #[serde(default)]
    pub auto_sign_in: bool,
}

impl Default for IdentitySettings {
    fn default() -> Self {
        Self {
            user_id: default_user_id(),
            display_name: default_display_name(),
            avatar_url: String::new(),
            auto_sign_in: false,
        }
    }
}

impl IdentitySettings {
    pub fn profile(&self) -> Session {
        Session::new(&self.user_id, &self.display_name, &self.avatar_url)
    }

    fn normalized(mut self) -> Self {
        self.user_id = if self.user_id.trim().is_empty() {
            default_user_id()
        } else {
            self.user_id.trim().to_string()
        };
        self.display_name = if self.display_name.trim().is_empty() {
            self.user_id.clone()
        } else {
            self.display_name.trim().to_string()
        };
        self.avatar_url = self.avatar_url.trim().to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            multiplier: default_multiplier(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl RetrySettings {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.initial_delay_ms),
            Duration::from_millis(self.max_delay_ms),
            self.multiplier,
            self.max_attempts,
        )
    }

    fn normalized(mut self) -> Self {
        if !self.multiplier.is_finite() || self.multiplier < 1.0 {
            self.multiplier = 1.0;
        }
        self.max_delay_ms = self.max_delay_ms.max(self.initial_delay_ms);
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalSettings {
    #[serde(default = "default_history_rows")]
    pub history_rows: usize,
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            history_rows: default_history_rows(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub backend: BackendSettings,
    #[serde(default)]
    pub store: StoreSettings,
    #[serde(default)]
    pub identity: IdentitySettings,
    #[serde(default)]
    pub retry: RetrySettings,
    #[serde(default)]
    pub terminal: TerminalSettings,
}

impl Settings {
    pub fn normalized(mut self) -> Self {
        self.backend = self.backend.normalized();
        self.store = self.store.normalized();
        self.identity = self.identity.normalized();
        self.retry = self.retry.normalized();
        self.terminal.history_rows = self.terminal.history_rows.max(1);
        self
    }
}

pub struct SettingsStore {
    settings: Arc<ArcSwap<Settings>>,
    config_path: PathBuf,
}

impl SettingsStore {
    pub fn default_config_dir() -> PathBuf {
        dirs::config_dir()
            .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
            .unwrap_or_else(|| PathBuf::from(".parlor"))
    }

    /// `PARLOR_CONFIG` when set, else `settings.json` in the user config dir.
    pub fn default_config_path() -> PathBuf {
        match std::env::var_os(CONFIG_PATH_ENV) {
            Some(path) if !path.is_empty() => PathBuf::from(path),
            _ => Self::default_config_dir().join(SETTINGS_FILE_NAME),
        }
    }

    pub fn new(config_path: PathBuf) -> Self {
        let settings = Self::load_from_disk(&config_path);
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            config_path,
        }
    }

    pub fn load() -> Self {
        Self::new(Self::default_config_path())
    }

    pub fn config_path(&self) -> &PathBuf {
        &self.config_path
    }

    pub fn settings(&self) -> Arc<Settings> {
        self.settings.load_full()
    }

    pub fn update(&self, settings: Settings) -> Result<(), SettingsError> {
        let normalized_settings = settings.normalized();
        self.persist(&normalized_settings)?;
        self.settings.store(Arc::new(normalized_settings));
        Ok(())
    }

    fn figment(path: &PathBuf) -> Figment {
        Figment::from(Serialized::defaults(Settings::default()))
            .merge(Json::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
    }

    fn load_from_disk(path: &PathBuf) -> Settings {
        if !path.exists() {
            tracing::info!("settings file not found at {:?}, using defaults", path);
        }

        match Self::figment(path).extract::<Settings>() {
            Ok(settings) => settings.normalized(),
            Err(error) => {
                tracing::warn!(
                    "failed to parse settings from {:?}: {}. using defaults",
                    path,
                    error
                );
                Settings::default()
            }
        }
    }

    fn persist(&self, settings: &Settings) -> Result<(), SettingsError> {
        if let Some(parent) = self.config_path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent).context(CreateDirSnafu {
                stage: "create-settings-directory",
                path: parent.to_path_buf(),
            })?;
        }

        let content = serde_json::to_string_pretty(settings).context(SerializeConfigSnafu {
            stage: "serialize-settings-json",
        })?;

        let temp_path = self.config_path.with_extension("json.tmp");
        std::fs::write(&temp_path, content).context(WriteFileSnafu {
            stage: "write-temporary-settings-file",
            path: temp_path.clone(),
        })?;

        std::fs::rename(&temp_path, &self.config_path).context(RenameTempFileSnafu {
            stage: "rename-temporary-settings-file",
            from: temp_path,
            to: self.config_path.clone(),
        })?;

        tracing::info!("saved settings to {:?}", self.config_path);
        Ok(())
    }
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum SettingsError {
    #[snafu(display("failed to create settings directory at {path:?} on `{stage}`: {source}"))]
    CreateDir {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display("failed to serialize settings on `{stage}`: {source}"))]
    SerializeConfig {
        stage: &'static str,
        source: serde_json::Error,
    },
    #[snafu(display("failed to write settings file at {path:?} on `{stage}`: {source}"))]
    WriteFile {
        stage: &'static str,
        path: PathBuf,
        source: std::io::Error,
    },
    #[snafu(display(
        "failed to replace settings file from {from:?} to {to:?} on `{stage}`: {source}"
    ))]
    RenameTempFile {
        stage: &'static str,
        from: PathBuf,
        to: PathBuf,
        source: std::io::Error,
    },
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|path| path.join(SETTINGS_DIRECTORY_NAME))
        .unwrap_or_else(|| PathBuf::from(".parlor"))
        .join(DATABASE_FILE_NAME)
        .display()
        .to_string()
}

fn default_collection() -> String {
    DEFAULT_COLLECTION.to_string()
}

fn default_user_id() -> String {
    DEFAULT_USER_ID.to_string()
}

fn default_display_name() -> String {
    DEFAULT_DISPLAY_NAME.to_string()
}

fn default_initial_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    30_000
}

fn default_multiplier() -> f64 {
    2.0
}

fn default_max_attempts() -> u32 {
    8
}

fn default_history_rows() -> usize {
    DEFAULT_HISTORY_ROWS
}
