pub mod state;

pub use state::{
    BackendSettings, IdentitySettings, RetrySettings, Settings, SettingsError, SettingsStore,
    StoreKind, StoreSettings, TerminalSettings,
};
