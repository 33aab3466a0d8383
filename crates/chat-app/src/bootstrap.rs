use std::sync::Arc;

use parlor_auth::{LocalIdentity, SessionProvider};
use parlor_storage::{MemoryStore, MessageStore, SqliteStore};
use snafu::ResultExt;

use crate::app::ChatApp;
use crate::error::{ChatResult, SettingsSnafu, StoreSnafu};
use crate::settings::{Settings, SettingsStore, StoreKind, StoreSettings};

pub async fn open_store(settings: &StoreSettings) -> ChatResult<Arc<dyn MessageStore>> {
    match settings.kind {
        StoreKind::Memory => {
            tracing::info!(collection = %settings.collection, "using in-memory message store");
            Ok(Arc::new(MemoryStore::with_snapshot_limit(
                settings.collection.clone(),
                settings.snapshot_limit,
            )))
        }
        StoreKind::Sqlite => {
            let store = SqliteStore::open_with_snapshot_limit(
                &settings.database_path,
                settings.collection.clone(),
                settings.snapshot_limit,
            )
            .await
            .context(StoreSnafu {
                stage: "open-sqlite-store",
            })?;
            tracing::info!(
                database_url = store.database_url(),
                collection = %settings.collection,
                "using sqlite message store"
            );
            Ok(Arc::new(store))
        }
    }
}

pub fn session_provider(settings: &Settings) -> Arc<SessionProvider> {
    let identity = LocalIdentity::new(Some(settings.identity.profile()))
        .with_auto_sign_in(settings.identity.auto_sign_in);
    Arc::new(SessionProvider::new(Arc::new(identity)))
}

/// Logs which backend connection parameters are still blank.
pub fn report_backend(settings: &Settings) {
    if settings.backend.is_configured() {
        tracing::info!(
            project_id = %settings.backend.project_id,
            "backend connection parameters present"
        );
    } else {
        tracing::warn!(
            missing = ?settings.backend.missing_fields(),
            "backend connection parameters are blank; running against the local store"
        );
    }
}

/// Writes the effective settings back to the config file, filling in defaults.
pub fn write_settings(store: &SettingsStore) -> ChatResult<()> {
    let settings = store.settings().as_ref().clone();
    store.update(settings).context(SettingsSnafu {
        stage: "write-effective-settings",
    })
}

pub async fn build_app(settings: &Settings) -> ChatResult<ChatApp> {
    report_backend(settings);
    let store = open_store(&settings.store).await?;
    Ok(ChatApp::new(
        session_provider(settings),
        store,
        settings.retry.policy(),
    ))
}
