use std::process::ExitCode;

use parlor::bootstrap::{build_app, write_settings};
use parlor::settings::SettingsStore;
use parlor::terminal;
use tokio::io::BufReader;
use tracing_subscriber::EnvFilter;

const DEFAULT_LOG_FILTER: &str = "parlor=info,parlor_storage=info,parlor_auth=info";

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    // Stdout belongs to the chat view.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        )
        .with_writer(std::io::stderr)
        .init();

    let settings_store = SettingsStore::load();
    let settings = settings_store.settings();

    if std::env::args().nth(1).as_deref() == Some("init") {
        return match write_settings(&settings_store) {
            Ok(()) => {
                println!("wrote {}", settings_store.config_path().display());
                ExitCode::SUCCESS
            }
            Err(error) => {
                tracing::error!(stage = error.stage(), %error, "failed to write settings");
                ExitCode::FAILURE
            }
        };
    }

    let mut app = match build_app(&settings).await {
        Ok(app) => app,
        Err(error) => {
            tracing::error!(stage = error.stage(), %error, "failed to start");
            return ExitCode::FAILURE;
        }
    };
    app.start().await;

    let input = BufReader::new(tokio::io::stdin());
    match terminal::run(&mut app, input, tokio::io::stdout(), &settings.terminal).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            tracing::error!(stage = error.stage(), %error, "terminal session ended with an error");
            ExitCode::FAILURE
        }
    }
}
