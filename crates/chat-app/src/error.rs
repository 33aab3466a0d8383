use std::io;

use parlor_storage::StoreError;
use snafu::Snafu;

use crate::settings::SettingsError;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChatError {
    #[snafu(display("message store failed on `{stage}`: {source}"))]
    Store {
        stage: &'static str,
        source: StoreError,
    },
    #[snafu(display("settings failed on `{stage}`: {source}"))]
    Settings {
        stage: &'static str,
        source: SettingsError,
    },
    #[snafu(display("failed to read terminal input on `{stage}`: {source}"))]
    ReadInput {
        stage: &'static str,
        source: io::Error,
    },
    #[snafu(display("failed to write terminal output on `{stage}`: {source}"))]
    WriteOutput {
        stage: &'static str,
        source: io::Error,
    },
}

impl ChatError {
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Store { stage, .. }
            | Self::Settings { stage, .. }
            | Self::ReadInput { stage, .. }
            | Self::WriteOutput { stage, .. } => stage,
        }
    }
}

pub type ChatResult<T> = Result<T, ChatError>;
