use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum StoreError {
    #[snafu(display("permission denied writing to collection '{collection}'"))]
    PermissionDenied {
        stage: &'static str,
        collection: String,
    },
    #[snafu(display("store network failure on `{stage}`: {details}"))]
    Network {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("store quota exceeded on `{stage}`: {details}"))]
    QuotaExceeded {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("feed subscription closed on `{stage}`: {details}"))]
    SubscriptionClosed {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("feed subscription needs a tokio runtime on `{stage}`"))]
    NoRuntime {
        stage: &'static str,
        source: tokio::runtime::TryCurrentError,
    },
    #[snafu(display("message id '{raw}' is invalid"))]
    InvalidId {
        stage: &'static str,
        raw: String,
        source: uuid::Error,
    },
    #[snafu(display("store invariant violation: {details}"))]
    InvariantViolation {
        stage: &'static str,
        details: String,
    },
    #[snafu(display("failed to create sqlite directory at {path}"))]
    CreateSqliteDirectory {
        stage: &'static str,
        path: String,
        source: std::io::Error,
    },
    #[snafu(display("failed to parse sqlite connection URL '{database_url}'"))]
    SqliteConnectOptions {
        stage: &'static str,
        database_url: String,
        source: sqlx::Error,
    },
    #[snafu(display("failed to connect sqlite database '{database_url}'"))]
    SqliteConnect {
        stage: &'static str,
        database_url: String,
        source: sqlx::Error,
    },
    #[snafu(display("failed to configure sqlite pragma '{pragma}'"))]
    SqlitePragma {
        stage: &'static str,
        pragma: &'static str,
        source: sqlx::Error,
    },
    #[snafu(display("failed to run sqlite migrations"))]
    SqliteMigrate {
        stage: &'static str,
        source: sqlx::migrate::MigrateError,
    },
    #[snafu(display("sqlite query failed at {stage}: {source}"))]
    SqliteQuery {
        stage: &'static str,
        source: sqlx::Error,
    },
}

/// Coarse classification used by callers deciding how to report or recover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StoreErrorKind {
    PermissionDenied,
    Network,
    Quota,
    Unavailable,
    Internal,
}

impl StoreError {
    pub fn kind(&self) -> StoreErrorKind {
        match self {
            Self::PermissionDenied { .. } => StoreErrorKind::PermissionDenied,
            Self::Network { .. } => StoreErrorKind::Network,
            Self::QuotaExceeded { .. } => StoreErrorKind::Quota,
            Self::SubscriptionClosed { .. }
            | Self::SqliteConnect { .. }
            | Self::SqliteQuery { .. } => StoreErrorKind::Unavailable,
            Self::NoRuntime { .. }
            | Self::InvalidId { .. }
            | Self::InvariantViolation { .. }
            | Self::CreateSqliteDirectory { .. }
            | Self::SqliteConnectOptions { .. }
            | Self::SqlitePragma { .. }
            | Self::SqliteMigrate { .. } => StoreErrorKind::Internal,
        }
    }

    pub fn stage(&self) -> &'static str {
        match self {
            Self::PermissionDenied { stage, .. }
            | Self::Network { stage, .. }
            | Self::QuotaExceeded { stage, .. }
            | Self::SubscriptionClosed { stage, .. }
            | Self::NoRuntime { stage, .. }
            | Self::InvalidId { stage, .. }
            | Self::InvariantViolation { stage, .. }
            | Self::CreateSqliteDirectory { stage, .. }
            | Self::SqliteConnectOptions { stage, .. }
            | Self::SqliteConnect { stage, .. }
            | Self::SqlitePragma { stage, .. }
            | Self::SqliteMigrate { stage, .. }
            | Self::SqliteQuery { stage, .. } => stage,
        }
    }
}

pub type StoreResult<T> = Result<T, StoreError>;
