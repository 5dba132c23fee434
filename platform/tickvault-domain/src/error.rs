/// Failure taxonomy shared by providers, the store and the engine.
///
/// Values are cloned to every caller that joined a coalesced fetch or write,
/// so variants only carry owned strings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncError {
    /// Network failure, rate limit or upstream HTTP error. Worth suppressing
    /// for a while and retrying on a later tick.
    Transient {
        provider: &'static str,
        message: String,
    },
    /// The upstream answered with a payload we could not make sense of.
    Validation {
        provider: &'static str,
        message: String,
    },
    /// The fetch succeeded but produced no usable rows.
    EmptyResult { ticker: String },
    Store(String),
    InvalidInput(String),
    /// A background fetch or write panicked or was cancelled.
    Internal(String),
}

impl SyncError {
    pub fn transient(provider: &'static str, message: impl Into<String>) -> Self {
        SyncError::Transient {
            provider,
            message: message.into(),
        }
    }

    pub fn validation(provider: &'static str, message: impl Into<String>) -> Self {
        SyncError::Validation {
            provider,
            message: message.into(),
        }
    }

    pub fn is_transient(&self) -> bool {
        matches!(self, SyncError::Transient { .. })
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SyncError::Transient { .. } => "transient",
            SyncError::Validation { .. } => "validation",
            SyncError::EmptyResult { .. } => "empty_result",
            SyncError::Store(_) => "store",
            SyncError::InvalidInput(_) => "invalid_input",
            SyncError::Internal(_) => "internal",
        }
    }
}

impl std::fmt::Display for SyncError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SyncError::Transient { provider, message } => write!(f, "{provider}: {message}"),
            SyncError::Validation { provider, message } => {
                write!(f, "{provider}: invalid response: {message}")
            }
            SyncError::EmptyResult { ticker } => write!(f, "no chart data found for {ticker}"),
            SyncError::Store(msg) => write!(f, "store: {msg}"),
            SyncError::InvalidInput(msg) => write!(f, "invalid input: {msg}"),
            SyncError::Internal(msg) => write!(f, "internal: {msg}"),
        }
    }
}

impl std::error::Error for SyncError {}
