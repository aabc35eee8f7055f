/// Core error type for the expense bot.
///
/// Adapter crates should map their specific errors into this type so command
/// handlers can log the detail and fall back to a fixed user-facing reply.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("auth error: {0}")]
    Auth(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("data error: {0}")]
    Data(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("external error: {0}")]
    External(String),
}

impl Error {
    /// Whether the cached spreadsheet handle should be dropped after this error.
    ///
    /// A rejected token or a vanished spreadsheet id both mean the handle is
    /// stale; the next call re-authenticates and looks the spreadsheet up again.
    pub fn invalidates_handle(&self) -> bool {
        matches!(self, Error::Auth(_) | Error::NotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, Error>;
