use std::time::Duration;

/// Core error type for the bridge.
///
/// Adapter crates map their transport errors into this type so jobs can tell
/// an authentication failure from a throttled send or a broken network.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("config error: {0}")]
    Config(String),

    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("rate limited, retry after {}s", retry_after.as_secs())]
    RateLimited { retry_after: Duration },

    #[error("delivery rejected: {0}")]
    Delivery(String),

    #[error("network failure: {0}")]
    Network(String),

    #[error("external error: {0}")]
    External(String),
}

pub type Result<T> = std::result::Result<T, Error>;
