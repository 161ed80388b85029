use thiserror::Error;

/// Errors from the crate's fallible edges: configuration, binding, redis.
///
/// The timing path itself never produces one of these. Malformed timing
/// input is recovered where it is read.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to load metrics configuration: {0}")]
    Config(#[from] confique::Error),

    #[error("invalid metrics configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
