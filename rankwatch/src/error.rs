use thiserror::Error;

/// Crate-wide error taxonomy. `Config` is fatal and only ever surfaces out of
/// `main`; everything else is handled locally by the dispatcher per tick
/// (see the policy table in the design doc) and never needs to propagate
/// further than the broadcast currently being processed.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to load configuration: {0}")]
    Config(String),

    #[error("storage error: {0}")]
    Storage(#[from] diesel::result::Error),

    #[error("storage pool error: {0}")]
    Pool(String),

    #[error("failed to fetch ranking page: {0}")]
    Fetch(#[from] reqwest::Error),

    #[error("failed to parse ranking page: {0}")]
    Parse(String),
}

pub type Result<T> = std::result::Result<T, Error>;
