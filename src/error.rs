use thiserror::Error;

/// Why a single cover image could not be materialized.
///
/// These never abort a run; they travel inside [`crate::materializer::AssetOutcome::Failed`].
#[derive(Debug, Error)]
pub enum AssetError {
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected status {status} fetching {url}")]
    Status { status: u16, url: String },

    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),

    #[error("webp encoding failed: {0}")]
    Encode(String),

    #[error("cache i/o: {0}")]
    Io(#[from] std::io::Error),

    #[error("compression task did not complete: {0}")]
    Task(String),
}
