use thiserror::Error;

/// Decode/encode failure on a single frame or push item. Contained to the
/// item: the session never terminates over one of these.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid base64 in push item: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("invalid binary payload: {0}")]
    Binary(String),
    #[error("frame is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("missing expected field `{0}`")]
    MissingField(&'static str),
}
