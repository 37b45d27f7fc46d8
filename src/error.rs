//! Error types for the vision scan session.
//!
//! `CycleError` never leaves the session loop: the cycle that raised it is
//! dropped and the next frame is processed. `TransportError` ends the session.

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("malformed frame envelope")]
    Parse(#[source] serde_json::Error),

    #[error("frame payload is missing or empty")]
    EmptyFrame,

    #[error("frame payload is not valid base64")]
    Base64(#[source] base64::DecodeError),

    #[error("failed to decode image")]
    Decode(#[source] opencv::Error),

    #[error("image payload did not decode to a frame")]
    EmptyImage,

    #[error("pose estimation failed")]
    Detection(#[source] anyhow::Error),

    #[error("failed to draw overlay")]
    Render(#[source] opencv::Error),

    #[error("failed to encode frame")]
    Encode(#[source] opencv::Error),
}

impl CycleError {
    /// Malformed client input, as opposed to a failure on our side.
    pub fn is_client_fault(&self) -> bool {
        matches!(
            self,
            Self::Parse(_) | Self::EmptyFrame | Self::Base64(_) | Self::Decode(_) | Self::EmptyImage
        )
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("websocket error")]
    Socket(#[from] axum::Error),

    #[error("connection closed")]
    Closed,
}
