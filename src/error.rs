use thiserror::Error;

use crate::voice::GroupId;

/// Failures surfaced by the moderation core
#[derive(Debug, Error)]
pub enum ModerationError {
    #[error("group {0} is already being monitored")]
    AlreadyMonitoring(GroupId),

    #[error("group {0} is not being monitored")]
    NotMonitoring(GroupId),

    #[error("decibel threshold {0} is outside the allowed range 0..=150")]
    InvalidRange(String),

    #[error("failed to decode voice frame: {0}")]
    DecodeFailure(String),

    #[error("voice frame source failed: {0}")]
    SourceFailure(String),

    #[error("voice frame source ended")]
    SourceEnded,

    #[error("unsupported codec: {0}")]
    Codec(String),

    #[error("voice gateway error: {0:#}")]
    Gateway(anyhow::Error),

    #[error("threshold store error: {0:#}")]
    Store(anyhow::Error),

    #[error("{0} registry is no longer running")]
    RegistryClosed(&'static str),
}

impl ModerationError {
    /// Per-stream failures only tear down the affected stream
    pub fn is_stream_local(&self) -> bool {
        matches!(
            self,
            ModerationError::DecodeFailure(_)
                | ModerationError::SourceFailure(_)
                | ModerationError::SourceEnded
        )
    }
}

pub type ModerationResult<T> = Result<T, ModerationError>;
