//! Voice platform seams
//!
//! The moderation core never talks to a voice platform directly. It goes through:
//! - `VoiceGateway`: joins one channel per group and yields speaking-start events
//! - `VoiceConnection`: per-participant encoded frame subscriptions, connection release
//! - `ModerationActuator`: disconnects a participant and posts notices
//!
//! `crate::nats` implements these over a NATS bridge; `local` implements them in-process.

pub mod local;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::mpsc;

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(id: &str) -> Self {
                Self(id.to_string())
            }
        }

        impl From<String> for $name {
            fn from(id: String) -> Self {
                Self(id)
            }
        }
    };
}

string_id!(
    /// Isolated community context (one monitoring session at most)
    GroupId
);
string_id!(
    /// Voice channel inside a group
    ChannelId
);
string_id!(
    /// Individual whose audio is being monitored
    ParticipantId
);

/// Event delivered by an encoded frame source
///
/// The source ends when its channel closes. It never closes on silence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    /// One encoded audio frame, in arrival order
    Frame(Vec<u8>),
    /// The source failed; no further frames follow
    Error(String),
}

/// Encoded frame source for one participant
pub type FrameSource = mpsc::Receiver<SourceEvent>;

/// Result of joining a voice channel
pub struct VoiceLink {
    pub connection: Arc<dyn VoiceConnection>,
    /// Speaking-start notifications keyed by participant.
    /// Closing without an explicit destroy means the transport was lost.
    pub speaking: mpsc::Receiver<ParticipantId>,
}

/// Establishes voice connections
#[async_trait::async_trait]
pub trait VoiceGateway: Send + Sync {
    /// Join `channel` for `group` (self-muted, listening)
    async fn join(&self, group: &GroupId, channel: &ChannelId) -> Result<VoiceLink>;

    /// Gateway name for logging
    fn name(&self) -> &str;
}

/// A joined voice channel
#[async_trait::async_trait]
pub trait VoiceConnection: Send + Sync {
    /// Subscribe to a participant's encoded frames.
    ///
    /// Dropping the returned source closes the subscription.
    fn subscribe(&self, participant: &ParticipantId) -> FrameSource;

    /// Release the connection
    async fn destroy(&self) -> Result<()>;
}

/// Notice posted to a group's text destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notice {
    /// A participant was removed for exceeding the threshold
    Disconnected {
        participant_id: ParticipantId,
        decibels: f64,
        threshold: u8,
    },
    /// The voice transport went away without an explicit stop
    MonitoringLost { channel_id: ChannelId },
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Notice::Disconnected {
                participant_id,
                threshold,
                ..
            } => write!(
                f,
                "{} was disconnected for exceeding {} dB",
                participant_id, threshold
            ),
            Notice::MonitoringLost { channel_id } => write!(
                f,
                "Lost the voice connection to {}; monitoring has stopped",
                channel_id
            ),
        }
    }
}

/// Carries out moderation decisions on the platform
#[async_trait::async_trait]
pub trait ModerationActuator: Send + Sync {
    /// Forcibly remove a participant from voice
    async fn disconnect(&self, group: &GroupId, participant: &ParticipantId) -> Result<()>;

    /// Post a notice for the group
    async fn notify(&self, group: &GroupId, notice: &Notice) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_serialize_transparently() {
        let group = GroupId::from("1234");
        assert_eq!(serde_json::to_string(&group).unwrap(), "\"1234\"");
        assert_eq!(group.to_string(), "1234");
    }

    #[test]
    fn test_notice_text() {
        let notice = Notice::Disconnected {
            participant_id: ParticipantId::from("alice"),
            decibels: 71.2,
            threshold: 70,
        };
        assert_eq!(notice.to_string(), "alice was disconnected for exceeding 70 dB");

        let json = serde_json::to_value(&notice).unwrap();
        assert_eq!(json["kind"], "disconnected");
        assert_eq!(json["threshold"], 70);
    }
}
