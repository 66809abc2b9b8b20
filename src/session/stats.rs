use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::voice::{ChannelId, GroupId, ParticipantId};

/// Snapshot of a monitoring session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// Monitored group
    pub group_id: GroupId,

    /// Voice channel the session joined
    pub channel_id: ChannelId,

    /// Unique id of this monitoring session
    pub session_id: Uuid,

    /// When monitoring started
    pub started_at: DateTime<Utc>,

    /// Time monitored so far in seconds
    pub duration_secs: f64,

    /// Participants currently being evaluated
    pub live_participants: Vec<ParticipantId>,
}

impl SessionStats {
    pub fn new(
        group: &GroupId,
        channel: &ChannelId,
        session_id: Uuid,
        started_at: DateTime<Utc>,
        live_participants: Vec<ParticipantId>,
    ) -> Self {
        let duration = Utc::now().signed_duration_since(started_at);

        Self {
            group_id: group.clone(),
            channel_id: channel.clone(),
            session_id,
            started_at,
            duration_secs: duration.num_milliseconds() as f64 / 1000.0,
            live_participants,
        }
    }
}
