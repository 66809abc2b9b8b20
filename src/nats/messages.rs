use serde::{Deserialize, Serialize};

use crate::voice::{ChannelId, GroupId, Notice, ParticipantId};

/// Request to join a voice channel (`voice.join`)
#[derive(Debug, Serialize, Deserialize)]
pub struct JoinRequest {
    pub group_id: GroupId,
    pub channel_id: ChannelId,
    pub self_mute: bool,
    pub self_deaf: bool,
}

/// Reply from the voice bridge to a join request
#[derive(Debug, Serialize, Deserialize)]
pub struct JoinReply {
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
}

/// Release a group's voice connection (`voice.leave`)
#[derive(Debug, Serialize, Deserialize)]
pub struct LeaveRequest {
    pub group_id: GroupId,
}

/// Speaking-start notification (`voice.<group>.speaking`)
#[derive(Debug, Serialize, Deserialize)]
pub struct SpeakingMessage {
    pub group_id: GroupId,
    pub participant_id: ParticipantId,
    pub timestamp: String, // RFC3339 timestamp
}

/// The bridge lost the group's voice connection (`voice.<group>.lost`)
#[derive(Debug, Serialize, Deserialize)]
pub struct VoiceLostMessage {
    pub group_id: GroupId,
    #[serde(default)]
    pub reason: Option<String>,
    pub timestamp: String,
}

/// Encoded voice frame (`voice.<group>.frames.<participant>`)
#[derive(Debug, Serialize, Deserialize)]
pub struct VoiceFrameMessage {
    pub group_id: GroupId,
    pub participant_id: ParticipantId,
    pub sequence: u32,
    pub payload: String, // Base64-encoded frame bytes
    pub timestamp: String,
    /// Manual end of the participant's source
    #[serde(rename = "final", default)]
    pub final_frame: bool,
}

/// Disconnect order (`moderation.<group>.disconnect`)
#[derive(Debug, Serialize, Deserialize)]
pub struct DisconnectMessage {
    pub group_id: GroupId,
    pub participant_id: ParticipantId,
    pub timestamp: String,
}

/// Notice for the group's text destination (`moderation.<group>.notify`)
#[derive(Debug, Serialize, Deserialize)]
pub struct NotifyMessage {
    pub group_id: GroupId,
    pub text: String,
    #[serde(flatten)]
    pub notice: Notice,
    pub timestamp: String,
}

pub mod subjects {
    use crate::voice::{GroupId, ParticipantId};

    pub const JOIN: &str = "voice.join";
    pub const LEAVE: &str = "voice.leave";

    pub fn speaking(group: &GroupId) -> String {
        format!("voice.{}.speaking", group)
    }

    pub fn lost(group: &GroupId) -> String {
        format!("voice.{}.lost", group)
    }

    pub fn frames(group: &GroupId, participant: &ParticipantId) -> String {
        format!("voice.{}.frames.{}", group, participant)
    }

    /// Every participant's frames in the group
    pub fn all_frames(group: &GroupId) -> String {
        format!("voice.{}.frames.*", group)
    }

    pub fn disconnect(group: &GroupId) -> String {
        format!("moderation.{}.disconnect", group)
    }

    pub fn notify(group: &GroupId) -> String {
        format!("moderation.{}.notify", group)
    }
}
