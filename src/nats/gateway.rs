use anyhow::{bail, Result};
use base64::Engine;
use chrono::Utc;
use futures::stream::{Stream, StreamExt};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::client::NatsClient;
use super::messages::{
    subjects, DisconnectMessage, JoinReply, JoinRequest, LeaveRequest, NotifyMessage,
    SpeakingMessage, VoiceFrameMessage, VoiceLostMessage,
};
use crate::voice::{
    ChannelId, FrameSource, GroupId, ModerationActuator, Notice, ParticipantId, SourceEvent,
    VoiceConnection, VoiceGateway, VoiceLink,
};

const SPEAKING_CAPACITY: usize = 64;
const FRAME_CAPACITY: usize = 128;

/// Live frame sources of one connection, by participant
type SourceMap = Arc<Mutex<HashMap<ParticipantId, mpsc::Sender<SourceEvent>>>>;

/// Voice gateway backed by a NATS voice bridge
pub struct NatsGateway {
    client: Arc<NatsClient>,
}

impl NatsGateway {
    pub fn new(client: Arc<NatsClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl VoiceGateway for NatsGateway {
    async fn join(&self, group: &GroupId, channel: &ChannelId) -> Result<VoiceLink> {
        let request = JoinRequest {
            group_id: group.clone(),
            channel_id: channel.clone(),
            self_mute: true,
            self_deaf: false,
        };

        let reply: JoinReply = self
            .client
            .request_json(subjects::JOIN.to_string(), &request)
            .await?;
        if !reply.ok {
            bail!(
                "voice bridge refused to join {}: {}",
                channel,
                reply.error.unwrap_or_else(|| "no reason given".to_string())
            );
        }

        // Frames are subscribed before speaking events can arrive
        let frames = self.client.subscribe(subjects::all_frames(group)).await?;
        let speaking = self.client.subscribe(subjects::speaking(group)).await?;
        let lost = self.client.subscribe(subjects::lost(group)).await?;

        let sources = SourceMap::default();
        let (tx, rx) = mpsc::channel(SPEAKING_CAPACITY);

        let frame_task = tokio::spawn(route_frames(
            group.clone(),
            frames.map(|msg| msg.payload.to_vec()),
            Arc::clone(&sources),
        ));
        let speaking_task = tokio::spawn(relay_speaking(
            group.clone(),
            speaking.map(|msg| msg.payload.to_vec()),
            lost.map(|msg| msg.payload.to_vec()),
            tx,
        ));

        info!("Joined voice channel {} for group {} via NATS", channel, group);

        Ok(VoiceLink {
            connection: Arc::new(NatsConnection {
                client: Arc::clone(&self.client),
                group: group.clone(),
                channel: channel.clone(),
                sources,
                tasks: Mutex::new(vec![frame_task, speaking_task]),
            }),
            speaking: rx,
        })
    }

    fn name(&self) -> &str {
        "nats"
    }
}

/// One group's voice connection on the bridge
pub struct NatsConnection {
    client: Arc<NatsClient>,
    group: GroupId,
    channel: ChannelId,
    sources: SourceMap,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

#[async_trait::async_trait]
impl VoiceConnection for NatsConnection {
    fn subscribe(&self, participant: &ParticipantId) -> FrameSource {
        let (tx, rx) = mpsc::channel(FRAME_CAPACITY);
        if let Ok(mut sources) = self.sources.lock() {
            sources.insert(participant.clone(), tx);
        }
        rx
    }

    async fn destroy(&self) -> Result<()> {
        let tasks = self
            .tasks
            .lock()
            .map(|mut tasks| std::mem::take(&mut *tasks))
            .unwrap_or_default();
        for task in tasks {
            task.abort();
        }
        if let Ok(mut sources) = self.sources.lock() {
            sources.clear();
        }

        self.client
            .publish_json(
                subjects::LEAVE.to_string(),
                &LeaveRequest {
                    group_id: self.group.clone(),
                },
            )
            .await?;

        info!("Left voice channel {} for group {}", self.channel, self.group);
        Ok(())
    }
}

/// Forward speaking-start events until the bridge reports the voice connection lost.
///
/// Returning drops `tx`, which the session treats as transport loss.
async fn relay_speaking<S, L>(
    group: GroupId,
    mut speaking: S,
    mut lost: L,
    tx: mpsc::Sender<ParticipantId>,
) where
    S: Stream<Item = Vec<u8>> + Unpin,
    L: Stream<Item = Vec<u8>> + Unpin,
{
    loop {
        tokio::select! {
            msg = speaking.next() => {
                let Some(payload) = msg else { break };
                match serde_json::from_slice::<SpeakingMessage>(&payload) {
                    Ok(event) if event.group_id == group => {
                        if tx.send(event.participant_id).await.is_err() {
                            break;
                        }
                    }
                    Ok(event) => warn!("Speaking event for group {} on wrong subject", event.group_id),
                    Err(e) => warn!("Failed to parse speaking message: {}", e),
                }
            }
            msg = lost.next() => {
                let Some(payload) = msg else { break };
                match serde_json::from_slice::<VoiceLostMessage>(&payload) {
                    Ok(event) if event.group_id == group => {
                        warn!(
                            "Bridge lost the voice connection for group {}: {}",
                            group,
                            event.reason.as_deref().unwrap_or("no reason given")
                        );
                        break;
                    }
                    Ok(event) => warn!("Voice loss for group {} on wrong subject", event.group_id),
                    Err(e) => warn!("Failed to parse voice loss message: {}", e),
                }
            }
        }
    }
    debug!("Speaking relay for group {} ended", group);
}

/// Deliver the group's frames to subscribed participants
async fn route_frames<S>(group: GroupId, mut frames: S, sources: SourceMap)
where
    S: Stream<Item = Vec<u8>> + Unpin,
{
    while let Some(payload) = frames.next().await {
        match serde_json::from_slice::<VoiceFrameMessage>(&payload) {
            Ok(frame) if frame.group_id == group => route_frame(&sources, frame).await,
            Ok(frame) => warn!("Voice frame for group {} on wrong subject", frame.group_id),
            Err(e) => warn!("Failed to parse voice frame for group {}: {}", group, e),
        }
    }

    // Without the subscription no source can receive anything more
    if let Ok(mut sources) = sources.lock() {
        sources.clear();
    }
    debug!("Frame subscription for group {} ended", group);
}

/// Deliver one frame. Frames for participants without a source are dropped.
async fn route_frame(sources: &SourceMap, frame: VoiceFrameMessage) {
    let sender = sources
        .lock()
        .ok()
        .and_then(|sources| sources.get(&frame.participant_id).cloned());
    let Some(sender) = sender else {
        return;
    };

    if frame.final_frame {
        debug!(
            "Source for participant {} ended by bridge after {} frames",
            frame.participant_id, frame.sequence
        );
        remove_source(sources, &frame.participant_id, &sender);
        return;
    }

    let event = match base64::engine::general_purpose::STANDARD.decode(&frame.payload) {
        Ok(bytes) => SourceEvent::Frame(bytes),
        Err(e) => SourceEvent::Error(format!("invalid frame payload: {}", e)),
    };
    let failed = matches!(event, SourceEvent::Error(_));

    if sender.send(event).await.is_err() || failed {
        remove_source(sources, &frame.participant_id, &sender);
    }
}

/// Drop a participant's source unless a newer subscription replaced it
fn remove_source(sources: &SourceMap, participant: &ParticipantId, sender: &mpsc::Sender<SourceEvent>) {
    if let Ok(mut sources) = sources.lock() {
        if sources
            .get(participant)
            .is_some_and(|current| current.same_channel(sender))
        {
            sources.remove(participant);
        }
    }
}

/// Moderation actuator publishing orders and notices to the bridge
pub struct NatsActuator {
    client: Arc<NatsClient>,
}

impl NatsActuator {
    pub fn new(client: Arc<NatsClient>) -> Self {
        Self { client }
    }
}

#[async_trait::async_trait]
impl ModerationActuator for NatsActuator {
    async fn disconnect(&self, group: &GroupId, participant: &ParticipantId) -> Result<()> {
        let message = DisconnectMessage {
            group_id: group.clone(),
            participant_id: participant.clone(),
            timestamp: Utc::now().to_rfc3339(),
        };
        self.client
            .publish_json(subjects::disconnect(group), &message)
            .await
    }

    async fn notify(&self, group: &GroupId, notice: &Notice) -> Result<()> {
        let message = NotifyMessage {
            group_id: group.clone(),
            text: notice.to_string(),
            notice: notice.clone(),
            timestamp: Utc::now().to_rfc3339(),
        };
        self.client.publish_json(subjects::notify(group), &message).await
    }
}
