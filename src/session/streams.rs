use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::audio::Codec;
use crate::error::{ModerationError, ModerationResult};
use crate::moderation::{StreamEnd, StreamPipeline, ThresholdStore};
use crate::voice::{GroupId, ModerationActuator, ParticipantId, VoiceConnection};

const COMMAND_CAPACITY: usize = 256;
const REGISTRY: &str = "stream";

/// Outcome of a speaking-start open request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenOutcome {
    /// A new stream is now live
    Opened,
    /// A stream was already live for this participant; nothing was allocated
    Ignored,
}

enum StreamCommand {
    Open {
        group: GroupId,
        participant: ParticipantId,
        connection: Arc<dyn VoiceConnection>,
        reply: oneshot::Sender<ModerationResult<OpenOutcome>>,
    },
    Close {
        group: GroupId,
        participant: ParticipantId,
        reply: oneshot::Sender<bool>,
    },
    CloseAll {
        group: GroupId,
        reply: oneshot::Sender<usize>,
    },
    Release {
        group: GroupId,
        participant: ParticipantId,
        stream_id: u64,
    },
    Participants {
        group: GroupId,
        reply: oneshot::Sender<Vec<ParticipantId>>,
    },
}

/// Handle to the actor owning every live participant stream
///
/// At most one stream is live per (group, participant). All map mutation
/// happens on the actor task.
#[derive(Clone)]
pub struct StreamRegistry {
    tx: mpsc::Sender<StreamCommand>,
}

impl StreamRegistry {
    /// Spawn the registry actor
    pub fn spawn(
        codec: Codec,
        thresholds: Arc<dyn ThresholdStore>,
        actuator: Arc<dyn ModerationActuator>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);

        let actor = StreamActor {
            streams: HashMap::new(),
            next_stream_id: 0,
            codec,
            thresholds,
            actuator,
            handle: tx.downgrade(),
        };
        tokio::spawn(actor.run(rx));

        Self { tx }
    }

    /// Start evaluating a participant unless a stream is already live
    pub async fn open(
        &self,
        group: &GroupId,
        participant: &ParticipantId,
        connection: Arc<dyn VoiceConnection>,
    ) -> ModerationResult<OpenOutcome> {
        let (reply, rx) = oneshot::channel();
        self.send(StreamCommand::Open {
            group: group.clone(),
            participant: participant.clone(),
            connection,
            reply,
        })
        .await?;
        rx.await.map_err(|_| ModerationError::RegistryClosed(REGISTRY))?
    }

    /// Tear down a participant's stream. Returns false when none was live.
    pub async fn close(&self, group: &GroupId, participant: &ParticipantId) -> ModerationResult<bool> {
        let (reply, rx) = oneshot::channel();
        self.send(StreamCommand::Close {
            group: group.clone(),
            participant: participant.clone(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ModerationError::RegistryClosed(REGISTRY))
    }

    /// Tear down every stream of a group. Returns how many were closed.
    pub async fn close_all(&self, group: &GroupId) -> ModerationResult<usize> {
        let (reply, rx) = oneshot::channel();
        self.send(StreamCommand::CloseAll {
            group: group.clone(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ModerationError::RegistryClosed(REGISTRY))
    }

    /// Participants with a live stream in the group, sorted
    pub async fn participants(&self, group: &GroupId) -> ModerationResult<Vec<ParticipantId>> {
        let (reply, rx) = oneshot::channel();
        self.send(StreamCommand::Participants {
            group: group.clone(),
            reply,
        })
        .await?;
        rx.await.map_err(|_| ModerationError::RegistryClosed(REGISTRY))
    }

    pub async fn is_live(&self, group: &GroupId, participant: &ParticipantId) -> ModerationResult<bool> {
        Ok(self.participants(group).await?.contains(participant))
    }

    async fn send(&self, command: StreamCommand) -> ModerationResult<()> {
        self.tx
            .send(command)
            .await
            .map_err(|_| ModerationError::RegistryClosed(REGISTRY))
    }
}

struct LiveStream {
    id: u64,
    task: JoinHandle<()>,
    opened_at: DateTime<Utc>,
}

struct StreamActor {
    streams: HashMap<GroupId, HashMap<ParticipantId, LiveStream>>,
    next_stream_id: u64,
    codec: Codec,
    thresholds: Arc<dyn ThresholdStore>,
    actuator: Arc<dyn ModerationActuator>,
    handle: mpsc::WeakSender<StreamCommand>,
}

impl StreamActor {
    async fn run(mut self, mut rx: mpsc::Receiver<StreamCommand>) {
        debug!("Stream registry started");

        while let Some(command) = rx.recv().await {
            match command {
                StreamCommand::Open {
                    group,
                    participant,
                    connection,
                    reply,
                } => {
                    let _ = reply.send(self.open(group, participant, connection));
                }
                StreamCommand::Close {
                    group,
                    participant,
                    reply,
                } => {
                    let _ = reply.send(self.close(&group, &participant));
                }
                StreamCommand::CloseAll { group, reply } => {
                    let _ = reply.send(self.close_all(&group));
                }
                StreamCommand::Release {
                    group,
                    participant,
                    stream_id,
                } => self.release(&group, &participant, stream_id),
                StreamCommand::Participants { group, reply } => {
                    let mut participants: Vec<ParticipantId> = self
                        .streams
                        .get(&group)
                        .map(|streams| streams.keys().cloned().collect())
                        .unwrap_or_default();
                    participants.sort();
                    let _ = reply.send(participants);
                }
            }
        }

        // Every handle is gone: nothing can observe the remaining streams
        for (_, streams) in self.streams.drain() {
            for (_, stream) in streams {
                stream.task.abort();
            }
        }

        debug!("Stream registry stopped");
    }

    fn open(
        &mut self,
        group: GroupId,
        participant: ParticipantId,
        connection: Arc<dyn VoiceConnection>,
    ) -> ModerationResult<OpenOutcome> {
        if self
            .streams
            .get(&group)
            .is_some_and(|streams| streams.contains_key(&participant))
        {
            debug!(
                "Stream for participant {} in group {} already live, ignoring",
                participant, group
            );
            return Ok(OpenOutcome::Ignored);
        }

        let decoder = self.codec.decoder()?;
        let source = connection.subscribe(&participant);

        let stream_id = self.next_stream_id;
        self.next_stream_id += 1;

        let pipeline = StreamPipeline::new(
            group.clone(),
            participant.clone(),
            decoder,
            Arc::clone(&self.thresholds),
            Arc::clone(&self.actuator),
        );

        let handle = self.handle.clone();
        let task_group = group.clone();
        let task_participant = participant.clone();

        let task = tokio::spawn(async move {
            let end = pipeline.run(source).await;
            log_stream_end(&task_group, &task_participant, &end);

            if let Some(tx) = handle.upgrade() {
                let _ = tx
                    .send(StreamCommand::Release {
                        group: task_group,
                        participant: task_participant,
                        stream_id,
                    })
                    .await;
            }
        });

        info!(
            "Opened stream {} for participant {} in group {}",
            stream_id, participant, group
        );

        self.streams.entry(group).or_default().insert(
            participant,
            LiveStream {
                id: stream_id,
                task,
                opened_at: Utc::now(),
            },
        );

        Ok(OpenOutcome::Opened)
    }

    fn close(&mut self, group: &GroupId, participant: &ParticipantId) -> bool {
        let Some(streams) = self.streams.get_mut(group) else {
            return false;
        };
        let Some(stream) = streams.remove(participant) else {
            return false;
        };
        if streams.is_empty() {
            self.streams.remove(group);
        }

        // Aborting drops the source subscription and any partial window
        stream.task.abort();
        info!(
            "Closed stream {} for participant {} in group {} (live {}s)",
            stream.id,
            participant,
            group,
            (Utc::now() - stream.opened_at).num_seconds()
        );
        true
    }

    fn close_all(&mut self, group: &GroupId) -> usize {
        let Some(streams) = self.streams.remove(group) else {
            return 0;
        };

        let count = streams.len();
        for (participant, stream) in streams {
            stream.task.abort();
            debug!("Closed stream {} for participant {}", stream.id, participant);
        }

        info!("Closed {} streams in group {}", count, group);
        count
    }

    /// A pipeline finished on its own; drop its entry unless a newer stream replaced it
    fn release(&mut self, group: &GroupId, participant: &ParticipantId, stream_id: u64) {
        let Some(streams) = self.streams.get_mut(group) else {
            return;
        };
        if streams.get(participant).map(|s| s.id) != Some(stream_id) {
            debug!(
                "Ignoring stale release of stream {} for participant {}",
                stream_id, participant
            );
            return;
        }

        streams.remove(participant);
        if streams.is_empty() {
            self.streams.remove(group);
        }
        debug!(
            "Released stream {} for participant {} in group {}",
            stream_id, participant, group
        );
    }
}

fn log_stream_end(group: &GroupId, participant: &ParticipantId, end: &StreamEnd) {
    match end {
        StreamEnd::Triggered {
            decibels,
            threshold,
        } => info!(
            "Stream for participant {} in group {} triggered at {:.2} dB (threshold {})",
            participant, group, decibels, threshold
        ),
        StreamEnd::Failed(ModerationError::SourceEnded) => info!(
            "Stream for participant {} in group {} ended",
            participant, group
        ),
        StreamEnd::Failed(e) if e.is_stream_local() => warn!(
            "Stream for participant {} in group {} failed: {}",
            participant, group, e
        ),
        StreamEnd::Failed(e) => error!(
            "Stream for participant {} in group {} stopped unexpectedly: {}",
            participant, group, e
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::moderation::MemoryThresholdStore;
    use crate::voice::local::LocalGateway;
    use crate::voice::{ChannelId, Notice, VoiceGateway};

    struct NoopActuator;

    #[async_trait::async_trait]
    impl ModerationActuator for NoopActuator {
        async fn disconnect(&self, _: &GroupId, _: &ParticipantId) -> anyhow::Result<()> {
            Ok(())
        }

        async fn notify(&self, _: &GroupId, _: &Notice) -> anyhow::Result<()> {
            Ok(())
        }
    }

    fn actor() -> StreamActor {
        let (tx, _rx) = mpsc::channel(1);
        StreamActor {
            streams: HashMap::new(),
            next_stream_id: 0,
            codec: Codec::Pcm,
            thresholds: Arc::new(MemoryThresholdStore::new()),
            actuator: Arc::new(NoopActuator),
            handle: tx.downgrade(),
        }
    }

    #[tokio::test]
    async fn test_stale_release_keeps_newer_stream() {
        let gateway = LocalGateway::new();
        let group = GroupId::from("g");
        let participant = ParticipantId::from("p");
        let link = gateway.join(&group, &ChannelId::from("c")).await.unwrap();
        let mut actor = actor();

        let opened = actor.open(group.clone(), participant.clone(), Arc::clone(&link.connection));
        assert_eq!(opened.unwrap(), OpenOutcome::Opened);
        assert!(actor.close(&group, &participant));

        let reopened = actor.open(group.clone(), participant.clone(), Arc::clone(&link.connection));
        assert_eq!(reopened.unwrap(), OpenOutcome::Opened);

        // Release from the first generation arrives late
        actor.release(&group, &participant, 0);
        assert!(actor.streams[&group].contains_key(&participant));

        actor.release(&group, &participant, 1);
        assert!(actor.streams.is_empty());
    }

    #[tokio::test]
    async fn test_open_is_idempotent() {
        let gateway = LocalGateway::new();
        let group = GroupId::from("g");
        let participant = ParticipantId::from("p");
        let link = gateway.join(&group, &ChannelId::from("c")).await.unwrap();
        let mut actor = actor();

        let first = actor.open(group.clone(), participant.clone(), Arc::clone(&link.connection));
        let second = actor.open(group.clone(), participant.clone(), Arc::clone(&link.connection));

        assert_eq!(first.unwrap(), OpenOutcome::Opened);
        assert_eq!(second.unwrap(), OpenOutcome::Ignored);
        assert_eq!(gateway.subscriptions(&group), 1);
        assert_eq!(actor.next_stream_id, 1);
    }

    #[tokio::test]
    async fn test_close_when_absent_is_noop() {
        let mut actor = actor();
        assert!(!actor.close(&GroupId::from("g"), &ParticipantId::from("p")));
        assert_eq!(actor.close_all(&GroupId::from("g")), 0);
    }
}
