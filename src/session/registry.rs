use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::stats::SessionStats;
use super::streams::{OpenOutcome, StreamRegistry};
use crate::error::{ModerationError, ModerationResult};
use crate::voice::{
    ChannelId, GroupId, ModerationActuator, Notice, ParticipantId, VoiceConnection, VoiceGateway,
};

const COMMAND_CAPACITY: usize = 64;
const REGISTRY: &str = "session";

enum SessionCommand {
    Start {
        group: GroupId,
        channel: ChannelId,
        reply: oneshot::Sender<ModerationResult<SessionStats>>,
    },
    Stop {
        group: GroupId,
        reply: oneshot::Sender<ModerationResult<SessionStats>>,
    },
    Status {
        group: GroupId,
        reply: oneshot::Sender<ModerationResult<SessionStats>>,
    },
    Groups {
        reply: oneshot::Sender<Vec<GroupId>>,
    },
    /// The speaking-start stream ended without a stop
    Lost { group: GroupId, session_id: Uuid },
}

/// Handle to the actor owning one monitoring session per group
#[derive(Clone)]
pub struct SessionRegistry {
    tx: mpsc::Sender<SessionCommand>,
}

impl SessionRegistry {
    /// Spawn the registry actor
    pub fn spawn(
        gateway: Arc<dyn VoiceGateway>,
        streams: StreamRegistry,
        actuator: Arc<dyn ModerationActuator>,
    ) -> Self {
        let (tx, rx) = mpsc::channel(COMMAND_CAPACITY);

        let actor = SessionActor {
            sessions: HashMap::new(),
            gateway,
            streams,
            actuator,
            handle: tx.downgrade(),
        };
        tokio::spawn(actor.run(rx));

        Self { tx }
    }

    /// Join `channel` and start monitoring `group`
    pub async fn start(&self, group: &GroupId, channel: &ChannelId) -> ModerationResult<SessionStats> {
        self.request(|reply| SessionCommand::Start {
            group: group.clone(),
            channel: channel.clone(),
            reply,
        })
        .await?
    }

    /// Stop monitoring `group`, closing its streams and releasing the connection
    pub async fn stop(&self, group: &GroupId) -> ModerationResult<SessionStats> {
        self.request(|reply| SessionCommand::Stop {
            group: group.clone(),
            reply,
        })
        .await?
    }

    pub async fn status(&self, group: &GroupId) -> ModerationResult<SessionStats> {
        self.request(|reply| SessionCommand::Status {
            group: group.clone(),
            reply,
        })
        .await?
    }

    /// Groups currently monitored, sorted
    pub async fn groups(&self) -> ModerationResult<Vec<GroupId>> {
        self.request(|reply| SessionCommand::Groups { reply }).await
    }

    /// Stop every session (shutdown path). Returns how many were stopped.
    pub async fn stop_all(&self) -> ModerationResult<usize> {
        let mut stopped = 0;
        for group in self.groups().await? {
            match self.stop(&group).await {
                Ok(_) => stopped += 1,
                // Lost concurrently
                Err(ModerationError::NotMonitoring(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(stopped)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> SessionCommand,
    ) -> ModerationResult<T> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(command(reply))
            .await
            .map_err(|_| ModerationError::RegistryClosed(REGISTRY))?;
        rx.await.map_err(|_| ModerationError::RegistryClosed(REGISTRY))
    }
}

struct MonitoringSession {
    id: Uuid,
    channel: ChannelId,
    connection: Arc<dyn VoiceConnection>,
    created_at: DateTime<Utc>,
    listener: JoinHandle<()>,
}

struct SessionActor {
    sessions: HashMap<GroupId, MonitoringSession>,
    gateway: Arc<dyn VoiceGateway>,
    streams: StreamRegistry,
    actuator: Arc<dyn ModerationActuator>,
    handle: mpsc::WeakSender<SessionCommand>,
}

impl SessionActor {
    async fn run(mut self, mut rx: mpsc::Receiver<SessionCommand>) {
        debug!("Session registry started ({} gateway)", self.gateway.name());

        while let Some(command) = rx.recv().await {
            match command {
                SessionCommand::Start {
                    group,
                    channel,
                    reply,
                } => {
                    let _ = reply.send(self.start(group, channel).await);
                }
                SessionCommand::Stop { group, reply } => {
                    let _ = reply.send(self.stop(&group).await);
                }
                SessionCommand::Status { group, reply } => {
                    let _ = reply.send(self.status(&group).await);
                }
                SessionCommand::Groups { reply } => {
                    let mut groups: Vec<GroupId> = self.sessions.keys().cloned().collect();
                    groups.sort();
                    let _ = reply.send(groups);
                }
                SessionCommand::Lost { group, session_id } => {
                    self.lost(&group, session_id).await;
                }
            }
        }

        debug!("Session registry stopped");
    }

    async fn start(&mut self, group: GroupId, channel: ChannelId) -> ModerationResult<SessionStats> {
        if self.sessions.contains_key(&group) {
            return Err(ModerationError::AlreadyMonitoring(group));
        }

        info!("Joining channel {} to monitor group {}", channel, group);

        let link = self
            .gateway
            .join(&group, &channel)
            .await
            .map_err(ModerationError::Gateway)?;

        let session_id = Uuid::new_v4();
        let listener = tokio::spawn(listen_for_speakers(
            group.clone(),
            session_id,
            Arc::clone(&link.connection),
            link.speaking,
            self.streams.clone(),
            self.handle.clone(),
        ));

        let session = MonitoringSession {
            id: session_id,
            channel,
            connection: link.connection,
            created_at: Utc::now(),
            listener,
        };
        let stats = SessionStats::new(&group, &session.channel, session.id, session.created_at, Vec::new());

        info!("Monitoring started for group {} (session {})", group, session_id);
        self.sessions.insert(group, session);

        Ok(stats)
    }

    async fn stop(&mut self, group: &GroupId) -> ModerationResult<SessionStats> {
        let Some(session) = self.sessions.get(group) else {
            return Err(ModerationError::NotMonitoring(group.clone()));
        };

        let participants = self.streams.participants(group).await?;
        let stats = SessionStats::new(group, &session.channel, session.id, session.created_at, participants);

        self.teardown(group).await;
        info!("Monitoring stopped for group {}", group);

        Ok(stats)
    }

    async fn status(&self, group: &GroupId) -> ModerationResult<SessionStats> {
        let Some(session) = self.sessions.get(group) else {
            return Err(ModerationError::NotMonitoring(group.clone()));
        };

        let participants = self.streams.participants(group).await?;
        Ok(SessionStats::new(group, &session.channel, session.id, session.created_at, participants))
    }

    async fn lost(&mut self, group: &GroupId, session_id: Uuid) {
        let Some(session) = self.sessions.get(group).filter(|s| s.id == session_id) else {
            // Already stopped, or replaced by a newer session
            return;
        };
        let channel = session.channel.clone();

        warn!(
            "Voice transport for group {} lost (session {}), stopping monitoring",
            group, session_id
        );

        self.teardown(group).await;

        let notice = Notice::MonitoringLost { channel_id: channel };
        if let Err(e) = self.actuator.notify(group, &notice).await {
            error!("Failed to post notice for group {}: {:#}", group, e);
        }
    }

    /// Stop the listener, close child streams, release the connection and deregister
    async fn teardown(&mut self, group: &GroupId) {
        let Some(session) = self.sessions.remove(group) else {
            return;
        };

        // Once the listener has finished, no open request can be queued behind close_all
        session.listener.abort();
        let _ = session.listener.await;

        let closed = match self.streams.close_all(group).await {
            Ok(closed) => closed,
            Err(e) => {
                // The stream actor aborts its streams when it exits
                warn!("Could not close streams for group {}: {}", group, e);
                0
            }
        };

        if let Err(e) = session.connection.destroy().await {
            warn!("Failed to release voice connection for group {}: {:#}", group, e);
        }

        debug!(
            "Session {} for group {} torn down ({} streams closed)",
            session.id, group, closed
        );
    }
}

/// Forward speaking-start notifications to the stream registry
async fn listen_for_speakers(
    group: GroupId,
    session_id: Uuid,
    connection: Arc<dyn VoiceConnection>,
    mut speaking: mpsc::Receiver<ParticipantId>,
    streams: StreamRegistry,
    sessions: mpsc::WeakSender<SessionCommand>,
) {
    while let Some(participant) = speaking.recv().await {
        match streams.open(&group, &participant, Arc::clone(&connection)).await {
            Ok(OpenOutcome::Opened) => {
                debug!("Participant {} started speaking in group {}", participant, group)
            }
            Ok(OpenOutcome::Ignored) => {}
            Err(e) => warn!(
                "Could not open stream for participant {} in group {}: {}",
                participant, group, e
            ),
        }
    }

    if let Some(tx) = sessions.upgrade() {
        let _ = tx.send(SessionCommand::Lost { group, session_id }).await;
    }
}
