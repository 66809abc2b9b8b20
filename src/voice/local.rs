// In-process voice gateway
//
// Stands in for a real voice platform: tests (and local runs) drive speaking-start
// events and push frames into participant sources by hand.

use anyhow::{bail, Result};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::info;

use super::{
    ChannelId, FrameSource, GroupId, ParticipantId, SourceEvent, VoiceConnection, VoiceGateway,
    VoiceLink,
};

const CHANNEL_CAPACITY: usize = 64;

/// Voice gateway whose connections live entirely in memory
#[derive(Clone, Default)]
pub struct LocalGateway {
    connections: Arc<Mutex<HashMap<GroupId, Arc<LocalConnection>>>>,
    refuse_joins: Arc<AtomicBool>,
}

impl LocalGateway {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following join fail
    pub fn refuse_joins(&self, refuse: bool) {
        self.refuse_joins.store(refuse, Ordering::SeqCst);
    }

    fn connection(&self, group: &GroupId) -> Option<Arc<LocalConnection>> {
        self.connections
            .lock()
            .ok()
            .and_then(|connections| connections.get(group).cloned())
    }

    /// Emit a speaking-start notification. Returns false when nothing is listening.
    pub async fn speak(&self, group: &GroupId, participant: &ParticipantId) -> bool {
        let Some(sender) = self.connection(group).and_then(|c| c.speaking_sender()) else {
            return false;
        };
        sender.send(participant.clone()).await.is_ok()
    }

    /// Sender feeding the participant's current subscription, if any
    pub fn source(&self, group: &GroupId, participant: &ParticipantId) -> Option<mpsc::Sender<SourceEvent>> {
        let connection = self.connection(group)?;
        let sources = connection.sources.lock().ok()?;
        let sender = sources.get(participant).filter(|tx| !tx.is_closed()).cloned();
        sender
    }

    /// End the participant's source, as a manual close from the platform would
    pub fn end_source(&self, group: &GroupId, participant: &ParticipantId) -> bool {
        let Some(connection) = self.connection(group) else {
            return false;
        };
        let removed = match connection.sources.lock() {
            Ok(mut sources) => sources.remove(participant).is_some(),
            Err(_) => false,
        };
        removed
    }

    /// Number of subscriptions ever made on the group's connection
    pub fn subscriptions(&self, group: &GroupId) -> usize {
        self.connection(group)
            .map(|c| c.subscriptions.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    /// Whether the group holds a connection that has not been destroyed
    pub fn is_connected(&self, group: &GroupId) -> bool {
        self.connection(group)
            .map(|c| !c.destroyed.load(Ordering::SeqCst))
            .unwrap_or(false)
    }

    /// Simulate losing the transport: the speaking-start stream ends
    pub fn drop_transport(&self, group: &GroupId) {
        if let Some(connection) = self.connection(group) {
            if let Ok(mut speaking) = connection.speaking.lock() {
                speaking.take();
            }
        }
    }
}

#[async_trait::async_trait]
impl VoiceGateway for LocalGateway {
    async fn join(&self, group: &GroupId, channel: &ChannelId) -> Result<VoiceLink> {
        if self.refuse_joins.load(Ordering::SeqCst) {
            bail!("join refused for group {}", group);
        }

        let (speaking_tx, speaking_rx) = mpsc::channel(CHANNEL_CAPACITY);
        let connection = Arc::new(LocalConnection {
            group: group.clone(),
            channel: channel.clone(),
            speaking: Mutex::new(Some(speaking_tx)),
            sources: Mutex::new(HashMap::new()),
            subscriptions: AtomicUsize::new(0),
            destroyed: AtomicBool::new(false),
        });

        if let Ok(mut connections) = self.connections.lock() {
            connections.insert(group.clone(), Arc::clone(&connection));
        }

        info!("Local voice connection joined {} in group {}", channel, group);

        Ok(VoiceLink {
            connection,
            speaking: speaking_rx,
        })
    }

    fn name(&self) -> &str {
        "local"
    }
}

/// In-memory voice connection
pub struct LocalConnection {
    group: GroupId,
    channel: ChannelId,
    speaking: Mutex<Option<mpsc::Sender<ParticipantId>>>,
    sources: Mutex<HashMap<ParticipantId, mpsc::Sender<SourceEvent>>>,
    subscriptions: AtomicUsize,
    destroyed: AtomicBool,
}

impl LocalConnection {
    fn speaking_sender(&self) -> Option<mpsc::Sender<ParticipantId>> {
        if self.destroyed.load(Ordering::SeqCst) {
            return None;
        }
        self.speaking.lock().ok().and_then(|s| s.clone())
    }
}

#[async_trait::async_trait]
impl VoiceConnection for LocalConnection {
    fn subscribe(&self, participant: &ParticipantId) -> FrameSource {
        let (tx, rx) = mpsc::channel(CHANNEL_CAPACITY);
        if let Ok(mut sources) = self.sources.lock() {
            sources.insert(participant.clone(), tx);
        }
        self.subscriptions.fetch_add(1, Ordering::SeqCst);
        rx
    }

    async fn destroy(&self) -> Result<()> {
        self.destroyed.store(true, Ordering::SeqCst);
        if let Ok(mut speaking) = self.speaking.lock() {
            speaking.take();
        }
        if let Ok(mut sources) = self.sources.lock() {
            sources.clear();
        }
        info!(
            "Local voice connection to {} for group {} destroyed",
            self.channel, self.group
        );
        Ok(())
    }
}
