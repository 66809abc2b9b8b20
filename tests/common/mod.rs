// Shared fixtures for integration tests

#![allow(dead_code)]

use anyhow::Result;
use std::sync::{Arc, Mutex};
use voice_warden::voice::local::LocalGateway;
use voice_warden::{
    Codec, GroupId, MemoryThresholdStore, ModerationActuator, Notice, ParticipantId,
    SessionRegistry, StreamRegistry,
};

/// Poll an async condition for up to two seconds
macro_rules! eventually {
    ($cond:expr) => {{
        let mut satisfied = false;
        for _ in 0..200 {
            if $cond {
                satisfied = true;
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        satisfied
    }};
}

/// Actuator that records every call
#[derive(Default)]
pub struct RecordingActuator {
    pub disconnects: Mutex<Vec<(GroupId, ParticipantId)>>,
    pub notices: Mutex<Vec<(GroupId, Notice)>>,
}

impl RecordingActuator {
    pub fn disconnected(&self) -> Vec<(GroupId, ParticipantId)> {
        self.disconnects.lock().unwrap().clone()
    }

    pub fn notices(&self) -> Vec<(GroupId, Notice)> {
        self.notices.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl ModerationActuator for RecordingActuator {
    async fn disconnect(&self, group: &GroupId, participant: &ParticipantId) -> Result<()> {
        self.disconnects
            .lock()
            .unwrap()
            .push((group.clone(), participant.clone()));
        Ok(())
    }

    async fn notify(&self, group: &GroupId, notice: &Notice) -> Result<()> {
        self.notices
            .lock()
            .unwrap()
            .push((group.clone(), notice.clone()));
        Ok(())
    }
}

/// Everything wired together over the in-process gateway
pub struct Harness {
    pub gateway: LocalGateway,
    pub actuator: Arc<RecordingActuator>,
    pub thresholds: Arc<MemoryThresholdStore>,
    pub streams: StreamRegistry,
    pub sessions: SessionRegistry,
}

impl Harness {
    pub fn new() -> Self {
        let gateway = LocalGateway::new();
        let actuator = Arc::new(RecordingActuator::default());
        let thresholds = Arc::new(MemoryThresholdStore::new());
        let streams = StreamRegistry::spawn(Codec::Pcm, thresholds.clone(), actuator.clone());
        let sessions =
            SessionRegistry::spawn(Arc::new(gateway.clone()), streams.clone(), actuator.clone());

        Self {
            gateway,
            actuator,
            thresholds,
            streams,
            sessions,
        }
    }
}

/// One decoded-size PCM chunk of constant amplitude (stereo, 64 sample frames)
pub fn chunk(amplitude: i16) -> Vec<u8> {
    std::iter::repeat(amplitude.to_le_bytes())
        .take(128)
        .flatten()
        .collect()
}
