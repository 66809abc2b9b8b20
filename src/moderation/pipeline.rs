//! Per-stream decode-and-evaluate pipeline
//!
//! One pipeline runs per live participant stream:
//! frames are decoded in arrival order, accumulated into a fixed window,
//! and each full window is judged against the group's threshold.

use std::sync::Arc;
use tracing::{debug, error, info};

use super::threshold::{Threshold, ThresholdStore};
use crate::audio::{loudness, EvaluationWindow, FrameDecoder};
use crate::error::ModerationError;
use crate::voice::{FrameSource, GroupId, ModerationActuator, Notice, ParticipantId, SourceEvent};

/// Decision for one evaluation window
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Verdict {
    /// At or below the threshold, keep buffering
    Continue,
    /// Above the threshold, the participant is removed
    Exceeded { decibels: f64, threshold: Threshold },
}

/// Judge a loudness sample against a threshold
pub fn judge(decibels: f64, threshold: Threshold) -> Verdict {
    if threshold.is_exceeded_by(decibels) {
        Verdict::Exceeded {
            decibels,
            threshold,
        }
    } else {
        Verdict::Continue
    }
}

/// Why a stream stopped
#[derive(Debug)]
pub enum StreamEnd {
    /// A window exceeded the threshold and the participant was moderated
    Triggered { decibels: f64, threshold: Threshold },
    /// Decode failure, source failure or source end
    Failed(ModerationError),
}

/// Decode-and-evaluate state for one participant
pub struct StreamPipeline {
    group: GroupId,
    participant: ParticipantId,
    decoder: Box<dyn FrameDecoder>,
    window: EvaluationWindow,
    thresholds: Arc<dyn ThresholdStore>,
    actuator: Arc<dyn ModerationActuator>,
    windows_evaluated: u64,
}

impl StreamPipeline {
    pub fn new(
        group: GroupId,
        participant: ParticipantId,
        decoder: Box<dyn FrameDecoder>,
        thresholds: Arc<dyn ThresholdStore>,
        actuator: Arc<dyn ModerationActuator>,
    ) -> Self {
        Self {
            group,
            participant,
            decoder,
            window: EvaluationWindow::default(),
            thresholds,
            actuator,
            windows_evaluated: 0,
        }
    }

    /// Decode one frame and evaluate if it completes the window.
    ///
    /// Runs synchronously; nothing here awaits.
    pub fn ingest(&mut self, frame: &[u8]) -> Result<Verdict, ModerationError> {
        let pcm = self.decoder.decode(frame)?;

        let Some(window) = self.window.push(pcm) else {
            return Ok(Verdict::Continue);
        };

        let decibels = loudness::decibels(&window);
        let threshold = self.thresholds.get(&self.group);
        self.windows_evaluated += 1;

        debug!(
            "Group {} participant {}: {:.2} dB (threshold {})",
            self.group, self.participant, decibels, threshold
        );

        Ok(judge(decibels, threshold))
    }

    /// Chunks waiting for the next evaluation
    pub fn buffered_chunks(&self) -> usize {
        self.window.len()
    }

    pub fn windows_evaluated(&self) -> u64 {
        self.windows_evaluated
    }

    /// Consume the source until a terminal state is reached
    pub async fn run(mut self, mut source: FrameSource) -> StreamEnd {
        let end = loop {
            let event = match source.recv().await {
                Some(event) => event,
                None => break StreamEnd::Failed(ModerationError::SourceEnded),
            };

            let frame = match event {
                SourceEvent::Frame(frame) => frame,
                SourceEvent::Error(reason) => {
                    break StreamEnd::Failed(ModerationError::SourceFailure(reason))
                }
            };

            match self.ingest(&frame) {
                Ok(Verdict::Continue) => {}
                Ok(Verdict::Exceeded {
                    decibels,
                    threshold,
                }) => {
                    break StreamEnd::Triggered {
                        decibels,
                        threshold,
                    }
                }
                Err(e) => break StreamEnd::Failed(e),
            }
        };

        // Close the subscription and release the decoder before acting on the platform
        drop(source);
        let StreamPipeline {
            group,
            participant,
            decoder,
            window,
            actuator,
            ..
        } = self;
        drop(decoder);
        drop(window);

        if let StreamEnd::Triggered {
            decibels,
            threshold,
        } = &end
        {
            moderate(&group, &participant, actuator, *decibels, *threshold).await;
        }

        end
    }
}

/// Disconnect the participant and post the notice. Failures are logged only.
async fn moderate(
    group: &GroupId,
    participant: &ParticipantId,
    actuator: Arc<dyn ModerationActuator>,
    decibels: f64,
    threshold: Threshold,
) {
    info!(
        "Participant {} in group {} exceeded {} dB ({:.2} dB), disconnecting",
        participant, group, threshold, decibels
    );

    if let Err(e) = actuator.disconnect(group, participant).await {
        error!(
            "Failed to disconnect participant {} in group {}: {:#}",
            participant, group, e
        );
    }

    let notice = Notice::Disconnected {
        participant_id: participant.clone(),
        decibels,
        threshold: threshold.value(),
    };
    if let Err(e) = actuator.notify(group, &notice).await {
        error!("Failed to post notice for group {}: {:#}", group, e);
    }
}
