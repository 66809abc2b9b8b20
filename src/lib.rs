pub mod audio;
pub mod config;
pub mod error;
pub mod http;
pub mod moderation;
pub mod nats;
pub mod session;
pub mod voice;

pub use audio::{decibels, Codec, EvaluationWindow, FrameDecoder, PcmDecoder, WINDOW_CHUNKS};
pub use config::Config;
pub use error::{ModerationError, ModerationResult};
pub use http::{create_router, AppState};
pub use moderation::{JsonThresholdStore, MemoryThresholdStore, Threshold, ThresholdStore};
pub use nats::{NatsActuator, NatsClient, NatsGateway};
pub use session::{OpenOutcome, SessionRegistry, SessionStats, StreamRegistry};
pub use voice::{
    ChannelId, GroupId, ModerationActuator, Notice, ParticipantId, SourceEvent, VoiceConnection,
    VoiceGateway,
};
