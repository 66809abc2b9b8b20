pub mod client;
pub mod gateway;
pub mod messages;

pub use client::NatsClient;
pub use gateway::{NatsActuator, NatsConnection, NatsGateway};
pub use messages::{
    DisconnectMessage, JoinReply, JoinRequest, LeaveRequest, NotifyMessage, SpeakingMessage,
    VoiceFrameMessage, VoiceLostMessage,
};
