use anyhow::Result;
use serde::Deserialize;

use crate::audio::Codec;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub nats: NatsConfig,
    pub audio: AudioConfig,
    pub thresholds: ThresholdsConfig,
}

#[derive(Debug, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
}

#[derive(Debug, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Deserialize)]
pub struct NatsConfig {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct AudioConfig {
    /// Encoding of frames delivered by the voice bridge
    pub codec: Codec,
}

#[derive(Debug, Deserialize)]
pub struct ThresholdsConfig {
    /// JSON file holding per-group decibel thresholds
    pub path: String,
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
