use anyhow::{Context, Result};
use async_nats::{Client, Subscriber};
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, info};

/// Thin JSON wrapper around the NATS connection shared by the gateway and actuator
pub struct NatsClient {
    client: Client,
}

impl NatsClient {
    /// Connect to NATS server
    pub async fn connect(url: &str) -> Result<Self> {
        info!("Connecting to NATS at {}", url);

        let client = async_nats::connect(url)
            .await
            .context("Failed to connect to NATS")?;

        info!("Connected to NATS successfully");

        Ok(Self { client })
    }

    /// Publish a JSON message
    pub async fn publish_json<T: Serialize>(&self, subject: String, message: &T) -> Result<()> {
        let payload = serde_json::to_vec(message)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .with_context(|| format!("Failed to publish to {}", subject))?;

        debug!("Published to {}", subject);
        Ok(())
    }

    /// Send a JSON request and decode the JSON reply
    pub async fn request_json<T: Serialize, R: DeserializeOwned>(
        &self,
        subject: String,
        message: &T,
    ) -> Result<R> {
        let payload = serde_json::to_vec(message)?;

        let reply = self
            .client
            .request(subject.clone(), payload.into())
            .await
            .with_context(|| format!("Request to {} failed", subject))?;

        serde_json::from_slice(&reply.payload)
            .with_context(|| format!("Invalid reply from {}", subject))
    }

    /// Subscribe to a subject
    pub async fn subscribe(&self, subject: String) -> Result<Subscriber> {
        let subscriber = self
            .client
            .subscribe(subject.clone())
            .await
            .with_context(|| format!("Failed to subscribe to {}", subject))?;

        debug!("Subscribed to {}", subject);
        Ok(subscriber)
    }
}
