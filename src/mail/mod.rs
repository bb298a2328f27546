//! Moderator digest delivery.
//!
//! Composing the digest is the relay's job; this side only asks for it to be sent.

use anyhow::{Context, Result};
use reqwest::blocking::Client;
use serde_json::json;
use std::time::Duration;
use tracing::info;

pub trait ModDigestMailer: Send + Sync {
    fn send_daily_mod_digest(&self) -> Result<()>;
}

/// Asks an HTTP mail relay to compose and send the digest.
pub struct HttpMailRelay {
    client: Client,
    relay_url: String,
}

impl HttpMailRelay {
    pub fn new(relay_url: &str, timeout: Duration) -> Result<Self> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(Self {
            client,
            relay_url: relay_url.to_string(),
        })
    }
}

impl ModDigestMailer for HttpMailRelay {
    fn send_daily_mod_digest(&self) -> Result<()> {
        let response = self
            .client
            .post(&self.relay_url)
            .json(&json!({ "kind": "daily_mod_digest" }))
            .send()
            .with_context(|| format!("Mail relay {} unreachable", self.relay_url))?;

        if !response.status().is_success() {
            anyhow::bail!("Mail relay failed with status {}", response.status());
        }
        info!("Daily moderator digest handed to mail relay");
        Ok(())
    }
}
