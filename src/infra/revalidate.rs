//! Webhook-based page regeneration.
//!
//! Posts each [`RevalidationPlan`] as JSON to a page renderer that owns the
//! static pages (`/productos`, `/equipo`, ...).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Url};

use crate::cache::{RegenerationError, RegenerationHook, RevalidationPlan};

use super::error::InfraError;

pub struct WebhookRegenerator {
    client: Client,
    url: Url,
}

impl WebhookRegenerator {
    pub fn new(url: Url, timeout: Duration) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(concat!("inkshop/", env!("CARGO_PKG_VERSION")))
            .timeout(timeout)
            .build()
            .map_err(InfraError::RevalidateClient)?;
        Ok(Self { client, url })
    }
}

#[async_trait]
impl RegenerationHook for WebhookRegenerator {
    fn name(&self) -> &'static str {
        "webhook"
    }

    async fn regenerate(&self, plan: &RevalidationPlan) -> Result<(), RegenerationError> {
        let response = self
            .client
            .post(self.url.clone())
            .json(plan)
            .send()
            .await
            .map_err(|err| RegenerationError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RegenerationError::Status {
                status: status.as_u16(),
            });
        }
        Ok(())
    }
}
