//! Webhook-backed account directory
//!
//! Each configured account relays its messages through an HTTP endpoint.
//! One POST is made per delivery; failures are reported, never retried.
//!
//! # Payload Format
//!
//! ```json
//! {
//!   "uin": "10001",
//!   "group_id": "123456",
//!   "message": "[Announcement]\n--------------------\n..."
//! }
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

use super::{AccountDirectory, AccountSession, DeliveryError};
use crate::config::{DirectoryAccount, DirectoryConfig};
use crate::error::{Error, Result};

/// Body of one relay request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    pub uin: String,
    pub group_id: String,
    pub message: String,
}

/// One account relayed through a webhook
pub struct WebhookSession {
    account: DirectoryAccount,
    client: Client,
}

impl WebhookSession {
    /// Create a session for a configured account
    pub fn new(account: DirectoryAccount) -> Result<Self> {
        if !account.webhook_url.starts_with("http://") && !account.webhook_url.starts_with("https://")
        {
            return Err(Error::config(format!(
                "webhook URL of account {} must start with http:// or https://",
                account.uin
            )));
        }
        if account.timeout_secs == 0 {
            return Err(Error::config(format!(
                "webhook timeout of account {} must be greater than 0",
                account.uin
            )));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(account.timeout_secs))
            .build()
            .map_err(|e| Error::with_source("Failed to create HTTP client", e))?;

        Ok(Self { account, client })
    }

    /// Relay endpoint
    pub fn url(&self) -> &str {
        &self.account.webhook_url
    }
}

#[async_trait]
impl AccountSession for WebhookSession {
    fn uin(&self) -> &str {
        &self.account.uin
    }

    fn nickname(&self) -> &str {
        &self.account.nickname
    }

    fn group_ids(&self) -> Option<Vec<String>> {
        Some(self.account.groups.clone())
    }

    fn has_group(&self, group_id: &str) -> bool {
        self.account.groups.iter().any(|g| g == group_id)
    }

    async fn send_group_message(
        &self,
        group_id: &str,
        message: &str,
    ) -> std::result::Result<(), DeliveryError> {
        if !self.has_group(group_id) {
            return Err(DeliveryError::GroupNotFound {
                uin: self.account.uin.clone(),
                group_id: group_id.to_string(),
            });
        }

        let payload = WebhookPayload {
            uin: self.account.uin.clone(),
            group_id: group_id.to_string(),
            message: message.to_string(),
        };

        let mut request = self.client.post(&self.account.webhook_url);
        if let Some(token) = &self.account.token {
            request = request.bearer_auth(token);
        }

        let response = request.json(&payload).send().await?;
        let status = response.status();
        if status.is_success() {
            tracing::debug!(uin = %self.account.uin, group_id, %status, "Webhook delivered");
            return Ok(());
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "Unable to read response body".to_string());
        Err(DeliveryError::Rejected {
            reason: format!("HTTP {status}: {body}"),
        })
    }
}

/// Static table of webhook accounts
pub struct WebhookDirectory {
    sessions: Vec<Arc<WebhookSession>>,
}

impl WebhookDirectory {
    /// Build sessions for every configured account
    pub fn new(config: &DirectoryConfig) -> Result<Self> {
        let sessions = config
            .accounts
            .iter()
            .cloned()
            .map(|account| WebhookSession::new(account).map(Arc::new))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { sessions })
    }

    /// Number of configured accounts
    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    /// Whether no account is configured
    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

#[async_trait]
impl AccountDirectory for WebhookDirectory {
    async fn sessions(&self) -> std::result::Result<Vec<Arc<dyn AccountSession>>, DeliveryError> {
        Ok(self
            .sessions
            .iter()
            .map(|s| Arc::clone(s) as Arc<dyn AccountSession>)
            .collect())
    }
}
