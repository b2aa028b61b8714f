use super::Notifier;
use crate::errors::{Error, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::collections::HashMap;
use tokio::sync::mpsc;
use tracing::{info, warn};

const QUEUE_CAPACITY: usize = 1000;

/// Substitute `{{Name}}` placeholders. Unknown placeholders are left as is.
pub fn render_template(template: &str, vars: &HashMap<&str, &str>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find("{{") {
        let Some(close) = rest[open + 2..].find("}}") else {
            break;
        };
        let name = rest[open + 2..open + 2 + close].trim();
        out.push_str(&rest[..open]);
        match vars.get(name) {
            Some(value) => out.push_str(value),
            None => out.push_str(&rest[open..open + 2 + close + 2]),
        }
        rest = &rest[open + 2 + close + 2..];
    }
    out.push_str(rest);
    out
}

/// Writes notifications to the log. Used when no delivery channel is set up.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        info!("notify {} `{}` ({} bytes)", to, subject, body.len());
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct Message {
    to: String,
    subject: String,
    body: String,
}

/// Queues notifications and POSTs them as JSON from a background worker.
///
/// `send` only fails when the queue is full or the worker is gone; delivery
/// errors are logged by the worker.
#[derive(Clone)]
pub struct WebhookNotifier {
    queue: mpsc::Sender<Message>,
}

impl WebhookNotifier {
    /// Start the delivery worker on the current runtime.
    pub fn spawn(client: Client, url: impl Into<String>) -> Self {
        let url = url.into();
        let (queue, mut rx) = mpsc::channel::<Message>(QUEUE_CAPACITY);
        tokio::spawn(async move {
            while let Some(message) = rx.recv().await {
                match client.post(&url).json(&message).send().await {
                    Ok(response) if response.status().is_success() => {
                        info!("delivered notification to {}", message.to);
                    }
                    Ok(response) => {
                        warn!(
                            "notification to {} rejected: HTTP {}",
                            message.to,
                            response.status()
                        );
                    }
                    Err(err) => warn!("notification to {} failed: {}", message.to, err),
                }
            }
        });
        Self { queue }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        self.queue
            .try_send(Message {
                to: to.into(),
                subject: subject.into(),
                body: body.into(),
            })
            .map_err(|err| Error::upstream("notifier", err))
    }
}
