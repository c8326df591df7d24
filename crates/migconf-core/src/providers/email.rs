use anyhow::Context;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmailMessage {
    pub to: String,
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Outcome reported by the email backend. `success == false` means the job
/// was attempted and rejected.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SendReceipt {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
}

#[async_trait]
pub trait EmailSender: Send + Sync {
    fn name(&self) -> &'static str;

    /// `Err` means the transport could not be reached at all.
    async fn send(&self, msg: &EmailMessage) -> anyhow::Result<SendReceipt>;
}

/// Posts email jobs as JSON to an HTTP email backend.
pub struct HttpEmailSender {
    client: reqwest::Client,
    endpoint: String,
    from: String,
    api_key: Option<String>,
}

impl HttpEmailSender {
    pub fn new(
        endpoint: impl Into<String>,
        from: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("failed to build http client")?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
            from: from.into(),
            api_key,
        })
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    fn name(&self) -> &'static str {
        "http"
    }

    async fn send(&self, msg: &EmailMessage) -> anyhow::Result<SendReceipt> {
        let body = serde_json::json!({
            "from": self.from,
            "to": msg.to,
            "subject": msg.subject,
            "html": msg.html,
            "text": msg.text,
        });
        let mut req = self.client.post(&self.endpoint).json(&body);
        if let Some(key) = &self.api_key {
            req = req.bearer_auth(key);
        }
        let resp = req.send().await.context("email backend unreachable")?;
        let status = resp.status();
        let text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Ok(SendReceipt {
                success: false,
                message: format!("email backend returned {}: {}", status, text.trim()),
                message_id: None,
            });
        }
        match serde_json::from_str::<SendReceipt>(&text) {
            Ok(receipt) => Ok(receipt),
            Err(_) => Ok(SendReceipt {
                success: true,
                message: "accepted".into(),
                message_id: None,
            }),
        }
    }
}

/// Records messages instead of sending them. Every send succeeds unless
/// `failing` is set.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<EmailMessage>>,
    failing: bool,
}

impl RecordingSender {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            failing: true,
        }
    }

    pub fn sent(&self) -> Vec<EmailMessage> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl EmailSender for RecordingSender {
    fn name(&self) -> &'static str {
        "recording"
    }

    async fn send(&self, msg: &EmailMessage) -> anyhow::Result<SendReceipt> {
        if let Ok(mut s) = self.sent.lock() {
            s.push(msg.clone());
        }
        if self.failing {
            anyhow::bail!("transport unavailable");
        }
        let n = self.sent().len();
        Ok(SendReceipt {
            success: true,
            message: "recorded".into(),
            message_id: Some(format!("rec-{}", n)),
        })
    }
}
