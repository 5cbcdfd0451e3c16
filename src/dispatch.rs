use crate::error::{ReportError, Result};
use crate::model::{Channel, Client, DateRange, DeliveryOptions, DeliveryOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use sha2::{Digest, Sha256};
use std::sync::Mutex;
use tracing::{info, warn};

/// Durable binary hosting. The returned URL must stay valid at least until
/// any scheduled delivery timestamp.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn upload(&self, bytes: &[u8], file_name: &str) -> Result<String>;
}

/// One call per recipient; success and failure are reported independently.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(&self, recipient: &str, subject: &str, body: &str) -> Result<()>;
}

#[async_trait]
pub trait SmsSender: Send + Sync {
    async fn send(&self, recipient: &str, text: &str) -> Result<()>;
}

/// Channel messages composed from one fixed template, parameterized by
/// client and date range only.
#[derive(Debug, Clone, PartialEq)]
pub struct MessageContent {
    pub subject: String,
    pub body: String,
    pub sms_text: String,
}

pub fn compose_messages(client: &Client, range: &DateRange, url: &str) -> MessageContent {
    let period = range.label();
    MessageContent {
        subject: format!("Weekly Security Report \u{2014} {} ({period})", client.name),
        body: format!(
            "Hello,\n\n\
             The weekly security report for {} covering {period} is ready.\n\n\
             Download: {url}\n\n\
             Questions? Reply to this message or contact {}.\n",
            client.name, client.contact_email
        ),
        sms_text: format!(
            "{} weekly security report ({period}) is ready: {url}",
            client.name
        ),
    }
}

/// What a send produced: the durable URL, the document digest used to skip
/// redundant re-uploads, per-recipient outcomes, and the queue time for a
/// deferred dispatch.
#[derive(Debug, Clone)]
pub struct DeliveryReport {
    pub url: String,
    pub digest: String,
    pub outcomes: Vec<DeliveryOutcome>,
    pub queued_for: Option<DateTime<Utc>>,
}

impl DeliveryReport {
    pub fn all_succeeded(&self) -> bool {
        self.outcomes.iter().all(|o| o.success)
    }

    pub fn failed_count(&self) -> usize {
        self.outcomes.iter().filter(|o| !o.success).count()
    }
}

/// A queued deferred dispatch. Message composition happens at flush time,
/// not queue time.
#[derive(Debug, Clone)]
struct ScheduledDispatch {
    due: DateTime<Utc>,
    url: String,
    client: Client,
    range: DateRange,
    recipients: Vec<(Channel, String)>,
}

pub fn document_digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}

/// Orchestrates one delivery: upload first (a hard barrier; nothing is
/// composed or dispatched on upload failure), then concurrent fan-out to
/// every recipient on every enabled channel.
pub struct Dispatcher<C, E, S> {
    store: C,
    email: E,
    sms: S,
    scheduled: Mutex<Vec<ScheduledDispatch>>,
}

impl<C: ContentStore, E: EmailSender, S: SmsSender> Dispatcher<C, E, S> {
    pub fn new(store: C, email: E, sms: S) -> Self {
        Self {
            store,
            email,
            sms,
            scheduled: Mutex::new(Vec::new()),
        }
    }

    pub async fn send(
        &self,
        document: &[u8],
        options: &DeliveryOptions,
        client: &Client,
        range: &DateRange,
        reuse_url: Option<&str>,
    ) -> Result<DeliveryReport> {
        let recipients: Vec<(Channel, String)> = options
            .active_recipients()
            .into_iter()
            .map(|(channel, recipient)| (channel, recipient.to_string()))
            .collect();
        if recipients.is_empty() {
            return Err(ReportError::NoRecipients);
        }

        let digest = document_digest(document);
        let url = match reuse_url {
            Some(existing) => {
                info!(url = existing, "reusing previously uploaded document");
                existing.to_string()
            }
            None => {
                let file_name = format!("weekly-report-{}-{}.pdf", client.id, range.start);
                self.store.upload(document, &file_name).await?
            }
        };

        if options.schedule_delivery {
            if let Some(due) = options.delivery_date {
                self.queue(ScheduledDispatch {
                    due,
                    url: url.clone(),
                    client: client.clone(),
                    range: *range,
                    recipients,
                })?;
                info!(%due, "delivery queued for scheduled dispatch");
                return Ok(DeliveryReport {
                    url,
                    digest,
                    outcomes: Vec::new(),
                    queued_for: Some(due),
                });
            }
            return Err(ReportError::InvalidConfiguration(
                "schedule_delivery is set but delivery_date is empty".to_string(),
            ));
        }

        let message = compose_messages(client, range, &url);
        let outcomes = self.dispatch_now(&message, &recipients).await;
        Ok(DeliveryReport {
            url,
            digest,
            outcomes,
            queued_for: None,
        })
    }

    async fn dispatch_now(
        &self,
        message: &MessageContent,
        recipients: &[(Channel, String)],
    ) -> Vec<DeliveryOutcome> {
        let sends = recipients.iter().map(|(channel, recipient)| async move {
            let result = match channel {
                Channel::Email => {
                    self.email
                        .send(recipient, &message.subject, &message.body)
                        .await
                }
                Channel::Sms => self.sms.send(recipient, &message.sms_text).await,
            };
            if let Err(err) = &result {
                warn!(recipient = %recipient, channel = channel.as_str(), error = %err, "recipient dispatch failed");
            }
            DeliveryOutcome {
                recipient: recipient.clone(),
                channel: *channel,
                success: result.is_ok(),
                detail: result.err().map(|e| e.to_string()),
            }
        });
        join_all(sends).await
    }

    fn queue(&self, dispatch: ScheduledDispatch) -> Result<()> {
        self.scheduled
            .lock()
            .map_err(|_| ReportError::storage("scheduled queue mutex poisoned"))?
            .push(dispatch);
        Ok(())
    }

    pub fn queued_count(&self) -> usize {
        self.scheduled.lock().map(|q| q.len()).unwrap_or(0)
    }

    /// Dispatches every queued delivery whose time has come. Returns one
    /// outcome list per flushed dispatch so callers can confirm or retry.
    pub async fn flush_due(&self, now: DateTime<Utc>) -> Result<Vec<Vec<DeliveryOutcome>>> {
        let due: Vec<ScheduledDispatch> = {
            let mut queue = self
                .scheduled
                .lock()
                .map_err(|_| ReportError::storage("scheduled queue mutex poisoned"))?;
            let (ready, waiting): (Vec<_>, Vec<_>) =
                queue.drain(..).partition(|item| item.due <= now);
            *queue = waiting;
            ready
        };

        let mut results = Vec::with_capacity(due.len());
        for item in due {
            let message = compose_messages(&item.client, &item.range, &item.url);
            results.push(self.dispatch_now(&message, &item.recipients).await);
        }
        Ok(results)
    }
}
