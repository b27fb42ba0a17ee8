//! Outgoing email as queued jobs.
//!
//! Callers hand an [`EmailJob`] to the [`MailQueue`] and return as soon as the
//! job is accepted. A single worker task delivers jobs through an
//! [`EmailTransport`]; jobs that fail are logged and forwarded to the
//! dead-letter channel, never back to the caller.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::errors::{AppError, Result};

#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
pub struct EmailJob {
    pub to: String,
    pub subject: String,
    pub body: String,
}

/// A job the transport could not deliver.
#[derive(Debug, Clone)]
pub struct FailedEmail {
    pub job: EmailJob,
    pub reason: String,
}

pub type DeadLetters = mpsc::UnboundedReceiver<FailedEmail>;

#[async_trait]
pub trait EmailTransport: Send + Sync {
    async fn send(&self, job: &EmailJob) -> Result<()>;
}

/// Posts each job as JSON to a transactional mail API.
pub struct HttpTransport {
    client: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    sender: String,
}

#[derive(Serialize)]
struct MailApiRequest<'a> {
    from: &'a str,
    to: &'a str,
    subject: &'a str,
    text: &'a str,
}

impl HttpTransport {
    pub fn new(endpoint: String, api_key: Option<String>, sender: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint,
            api_key,
            sender,
        }
    }
}

#[async_trait]
impl EmailTransport for HttpTransport {
    async fn send(&self, job: &EmailJob) -> Result<()> {
        let mut request = self.client.post(&self.endpoint).json(&MailApiRequest {
            from: &self.sender,
            to: &job.to,
            subject: &job.subject,
            text: &job.body,
        });
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| AppError::EmailSend(e.to_string()))?;
        if !response.status().is_success() {
            return Err(AppError::EmailSend(format!(
                "mail API answered HTTP {}",
                response.status()
            )));
        }
        Ok(())
    }
}

/// Writes emails to the log instead of sending them. Used when no mail API
/// is configured.
pub struct LogTransport;

#[async_trait]
impl EmailTransport for LogTransport {
    async fn send(&self, job: &EmailJob) -> Result<()> {
        tracing::info!("Email to {}: {} | {}", job.to, job.subject, job.body);
        Ok(())
    }
}

#[derive(Clone)]
pub struct MailQueue {
    tx: mpsc::Sender<EmailJob>,
}

impl MailQueue {
    /// Returns once the worker has accepted the job, not when it is delivered.
    pub async fn enqueue(&self, job: EmailJob) -> Result<()> {
        self.tx
            .send(job)
            .await
            .map_err(|_| AppError::EmailSend("mail worker is not running".into()))
    }
}

/// Start the delivery worker. The worker stops once every [`MailQueue`]
/// clone has been dropped.
pub fn spawn_mail_worker(
    transport: Arc<dyn EmailTransport>,
    capacity: usize,
) -> (MailQueue, DeadLetters, JoinHandle<()>) {
    let (tx, mut rx) = mpsc::channel::<EmailJob>(capacity.max(1));
    let (dead_tx, dead_rx) = mpsc::unbounded_channel();

    let worker = tokio::spawn(async move {
        while let Some(job) = rx.recv().await {
            match transport.send(&job).await {
                Ok(()) => tracing::debug!("Email '{}' delivered to {}", job.subject, job.to),
                Err(e) => {
                    tracing::error!("Email '{}' to {} failed: {}", job.subject, job.to, e);
                    let _ = dead_tx.send(FailedEmail {
                        job,
                        reason: e.to_string(),
                    });
                }
            }
        }
        tracing::info!("Mail worker stopped");
    });

    (MailQueue { tx }, dead_rx, worker)
}

/// Drains the dead-letter channel into the log for the life of the process.
pub fn spawn_dead_letter_logger(mut dead_letters: DeadLetters) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(failed) = dead_letters.recv().await {
            tracing::warn!(
                "Dead letter: email '{}' to {} was not delivered ({})",
                failed.job.subject,
                failed.job.to,
                failed.reason
            );
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    struct Recording {
        sent: Mutex<Vec<EmailJob>>,
        fail_for: &'static str,
    }

    #[async_trait]
    impl EmailTransport for Recording {
        async fn send(&self, job: &EmailJob) -> Result<()> {
            if job.to == self.fail_for {
                return Err(AppError::EmailSend("mailbox unavailable".into()));
            }
            self.sent.lock().unwrap().push(job.clone());
            Ok(())
        }
    }

    fn job(to: &str) -> EmailJob {
        EmailJob {
            to: to.to_string(),
            subject: "Verify your account".into(),
            body: "123456".into(),
        }
    }

    #[tokio::test]
    async fn failed_jobs_go_to_dead_letters_and_others_are_delivered() {
        let transport = Arc::new(Recording {
            sent: Mutex::new(Vec::new()),
            fail_for: "broken@example.com",
        });
        let (queue, mut dead, worker) = spawn_mail_worker(transport.clone(), 4);

        queue.enqueue(job("broken@example.com")).await.unwrap();
        queue.enqueue(job("ok@example.com")).await.unwrap();
        drop(queue);
        worker.await.unwrap();

        let failed = dead.recv().await.unwrap();
        assert_eq!(failed.job.to, "broken@example.com");
        assert!(failed.reason.contains("mailbox unavailable"));
        assert_eq!(transport.sent.lock().unwrap().clone(), vec![job("ok@example.com")]);
    }

    #[tokio::test]
    async fn enqueue_fails_once_worker_is_gone() {
        let (queue, _dead, worker) = spawn_mail_worker(Arc::new(LogTransport), 1);
        worker.abort();
        let _ = worker.await;
        let err = queue.enqueue(job("late@example.com")).await.unwrap_err();
        assert!(matches!(err, AppError::EmailSend(_)));
    }
}
