//! Email side of notifications.
//!
//! Stored notifications are mirrored to email through a bounded queue that a
//! few worker tasks drain. Handing a job to the queue never blocks a request:
//! a full queue drops the job and every delivery failure ends in the log.

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use studenthub_common::model::notification::EMAIL_SUBJECT;
use studenthub_db::notifications::Notice;
use thiserror::Error;
use tokio::{
    sync::{
        Mutex,
        mpsc::{self, error::TrySendError},
    },
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[derive(Clone, Eq, PartialEq, Debug, Hash, Serialize)]
pub struct MailJob {
    pub subject: String,
    pub recipients: Vec<String>,
    pub body: String,
}

impl MailJob {
    #[must_use]
    pub fn for_notice(notice: &Notice) -> Self {
        Self {
            subject: EMAIL_SUBJECT.to_owned(),
            recipients: vec![notice.receiver_email.clone()],
            body: notice.notification.text.clone(),
        }
    }
}

#[derive(Debug, Error)]
pub enum MailError {
    #[error("Mail relay request failed: {0}")]
    Relay(#[from] reqwest::Error),
}

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_mail(&self, job: &MailJob) -> Result<(), MailError>;
}

/// Posts mails as JSON to an HTTP relay.
#[derive(Clone, Debug)]
pub struct HttpMailer {
    client: reqwest::Client,
    relay_url: String,
    sender: String,
}

#[derive(Serialize)]
struct RelayRequest<'a> {
    from: &'a str,
    to: &'a [String],
    subject: &'a str,
    text: &'a str,
}

impl HttpMailer {
    #[must_use]
    pub fn new(relay_url: String, sender: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            relay_url,
            sender,
        }
    }
}

#[async_trait]
impl Mailer for HttpMailer {
    async fn send_mail(&self, job: &MailJob) -> Result<(), MailError> {
        let request = RelayRequest {
            from: &self.sender,
            to: &job.recipients,
            subject: &job.subject,
            text: &job.body,
        };

        self.client
            .post(&self.relay_url)
            .json(&request)
            .send()
            .await?
            .error_for_status()?;
        Ok(())
    }
}

/// Stands in for a relay when none is configured.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default, Hash)]
pub struct LogMailer;

#[async_trait]
impl Mailer for LogMailer {
    async fn send_mail(&self, job: &MailJob) -> Result<(), MailError> {
        info!(recipients = ?job.recipients, subject = job.subject, "Mail relay not configured, dropping mail");
        Ok(())
    }
}

/// Producer side of the mail queue.
#[derive(Clone, Debug)]
pub struct Notifier {
    sender: mpsc::Sender<MailJob>,
}

/// Consumer side of the mail queue, shared by the workers.
#[derive(Debug)]
pub struct MailQueue {
    receiver: Arc<Mutex<mpsc::Receiver<MailJob>>>,
}

impl Notifier {
    #[must_use]
    pub fn with_capacity(capacity: usize) -> (Self, MailQueue) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let queue = MailQueue {
            receiver: Arc::new(Mutex::new(receiver)),
        };
        (Self { sender }, queue)
    }

    /// Queues the email for `notice`. Returns whether it was queued.
    pub fn dispatch(&self, notice: &Notice) -> bool {
        let job = MailJob::for_notice(notice);
        let notification_id = notice.notification.id;

        match self.sender.try_send(job) {
            Ok(()) => {
                debug!(%notification_id, "Queued notification mail");
                true
            }
            Err(TrySendError::Full(_)) => {
                warn!(%notification_id, "Mail queue is full, dropping notification mail");
                false
            }
            Err(TrySendError::Closed(_)) => {
                error!(%notification_id, "Mail queue is closed, dropping notification mail");
                false
            }
        }
    }

    /// Queues the mail for every notice that is present.
    pub fn dispatch_all<'a>(&self, notices: impl IntoIterator<Item = &'a Notice>) {
        for notice in notices {
            self.dispatch(notice);
        }
    }
}

impl MailQueue {
    /// Starts `workers` tasks delivering through `mailer` until `shutdown` fires.
    pub fn spawn_workers(
        self,
        mailer: Arc<dyn Mailer>,
        workers: usize,
        shutdown: &CancellationToken,
    ) -> Vec<JoinHandle<()>> {
        (0..workers.max(1))
            .map(|worker| {
                let receiver = Arc::clone(&self.receiver);
                let mailer = Arc::clone(&mailer);
                let shutdown = shutdown.clone();
                tokio::spawn(run_worker(worker, receiver, mailer, shutdown))
            })
            .collect()
    }
}

async fn run_worker(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<MailJob>>>,
    mailer: Arc<dyn Mailer>,
    shutdown: CancellationToken,
) {
    debug!(worker, "Mail worker started");

    loop {
        let job = tokio::select! {
            () = shutdown.cancelled() => break,
            job = async { receiver.lock().await.recv().await } => job,
        };
        let Some(job) = job else {
            break;
        };

        match mailer.send_mail(&job).await {
            Ok(()) => debug!(worker, recipients = ?job.recipients, "Delivered mail"),
            Err(err) => error!(worker, error = %err, recipients = ?job.recipients, "Mail delivery failed"),
        }
    }

    debug!(worker, "Mail worker stopped");
}

#[cfg(test)]
mod tests {
    use crate::notify::{MailError, MailJob, Mailer, Notifier};
    use async_trait::async_trait;
    use std::{
        sync::{
            Arc,
            atomic::{AtomicUsize, Ordering},
        },
        time::Duration,
    };
    use studenthub_common::model::{Id, notification::Notification};
    use studenthub_db::notifications::Notice;
    use time::OffsetDateTime;
    use tokio::{sync::mpsc, time::timeout};
    use tokio_util::sync::CancellationToken;

    fn notice(id: i64) -> Notice {
        Notice {
            notification: Notification {
                id: Id::new(id),
                text: format!("Notification {id}"),
                receiver: Id::new(1),
                is_seen: false,
                link: None,
                created_at: OffsetDateTime::UNIX_EPOCH,
            },
            receiver_email: "olena@uni.example.org".into(),
        }
    }

    struct RecordingMailer {
        sent: mpsc::UnboundedSender<MailJob>,
        failures_left: AtomicUsize,
    }

    #[async_trait]
    impl Mailer for RecordingMailer {
        async fn send_mail(&self, job: &MailJob) -> Result<(), MailError> {
            let failing = self
                .failures_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |left| left.checked_sub(1))
                .is_ok();
            if failing {
                // Any reqwest error will do, building a request for a bad url is the easiest.
                let err = reqwest::Client::new().get("not a url").build().unwrap_err();
                return Err(MailError::Relay(err));
            }
            self.sent.send(job.clone()).unwrap();
            Ok(())
        }
    }

    #[test]
    fn job_mirrors_the_notification() {
        let job = MailJob::for_notice(&notice(3));
        assert_eq!(job.recipients, vec!["olena@uni.example.org".to_owned()]);
        assert_eq!(job.body, "Notification 3");
        assert!(!job.subject.is_empty());
    }

    #[tokio::test]
    async fn full_queue_drops_jobs() {
        let (notifier, _queue) = Notifier::with_capacity(1);

        assert!(notifier.dispatch(&notice(1)));
        assert!(!notifier.dispatch(&notice(2)));
    }

    #[tokio::test]
    async fn closed_queue_drops_jobs() {
        let (notifier, queue) = Notifier::with_capacity(4);
        drop(queue);

        assert!(!notifier.dispatch(&notice(1)));
    }

    #[tokio::test]
    async fn workers_deliver_and_survive_failures() {
        let (sent, mut delivered) = mpsc::unbounded_channel();
        let mailer = Arc::new(RecordingMailer {
            sent,
            failures_left: AtomicUsize::new(1),
        });
        let shutdown = CancellationToken::new();
        let (notifier, queue) = Notifier::with_capacity(8);
        let workers = queue.spawn_workers(mailer, 2, &shutdown);

        for id in 1..=3 {
            assert!(notifier.dispatch(&notice(id)));
        }

        // The first job fails, the other two arrive.
        let mut bodies = Vec::new();
        for _ in 0..2 {
            let job = timeout(Duration::from_secs(5), delivered.recv())
                .await
                .unwrap()
                .unwrap();
            bodies.push(job.body);
        }
        bodies.sort();
        assert_eq!(bodies.len(), 2);
        assert!(bodies.iter().all(|body| body.starts_with("Notification ")));

        shutdown.cancel();
        for worker in workers {
            timeout(Duration::from_secs(5), worker).await.unwrap().unwrap();
        }
    }
}
