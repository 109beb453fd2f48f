//! Bounded background delivery.
//!
//! Request handlers enqueue without waiting; a fixed pool of workers drains the
//! queue, bounding each attempt with a timeout and retrying with backoff.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, mpsc};
use tracing::{debug, error, info, warn};

use super::{MailTransport, OutgoingMail};

#[derive(Debug, Clone)]
pub struct MailQueueConfig {
    /// Number of worker tasks
    pub workers: usize,
    /// Messages held before new ones are dropped
    pub capacity: usize,
    /// Upper bound for a single delivery attempt
    pub timeout: Duration,
    /// Attempts per message, including the first
    pub max_attempts: u32,
    /// Delay before the first retry, doubled after each failure
    pub backoff: Duration,
}

impl Default for MailQueueConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            capacity: 256,
            timeout: Duration::from_secs(10),
            max_attempts: 3,
            backoff: Duration::from_secs(2),
        }
    }
}

/// Handle for enqueueing messages. Workers exit once every handle is dropped.
#[derive(Clone)]
pub struct MailQueue {
    sender: mpsc::Sender<OutgoingMail>,
}

impl MailQueue {
    /// Spawn the worker pool. Must be called from within a Tokio runtime.
    pub fn start(transport: Arc<dyn MailTransport>, config: MailQueueConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let config = Arc::new(config);

        for worker in 0..config.workers.max(1) {
            tokio::spawn(run_worker(
                worker,
                receiver.clone(),
                transport.clone(),
                config.clone(),
            ));
        }

        Self { sender }
    }

    /// Queue a message without waiting. Returns false if it was dropped.
    pub fn enqueue(&self, mail: OutgoingMail) -> bool {
        match self.sender.try_send(mail) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(mail)) => {
                warn!(to = %mail.to, subject = %mail.subject, "Mail queue full, dropping message");
                false
            }
            Err(mpsc::error::TrySendError::Closed(mail)) => {
                error!(to = %mail.to, subject = %mail.subject, "Mail queue closed, dropping message");
                false
            }
        }
    }
}

async fn run_worker(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<OutgoingMail>>>,
    transport: Arc<dyn MailTransport>,
    config: Arc<MailQueueConfig>,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(mail) = next else {
            debug!(worker, "Mail queue closed, worker exiting");
            break;
        };
        deliver(transport.as_ref(), &mail, &config).await;
    }
}

/// Deliver one message, retrying failed or timed-out attempts.
/// Returns whether delivery eventually succeeded.
pub async fn deliver(
    transport: &dyn MailTransport,
    mail: &OutgoingMail,
    config: &MailQueueConfig,
) -> bool {
    let attempts = config.max_attempts.max(1);
    let mut delay = config.backoff;

    for attempt in 1..=attempts {
        match tokio::time::timeout(config.timeout, transport.send(mail)).await {
            Ok(Ok(())) => {
                info!(to = %mail.to, subject = %mail.subject, attempt, "Mail delivered");
                return true;
            }
            Ok(Err(e)) => {
                warn!(to = %mail.to, attempt, error = %e, "Mail delivery failed");
            }
            Err(_) => {
                warn!(
                    to = %mail.to,
                    attempt,
                    timeout_ms = config.timeout.as_millis() as u64,
                    "Mail delivery timed out"
                );
            }
        }

        if attempt < attempts {
            tokio::time::sleep(delay).await;
            delay = delay.saturating_mul(2);
        }
    }

    error!(to = %mail.to, subject = %mail.subject, attempts, "Giving up on mail delivery");
    false
}
