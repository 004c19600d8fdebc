use chrono::{DateTime, Utc};
use rayon::prelude::*;
use serde::Serialize;
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::time::Instant;
use thiserror::Error;
use tracing::{info, warn};

use crate::mailer::Mailer;
use crate::recipient::Recipient;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("failed to start send workers: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Result of the single send attempt made for one recipient.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SendOutcome {
    pub recipient: Recipient,
    pub succeeded: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub completed_at: DateTime<Utc>,
}

impl SendOutcome {
    fn success(recipient: Recipient) -> Self {
        Self {
            recipient,
            succeeded: true,
            error: None,
            completed_at: Utc::now(),
        }
    }

    fn failure(recipient: Recipient, error: String) -> Self {
        Self {
            recipient,
            succeeded: false,
            error: Some(error),
            completed_at: Utc::now(),
        }
    }
}

/// Pool width used when no `--workers` cap is given.
pub const DEFAULT_MAX_WORKERS: usize = 32;

/// Fans sends out over a dedicated worker pool, one unit per recipient.
#[derive(Debug, Clone, Copy, Default)]
pub struct Dispatcher {
    max_workers: Option<usize>,
}

impl Dispatcher {
    /// Without a cap the pool is `DEFAULT_MAX_WORKERS` wide, or narrower for
    /// small batches.
    pub fn new(max_workers: Option<usize>) -> Self {
        Self { max_workers }
    }

    /// Sends to every recipient and waits for all attempts to finish.
    ///
    /// Each attempt is isolated: an error or a panic in one send becomes a
    /// failed outcome for that recipient only. `on_complete` runs on the
    /// worker thread right after each attempt.
    pub fn dispatch<M, P>(
        &self,
        recipients: &[Recipient],
        mailer: &M,
        on_complete: P,
    ) -> Result<Vec<SendOutcome>, DispatchError>
    where
        M: Mailer + ?Sized,
        P: Fn(&SendOutcome) + Sync,
    {
        if recipients.is_empty() {
            return Ok(Vec::new());
        }

        let start_time = Instant::now();
        let worker_count = self
            .max_workers
            .unwrap_or(DEFAULT_MAX_WORKERS)
            .clamp(1, recipients.len());

        info!(
            action = "start",
            component = "dispatcher",
            recipient_count = recipients.len(),
            worker_count,
            "Dispatching emails"
        );

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(worker_count)
            .thread_name(|i| format!("send-worker-{}", i))
            .build()?;

        let outcomes: Vec<SendOutcome> = pool.install(|| {
            recipients
                .par_iter()
                .with_max_len(1)
                .map(|recipient| {
                    let outcome = attempt(mailer, recipient);
                    on_complete(&outcome);
                    outcome
                })
                .collect()
        });

        let sent = outcomes.iter().filter(|o| o.succeeded).count();
        info!(
            action = "complete",
            component = "dispatcher",
            sent,
            failed = outcomes.len() - sent,
            duration_ms = start_time.elapsed().as_millis(),
            "Dispatch finished"
        );

        Ok(outcomes)
    }
}

fn attempt<M: Mailer + ?Sized>(mailer: &M, recipient: &Recipient) -> SendOutcome {
    match panic::catch_unwind(AssertUnwindSafe(|| mailer.send(recipient))) {
        Ok(Ok(())) => SendOutcome::success(recipient.clone()),
        Ok(Err(e)) => {
            warn!(action = "send", component = "dispatcher", recipient = %recipient.email, error = %e, "Send failed");
            SendOutcome::failure(recipient.clone(), e.to_string())
        }
        Err(payload) => {
            let message = panic_message(payload.as_ref());
            warn!(action = "send", component = "dispatcher", recipient = %recipient.email, error = %message, "Send panicked");
            SendOutcome::failure(recipient.clone(), format!("send panicked: {}", message))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mailer::MailError;
    use std::collections::HashSet;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Barrier, Mutex};
    use std::time::Duration;

    fn recipients(n: usize) -> Vec<Recipient> {
        (0..n)
            .map(|i| Recipient {
                name: format!("User {}", i),
                email: format!("user{}@x.com", i),
            })
            .collect()
    }

    #[test]
    fn every_recipient_gets_exactly_one_outcome() {
        let list = recipients(20);
        let mailer = |_: &Recipient| Ok::<(), MailError>(());
        let outcomes = Dispatcher::default().dispatch(&list, &mailer, |_| {}).unwrap();

        assert_eq!(outcomes.len(), list.len());
        let emails: HashSet<_> = outcomes.iter().map(|o| o.recipient.email.clone()).collect();
        assert_eq!(emails.len(), list.len());
        assert!(outcomes.iter().all(|o| o.succeeded && o.error.is_none()));
    }

    #[test]
    fn one_failure_does_not_affect_siblings() {
        let list = recipients(5);
        let mailer = |r: &Recipient| {
            if r.email == "user2@x.com" {
                Err(MailError::InvalidRecipient("relay rejected".to_string()))
            } else {
                Ok(())
            }
        };
        let outcomes = Dispatcher::new(Some(2)).dispatch(&list, &mailer, |_| {}).unwrap();

        for outcome in &outcomes {
            let failed = outcome.recipient.email == "user2@x.com";
            assert_eq!(outcome.succeeded, !failed);
            assert_eq!(outcome.error.is_some(), failed);
        }
    }

    #[test]
    fn panicking_send_is_contained() {
        let list = recipients(3);
        let mailer = |r: &Recipient| {
            if r.email == "user0@x.com" {
                panic!("connection reset");
            }
            Ok::<(), MailError>(())
        };
        let outcomes = Dispatcher::default().dispatch(&list, &mailer, |_| {}).unwrap();

        let failed: Vec<_> = outcomes.iter().filter(|o| !o.succeeded).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].recipient.email, "user0@x.com");
        assert_eq!(failed[0].error.as_deref(), Some("send panicked: connection reset"));
    }

    #[test]
    fn small_batches_get_a_worker_per_recipient() {
        // every send waits for all the others, so this only finishes if
        // all units are in flight at the same time
        let list = recipients(8);
        let barrier = Barrier::new(list.len());
        let mailer = |_: &Recipient| {
            barrier.wait();
            Ok::<(), MailError>(())
        };
        let outcomes = Dispatcher::default().dispatch(&list, &mailer, |_| {}).unwrap();
        assert_eq!(outcomes.len(), 8);
    }

    #[test]
    fn large_batch_uses_bounded_pool() {
        let list = recipients(5_000);
        let mailer = |_: &Recipient| Ok::<(), MailError>(());

        let start = Instant::now();
        let outcomes = Dispatcher::default().dispatch(&list, &mailer, |_| {}).unwrap();

        assert_eq!(outcomes.len(), 5_000);
        assert!(outcomes.iter().all(|o| o.succeeded));
        assert!(start.elapsed() < Duration::from_secs(20));
    }

    #[test]
    fn explicit_cap_above_default_is_honored() {
        let width = DEFAULT_MAX_WORKERS + 8;
        let list = recipients(width);
        let barrier = Barrier::new(width);
        let mailer = |_: &Recipient| {
            barrier.wait();
            Ok::<(), MailError>(())
        };
        let outcomes = Dispatcher::new(Some(width)).dispatch(&list, &mailer, |_| {}).unwrap();
        assert_eq!(outcomes.len(), width);
    }

    #[test]
    fn progress_fires_once_per_unit() {
        let list = recipients(6);
        let completed = AtomicUsize::new(0);
        let seen = Mutex::new(Vec::new());
        let mailer = |_: &Recipient| Ok::<(), MailError>(());

        Dispatcher::new(Some(3))
            .dispatch(&list, &mailer, |o| {
                completed.fetch_add(1, Ordering::SeqCst);
                seen.lock().unwrap().push(o.recipient.email.clone());
            })
            .unwrap();

        assert_eq!(completed.load(Ordering::SeqCst), 6);
        assert_eq!(seen.into_inner().unwrap().len(), 6);
    }

    #[test]
    fn empty_batch_never_calls_mailer() {
        let calls = AtomicUsize::new(0);
        let mailer = |_: &Recipient| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<(), MailError>(())
        };
        let outcomes = Dispatcher::default().dispatch(&[], &mailer, |_| {}).unwrap();
        assert!(outcomes.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }
}
