//! Retry confirmation answered by the API client between failed attempts.

use crate::services::{GenerationError, RetryPrompt};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tokio::sync::{oneshot, watch};

/// An unanswered "retry?" question.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct RetryQuestion {
    pub id: u64,
    /// Attempt that just failed, from 1.
    pub attempt: u32,
    pub max_attempts: u32,
    pub error: String,
}

/// Parks each retry decision until `answer` is called or the timeout passes.
///
/// An unanswered question counts as a decline once the timeout passes.
pub struct PendingRetryPrompt {
    question: watch::Sender<Option<RetryQuestion>>,
    reply: Mutex<Option<(u64, oneshot::Sender<bool>)>>,
    next_id: AtomicU64,
    timeout: Duration,
}

impl PendingRetryPrompt {
    pub fn new(timeout: Duration) -> Self {
        let (question, _) = watch::channel(None);
        Self {
            question,
            reply: Mutex::new(None),
            next_id: AtomicU64::new(1),
            timeout,
        }
    }

    pub fn pending(&self) -> Option<RetryQuestion> {
        self.question.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<RetryQuestion>> {
        self.question.subscribe()
    }

    /// Answer the open question. `false` when nothing was waiting.
    pub fn answer(&self, retry: bool) -> bool {
        let waiting = self
            .reply
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        let Some((id, tx)) = waiting else {
            return false;
        };
        self.question.send_replace(None);
        log::info!("Retry question {} answered: {}", id, if retry { "retry" } else { "abort" });
        tx.send(retry).is_ok()
    }

    /// Drop the question `id` if it is still the open one.
    fn withdraw(&self, id: u64) {
        let mut reply = self.reply.lock().unwrap_or_else(PoisonError::into_inner);
        if matches!(reply.as_ref(), Some((open, _)) if *open == id) {
            reply.take();
            self.question.send_replace(None);
        }
    }
}

#[async_trait]
impl RetryPrompt for PendingRetryPrompt {
    async fn confirm_retry(&self, attempt: u32, max_attempts: u32, error: &GenerationError) -> bool {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        {
            let mut reply = self.reply.lock().unwrap_or_else(PoisonError::into_inner);
            if reply.replace((id, tx)).is_some() {
                log::warn!("Retry question replaced before it was answered");
            }
            self.question.send_replace(Some(RetryQuestion {
                id,
                attempt,
                max_attempts,
                error: error.to_string(),
            }));
        }
        log::info!(
            "Generation attempt {}/{} failed, waiting for a retry decision: {}",
            attempt,
            max_attempts,
            error
        );
        match tokio::time::timeout(self.timeout, rx).await {
            Ok(Ok(retry)) => retry,
            Ok(Err(_)) => false,
            Err(_) => {
                log::warn!("No retry decision within {:?}, giving up", self.timeout);
                self.withdraw(id);
                false
            }
        }
    }

    fn report_failure(&self, attempts: u32, error: &GenerationError) {
        log::error!("Generation failed {} time(s), giving up: {}", attempts, error);
    }
}
