//! Keyed, cancellable timers that fire onto a plugin's own queue.
//!
//! Arming a key replaces any timer already armed under it.  A firing timer
//! does not call the plugin directly: it posts [`Job::Timer`] carrying its
//! generation, and the worker only delivers it if that generation is still
//! the armed one.  A timer cancelled after it already posted its job is
//! therefore dropped instead of running late.

use super::queue::{Job, Mailbox};
use std::collections::HashMap;
use std::time::Duration;
use tokio::task::JoinHandle;

struct Armed {
    generation: u64,
    task: JoinHandle<()>,
}

/// The timer set of one plugin.
pub struct Timers {
    mailbox: Mailbox,
    armed: HashMap<String, Armed>,
    next_generation: u64,
}

impl Timers {
    pub fn new(mailbox: Mailbox) -> Self {
        Self {
            mailbox,
            armed: HashMap::new(),
            next_generation: 0,
        }
    }

    /// Fire `key` after `delay`, replacing a pending timer with the same key.
    pub fn schedule(&mut self, key: &str, delay: Duration) {
        self.cancel(key);
        self.next_generation += 1;
        let generation = self.next_generation;
        let mailbox = self.mailbox.clone();
        let job_key = key.to_string();
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            mailbox.send(Job::Timer {
                key: job_key,
                generation,
            });
        });
        self.armed.insert(key.to_string(), Armed { generation, task });
    }

    /// Cancel `key`.  Returns whether a timer was pending.
    pub fn cancel(&mut self, key: &str) -> bool {
        match self.armed.remove(key) {
            Some(armed) => {
                armed.task.abort();
                true
            }
            None => false,
        }
    }

    pub fn is_armed(&self, key: &str) -> bool {
        self.armed.contains_key(key)
    }

    pub fn cancel_all(&mut self) {
        for (_, armed) in self.armed.drain() {
            armed.task.abort();
        }
    }

    /// Claim a fired timer.  Returns `false` for stale generations.
    pub(crate) fn claim(&mut self, key: &str, generation: u64) -> bool {
        match self.armed.get(key) {
            Some(armed) if armed.generation == generation => {
                self.armed.remove(key);
                true
            }
            _ => false,
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn timers() -> (Timers, mpsc::UnboundedReceiver<Job>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Timers::new(Mailbox::new(tx)), rx)
    }

    fn fired(job: Job) -> (String, u64) {
        match job {
            Job::Timer { key, generation } => (key, generation),
            _ => panic!("expected a timer job"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timer_fires_after_delay() {
        let (mut timers, mut rx) = timers();
        timers.schedule("unfocus:term", Duration::from_millis(400));
        assert!(timers.is_armed("unfocus:term"));

        let (key, generation) = fired(rx.recv().await.unwrap());
        assert_eq!(key, "unfocus:term");
        assert!(timers.claim(&key, generation));
        assert!(!timers.is_armed("unfocus:term"));
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_supersedes_previous_timer() {
        let (mut timers, mut rx) = timers();
        timers.schedule("k", Duration::from_millis(100));
        timers.schedule("k", Duration::from_millis(300));

        let (key, generation) = fired(rx.recv().await.unwrap());
        assert!(timers.claim(&key, generation));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let (mut timers, mut rx) = timers();
        timers.schedule("k", Duration::from_millis(100));
        assert!(timers.cancel("k"));
        assert!(!timers.cancel("k"));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stale_generation_is_rejected() {
        let (mut timers, mut rx) = timers();
        timers.schedule("k", Duration::from_millis(100));
        let (key, generation) = fired(rx.recv().await.unwrap());
        // Re-armed after the first fire was already queued.
        timers.schedule("k", Duration::from_millis(100));
        assert!(!timers.claim(&key, generation));
        assert!(timers.is_armed("k"));
    }
}
