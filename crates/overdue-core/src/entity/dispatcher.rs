//! Entity dispatcher
//!
//! Routes messages to a per-identity mailbox task so that messages for one
//! item are applied strictly in order and never overlap, while different
//! items run independently. Wake-ups are tokio tasks sleeping until their
//! due time; arming a new one for an identity aborts the previous one.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::AbortHandle;
use tracing::{debug, error, info, warn};

use super::{
    EntityCommand, EntityCommandSink, EntityContext, EntityStateStore, TimerEntity,
    TimerMessage, WakeUp, WakeUpScheduler, WakeUpToken,
};
use crate::clock::Clock;
use crate::config::TimerConfig;
use crate::error::{EntityError, Result};
use crate::store::ItemStore;

struct PendingTimer {
    token: WakeUpToken,
    handle: AbortHandle,
}

struct DispatcherInner {
    store: Arc<dyn ItemStore>,
    states: Arc<dyn EntityStateStore>,
    clock: Arc<dyn Clock>,
    config: TimerConfig,
    mailboxes: Mutex<HashMap<String, mpsc::UnboundedSender<TimerMessage>>>,
    timers: Mutex<HashMap<String, PendingTimer>>,
}

/// Single-threaded-per-identity executor for timer entities.
///
/// Cheap to clone; all clones share mailboxes and wake-ups. Must be used
/// from within a tokio runtime.
#[derive(Clone)]
pub struct EntityDispatcher {
    inner: Arc<DispatcherInner>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl EntityDispatcher {
    pub fn new(
        store: Arc<dyn ItemStore>,
        states: Arc<dyn EntityStateStore>,
        clock: Arc<dyn Clock>,
        config: TimerConfig,
    ) -> Self {
        Self {
            inner: Arc::new(DispatcherInner {
                store,
                states,
                clock,
                config,
                mailboxes: Mutex::new(HashMap::new()),
                timers: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Re-arm the wake-ups of every persisted entity (after a restart)
    pub fn restore(&self) -> Result<usize> {
        let snapshots = self.inner.states.all()?;
        for snapshot in &snapshots {
            self.arm(&snapshot.id, snapshot.wake_up);
        }
        info!(count = snapshots.len(), "restored timer entities");
        Ok(snapshots.len())
    }

    /// Number of identities with a pending wake-up
    pub fn pending_wake_ups(&self) -> usize {
        lock(&self.inner.timers).len()
    }

    /// Whether `id` has a pending wake-up
    pub fn is_armed(&self, id: &str) -> bool {
        lock(&self.inner.timers).contains_key(id)
    }

    /// Number of mailboxes currently processing messages
    pub fn active_mailboxes(&self) -> usize {
        lock(&self.inner.mailboxes).len()
    }

    /// Wait until every mailbox has processed its queue
    pub async fn drain(&self) {
        while self.active_mailboxes() > 0 {
            tokio::task::yield_now().await;
        }
    }

    /// Abort all pending wake-ups. Persisted snapshots are kept for
    /// [`restore`](Self::restore).
    pub fn shutdown(&self) {
        let mut timers = lock(&self.inner.timers);
        for (_, timer) in timers.drain() {
            timer.handle.abort();
        }
        debug!("dispatcher wake-ups aborted");
    }

    fn enqueue(&self, id: &str, message: TimerMessage) -> Result<()> {
        if id.trim().is_empty() {
            return Err(EntityError::InvalidIdentity(id.to_string()).into());
        }

        let mut mailboxes = lock(&self.inner.mailboxes);
        let message = match mailboxes.get(id) {
            Some(tx) => match tx.send(message) {
                Ok(()) => return Ok(()),
                Err(mpsc::error::SendError(message)) => message,
            },
            None => message,
        };

        let (tx, rx) = mpsc::unbounded_channel();
        tx.send(message)
            .map_err(|_| EntityError::MailboxClosed(id.to_string()))?;
        mailboxes.insert(id.to_string(), tx);
        tokio::spawn(self.clone().run_mailbox(id.to_string(), rx));
        Ok(())
    }

    async fn run_mailbox(self, id: String, mut rx: mpsc::UnboundedReceiver<TimerMessage>) {
        loop {
            while let Ok(message) = rx.try_recv() {
                self.process(&id, message).await;
            }
            if self.retire_if_idle(&id, &rx) {
                return;
            }
        }
    }

    /// Senders only enqueue while holding the mailbox lock, so an empty
    /// queue observed under the lock stays empty once the entry is gone.
    fn retire_if_idle(&self, id: &str, rx: &mpsc::UnboundedReceiver<TimerMessage>) -> bool {
        let mut mailboxes = lock(&self.inner.mailboxes);
        if rx.is_empty() {
            mailboxes.remove(id);
            true
        } else {
            false
        }
    }

    async fn process(&self, id: &str, message: TimerMessage) {
        let name = message.name();
        let token = match &message {
            TimerMessage::Reevaluate(token) => Some(*token),
            _ => None,
        };

        let ctx = EntityContext {
            store: self.inner.store.as_ref(),
            states: self.inner.states.as_ref(),
            wake_ups: self,
            clock: self.inner.clock.as_ref(),
        };

        match TimerEntity::new(id, ctx).handle(message).await {
            Ok(outcome) => debug!(id, message = name, ?outcome, "message handled"),
            Err(err) => match token {
                Some(token) => {
                    warn!(id, error = %err, "reevaluate failed, retrying");
                    self.retry_wake_up(id, token);
                }
                None => error!(id, message = name, error = %err, "message failed"),
            },
        }
    }

    /// Re-deliver a failed wake-up unless it has been superseded meanwhile
    fn retry_wake_up(&self, id: &str, token: WakeUpToken) {
        let current = match self.inner.states.load(id) {
            Ok(snapshot) => snapshot.map(|s| s.wake_up.token),
            Err(err) => {
                warn!(id, error = %err, "cannot load entity state, retrying anyway");
                Some(token)
            }
        };
        if current != Some(token) {
            debug!(id, "failed wake-up superseded, not retried");
            return;
        }

        let at = chrono::Duration::from_std(self.inner.config.retry_delay())
            .ok()
            .and_then(|delay| self.inner.clock.now().checked_add_signed(delay));
        let Some(at) = at else {
            // The snapshot stays persisted; restore() re-arms it
            error!(
                id,
                retry_delay_ms = self.inner.config.retry_delay_ms,
                "retry delay out of range, wake-up not retried"
            );
            return;
        };
        self.arm(id, WakeUp { at, token });
    }

    fn fire(&self, id: &str, token: WakeUpToken) {
        {
            let mut timers = lock(&self.inner.timers);
            if timers.get(id).is_some_and(|t| t.token == token) {
                timers.remove(id);
            }
        }
        if let Err(err) = self.enqueue(id, TimerMessage::Reevaluate(token)) {
            warn!(id, error = %err, "wake-up could not be delivered");
        }
    }
}

impl WakeUpScheduler for EntityDispatcher {
    fn arm(&self, id: &str, wake_up: WakeUp) {
        let delay = (wake_up.at - self.inner.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let dispatcher = self.clone();
        let target = id.to_string();
        let token = wake_up.token;

        // Registered before the task can fire so `fire` always sees its entry
        let mut timers = lock(&self.inner.timers);
        let task = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            dispatcher.fire(&target, token);
        });
        let previous = timers.insert(
            id.to_string(),
            PendingTimer {
                token,
                handle: task.abort_handle(),
            },
        );
        if let Some(previous) = previous {
            previous.handle.abort();
        }
    }

    fn cancel(&self, id: &str) {
        if let Some(timer) = lock(&self.inner.timers).remove(id) {
            timer.handle.abort();
        }
    }
}

impl EntityCommandSink for EntityDispatcher {
    fn deliver(&self, id: &str, command: EntityCommand) -> Result<()> {
        self.enqueue(id, command.into())
    }
}
