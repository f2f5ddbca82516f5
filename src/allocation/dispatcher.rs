//! Background worker for collaborator requests.
//!
//! Tasks go out over a bounded channel, a worker thread runs them against
//! the resolver, and outcomes come back in submission order. The session
//! stays on the caller's thread and decides whether each outcome is still
//! current.
//!
//! `submit` never blocks. Tasks that do not fit in the channel wait in a
//! local queue and are handed to the worker as outcomes are drained.

use crate::allocation::resolver::{AllocationResolver, RecomputeOutcome, RecomputeTask};
use crate::allocation::session::AllocationSession;
use crate::error::{CoreError, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError, Sender, TrySendError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

/// Runs recompute tasks off the editing thread.
pub struct RecomputeDispatcher {
    tasks: Option<Sender<RecomputeTask>>,
    pending: Mutex<VecDeque<RecomputeTask>>,
    outcomes: Receiver<RecomputeOutcome>,
    worker: Option<JoinHandle<()>>,
}

impl RecomputeDispatcher {
    /// Spawn the worker.
    pub fn spawn(resolver: Arc<AllocationResolver>, buffer: usize) -> Result<Self> {
        let (task_tx, task_rx) = bounded::<RecomputeTask>(buffer.max(1));
        let (outcome_tx, outcome_rx) = bounded::<RecomputeOutcome>(buffer.max(1));

        let worker = std::thread::Builder::new()
            .name("recompute-dispatcher".to_string())
            .spawn(move || {
                for task in task_rx.iter() {
                    let outcome = resolver.execute(task);
                    if outcome_tx.send(outcome).is_err() {
                        break;
                    }
                }
                tracing::debug!("recompute dispatcher stopped");
            })?;

        Ok(Self {
            tasks: Some(task_tx),
            pending: Mutex::new(VecDeque::new()),
            outcomes: outcome_rx,
            worker: Some(worker),
        })
    }

    /// Queue tasks for the worker without blocking.
    pub fn submit(&self, tasks: impl IntoIterator<Item = RecomputeTask>) -> Result<()> {
        if self.tasks.is_none() {
            return Err(CoreError::InvalidOperation("dispatcher is shut down".into()));
        }

        self.pending.lock().extend(tasks);
        self.pump()
    }

    /// Tasks accepted but not yet handed to the worker.
    pub fn pending_len(&self) -> usize {
        self.pending.lock().len()
    }

    /// Move queued tasks into the channel until it is full.
    fn pump(&self) -> Result<()> {
        let Some(sender) = self.tasks.as_ref() else {
            return Ok(());
        };

        let mut pending = self.pending.lock();
        while let Some(task) = pending.pop_front() {
            match sender.try_send(task) {
                Ok(()) => {}
                Err(TrySendError::Full(task)) => {
                    pending.push_front(task);
                    break;
                }
                Err(TrySendError::Disconnected(_)) => {
                    pending.clear();
                    return Err(CoreError::Collaborator("recompute worker is gone".into()));
                }
            }
        }
        Ok(())
    }

    /// Next outcome, if one arrives within `timeout`.
    pub fn recv_timeout(&self, timeout: Duration) -> Option<RecomputeOutcome> {
        if let Err(e) = self.pump() {
            tracing::warn!(error = %e, "could not hand queued tasks to the worker");
        }

        match self.outcomes.recv_timeout(timeout) {
            Ok(outcome) => Some(outcome),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Apply outcomes to a session until `expected` have arrived, feeding
    /// follow-up stages back to the worker. Returns the number applied.
    ///
    /// The first failed outcome stops the loop and is returned.
    pub fn settle(
        &self,
        session: &mut AllocationSession,
        mut expected: usize,
        timeout: Duration,
    ) -> Result<usize> {
        let mut applied = 0;

        while expected > 0 {
            let Some(outcome) = self.recv_timeout(timeout) else {
                return Err(CoreError::Collaborator(
                    "timed out waiting for inventory response".into(),
                ));
            };
            expected -= 1;
            applied += 1;

            let follow_up = session.apply(outcome)?;
            expected += follow_up.len();
            self.submit(follow_up)?;
        }

        Ok(applied)
    }

    /// Stop accepting tasks and wait for the worker to finish.
    pub fn shutdown(&mut self) {
        self.tasks.take();
        self.pending.get_mut().clear();
        if let Some(worker) = self.worker.take() {
            // Unread outcomes would keep the worker blocked on a full channel.
            while self.outcomes.recv().is_ok() {}

            if worker.join().is_err() {
                tracing::warn!("recompute dispatcher panicked");
            }
        }
    }
}

impl Drop for RecomputeDispatcher {
    fn drop(&mut self) {
        self.shutdown();
    }
}
