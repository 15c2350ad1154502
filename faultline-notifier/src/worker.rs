//! The background queue and the workers draining it.

use std::{
    panic::{self, AssertUnwindSafe},
    sync::{
        Arc, Condvar, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crossbeam_channel::{Receiver, Sender, TrySendError, bounded};

use crate::{Notice, NotifierError, QueueFullPolicy, Transport};

/// Delivery counters of a [`Notifier`](crate::Notifier).
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct NotifierStats {
    /// Notices accepted by the transport.
    pub delivered: usize,
    /// Notices the transport failed to deliver.
    pub failed: usize,
    /// Notices evicted from a full queue.
    pub dropped: usize,
}

/// Outstanding work and counters, shared by the notifier and its workers.
#[derive(Default)]
pub(crate) struct Progress {
    pending: Mutex<usize>,
    drained: Condvar,
    delivered: AtomicUsize,
    failed: AtomicUsize,
    dropped: AtomicUsize,
}

impl Progress {
    fn begin(&self) {
        *self.pending.lock().unwrap_or_else(PoisonError::into_inner) += 1;
    }

    fn finish(&self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        *pending = pending.saturating_sub(1);
        if *pending == 0 {
            self.drained.notify_all();
        }
    }

    fn drop_one(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
        self.finish();
    }

    pub(crate) fn wait_drained(&self, timeout: Duration) -> Result<(), NotifierError> {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        let (pending, _) = self
            .drained
            .wait_timeout_while(pending, timeout, |pending| *pending > 0)
            .unwrap_or_else(PoisonError::into_inner);
        match *pending {
            0 => Ok(()),
            pending => Err(NotifierError::FlushTimeout { pending }),
        }
    }

    pub(crate) fn stats(&self) -> NotifierStats {
        NotifierStats {
            delivered: self.delivered.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
        }
    }
}

/// Sends one notice, recording the outcome. A panicking transport is
/// contained and counted as a failure.
pub(crate) fn deliver(transport: &dyn Transport, notice: &Notice, progress: &Progress) {
    match panic::catch_unwind(AssertUnwindSafe(|| transport.send(notice))) {
        Ok(Ok(())) => {
            progress.delivered.fetch_add(1, Ordering::Relaxed);
            tracing::debug!(notice = %notice_message(notice), "notice delivered");
        }
        Ok(Err(error)) => {
            progress.failed.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                error = %error,
                notice = %notice_message(notice),
                "failed to deliver notice"
            );
        }
        Err(_) => {
            progress.failed.fetch_add(1, Ordering::Relaxed);
            tracing::error!(
                notice = %notice_message(notice),
                "transport panicked while delivering notice"
            );
        }
    }
}

fn notice_message(notice: &Notice) -> &str {
    notice
        .errors
        .first()
        .map_or("", |error| error.message.as_str())
}

/// The bounded queue in front of the worker threads.
pub(crate) struct Queue {
    sender: Mutex<Option<Sender<Notice>>>,
    receiver: Receiver<Notice>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    policy: QueueFullPolicy,
}

impl Queue {
    pub(crate) fn start(
        capacity: usize,
        workers: usize,
        policy: QueueFullPolicy,
        transport: Arc<dyn Transport>,
        progress: Arc<Progress>,
    ) -> Result<Self, NotifierError> {
        let (sender, receiver) = bounded(capacity);
        let queue = Self {
            sender: Mutex::new(Some(sender)),
            receiver,
            workers: Mutex::new(Vec::with_capacity(workers)),
            policy,
        };

        for index in 0..workers {
            let receiver = queue.receiver.clone();
            let transport = transport.clone();
            let progress = progress.clone();
            let spawned = thread::Builder::new()
                .name(format!("faultline-notifier-{index}"))
                .spawn(move || {
                    for notice in receiver.iter() {
                        deliver(&*transport, &notice, &progress);
                        progress.finish();
                    }
                    tracing::debug!(worker = index, "notifier worker stopped");
                });
            match spawned {
                Ok(handle) => queue
                    .workers
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .push(handle),
                Err(error) => {
                    // Let the workers already started exit before failing.
                    let _ = queue.shutdown();
                    return Err(NotifierError::Spawn(error));
                }
            }
        }

        Ok(queue)
    }

    /// Queues `notice`, applying the queue-full policy. Returns the notice
    /// back if the queue is full and it must be delivered inline, or
    /// `Err(Closed)` if the queue no longer accepts work.
    pub(crate) fn push(
        &self,
        notice: Notice,
        progress: &Progress,
    ) -> Result<Option<Notice>, NotifierError> {
        let sender = self
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(NotifierError::Closed)?;

        progress.begin();
        let notice = match sender.try_send(notice) {
            Ok(()) => return Ok(None),
            Err(TrySendError::Disconnected(_)) => {
                progress.finish();
                return Err(NotifierError::Closed);
            }
            Err(TrySendError::Full(notice)) => notice,
        };

        match self.policy {
            QueueFullPolicy::SendInline => {
                progress.finish();
                Ok(Some(notice))
            }
            QueueFullPolicy::Block => match sender.send(notice) {
                Ok(()) => Ok(None),
                Err(_) => {
                    progress.finish();
                    Err(NotifierError::Closed)
                }
            },
            QueueFullPolicy::DropOldest => {
                if let Ok(evicted) = self.receiver.try_recv() {
                    tracing::warn!(
                        notice = %notice_message(&evicted),
                        "notifier queue full, dropped oldest notice"
                    );
                    progress.drop_one();
                }
                if let Err(error) = sender.try_send(notice) {
                    tracing::warn!(
                        notice = %notice_message(&error.into_inner()),
                        "notifier queue full, dropped notice"
                    );
                    progress.drop_one();
                }
                Ok(None)
            }
        }
    }

    /// Stops intake, lets the workers drain the queue and joins them.
    pub(crate) fn shutdown(&self) -> Result<(), NotifierError> {
        drop(
            self.sender
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take(),
        );
        let workers = std::mem::take(&mut *self.workers.lock().unwrap_or_else(PoisonError::into_inner));
        let current = thread::current().id();
        let mut panicked = 0;
        for worker in workers {
            // A transport closing its own notifier must not join itself.
            if worker.thread().id() == current {
                continue;
            }
            if worker.join().is_err() {
                panicked += 1;
            }
        }
        match panicked {
            0 => Ok(()),
            count => Err(NotifierError::WorkerPanicked { count }),
        }
    }
}
