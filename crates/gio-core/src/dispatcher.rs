//! Batch dispatcher: drains the message queue in bounded slices.
//!
//! A drain is triggered when an enqueue brings the queue to `batch_size`,
//! when the recurring timer fires, or on an explicit flush. Each slice is
//! sent once; the outcome goes to the callback registry and a failed slice
//! is not re-queued.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, trace, warn};

use crate::callbacks::CallbackRegistry;
use crate::error::DispatchError;
use crate::message::WireMessage;
use crate::queue::MessageQueue;
use crate::transport::Transport;

pub struct Dispatcher {
    queue: MessageQueue,
    callbacks: CallbackRegistry,
    transport: Arc<dyn Transport>,
    batch_size: usize,
    send_interval: Duration,
    timer: Mutex<Option<Timer>>,
}

/// Running flush timer. Dropping `stop` ends the loop at its next wait.
struct Timer {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>, batch_size: usize, send_interval: Duration) -> Self {
        Self {
            queue: MessageQueue::new(),
            callbacks: CallbackRegistry::new(),
            transport,
            batch_size: batch_size.max(1),
            send_interval: send_interval.max(Duration::from_millis(1)),
            timer: Mutex::new(None),
        }
    }

    pub fn queue(&self) -> &MessageQueue {
        &self.queue
    }

    pub fn callbacks(&self) -> &CallbackRegistry {
        &self.callbacks
    }

    /// Appends `message`; a full queue is drained immediately and its slice
    /// sent in the background.
    ///
    /// Outside a tokio runtime the message is only queued and waits for the
    /// next timer tick or flush.
    pub fn enqueue(self: &Arc<Self>, message: WireMessage) {
        let Ok(runtime) = Handle::try_current() else {
            let pending = self.queue.push(message);
            trace!(pending, "Queued message without runtime");
            return;
        };

        if let Some(slice) = self.queue.push_and_take_full(message, self.batch_size) {
            let dispatcher = Arc::clone(self);
            runtime.spawn(async move {
                let _ = dispatcher.dispatch(slice).await;
            });
        }
    }

    /// Removes up to `batch_size` oldest messages and sends them.
    ///
    /// Returns `Ok(None)` when the queue was empty, and the delivered slice
    /// otherwise.
    pub async fn send_batch(&self) -> Result<Option<Vec<WireMessage>>, DispatchError> {
        let slice = self.queue.take_slice(self.batch_size);
        if slice.is_empty() {
            return Ok(None);
        }
        self.dispatch(slice).await.map(Some)
    }

    /// Sends slices until the queue is empty.
    ///
    /// A failed slice does not stop the drain; the first failure is returned
    /// once the queue has been emptied.
    pub async fn flush(&self) -> Result<usize, DispatchError> {
        let mut delivered = 0;
        let mut first_error = None;

        loop {
            match self.send_batch().await {
                Ok(Some(slice)) => delivered += slice.len(),
                Ok(None) => break,
                Err(error) => {
                    first_error.get_or_insert(error);
                }
            }
        }

        match first_error {
            Some(error) => Err(error),
            None => Ok(delivered),
        }
    }

    async fn dispatch(&self, slice: Vec<WireMessage>) -> Result<Vec<WireMessage>, DispatchError> {
        match self.transport.send(&slice).await {
            Ok(()) => {
                debug!(messages = slice.len(), "Batch delivered");
                self.callbacks.notify_success(&slice);
                Ok(slice)
            }
            Err(source) => {
                let error = DispatchError {
                    messages: slice.len(),
                    source,
                };
                warn!(messages = slice.len(), status = ?error.status(), error = %error, "Batch dispatch failed");
                self.callbacks.notify_error(&slice, &error);
                Err(error)
            }
        }
    }

    /// Starts the recurring drain and returns whether a timer is running.
    ///
    /// Calling it while a timer runs is a no-op. Outside a tokio runtime no
    /// timer can be spawned and `false` is returned.
    pub fn start_timer(self: &Arc<Self>) -> bool {
        let mut timer = self.timer.lock().unwrap_or_else(|e| e.into_inner());
        if timer.as_ref().is_some_and(|timer| !timer.task.is_finished()) {
            return true;
        }
        let Ok(runtime) = Handle::try_current() else {
            warn!("Send timer not started: no tokio runtime");
            return false;
        };

        let dispatcher = Arc::downgrade(self);
        let period = self.send_interval;
        let (stop, mut stopped) = watch::channel(false);
        debug!(interval_ms = u64::try_from(period.as_millis()).unwrap_or(u64::MAX), "Send timer started");

        let task = runtime.spawn(async move {
            let mut interval = tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                // Only the wait is cancellable; a dequeued slice is always sent and reported.
                tokio::select! {
                    biased;
                    _ = stopped.changed() => break,
                    _ = interval.tick() => {}
                }
                let Some(dispatcher) = dispatcher.upgrade() else {
                    break;
                };
                let _ = dispatcher.send_batch().await;
            }
        });
        *timer = Some(Timer { stop, task });
        true
    }

    /// Stops the recurring drain. A send already in progress runs to completion.
    pub fn stop_timer(&self) {
        drop(self.take_timer());
    }

    fn take_timer(&self) -> Option<JoinHandle<()>> {
        let timer = self.timer.lock().unwrap_or_else(|e| e.into_inner()).take()?;
        let _ = timer.stop.send(true);
        debug!("Send timer stopped");
        Some(timer.task)
    }

    pub fn is_timer_running(&self) -> bool {
        self.timer
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .as_ref()
            .is_some_and(|timer| !timer.task.is_finished())
    }

    /// Stops the timer, waits for a tick's in-flight send, and if `flush`
    /// is set drains the queue.
    pub async fn stop(&self, flush: bool) -> Result<usize, DispatchError> {
        if let Some(task) = self.take_timer() {
            let _ = task.await;
        }
        if flush {
            self.flush().await
        } else {
            Ok(0)
        }
    }
}
