//! Success and error observers fanned out per event key after each dispatch.

use std::sync::{Arc, RwLock};

use crate::error::DispatchError;
use crate::message::WireMessage;

/// Called with an event key and that key's messages from a delivered slice.
pub type SuccessCallback = Arc<dyn Fn(&str, &[WireMessage]) + Send + Sync>;

/// Called with an event key, that key's messages and the dispatch failure.
pub type ErrorCallback = Arc<dyn Fn(&str, &[WireMessage], &DispatchError) + Send + Sync>;

/// Ordered observer lists. Registration order is invocation order.
#[derive(Default)]
pub struct CallbackRegistry {
    success: RwLock<Vec<SuccessCallback>>,
    error: RwLock<Vec<ErrorCallback>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_success<F>(&self, callback: F)
    where
        F: Fn(&str, &[WireMessage]) + Send + Sync + 'static,
    {
        self.success
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(callback));
    }

    pub fn on_error<F>(&self, callback: F)
    where
        F: Fn(&str, &[WireMessage], &DispatchError) + Send + Sync + 'static,
    {
        self.error
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push(Arc::new(callback));
    }

    /// Invokes every success observer once per distinct key in `slice`.
    pub fn notify_success(&self, slice: &[WireMessage]) {
        let observers = self.success.read().unwrap_or_else(|e| e.into_inner()).clone();
        if observers.is_empty() {
            return;
        }
        for (key, messages) in group_by_key(slice) {
            for observer in &observers {
                observer(key, &messages);
            }
        }
    }

    /// Invokes every error observer once per distinct key in `slice`.
    pub fn notify_error(&self, slice: &[WireMessage], error: &DispatchError) {
        let observers = self.error.read().unwrap_or_else(|e| e.into_inner()).clone();
        if observers.is_empty() {
            return;
        }
        for (key, messages) in group_by_key(slice) {
            for observer in &observers {
                observer(key, &messages, error);
            }
        }
    }
}

/// Groups messages by event key, keys in first-seen order, messages in slice order.
pub fn group_by_key(slice: &[WireMessage]) -> Vec<(&str, Vec<WireMessage>)> {
    let mut groups: Vec<(&str, Vec<WireMessage>)> = Vec::new();
    for message in slice {
        match groups.iter_mut().find(|(key, _)| *key == message.event_key()) {
            Some((_, messages)) => messages.push(message.clone()),
            None => groups.push((message.event_key(), vec![message.clone()])),
        }
    }
    groups
}
