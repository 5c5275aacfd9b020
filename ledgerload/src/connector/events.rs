use arc_swap::ArcSwap;
use ledgerload_core::{TxStatistics, TxStatus};
use std::sync::Arc;

/// Telemetry emitted by the dispatch layer.
#[derive(Clone, Copy, Debug)]
pub enum TxEvent<'a> {
    /// A request is about to be handed to the connector. Always carries `1`.
    Submitted(u64),
    /// Outcome of a `send_requests` call.
    Finished(Finished<'a>),
}

/// Payload of [`TxEvent::Finished`]: one record for a single request, every record in
/// submission order for a batch.
#[derive(Clone, Copy, Debug)]
pub enum Finished<'a> {
    Single(&'a TxStatus),
    Batch(&'a [TxStatus]),
}

impl<'a> Finished<'a> {
    pub fn records(&self) -> &'a [TxStatus] {
        match *self {
            Finished::Single(record) => std::slice::from_ref(record),
            Finished::Batch(records) => records,
        }
    }
}

pub trait TxEventListener: Send + Sync {
    fn on_event(&self, event: &TxEvent<'_>);
}

impl TxEventListener for TxStatistics {
    fn on_event(&self, event: &TxEvent<'_>) {
        match event {
            TxEvent::Submitted(count) => self.tx_submitted(*count),
            TxEvent::Finished(finished) => self.tx_finished(finished.records()),
        }
    }
}

/// Listener registry. Listeners are invoked synchronously, in registration order.
#[derive(Clone)]
pub struct Telemetry {
    listeners: Arc<ArcSwap<Vec<Arc<dyn TxEventListener>>>>,
}

impl Default for Telemetry {
    fn default() -> Self {
        Self::new()
    }
}

impl Telemetry {
    pub fn new() -> Self {
        Self {
            listeners: Arc::new(ArcSwap::from_pointee(vec![])),
        }
    }

    pub fn subscribe(&self, listener: Arc<dyn TxEventListener>) {
        self.listeners.rcu(|current| {
            let mut next = Vec::clone(current);
            next.push(listener.clone());
            next
        });
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.load().len()
    }

    pub(crate) fn emit(&self, event: TxEvent<'_>) {
        for listener in self.listeners.load().iter() {
            listener.on_event(&event);
        }
    }
}

impl std::fmt::Debug for Telemetry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Telemetry")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
