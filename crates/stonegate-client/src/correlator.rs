use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use stonegate_core::RpcResponse;
use tokio::sync::oneshot;

use crate::error::ClientError;

pub(crate) type Outcome = Result<RpcResponse, ClientError>;

pub(crate) enum Registration {
    Waiting(oneshot::Receiver<Outcome>),
    /// `id` is already in flight.
    Duplicate,
    /// The table was failed; the connection it belongs to is gone.
    Closed,
}

#[derive(Default)]
struct Slots {
    waiting: HashMap<String, oneshot::Sender<Outcome>>,
    closed: bool,
}

/// In-flight calls of one connection, keyed by correlation id. Each entry is
/// a single-use resolution slot; whichever of resolve, forget or fail_all
/// reaches it first removes it.
#[derive(Default)]
pub(crate) struct PendingTable {
    slots: Mutex<Slots>,
}

impl PendingTable {
    fn slots(&self) -> MutexGuard<'_, Slots> {
        self.slots
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub(crate) fn register(&self, id: &str) -> Registration {
        let mut slots = self.slots();
        if slots.closed {
            return Registration::Closed;
        }
        if slots.waiting.contains_key(id) {
            return Registration::Duplicate;
        }
        let (tx, rx) = oneshot::channel();
        slots.waiting.insert(id.to_string(), tx);
        Registration::Waiting(rx)
    }

    /// Hands `response` to the caller waiting on its id. Returns false when
    /// nobody is waiting (unknown, already resolved or timed out).
    pub(crate) fn resolve(&self, response: RpcResponse) -> bool {
        let Some(slot) = self.slots().waiting.remove(&response.id) else {
            return false;
        };
        slot.send(Ok(response)).is_ok()
    }

    pub(crate) fn forget(&self, id: &str) -> bool {
        self.slots().waiting.remove(id).is_some()
    }

    /// Fails every waiter and refuses registrations from then on.
    pub(crate) fn fail_all(&self, error: impl Fn() -> ClientError) -> usize {
        let drained: Vec<_> = {
            let mut slots = self.slots();
            slots.closed = true;
            slots.waiting.drain().collect()
        };
        let count = drained.len();
        for (_, slot) in drained {
            let _ = slot.send(Err(error()));
        }
        count
    }

    pub(crate) fn is_closed(&self) -> bool {
        self.slots().closed
    }

    pub(crate) fn len(&self) -> usize {
        self.slots().waiting.len()
    }
}

#[cfg(test)]
pub(crate) fn waiting(table: &PendingTable, id: &str) -> oneshot::Receiver<Outcome> {
    match table.register(id) {
        Registration::Waiting(rx) => rx,
        Registration::Duplicate => panic!("{id} already in flight"),
        Registration::Closed => panic!("table closed"),
    }
}
