//! Per-block execution context
//!
//! The host runtime hands the module a context for every call: the module's
//! store view for the current block, the block header and an event sink.

use crate::error::Result;
use crate::events::{EventManager, RegisterEvent};
use crate::store::{KvStore, StoreTransaction};
use chrono::{DateTime, Utc};

/// Header of the block being processed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHeader {
    /// Block height
    pub height: i64,
    /// Block time
    pub time: DateTime<Utc>,
}

/// Execution context for one block
pub struct Context<'a> {
    store: &'a dyn KvStore,
    header: BlockHeader,
    events: EventManager,
}

impl<'a> Context<'a> {
    /// Create a context over a store view
    pub fn new(store: &'a dyn KvStore, header: BlockHeader) -> Self {
        Self {
            store,
            header,
            events: EventManager::new(),
        }
    }

    /// Module store
    pub fn store(&self) -> &'a dyn KvStore {
        self.store
    }

    /// Block header
    pub fn header(&self) -> BlockHeader {
        self.header
    }

    /// Block time
    pub fn block_time(&self) -> DateTime<Utc> {
        self.header.time
    }

    /// Block height
    pub fn block_height(&self) -> i64 {
        self.header.height
    }

    /// Emit an event
    pub fn emit(&self, event: RegisterEvent) {
        self.events.emit(event);
    }

    /// Event sink
    pub fn events(&self) -> &EventManager {
        &self.events
    }

    /// Run `f` against a buffered view of the store
    ///
    /// Writes and events are kept only when `f` succeeds.
    pub fn atomic<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&Context<'_>) -> Result<T>,
    {
        let tx = StoreTransaction::new(self.store);
        let scoped = Context::new(&tx, self.header);
        let result = f(&scoped);
        let events = scoped.events.drain();
        drop(scoped);

        let value = result?;
        tx.commit()?;
        self.events.append(events);
        Ok(value)
    }
}
