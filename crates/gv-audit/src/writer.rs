// writer.rs — The synchronous audit log writer.
//
// `AuditWriter` validates events, links them into their per-object chain and
// appends them to the store. Chain extension for one object is serialized by
// a per-object mutex (the "sequence point"); writes about different objects
// only share the brief lookup of that mutex.
//
// This is the blocking path. Lifecycle transitions use it directly because
// they must not take effect before their audit record is durable. Everything
// else goes through `AuditDispatcher`, which calls `commit` from a worker.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use chrono::Utc;
use uuid::Uuid;

use crate::chain::link_hash;
use crate::error::AuditError;
use crate::event::{AuditEvent, AuditEventFields, ChainKey};
use crate::store::AuditStore;

type ChainHead = Arc<Mutex<Option<String>>>;

pub struct AuditWriter {
    store: Arc<dyn AuditStore>,
    heads: Mutex<HashMap<ChainKey, ChainHead>>,
}

impl AuditWriter {
    /// Wrap a store, recovering every chain head from its existing events.
    pub fn new(store: Arc<dyn AuditStore>) -> Result<Self, AuditError> {
        let mut heads: HashMap<ChainKey, ChainHead> = HashMap::new();
        let existing = store.snapshot()?;
        for event in &existing {
            heads.insert(event.chain_key(), Arc::new(Mutex::new(Some(link_hash(event)?))));
        }
        tracing::debug!(
            events = existing.len(),
            chains = heads.len(),
            "audit writer recovered chain heads"
        );
        Ok(Self {
            store,
            heads: Mutex::new(heads),
        })
    }

    /// Validate, stamp and durably append a new event. Returns its id.
    pub fn emit(&self, fields: AuditEventFields) -> Result<Uuid, AuditError> {
        if let Err(err) = fields.validate() {
            tracing::warn!(intent = %fields.intent, error = %err, "rejected audit write");
            return Err(err);
        }
        self.commit(AuditEvent::from_fields(fields, Uuid::now_v7(), Utc::now()))
    }

    /// Append an event that already carries its id and timestamp.
    ///
    /// Any `previous_state_hash` on the input is replaced with the current
    /// head of the event's chain.
    pub fn commit(&self, mut event: AuditEvent) -> Result<Uuid, AuditError> {
        event.validate()?;
        let slot = self.head_for(&event.chain_key())?;
        let mut head = slot
            .lock()
            .map_err(|e| AuditError::LockPoisoned(e.to_string()))?;

        event.previous_state_hash = head.clone();
        let hash = link_hash(&event)?;
        self.store.append(&event)?;
        *head = Some(hash);

        tracing::debug!(
            event_id = %event.event_id,
            intent = %event.intent,
            chain = %event.chain_key(),
            "audit event committed"
        );
        Ok(event.event_id)
    }

    /// Always fails: audit events cannot be edited.
    pub fn update(&self, event: &AuditEvent) -> Result<(), AuditError> {
        self.store.update(event)
    }

    /// Always fails: audit events cannot be removed.
    pub fn delete(&self, event_id: Uuid) -> Result<(), AuditError> {
        self.store.delete(event_id)
    }

    /// Current head hash of a chain, if the chain has any events.
    pub fn head(&self, key: &ChainKey) -> Result<Option<String>, AuditError> {
        let heads = self
            .heads
            .lock()
            .map_err(|e| AuditError::LockPoisoned(e.to_string()))?;
        match heads.get(key) {
            Some(slot) => Ok(slot
                .lock()
                .map_err(|e| AuditError::LockPoisoned(e.to_string()))?
                .clone()),
            None => Ok(None),
        }
    }

    fn head_for(&self, key: &ChainKey) -> Result<ChainHead, AuditError> {
        let mut heads = self
            .heads
            .lock()
            .map_err(|e| AuditError::LockPoisoned(e.to_string()))?;
        Ok(heads.entry(key.clone()).or_default().clone())
    }
}
