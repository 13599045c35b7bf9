//! In-memory take store with an active-take pointer.

use crate::sink::PoseSink;
use crate::types::{Take, TakeId};
use std::sync::Arc;

/// Ordered collection of recorded takes.
///
/// `active` is always `None` or the id of a take in `takes`.
#[derive(Debug, Default)]
pub struct TakeStore {
    takes: Vec<Arc<Take>>,
    active: Option<TakeId>,
    names_issued: u32,
}

impl TakeStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a take and make it active.
    pub fn add(&mut self, take: Take) -> TakeId {
        let id = take.id;
        tracing::debug!(take = %id, name = %take.name, "take stored");
        self.takes.push(Arc::new(take));
        self.active = Some(id);
        id
    }

    /// Make `id` the active take. Resets the sink on success, since the
    /// pose currently shown belongs to the previous take.
    pub fn set_active(&mut self, id: TakeId, sink: &mut dyn PoseSink) -> bool {
        if !self.contains(id) {
            tracing::warn!(take = %id, "cannot activate unknown take");
            return false;
        }
        self.active = Some(id);
        sink.reset_to_neutral();
        true
    }

    /// Remove a take. Unknown ids are ignored; returns whether a take was removed.
    pub fn delete(&mut self, id: TakeId, sink: &mut dyn PoseSink) -> bool {
        let Some(pos) = self.takes.iter().position(|t| t.id == id) else {
            return false;
        };
        self.takes.remove(pos);
        if self.active == Some(id) {
            self.active = None;
            sink.reset_to_neutral();
        }
        tracing::debug!(take = %id, remaining = self.takes.len(), "take deleted");
        true
    }

    /// Snapshot of all takes in insertion order.
    pub fn list(&self) -> Vec<Arc<Take>> {
        self.takes.clone()
    }

    pub fn get(&self, id: TakeId) -> Option<Arc<Take>> {
        self.takes.iter().find(|t| t.id == id).cloned()
    }

    pub fn contains(&self, id: TakeId) -> bool {
        self.takes.iter().any(|t| t.id == id)
    }

    pub fn active_id(&self) -> Option<TakeId> {
        self.active
    }

    pub fn active(&self) -> Option<Arc<Take>> {
        self.active.and_then(|id| self.get(id))
    }

    pub fn len(&self) -> usize {
        self.takes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.takes.is_empty()
    }

    /// Display name for the next take: "Take 1", "Take 2", ...
    ///
    /// Numbers keep counting across deletions so names stay unique.
    pub fn next_take_name(&mut self) -> String {
        self.names_issued += 1;
        format!("Take {}", self.names_issued)
    }
}
