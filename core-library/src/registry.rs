//! Registry of configured backend instances.

use parking_lot::RwLock;
use std::sync::Arc;
use tracing::debug;

use crate::identity::{EntityId, SourceKind, SourceRef};

/// Insertion-ordered set of [`SourceRef`]s keyed by instance id.
///
/// Constructed once at startup and shared by `Arc`; there is no process-wide
/// instance.
#[derive(Debug, Default)]
pub struct SourceRegistry {
    sources: RwLock<Vec<Arc<SourceRef>>>,
}

impl SourceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `source`, replacing an entry with the same kind and instance
    /// id in place. Returns the shared descriptor.
    pub fn register(&self, source: SourceRef) -> Arc<SourceRef> {
        let source = Arc::new(source);
        let mut sources = self.sources.write();
        match sources
            .iter_mut()
            .find(|s| s.kind == source.kind && s.instance_id == source.instance_id)
        {
            Some(existing) => *existing = Arc::clone(&source),
            None => sources.push(Arc::clone(&source)),
        }
        debug!(
            kind = %source.kind,
            instance = %source.instance_id,
            "Registered source instance"
        );
        source
    }

    pub fn get(&self, kind: SourceKind, instance_id: &str) -> Option<Arc<SourceRef>> {
        self.sources
            .read()
            .iter()
            .find(|s| s.kind == kind && s.instance_id == instance_id)
            .cloned()
    }

    pub fn all(&self) -> Vec<Arc<SourceRef>> {
        self.sources.read().clone()
    }

    pub fn of_kind(&self, kind: SourceKind) -> Vec<Arc<SourceRef>> {
        self.sources
            .read()
            .iter()
            .filter(|s| s.kind == kind)
            .cloned()
            .collect()
    }

    /// Descriptor for the instance `id` belongs to, synthesized when the
    /// instance was never registered.
    pub fn resolve(&self, id: &EntityId) -> SourceRef {
        self.get(id.kind(), id.instance_id())
            .map(|source| (*source).clone())
            .unwrap_or_else(|| SourceRef::synthesized_for(id))
    }

    pub fn remove(&self, kind: SourceKind, instance_id: &str) -> bool {
        let mut sources = self.sources.write();
        let before = sources.len();
        sources.retain(|s| !(s.kind == kind && s.instance_id == instance_id));
        before != sources.len()
    }

    pub fn len(&self) -> usize {
        self.sources.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.read().is_empty()
    }
}
