use crate::assets::events::Subscription;
use crate::assets::record::TextureRecord;
use crate::assets::registry::TextureRegistry;
use log::trace;
use std::sync::{Arc, Weak};

/// A long-lived view of whatever record an alias currently names.
///
/// The handle never caches a record across an alias change: it watches the
/// alias on the registry's invalidation channel and looks the alias up again
/// on the next [`refresh`](Self::refresh) after any event. While it holds the
/// empty record it also re-resolves on every refresh, so a texture that was
/// still loading when the alias changed shows up once it is ready.
///
/// Both the registry and the current record are held weakly. Once the
/// registry lets go of a record the handle reads as empty.
pub struct TextureHandle {
    alias: String,
    registry: Weak<TextureRegistry>,
    current: Weak<TextureRecord>,
    events: Subscription,
}

impl TextureHandle {
    pub fn new(registry: &Arc<TextureRegistry>, alias: impl Into<String>) -> Self {
        let alias = alias.into();
        // Subscribe before the first lookup so no change slips in between.
        let events = registry.subscribe_alias(&alias);
        let current = Arc::downgrade(&registry.resolve_by_alias(&alias));
        Self {
            alias,
            registry: Arc::downgrade(registry),
            current,
            events,
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// The record the alias named at the last refresh, or the empty record if
    /// it has since been released.
    pub fn get(&self) -> Arc<TextureRecord> {
        self.current
            .upgrade()
            .unwrap_or_else(TextureRecord::sentinel)
    }

    /// Applies pending invalidations. Returns true if the handle now points at
    /// a different record.
    pub fn refresh(&mut self) -> bool {
        let events = self.events.poll();
        if events.is_empty() && !self.get().is_empty() {
            return false;
        }
        if let Some(last) = events.last() {
            trace!(
                "Handle '{}' re-resolving after {} event(s), last {last:?}.",
                self.alias,
                events.len()
            );
        }
        let next = match self.registry.upgrade() {
            Some(registry) => registry.resolve_by_alias(&self.alias),
            None => TextureRecord::sentinel(),
        };
        let next = Arc::downgrade(&next);
        let changed = !Weak::ptr_eq(&next, &self.current);
        self.current = next;
        changed
    }
}

impl std::fmt::Debug for TextureHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TextureHandle")
            .field("alias", &self.alias)
            .field("current", &self.get())
            .finish()
    }
}
