//! Bidirectional index of active links
//!
//! Pure bookkeeping: the table never checks linking invariants, the
//! managers do that before touching it. The same structure serves scene
//! slot links and the virtual-provider links of the texture manager.

use std::fmt;
use std::hash::Hash;

use rustc_hash::FxHashMap;
use serde::Serialize;

use crate::types::{OffscreenBufferId, SceneId, SlotRef, StreamBufferId};

/// Anything a consumer slot can be linked to
pub trait LinkProvider: Copy + Eq + Hash + Ord + fmt::Debug {
    /// Scene owning the provider, if it lives in a scene at all
    fn provider_scene(&self) -> Option<SceneId>;
}

impl LinkProvider for SlotRef {
    #[inline]
    fn provider_scene(&self) -> Option<SceneId> {
        Some(self.scene)
    }
}

impl LinkProvider for OffscreenBufferId {
    #[inline]
    fn provider_scene(&self) -> Option<SceneId> {
        None
    }
}

impl LinkProvider for StreamBufferId {
    #[inline]
    fn provider_scene(&self) -> Option<SceneId> {
        None
    }
}

/// One active link: provider -> consumer slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct Link<P> {
    pub provider: P,
    pub consumer: SlotRef,
}

/// Scene slot to scene slot
pub type SceneLink = Link<SlotRef>;
/// Offscreen buffer to texture consumer
pub type BufferLink = Link<OffscreenBufferId>;
/// Compositor stream to texture consumer
pub type StreamLink = Link<StreamBufferId>;

impl SceneLink {
    #[inline]
    pub fn provider_scene(&self) -> SceneId {
        self.provider.scene
    }

    #[inline]
    pub fn consumer_scene(&self) -> SceneId {
        self.consumer.scene
    }
}

/// Consumer -> provider and provider -> consumers, kept in lockstep
#[derive(Debug, Clone)]
pub struct LinkTable<P: LinkProvider> {
    by_consumer: FxHashMap<SlotRef, P>,
    /// Consumers in link order
    by_provider: FxHashMap<P, Vec<SlotRef>>,
}

impl<P: LinkProvider> Default for LinkTable<P> {
    fn default() -> Self {
        Self {
            by_consumer: FxHashMap::default(),
            by_provider: FxHashMap::default(),
        }
    }
}

impl<P: LinkProvider> LinkTable<P> {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.by_consumer.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.by_consumer.is_empty()
    }

    /// Record a link; the consumer must not be linked already
    pub fn add_link(&mut self, provider: P, consumer: SlotRef) {
        debug_assert!(
            !self.by_consumer.contains_key(&consumer),
            "consumer {consumer} linked twice"
        );
        self.by_consumer.insert(consumer, provider);
        self.by_provider.entry(provider).or_default().push(consumer);
    }

    /// Forget the consumer's link, returning it if there was one
    pub fn remove_link(&mut self, consumer: SlotRef) -> Option<Link<P>> {
        let provider = self.by_consumer.remove(&consumer)?;

        if let Some(consumers) = self.by_provider.get_mut(&provider) {
            consumers.retain(|c| *c != consumer);
            if consumers.is_empty() {
                self.by_provider.remove(&provider);
            }
        }

        Some(Link { provider, consumer })
    }

    pub fn linked_provider(&self, consumer: SlotRef) -> Option<Link<P>> {
        self.by_consumer
            .get(&consumer)
            .map(|provider| Link { provider: *provider, consumer })
    }

    #[inline]
    pub fn has_linked_provider(&self, consumer: SlotRef) -> bool {
        self.by_consumer.contains_key(&consumer)
    }

    pub fn linked_consumers(&self, provider: P) -> Vec<Link<P>> {
        self.by_provider
            .get(&provider)
            .map(|consumers| {
                consumers
                    .iter()
                    .map(|consumer| Link { provider, consumer: *consumer })
                    .collect()
            })
            .unwrap_or_default()
    }

    #[inline]
    pub fn has_linked_consumers(&self, provider: P) -> bool {
        self.by_provider.contains_key(&provider)
    }

    /// Links whose provider lives in `provider_scene`, sorted
    pub fn linked_consumers_of_scene(&self, provider_scene: SceneId) -> Vec<Link<P>> {
        let mut links: Vec<Link<P>> = self
            .iter()
            .filter(|link| link.provider.provider_scene() == Some(provider_scene))
            .collect();
        links.sort();
        links
    }

    /// Links whose consumer lives in `consumer_scene`, sorted
    pub fn linked_providers_of_scene(&self, consumer_scene: SceneId) -> Vec<Link<P>> {
        let mut links: Vec<Link<P>> = self
            .iter()
            .filter(|link| link.consumer.scene == consumer_scene)
            .collect();
        links.sort();
        links
    }

    /// True if anything in `consumer_scene` consumes through this table
    pub fn has_any_links_to_provider(&self, consumer_scene: SceneId) -> bool {
        self.by_consumer.keys().any(|c| c.scene == consumer_scene)
    }

    /// True if anything in `provider_scene` is consumed through this table
    pub fn has_any_links_to_consumer(&self, provider_scene: SceneId) -> bool {
        self.by_provider
            .keys()
            .any(|p| p.provider_scene() == Some(provider_scene))
    }

    pub fn iter(&self) -> impl Iterator<Item = Link<P>> + '_ {
        self.by_consumer
            .iter()
            .map(|(consumer, provider)| Link { provider: *provider, consumer: *consumer })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SlotHandle;

    fn slot(scene: u32, slot: u32) -> SlotRef {
        SlotRef::new(SceneId(scene), SlotHandle(slot))
    }

    #[test]
    fn resolves_both_directions() {
        let mut table: LinkTable<SlotRef> = LinkTable::new();
        table.add_link(slot(3, 51), slot(4, 54));

        let link = table.linked_provider(slot(4, 54)).unwrap();
        assert_eq!(link.provider, slot(3, 51));
        assert_eq!(link.provider_scene(), SceneId(3));
        assert_eq!(table.linked_consumers(slot(3, 51)), vec![link]);
        assert!(table.has_linked_consumers(slot(3, 51)));
        assert!(!table.has_linked_provider(slot(3, 51)));
    }

    #[test]
    fn fans_out_to_many_consumers() {
        let mut table: LinkTable<SlotRef> = LinkTable::new();
        table.add_link(slot(3, 51), slot(4, 54));
        table.add_link(slot(3, 51), slot(4, 55));
        table.add_link(slot(3, 51), slot(5, 1));

        assert_eq!(table.linked_consumers(slot(3, 51)).len(), 3);
        assert_eq!(table.len(), 3);

        table.remove_link(slot(4, 55));
        let consumers: Vec<SlotRef> = table
            .linked_consumers(slot(3, 51))
            .into_iter()
            .map(|l| l.consumer)
            .collect();
        assert_eq!(consumers, vec![slot(4, 54), slot(5, 1)]);
    }

    #[test]
    fn remove_last_consumer_forgets_provider() {
        let mut table: LinkTable<SlotRef> = LinkTable::new();
        table.add_link(slot(3, 51), slot(4, 54));

        let removed = table.remove_link(slot(4, 54)).unwrap();
        assert_eq!(removed.provider, slot(3, 51));
        assert!(!table.has_linked_consumers(slot(3, 51)));
        assert!(table.is_empty());
        assert!(table.remove_link(slot(4, 54)).is_none());
    }

    #[test]
    fn scene_level_queries() {
        let mut table: LinkTable<SlotRef> = LinkTable::new();
        table.add_link(slot(1, 1), slot(2, 1));
        table.add_link(slot(2, 2), slot(3, 1));

        assert_eq!(table.linked_consumers_of_scene(SceneId(2)).len(), 1);
        assert_eq!(table.linked_providers_of_scene(SceneId(2)).len(), 1);
        assert!(table.has_any_links_to_provider(SceneId(2)));
        assert!(table.has_any_links_to_consumer(SceneId(2)));
        assert!(!table.has_any_links_to_provider(SceneId(1)));
        assert!(!table.has_any_links_to_consumer(SceneId(3)));
    }

    #[test]
    fn buffer_links_have_no_provider_scene() {
        let mut table: LinkTable<OffscreenBufferId> = LinkTable::new();
        table.add_link(OffscreenBufferId(7), slot(4, 54));

        assert_eq!(
            table.linked_provider(slot(4, 54)).map(|l| l.provider),
            Some(OffscreenBufferId(7))
        );
        assert!(table.linked_consumers_of_scene(SceneId(4)).is_empty());
        assert_eq!(table.linked_providers_of_scene(SceneId(4)).len(), 1);
    }
}
