//! Linking invariants shared by all payload kinds
//!
//! - A consumer slot has at most one provider.
//! - Every scene link is mirrored by one dependency edge, and no edge may
//!   close a cycle between scenes.
//! - Rejected requests change nothing.
//!
//! The payload managers wrap a [`LinkManager`], run their own checks
//! between [`LinkManager::validate`] and [`LinkManager::commit`], and react
//! to the links it hands back on removal.

use tracing::debug;

use crate::dependency::SceneDependencyChecker;
use crate::error::LinkError;
use crate::links::{LinkTable, SceneLink};
use crate::types::{SceneId, SlotRef};

#[derive(Debug, Default, Clone)]
pub struct LinkManager {
    links: LinkTable<SlotRef>,
    dependencies: SceneDependencyChecker,
}

impl LinkManager {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn scene_links(&self) -> &LinkTable<SlotRef> {
        &self.links
    }

    #[inline]
    pub fn dependency_checker(&self) -> &SceneDependencyChecker {
        &self.dependencies
    }

    /// Check uniqueness and acyclicity without touching any state
    pub fn validate(&self, provider: SlotRef, consumer: SlotRef) -> Result<(), LinkError> {
        if self.links.has_linked_provider(consumer) {
            return Err(LinkError::ConsumerAlreadyLinked { consumer });
        }

        if self
            .dependencies
            .would_create_cycle(consumer.scene, provider.scene)
        {
            return Err(LinkError::WouldCreateCycle {
                provider_scene: provider.scene,
                consumer_scene: consumer.scene,
            });
        }

        Ok(())
    }

    /// Record a link that already passed [`validate`](Self::validate)
    pub fn commit(&mut self, provider: SlotRef, consumer: SlotRef) -> SceneLink {
        let added = self.dependencies.add_dependency(provider.scene, consumer.scene);
        debug_assert!(added, "link {provider} -> {consumer} was not validated");
        self.links.add_link(provider, consumer);

        debug!(%provider, %consumer, "scene data linked");
        SceneLink { provider, consumer }
    }

    pub fn create_data_link(
        &mut self,
        provider: SlotRef,
        consumer: SlotRef,
    ) -> Result<SceneLink, LinkError> {
        self.validate(provider, consumer)?;
        Ok(self.commit(provider, consumer))
    }

    /// Remove the consumer's link; the returned link names the old provider
    pub fn remove_data_link(&mut self, consumer: SlotRef) -> Result<SceneLink, LinkError> {
        let link = self
            .links
            .remove_link(consumer)
            .ok_or(LinkError::NotLinked { consumer })?;
        self.dependencies
            .remove_dependency(link.provider_scene(), link.consumer_scene());

        debug!(provider = %link.provider, %consumer, "scene data unlinked");
        Ok(link)
    }

    /// Remove every link the scene takes part in, on either side
    ///
    /// Never fails; a scene without links yields an empty list.
    pub fn remove_scene_links(&mut self, scene: SceneId) -> Vec<SceneLink> {
        let mut doomed = self.links.linked_providers_of_scene(scene);
        doomed.extend(
            self.links
                .linked_consumers_of_scene(scene)
                .into_iter()
                .filter(|link| link.consumer_scene() != scene),
        );

        let removed: Vec<SceneLink> = doomed
            .into_iter()
            .filter_map(|link| self.remove_data_link(link.consumer).ok())
            .collect();

        if !removed.is_empty() {
            debug!(%scene, count = removed.len(), "removed scene links");
        }
        debug_assert!(!self.dependencies.has_dependency(scene));
        removed
    }

    /// Remove every link fed by one provider slot
    pub fn remove_provider_links(&mut self, provider: SlotRef) -> Vec<SceneLink> {
        self.links
            .linked_consumers(provider)
            .into_iter()
            .filter_map(|link| self.remove_data_link(link.consumer).ok())
            .collect()
    }
}
