//! Data reference links: a consumer data instance mirrors a provider's value
//!
//! Values are pulled once per update pass rather than pushed, since they
//! are small and consumers are few. The consumer's own value is saved as
//! fallback while linked and restored verbatim on unlink.

use tracing::debug;

use crate::dependency::SceneDependencyChecker;
use crate::error::LinkError;
use crate::link_manager::LinkManager;
use crate::links::{LinkTable, SceneLink};
use crate::scene::RendererScenes;
use crate::types::{DataInstanceHandle, DataSlotType, PayloadKind, SceneId, SlotRef, SlotRole};

#[derive(Debug, Default, Clone)]
pub struct DataReferenceLinkManager {
    base: LinkManager,
}

impl DataReferenceLinkManager {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn scene_links(&self) -> &LinkTable<SlotRef> {
        self.base.scene_links()
    }

    #[inline]
    pub fn dependency_checker(&self) -> &SceneDependencyChecker {
        self.base.dependency_checker()
    }

    pub fn create_data_link(
        &mut self,
        scenes: &mut RendererScenes,
        provider: SlotRef,
        consumer: SlotRef,
    ) -> Result<SceneLink, LinkError> {
        let provider_data = data_instance(scenes, provider, SlotRole::Provider)?;
        let consumer_data = data_instance(scenes, consumer, SlotRole::Consumer)?;

        self.base.validate(provider, consumer)?;

        let provider_value = scenes
            .get(provider.scene)
            .and_then(|scene| scene.data_value(provider_data))
            .ok_or(LinkError::InvalidSlot { scene: provider.scene, slot: provider.slot })?;
        let consumer_type = scenes
            .get(consumer.scene)
            .and_then(|scene| scene.data_type(consumer_data))
            .ok_or(LinkError::InvalidSlot { scene: consumer.scene, slot: consumer.slot })?;
        if provider_value.data_type() != consumer_type {
            return Err(LinkError::TypeMismatch {
                provider,
                consumer,
                provider_type: provider_value.data_type(),
                consumer_type,
            });
        }

        let link = self.base.commit(provider, consumer);
        if let Some(scene) = scenes.get_mut(consumer.scene) {
            scene.store_data_fallback(consumer_data);
            scene.set_linked_data_value(consumer_data, provider_value);
        }
        Ok(link)
    }

    pub fn remove_data_link(
        &mut self,
        scenes: &mut RendererScenes,
        consumer: SlotRef,
    ) -> Result<SceneLink, LinkError> {
        let link = self.base.remove_data_link(consumer)?;
        restore_fallback(scenes, consumer);
        Ok(link)
    }

    pub fn remove_scene_links(
        &mut self,
        scenes: &mut RendererScenes,
        scene: SceneId,
    ) -> Vec<SceneLink> {
        let removed = self.base.remove_scene_links(scene);
        for link in &removed {
            restore_fallback(scenes, link.consumer);
        }
        removed
    }

    pub fn remove_provider_links(
        &mut self,
        scenes: &mut RendererScenes,
        provider: SlotRef,
    ) -> Vec<SceneLink> {
        let removed = self.base.remove_provider_links(provider);
        for link in &removed {
            restore_fallback(scenes, link.consumer);
        }
        removed
    }

    /// Copy every linked provider value into this scene's consumers
    pub fn resolve_links_for_consumer_scene(
        &self,
        scenes: &mut RendererScenes,
        consumer_scene: SceneId,
    ) {
        for link in self.base.scene_links().linked_providers_of_scene(consumer_scene) {
            let value = data_instance(scenes, link.provider, SlotRole::Provider)
                .ok()
                .and_then(|data| scenes.get(link.provider_scene())?.data_value(data));
            let consumer_data = data_instance(scenes, link.consumer, SlotRole::Consumer).ok();

            if let (Some(value), Some(data), Some(scene)) =
                (value, consumer_data, scenes.get_mut(consumer_scene))
            {
                scene.set_linked_data_value(data, value);
            }
        }
    }
}

fn data_instance(
    scenes: &RendererScenes,
    slot: SlotRef,
    role: SlotRole,
) -> Result<DataInstanceHandle, LinkError> {
    match (scenes.data_slot(slot)?, role) {
        (DataSlotType::DataProvider(data), SlotRole::Provider)
        | (DataSlotType::DataConsumer(data), SlotRole::Consumer) => Ok(data),
        (other, _) => Err(LinkError::wrong_slot(slot, other, role, PayloadKind::DataReference)),
    }
}

fn restore_fallback(scenes: &mut RendererScenes, consumer: SlotRef) {
    let Ok(data) = data_instance(scenes, consumer, SlotRole::Consumer) else {
        return;
    };
    if let Some(scene) = scenes.get_mut(consumer.scene) {
        scene.restore_data_fallback(data);
        debug!(%consumer, "data consumer restored to fallback value");
    }
}
