//! Single owner of the renderer scenes and their links
//!
//! Created once by whoever drives the update loop and passed by reference
//! to the stages that need it. Every scene mutation that matters to links
//! goes through here so link teardown always happens before storage is
//! dropped.

use glam::Mat4;
use tracing::info;

use crate::error::LinkError;
use crate::events::{RendererEvent, RendererEventCollector};
use crate::scene::{RendererScene, RendererScenes};
use crate::scene_links_manager::{LinkInfo, SceneLinksManager};
use crate::texture::TextureProvider;
use crate::types::{
    DataInstanceHandle, DataSlotType, DataValue, MatrixKind, NodeHandle, OffscreenBufferId,
    SamplerContent, SamplerHandle, SceneId, SlotRef, StreamBufferId, TextureHash,
};

#[derive(Debug)]
pub struct LinkRegistry {
    scenes: RendererScenes,
    links: SceneLinksManager,
    events: RendererEventCollector,
}

impl LinkRegistry {
    pub fn new() -> Self {
        let events = RendererEventCollector::new();
        Self {
            scenes: RendererScenes::new(),
            links: SceneLinksManager::new(events.clone()),
            events,
        }
    }

    #[inline]
    pub fn scenes(&self) -> &RendererScenes {
        &self.scenes
    }

    #[inline]
    pub fn links(&self) -> &SceneLinksManager {
        &self.links
    }

    /// Event sink shared with the link layer
    #[inline]
    pub fn events(&self) -> &RendererEventCollector {
        &self.events
    }

    pub fn consume_events(&self) -> Vec<RendererEvent> {
        self.events.consume_events()
    }

    // ═══════════════════════════════════════════
    // SCENE LIFECYCLE
    // ═══════════════════════════════════════════

    /// Create a scene, or reset one with the same id after unlinking it
    ///
    /// The returned scene is for declaring nodes, data, samplers and slots
    /// before anything links to them. Later changes go through the registry
    /// (`set_local_transform`, `set_data_value`, `release_data_slot`, ...)
    /// so links are torn down and dirtiness reaches consumers.
    pub fn create_scene(&mut self, id: SceneId) -> &mut RendererScene {
        if self.scenes.contains(id) {
            self.links.handle_scene_removed(&mut self.scenes, id);
        }
        self.scenes.create_scene(id)
    }

    /// Tear down the scene's links, then drop its storage
    pub fn destroy_scene(&mut self, id: SceneId) -> Result<(), LinkError> {
        if !self.scenes.contains(id) {
            return Err(LinkError::UnknownScene { scene: id });
        }
        self.links.handle_scene_removed(&mut self.scenes, id);
        self.scenes.destroy_scene(id);
        info!(scene = %id, "scene destroyed");
        Ok(())
    }

    /// Tear down the scene's links but keep its content
    pub fn unmap_scene(&mut self, id: SceneId) -> Result<(), LinkError> {
        if !self.scenes.contains(id) {
            return Err(LinkError::UnknownScene { scene: id });
        }
        self.links.handle_scene_unmapped(&mut self.scenes, id);
        Ok(())
    }

    // ═══════════════════════════════════════════
    // LINKS
    // ═══════════════════════════════════════════

    pub fn create_data_link(
        &mut self,
        provider: SlotRef,
        consumer: SlotRef,
    ) -> Result<(), LinkError> {
        self.links.create_data_link(&mut self.scenes, provider, consumer)
    }

    pub fn create_buffer_link(
        &mut self,
        buffer: OffscreenBufferId,
        consumer: SlotRef,
    ) -> Result<(), LinkError> {
        self.links.create_buffer_link(&mut self.scenes, buffer, consumer)
    }

    pub fn create_stream_link(
        &mut self,
        stream: StreamBufferId,
        consumer: SlotRef,
    ) -> Result<(), LinkError> {
        self.links.create_stream_link(&mut self.scenes, stream, consumer)
    }

    /// Unlink a consumer; returns the provider it was bound to
    pub fn remove_data_link(&mut self, consumer: SlotRef) -> Result<TextureProvider, LinkError> {
        self.links.remove_data_link(&mut self.scenes, consumer)
    }

    pub fn rebind_texture_consumer(
        &mut self,
        provider: TextureProvider,
        consumer: SlotRef,
    ) -> Result<(), LinkError> {
        self.links
            .rebind_texture_consumer(&mut self.scenes, provider, consumer)
    }

    /// Release a slot, tearing down its links first
    pub fn release_data_slot(&mut self, slot: SlotRef) -> Result<DataSlotType, LinkError> {
        let slot_type = self.scenes.data_slot(slot)?;
        self.links.release_data_slot(&mut self.scenes, slot);
        Ok(slot_type)
    }

    pub fn destroy_offscreen_buffer(&mut self, buffer: OffscreenBufferId) -> usize {
        self.links.remove_buffer_links(&mut self.scenes, buffer)
    }

    pub fn destroy_stream(&mut self, stream: StreamBufferId) -> usize {
        self.links.remove_stream_links(&mut self.scenes, stream)
    }

    pub fn linked_provider(&self, consumer: SlotRef) -> Option<TextureProvider> {
        self.links.get_linked_provider(consumer)
    }

    pub fn scene_links(&self, scene: SceneId) -> Vec<LinkInfo> {
        self.links.get_scene_links(scene)
    }

    pub fn all_links(&self) -> Vec<LinkInfo> {
        self.links.links()
    }

    // ═══════════════════════════════════════════
    // CONTENT
    // ═══════════════════════════════════════════

    pub fn set_local_transform(
        &mut self,
        scene: SceneId,
        node: NodeHandle,
        local: Mat4,
    ) -> Result<(), LinkError> {
        self.links
            .set_local_transform(&mut self.scenes, scene, node, local)
    }

    /// Client write; lands in the fallback while the instance is linked
    pub fn set_data_value(
        &mut self,
        scene: SceneId,
        data: DataInstanceHandle,
        value: DataValue,
    ) -> Result<(), LinkError> {
        let renderer_scene = self
            .scenes
            .get_mut(scene)
            .ok_or(LinkError::UnknownScene { scene })?;
        if !renderer_scene.set_data_value(data, value) {
            return Err(LinkError::UnknownDataInstance { scene, data });
        }
        Ok(())
    }

    pub fn set_texture(
        &mut self,
        provider: SlotRef,
        texture: TextureHash,
    ) -> Result<(), LinkError> {
        self.links.set_texture(&mut self.scenes, provider, texture)
    }

    /// Per-frame pass
    pub fn update(&mut self) {
        self.links.update(&mut self.scenes);
    }

    // ═══════════════════════════════════════════
    // RESOLVED VALUES
    // ═══════════════════════════════════════════

    /// World matrix as of the last update
    pub fn world_matrix(&self, scene: SceneId, node: NodeHandle) -> Option<Mat4> {
        self.scenes.get(scene)?.world_matrix(node)
    }

    /// Matrix of the provider node feeding a linked consumer node
    pub fn linked_transformation(
        &self,
        kind: MatrixKind,
        scene: SceneId,
        node: NodeHandle,
    ) -> Option<Mat4> {
        self.links
            .transformation_link_manager()
            .get_linked_transformation_from_data_provider(kind, &self.scenes, scene, node)
    }

    pub fn data_value(&self, scene: SceneId, data: DataInstanceHandle) -> Option<DataValue> {
        self.scenes.get(scene)?.data_value(data)
    }

    pub fn sampler_content(
        &self,
        scene: SceneId,
        sampler: SamplerHandle,
    ) -> Option<SamplerContent> {
        self.scenes.get(scene)?.sampler_content(sampler)
    }
}

impl Default for LinkRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SlotHandle;

    #[test]
    fn destroying_scene_tears_down_links_first() {
        let mut registry = LinkRegistry::new();
        let provider = registry.create_scene(SceneId(3));
        provider.add_data_instance(DataInstanceHandle(0), DataValue::Int32(7));
        provider.add_data_slot(SlotHandle(51), DataSlotType::DataProvider(DataInstanceHandle(0)));
        let consumer = registry.create_scene(SceneId(4));
        consumer.add_data_instance(DataInstanceHandle(0), DataValue::Int32(1));
        consumer.add_data_slot(SlotHandle(54), DataSlotType::DataConsumer(DataInstanceHandle(0)));

        let consumer_slot = SlotRef::new(SceneId(4), SlotHandle(54));
        registry
            .create_data_link(SlotRef::new(SceneId(3), SlotHandle(51)), consumer_slot)
            .unwrap();
        assert_eq!(
            registry.data_value(SceneId(4), DataInstanceHandle(0)),
            Some(DataValue::Int32(7))
        );

        registry.destroy_scene(SceneId(3)).unwrap();

        assert!(registry.linked_provider(consumer_slot).is_none());
        assert!(registry.links().dependency_checker().is_empty());
        assert_eq!(
            registry.data_value(SceneId(4), DataInstanceHandle(0)),
            Some(DataValue::Int32(1))
        );
        assert_eq!(
            registry.destroy_scene(SceneId(3)),
            Err(LinkError::UnknownScene { scene: SceneId(3) })
        );
    }

    #[test]
    fn events_flow_through_shared_collector() {
        let mut registry = LinkRegistry::new();
        registry.create_scene(SceneId(4));

        let err = registry
            .remove_data_link(SlotRef::new(SceneId(4), SlotHandle(54)))
            .unwrap_err();

        assert_eq!(err, LinkError::InvalidSlot { scene: SceneId(4), slot: SlotHandle(54) });
        let events = registry.consume_events();
        assert_eq!(events.len(), 1);
        assert!(events[0].kind.is_failure());
    }
}
