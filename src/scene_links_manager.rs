//! Entry point for link commands
//!
//! Validates requests against the scene model, routes them to the manager
//! for the consumer slot's payload kind, and reports every outcome as a
//! renderer event. A scene-wide dependency checker spans all payload kinds,
//! so a cycle is rejected even when its edges come from different managers.

use glam::Mat4;
use serde::Serialize;
use tracing::{debug, info, instrument, warn};

use crate::data_reference::DataReferenceLinkManager;
use crate::dependency::SceneDependencyChecker;
use crate::error::LinkError;
use crate::events::{RendererEventCollector, RendererEventKind};
use crate::links::SceneLink;
use crate::scene::RendererScenes;
use crate::texture::{TextureLinkManager, TextureProvider};
use crate::transformation::TransformationLinkManager;
use crate::types::{
    DataSlotType, NodeHandle, OffscreenBufferId, PayloadKind, SceneId, SlotRef, SlotRole,
    StreamBufferId, TextureHash,
};

/// One active link of any payload kind, for introspection
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct LinkInfo {
    pub payload: PayloadKind,
    /// Scene slot for every payload; texture links may also name a buffer
    pub provider: TextureProvider,
    pub consumer: SlotRef,
}

#[derive(Debug, Default)]
pub struct SceneLinksManager {
    transformation: TransformationLinkManager,
    data_reference: DataReferenceLinkManager,
    texture: TextureLinkManager,
    dependencies: SceneDependencyChecker,
    events: RendererEventCollector,
}

impl SceneLinksManager {
    pub fn new(events: RendererEventCollector) -> Self {
        Self {
            events,
            ..Self::default()
        }
    }

    #[inline]
    pub fn transformation_link_manager(&self) -> &TransformationLinkManager {
        &self.transformation
    }

    #[inline]
    pub fn data_reference_link_manager(&self) -> &DataReferenceLinkManager {
        &self.data_reference
    }

    #[inline]
    pub fn texture_link_manager(&self) -> &TextureLinkManager {
        &self.texture
    }

    /// Edges of every scene link, whatever the payload
    #[inline]
    pub fn dependency_checker(&self) -> &SceneDependencyChecker {
        &self.dependencies
    }

    #[inline]
    pub fn events(&self) -> &RendererEventCollector {
        &self.events
    }

    // ═══════════════════════════════════════════
    // LINK / UNLINK
    // ═══════════════════════════════════════════

    #[instrument(skip(self, scenes))]
    pub fn create_data_link(
        &mut self,
        scenes: &mut RendererScenes,
        provider: SlotRef,
        consumer: SlotRef,
    ) -> Result<(), LinkError> {
        match self.try_create_data_link(scenes, provider, consumer) {
            Ok(link) => {
                self.dependencies
                    .add_dependency(link.provider_scene(), link.consumer_scene());
                self.events
                    .emit(RendererEventKind::SceneDataLinked { provider, consumer });
                info!(%provider, %consumer, "scene data linked");
                Ok(())
            }
            Err(e) => {
                warn!(%provider, %consumer, error = %e, "failed to link scene data");
                self.events
                    .emit(RendererEventKind::link_failed(provider, consumer, &e));
                Err(e)
            }
        }
    }

    fn try_create_data_link(
        &mut self,
        scenes: &mut RendererScenes,
        provider: SlotRef,
        consumer: SlotRef,
    ) -> Result<SceneLink, LinkError> {
        let provider_type = checked_slot(scenes, provider, SlotRole::Provider)?;
        let consumer_type = checked_slot(scenes, consumer, SlotRole::Consumer)?;
        if provider_type.payload() != consumer_type.payload() {
            return Err(LinkError::PayloadMismatch {
                slot: provider,
                expected: consumer_type.payload(),
                actual: provider_type.payload(),
            });
        }
        match self.get_linked_provider(consumer) {
            Some(TextureProvider::SceneSlot(_)) => {
                return Err(LinkError::ConsumerAlreadyLinked { consumer })
            }
            Some(_) => return Err(LinkError::AlreadyHasVirtualLink { consumer }),
            None => {}
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

        match consumer_type.payload() {
            PayloadKind::Transformation => {
                self.transformation.create_data_link(scenes, provider, consumer)
            }
            PayloadKind::DataReference => {
                self.data_reference.create_data_link(scenes, provider, consumer)
            }
            PayloadKind::Texture => self.texture.create_data_link(scenes, provider, consumer),
        }
    }

    #[instrument(skip(self, scenes))]
    pub fn create_buffer_link(
        &mut self,
        scenes: &mut RendererScenes,
        buffer: OffscreenBufferId,
        consumer: SlotRef,
    ) -> Result<(), LinkError> {
        let result = self
            .texture
            .create_buffer_link(scenes, buffer, consumer)
            .map(|_| ());
        self.report_buffer_link(TextureProvider::OffscreenBuffer(buffer), consumer, result)
    }

    #[instrument(skip(self, scenes))]
    pub fn create_stream_link(
        &mut self,
        scenes: &mut RendererScenes,
        stream: StreamBufferId,
        consumer: SlotRef,
    ) -> Result<(), LinkError> {
        let result = self
            .texture
            .create_stream_link(scenes, stream, consumer)
            .map(|_| ());
        self.report_buffer_link(TextureProvider::StreamBuffer(stream), consumer, result)
    }

    fn report_buffer_link(
        &self,
        provider: TextureProvider,
        consumer: SlotRef,
        result: Result<(), LinkError>,
    ) -> Result<(), LinkError> {
        match &result {
            Ok(()) => {
                self.events
                    .emit(RendererEventKind::SceneDataBufferLinked { provider, consumer });
                info!(%provider, %consumer, "buffer linked");
            }
            Err(e) => {
                warn!(%provider, %consumer, error = %e, "failed to link buffer");
                self.events
                    .emit(RendererEventKind::buffer_link_failed(provider, consumer, e));
            }
        }
        result
    }

    /// Unlink a consumer slot, returning the provider it was bound to
    #[instrument(skip(self, scenes))]
    pub fn remove_data_link(
        &mut self,
        scenes: &mut RendererScenes,
        consumer: SlotRef,
    ) -> Result<TextureProvider, LinkError> {
        let result = checked_slot(scenes, consumer, SlotRole::Consumer)
            .and_then(|slot_type| self.unlink_consumer(scenes, consumer, slot_type.payload()));

        match result {
            Ok(provider) => {
                self.events
                    .emit(RendererEventKind::SceneDataUnlinked { consumer });
                info!(%provider, %consumer, "scene data unlinked");
                Ok(provider)
            }
            Err(e) => {
                warn!(%consumer, error = %e, "failed to unlink scene data");
                self.events
                    .emit(RendererEventKind::unlink_failed(consumer, &e));
                Err(e)
            }
        }
    }

    /// Switch a texture consumer to a new provider of any kind
    ///
    /// The old link is removed first. If the new one is rejected the old
    /// one is put back, so a failed rebind leaves the consumer untouched.
    #[instrument(skip(self, scenes))]
    pub fn rebind_texture_consumer(
        &mut self,
        scenes: &mut RendererScenes,
        provider: TextureProvider,
        consumer: SlotRef,
    ) -> Result<(), LinkError> {
        if let Err(e) = checked_texture_consumer(scenes, consumer) {
            warn!(%provider, %consumer, error = %e, "rebind rejected");
            let kind = match provider {
                TextureProvider::SceneSlot(slot) => {
                    RendererEventKind::link_failed(slot, consumer, &e)
                }
                other => RendererEventKind::buffer_link_failed(other, consumer, &e),
            };
            self.events.emit(kind);
            return Err(e);
        }

        let previous = self.texture.get_linked_provider(consumer);
        if let Some(old) = previous {
            self.unlink_consumer(scenes, consumer, PayloadKind::Texture)?;
            debug!(%old, %consumer, "texture consumer unbound for rebind");
        }

        let result = match provider {
            TextureProvider::SceneSlot(slot) => self.create_data_link(scenes, slot, consumer),
            TextureProvider::OffscreenBuffer(buffer) => {
                self.create_buffer_link(scenes, buffer, consumer)
            }
            TextureProvider::StreamBuffer(stream) => {
                self.create_stream_link(scenes, stream, consumer)
            }
        };

        if result.is_err() {
            if let Some(old) = previous {
                self.restore_texture_link(scenes, old, consumer);
            }
        }
        result
    }

    fn restore_texture_link(
        &mut self,
        scenes: &mut RendererScenes,
        provider: TextureProvider,
        consumer: SlotRef,
    ) {
        let restored = match provider {
            TextureProvider::SceneSlot(slot) => self
                .texture
                .create_data_link(scenes, slot, consumer)
                .map(|link| {
                    self.dependencies
                        .add_dependency(link.provider_scene(), link.consumer_scene());
                }),
            TextureProvider::OffscreenBuffer(buffer) => self
                .texture
                .create_buffer_link(scenes, buffer, consumer)
                .map(|_| ()),
            TextureProvider::StreamBuffer(stream) => self
                .texture
                .create_stream_link(scenes, stream, consumer)
                .map(|_| ()),
        };
        if let Err(e) = restored {
            warn!(%provider, %consumer, error = %e, "could not restore texture link");
        }
    }

    fn unlink_consumer(
        &mut self,
        scenes: &mut RendererScenes,
        consumer: SlotRef,
        payload: PayloadKind,
    ) -> Result<TextureProvider, LinkError> {
        let provider = match payload {
            PayloadKind::Transformation => TextureProvider::SceneSlot(
                self.transformation.remove_data_link(scenes, consumer)?.provider,
            ),
            PayloadKind::DataReference => TextureProvider::SceneSlot(
                self.data_reference.remove_data_link(scenes, consumer)?.provider,
            ),
            PayloadKind::Texture => self.texture.remove_data_link(scenes, consumer)?.provider,
        };
        if let TextureProvider::SceneSlot(slot) = provider {
            self.dependencies.remove_dependency(slot.scene, consumer.scene);
        }
        Ok(provider)
    }

    // ═══════════════════════════════════════════
    // CASCADES
    // ═══════════════════════════════════════════

    /// Tear down the links of a slot that is about to be released
    ///
    /// A provider slot loses all its consumers, a consumer slot its single
    /// provider. Returns the slot type if the slot existed.
    #[instrument(skip(self, scenes))]
    pub fn release_data_slot(
        &mut self,
        scenes: &mut RendererScenes,
        slot: SlotRef,
    ) -> Option<DataSlotType> {
        let slot_type = scenes.data_slot(slot).ok()?;

        match slot_type.role() {
            SlotRole::Provider => {
                let removed = match slot_type.payload() {
                    PayloadKind::Transformation => {
                        self.transformation.remove_provider_links(scenes, slot)
                    }
                    PayloadKind::DataReference => {
                        self.data_reference.remove_provider_links(scenes, slot)
                    }
                    PayloadKind::Texture => self.texture.remove_provider_links(scenes, slot),
                };
                for link in removed {
                    self.forget_scene_link(&link);
                    self.events
                        .emit(RendererEventKind::SceneDataUnlinkedAsResultOfClientSceneChange {
                            consumer: link.consumer,
                        });
                }
                self.events
                    .emit(RendererEventKind::SceneDataSlotProviderDestroyed { provider: slot });
            }
            SlotRole::Consumer => {
                if self.unlink_consumer(scenes, slot, slot_type.payload()).is_ok() {
                    self.events
                        .emit(RendererEventKind::SceneDataUnlinkedAsResultOfClientSceneChange {
                            consumer: slot,
                        });
                }
                self.events
                    .emit(RendererEventKind::SceneDataSlotConsumerDestroyed { consumer: slot });
            }
        }

        debug!(%slot, "data slot released");
        scenes
            .get_mut(slot.scene)
            .and_then(|scene| scene.remove_data_slot(slot.slot))
    }

    /// Scene destroyed or unpublished
    #[instrument(skip(self, scenes))]
    pub fn handle_scene_removed(&mut self, scenes: &mut RendererScenes, scene: SceneId) {
        let count = self.remove_scene_links(scenes, scene);
        info!(%scene, count, "links of removed scene torn down");
    }

    /// Scene unmapped from its display; its links go like on removal
    #[instrument(skip(self, scenes))]
    pub fn handle_scene_unmapped(&mut self, scenes: &mut RendererScenes, scene: SceneId) {
        let count = self.remove_scene_links(scenes, scene);
        info!(%scene, count, "links of unmapped scene torn down");
    }

    fn remove_scene_links(&mut self, scenes: &mut RendererScenes, scene: SceneId) -> usize {
        let mut consumers: Vec<SlotRef> = Vec::new();

        for link in self.transformation.remove_scene_links(scenes, scene) {
            self.forget_scene_link(&link);
            consumers.push(link.consumer);
        }
        for link in self.data_reference.remove_scene_links(scenes, scene) {
            self.forget_scene_link(&link);
            consumers.push(link.consumer);
        }
        for link in self.texture.remove_scene_links(scenes, scene) {
            if let TextureProvider::SceneSlot(provider) = link.provider {
                self.dependencies.remove_dependency(provider.scene, link.consumer.scene);
            }
            consumers.push(link.consumer);
        }
        debug_assert!(!self.dependencies.has_dependency(scene));

        for consumer in &consumers {
            self.events
                .emit(RendererEventKind::SceneDataUnlinkedAsResultOfClientSceneChange {
                    consumer: *consumer,
                });
        }
        consumers.len()
    }

    /// Offscreen buffer destroyed; its consumers fall back
    pub fn remove_buffer_links(
        &mut self,
        scenes: &mut RendererScenes,
        buffer: OffscreenBufferId,
    ) -> usize {
        let removed = self.texture.remove_buffer_links(scenes, buffer);
        for link in &removed {
            self.events
                .emit(RendererEventKind::SceneDataUnlinkedAsResultOfClientSceneChange {
                    consumer: link.consumer,
                });
        }
        removed.len()
    }

    pub fn remove_stream_links(
        &mut self,
        scenes: &mut RendererScenes,
        stream: StreamBufferId,
    ) -> usize {
        let removed = self.texture.remove_stream_links(scenes, stream);
        for link in &removed {
            self.events
                .emit(RendererEventKind::SceneDataUnlinkedAsResultOfClientSceneChange {
                    consumer: link.consumer,
                });
        }
        removed.len()
    }

    fn forget_scene_link(&mut self, link: &SceneLink) {
        self.dependencies
            .remove_dependency(link.provider_scene(), link.consumer_scene());
    }

    // ═══════════════════════════════════════════
    // PROVIDER CHANGES
    // ═══════════════════════════════════════════

    /// Set a node's local transform and push dirtiness down link chains
    pub fn set_local_transform(
        &self,
        scenes: &mut RendererScenes,
        scene: SceneId,
        node: NodeHandle,
        local: Mat4,
    ) -> Result<(), LinkError> {
        let renderer_scene = scenes
            .get_mut(scene)
            .ok_or(LinkError::UnknownScene { scene })?;
        if renderer_scene.set_local_transform(node, local).is_empty() {
            return Err(LinkError::UnknownNode { scene, node });
        }
        self.transformation.mark_subtree_dirty(scenes, scene, node);
        Ok(())
    }

    /// Give a texture provider slot new content and push it to consumers
    pub fn set_texture(
        &self,
        scenes: &mut RendererScenes,
        provider: SlotRef,
        texture: TextureHash,
    ) -> Result<(), LinkError> {
        let renderer_scene = scenes
            .get_mut(provider.scene)
            .ok_or(LinkError::UnknownScene { scene: provider.scene })?;
        if !renderer_scene.set_slot_texture(provider.slot, texture) {
            let slot_type = scenes.data_slot(provider)?;
            return Err(LinkError::wrong_slot(
                provider,
                slot_type,
                SlotRole::Provider,
                PayloadKind::Texture,
            ));
        }
        self.texture.set_texture_to_consumers(scenes, provider, texture);
        Ok(())
    }

    // ═══════════════════════════════════════════
    // INTROSPECTION
    // ═══════════════════════════════════════════

    /// Every active link, sorted
    pub fn links(&self) -> Vec<LinkInfo> {
        let scene_links = |payload: PayloadKind, links: Vec<SceneLink>| {
            links.into_iter().map(move |link| LinkInfo {
                payload,
                provider: TextureProvider::SceneSlot(link.provider),
                consumer: link.consumer,
            })
        };

        let mut all: Vec<LinkInfo> = Vec::new();
        all.extend(scene_links(
            PayloadKind::Transformation,
            self.transformation.scene_links().iter().collect(),
        ));
        all.extend(scene_links(
            PayloadKind::DataReference,
            self.data_reference.scene_links().iter().collect(),
        ));
        all.extend(scene_links(
            PayloadKind::Texture,
            self.texture.scene_links().iter().collect(),
        ));
        all.extend(self.texture.buffer_links().iter().map(|link| LinkInfo {
            payload: PayloadKind::Texture,
            provider: TextureProvider::OffscreenBuffer(link.provider),
            consumer: link.consumer,
        }));
        all.extend(self.texture.stream_links().iter().map(|link| LinkInfo {
            payload: PayloadKind::Texture,
            provider: TextureProvider::StreamBuffer(link.provider),
            consumer: link.consumer,
        }));
        all.sort();
        all
    }

    /// Links touching the scene on either side, sorted
    pub fn get_scene_links(&self, scene: SceneId) -> Vec<LinkInfo> {
        self.links()
            .into_iter()
            .filter(|info| {
                info.consumer.scene == scene || info.provider.provider_scene() == Some(scene)
            })
            .collect()
    }

    /// Provider of a linked consumer slot, whatever its payload
    pub fn get_linked_provider(&self, consumer: SlotRef) -> Option<TextureProvider> {
        self.transformation
            .scene_links()
            .linked_provider(consumer)
            .or_else(|| self.data_reference.scene_links().linked_provider(consumer))
            .map(|link| TextureProvider::SceneSlot(link.provider))
            .or_else(|| self.texture.get_linked_provider(consumer))
    }

    /// Per-frame pass: pull data links in dependency order, then resolve
    /// dirty world matrices
    pub fn update(&self, scenes: &mut RendererScenes) {
        let mut order = self.dependencies.dependent_scenes_in_order();
        for scene in scenes.ids() {
            if !order.contains(&scene) {
                order.push(scene);
            }
        }
        for scene in order {
            self.data_reference
                .resolve_links_for_consumer_scene(scenes, scene);
        }
        self.transformation.update_world_matrices(scenes);
    }
}

/// Slot metadata, checked for existence and role
fn checked_slot(
    scenes: &RendererScenes,
    slot: SlotRef,
    role: SlotRole,
) -> Result<DataSlotType, LinkError> {
    let slot_type = scenes.data_slot(slot)?;
    if slot_type.role() != role {
        return Err(LinkError::SlotRoleMismatch { slot, expected: role });
    }
    Ok(slot_type)
}

/// Consumer slot that feeds a sampler
fn checked_texture_consumer(scenes: &RendererScenes, consumer: SlotRef) -> Result<(), LinkError> {
    let slot_type = checked_slot(scenes, consumer, SlotRole::Consumer)?;
    if slot_type.payload() != PayloadKind::Texture {
        return Err(LinkError::PayloadMismatch {
            slot: consumer,
            expected: PayloadKind::Texture,
            actual: slot_type.payload(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{
        DataInstanceHandle, DataValue, NodeHandle, SamplerContent, SamplerHandle, SlotHandle,
    };

    const PROVIDER: SceneId = SceneId(3);
    const CONSUMER: SceneId = SceneId(4);

    fn slot(scene: SceneId, slot: u32) -> SlotRef {
        SlotRef::new(scene, SlotHandle(slot))
    }

    /// Provider and consumer scenes with one slot pair per payload kind:
    /// transformation 1/2, data 3/4, texture 5/6
    fn setup() -> RendererScenes {
        let mut scenes = RendererScenes::new();
        for id in [PROVIDER, CONSUMER] {
            let scene = scenes.create_scene(id);
            scene.add_node(NodeHandle(0), None);
            scene.add_data_instance(DataInstanceHandle(0), DataValue::Float(id.value() as f32));
            let texture = TextureHash(id.value() as u64);
            scene.add_sampler(SamplerHandle(0), SamplerContent::ClientTexture(texture));
            scene.add_data_slot(SlotHandle(1), DataSlotType::TransformationProvider(NodeHandle(0)));
            scene.add_data_slot(SlotHandle(2), DataSlotType::TransformationConsumer(NodeHandle(0)));
            scene.add_data_slot(SlotHandle(3), DataSlotType::DataProvider(DataInstanceHandle(0)));
            scene.add_data_slot(SlotHandle(4), DataSlotType::DataConsumer(DataInstanceHandle(0)));
            scene.add_data_slot(SlotHandle(5), DataSlotType::TextureProvider(TextureHash(0xf00)));
            scene.add_data_slot(SlotHandle(6), DataSlotType::TextureConsumer(SamplerHandle(0)));
        }
        scenes
    }

    fn kinds(manager: &SceneLinksManager) -> Vec<&'static str> {
        manager
            .events()
            .consume_events()
            .iter()
            .map(|e| e.kind.name())
            .collect()
    }

    #[test]
    fn reports_link_and_unlink() {
        let mut manager = SceneLinksManager::default();
        let mut scenes = setup();

        manager
            .create_data_link(&mut scenes, slot(PROVIDER, 3), slot(CONSUMER, 4))
            .unwrap();
        manager
            .remove_data_link(&mut scenes, slot(CONSUMER, 4))
            .unwrap();

        assert_eq!(kinds(&manager), vec!["SceneDataLinked", "SceneDataUnlinked"]);
        assert!(manager.dependency_checker().is_empty());
    }

    #[test]
    fn rejects_swapped_and_mismatched_slots() {
        let mut manager = SceneLinksManager::default();
        let mut scenes = setup();

        let err = manager
            .create_data_link(&mut scenes, slot(CONSUMER, 4), slot(PROVIDER, 3))
            .unwrap_err();
        assert!(matches!(err, LinkError::SlotRoleMismatch { .. }));

        let err = manager
            .create_data_link(&mut scenes, slot(PROVIDER, 1), slot(CONSUMER, 4))
            .unwrap_err();
        assert_eq!(
            err,
            LinkError::PayloadMismatch {
                slot: slot(PROVIDER, 1),
                expected: PayloadKind::DataReference,
                actual: PayloadKind::Transformation,
            }
        );

        let err = manager
            .create_data_link(&mut scenes, slot(SceneId(99), 3), slot(CONSUMER, 4))
            .unwrap_err();
        assert_eq!(err, LinkError::UnknownScene { scene: SceneId(99) });

        assert_eq!(kinds(&manager), vec!["SceneDataLinkFailed"; 3]);
        assert!(manager.links().is_empty());
    }

    #[test]
    fn rejects_cycle_across_payload_kinds() {
        let mut manager = SceneLinksManager::default();
        let mut scenes = setup();
        manager
            .create_data_link(&mut scenes, slot(PROVIDER, 1), slot(CONSUMER, 2))
            .unwrap();

        let err = manager
            .create_data_link(&mut scenes, slot(CONSUMER, 3), slot(PROVIDER, 4))
            .unwrap_err();

        assert!(matches!(err, LinkError::WouldCreateCycle { .. }));
        assert!(manager.data_reference_link_manager().scene_links().is_empty());
        assert_eq!(manager.dependency_checker().link_count(PROVIDER, CONSUMER), 1);
    }

    #[test]
    fn releasing_provider_slot_cascades() {
        let mut manager = SceneLinksManager::default();
        let mut scenes = setup();
        scenes
            .get_mut(CONSUMER)
            .unwrap()
            .add_data_instance(DataInstanceHandle(1), DataValue::Float(0.5));
        scenes
            .get_mut(CONSUMER)
            .unwrap()
            .add_data_slot(SlotHandle(7), DataSlotType::DataConsumer(DataInstanceHandle(1)));
        manager
            .create_data_link(&mut scenes, slot(PROVIDER, 3), slot(CONSUMER, 4))
            .unwrap();
        manager
            .create_data_link(&mut scenes, slot(PROVIDER, 3), slot(CONSUMER, 7))
            .unwrap();
        kinds(&manager);

        let released = manager.release_data_slot(&mut scenes, slot(PROVIDER, 3));

        assert_eq!(released, Some(DataSlotType::DataProvider(DataInstanceHandle(0))));
        assert_eq!(
            kinds(&manager),
            vec![
                "SceneDataUnlinkedAsResultOfClientSceneChange",
                "SceneDataUnlinkedAsResultOfClientSceneChange",
                "SceneDataSlotProviderDestroyed",
            ]
        );
        assert!(!manager.dependency_checker().has_dependency_as_consumer(CONSUMER));
        assert!(scenes.data_slot(slot(PROVIDER, 3)).is_err());
    }

    #[test]
    fn releasing_consumer_slot_cascades() {
        let mut manager = SceneLinksManager::default();
        let mut scenes = setup();
        manager
            .create_data_link(&mut scenes, slot(PROVIDER, 1), slot(CONSUMER, 2))
            .unwrap();
        kinds(&manager);

        manager.release_data_slot(&mut scenes, slot(CONSUMER, 2));

        assert_eq!(
            kinds(&manager),
            vec!["SceneDataUnlinkedAsResultOfClientSceneChange", "SceneDataSlotConsumerDestroyed"]
        );
        assert!(manager.links().is_empty());
    }

    #[test]
    fn releasing_unlinked_slot_only_reports_destruction() {
        let mut manager = SceneLinksManager::default();
        let mut scenes = setup();

        manager.release_data_slot(&mut scenes, slot(PROVIDER, 5));

        assert_eq!(kinds(&manager), vec!["SceneDataSlotProviderDestroyed"]);
        assert!(manager.release_data_slot(&mut scenes, slot(PROVIDER, 5)).is_none());
    }

    #[test]
    fn unmapping_either_side_removes_texture_links() {
        for unmapped in [PROVIDER, CONSUMER] {
            let mut manager = SceneLinksManager::default();
            let mut scenes = setup();
            manager
                .create_data_link(&mut scenes, slot(PROVIDER, 5), slot(CONSUMER, 6))
                .unwrap();

            manager.handle_scene_unmapped(&mut scenes, unmapped);

            let textures = manager.texture_link_manager().scene_links();
            assert!(!textures.has_any_links_to_provider(CONSUMER));
            assert!(!textures.has_any_links_to_consumer(PROVIDER));
            assert!(manager.dependency_checker().is_empty());
        }
    }

    #[test]
    fn scene_links_cover_all_payloads() {
        let mut manager = SceneLinksManager::default();
        let mut scenes = setup();
        manager
            .create_data_link(&mut scenes, slot(PROVIDER, 1), slot(CONSUMER, 2))
            .unwrap();
        manager
            .create_data_link(&mut scenes, slot(PROVIDER, 3), slot(CONSUMER, 4))
            .unwrap();
        manager
            .create_buffer_link(&mut scenes, OffscreenBufferId(7), slot(PROVIDER, 6))
            .unwrap();

        assert_eq!(manager.get_scene_links(CONSUMER).len(), 2);
        assert_eq!(manager.get_scene_links(PROVIDER).len(), 3);
        assert_eq!(manager.links().len(), 3);
        assert_eq!(manager.dependency_checker().link_count(PROVIDER, CONSUMER), 2);

        manager.handle_scene_removed(&mut scenes, PROVIDER);
        assert!(manager.links().is_empty());
    }

    #[test]
    fn rebinds_texture_consumer_between_provider_kinds() {
        let mut manager = SceneLinksManager::default();
        let mut scenes = setup();
        manager
            .create_buffer_link(&mut scenes, OffscreenBufferId(7), slot(CONSUMER, 6))
            .unwrap();

        manager
            .rebind_texture_consumer(
                &mut scenes,
                TextureProvider::SceneSlot(slot(PROVIDER, 5)),
                slot(CONSUMER, 6),
            )
            .unwrap();

        assert_eq!(
            manager.get_linked_provider(slot(CONSUMER, 6)),
            Some(TextureProvider::SceneSlot(slot(PROVIDER, 5)))
        );
        assert_eq!(manager.dependency_checker().link_count(PROVIDER, CONSUMER), 1);
        assert_eq!(
            scenes.get(CONSUMER).unwrap().sampler_content(SamplerHandle(0)),
            Some(SamplerContent::ClientTexture(TextureHash(0xf00)))
        );
    }

    #[test]
    fn failed_rebind_keeps_previous_provider() {
        let mut manager = SceneLinksManager::default();
        let mut scenes = setup();
        manager
            .create_data_link(&mut scenes, slot(PROVIDER, 5), slot(CONSUMER, 6))
            .unwrap();

        let err = manager
            .rebind_texture_consumer(
                &mut scenes,
                TextureProvider::SceneSlot(slot(CONSUMER, 5)),
                slot(CONSUMER, 6),
            )
            .unwrap_err();

        assert!(matches!(err, LinkError::WouldCreateCycle { .. }));
        assert_eq!(
            manager.get_linked_provider(slot(CONSUMER, 6)),
            Some(TextureProvider::SceneSlot(slot(PROVIDER, 5)))
        );
        assert_eq!(manager.dependency_checker().link_count(PROVIDER, CONSUMER), 1);
    }

    #[test]
    fn rebind_rejects_non_texture_consumer() {
        let mut manager = SceneLinksManager::default();
        let mut scenes = setup();
        manager
            .create_data_link(&mut scenes, slot(PROVIDER, 3), slot(CONSUMER, 4))
            .unwrap();
        kinds(&manager);

        let err = manager
            .rebind_texture_consumer(
                &mut scenes,
                TextureProvider::OffscreenBuffer(OffscreenBufferId(7)),
                slot(CONSUMER, 4),
            )
            .unwrap_err();

        assert_eq!(
            err,
            LinkError::PayloadMismatch {
                slot: slot(CONSUMER, 4),
                expected: PayloadKind::Texture,
                actual: PayloadKind::DataReference,
            }
        );
        assert_eq!(kinds(&manager), vec!["SceneDataBufferLinkFailed"]);
        assert_eq!(
            manager.get_linked_provider(slot(CONSUMER, 4)),
            Some(TextureProvider::SceneSlot(slot(PROVIDER, 3)))
        );
        assert!(manager.texture_link_manager().buffer_links().is_empty());
    }

    #[test]
    fn already_linked_consumer_wins_over_cycle() {
        let mut manager = SceneLinksManager::default();
        let mut scenes = setup();
        manager
            .create_data_link(&mut scenes, slot(PROVIDER, 3), slot(CONSUMER, 4))
            .unwrap();
        manager
            .create_buffer_link(&mut scenes, OffscreenBufferId(7), slot(CONSUMER, 6))
            .unwrap();

        // both would also be self links
        let err = manager
            .create_data_link(&mut scenes, slot(CONSUMER, 3), slot(CONSUMER, 4))
            .unwrap_err();
        assert_eq!(err, LinkError::ConsumerAlreadyLinked { consumer: slot(CONSUMER, 4) });

        let err = manager
            .create_data_link(&mut scenes, slot(CONSUMER, 5), slot(CONSUMER, 6))
            .unwrap_err();
        assert_eq!(err, LinkError::AlreadyHasVirtualLink { consumer: slot(CONSUMER, 6) });

        assert_eq!(manager.links().len(), 2);
    }

    #[test]
    fn unlink_returns_prior_provider() {
        let mut manager = SceneLinksManager::default();
        let mut scenes = setup();
        manager
            .create_data_link(&mut scenes, slot(PROVIDER, 1), slot(CONSUMER, 2))
            .unwrap();
        manager
            .create_stream_link(&mut scenes, StreamBufferId(9), slot(CONSUMER, 6))
            .unwrap();

        let provider = manager
            .remove_data_link(&mut scenes, slot(CONSUMER, 2))
            .unwrap();
        assert_eq!(provider, TextureProvider::SceneSlot(slot(PROVIDER, 1)));
        assert_eq!(provider.provider_scene(), Some(PROVIDER));

        let provider = manager
            .remove_data_link(&mut scenes, slot(CONSUMER, 6))
            .unwrap();
        assert_eq!(provider, TextureProvider::StreamBuffer(StreamBufferId(9)));
        assert_eq!(provider.provider_scene(), None);
    }

    #[test]
    fn set_texture_pushes_to_linked_sampler() {
        let mut manager = SceneLinksManager::default();
        let mut scenes = setup();
        manager
            .create_data_link(&mut scenes, slot(PROVIDER, 5), slot(CONSUMER, 6))
            .unwrap();

        manager
            .set_texture(&mut scenes, slot(PROVIDER, 5), TextureHash(0xabc))
            .unwrap();

        assert_eq!(
            scenes.get(CONSUMER).unwrap().sampler_content(SamplerHandle(0)),
            Some(SamplerContent::ClientTexture(TextureHash(0xabc)))
        );
        assert!(manager
            .set_texture(&mut scenes, slot(PROVIDER, 3), TextureHash(1))
            .is_err());
    }

    #[test]
    fn update_pulls_data_values() {
        let mut manager = SceneLinksManager::default();
        let mut scenes = setup();
        manager
            .create_data_link(&mut scenes, slot(PROVIDER, 3), slot(CONSUMER, 4))
            .unwrap();
        scenes
            .get_mut(PROVIDER)
            .unwrap()
            .set_data_value(DataInstanceHandle(0), DataValue::Float(9.0));

        manager.update(&mut scenes);

        assert_eq!(
            scenes.get(CONSUMER).unwrap().data_value(DataInstanceHandle(0)),
            Some(DataValue::Float(9.0))
        );
    }
}
