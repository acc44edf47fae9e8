//! Texture links
//!
//! A texture consumer slot feeds a sampler and can draw from one of three
//! providers: another scene's texture provider slot, an offscreen buffer,
//! or a compositor stream. The two off-scene kinds live in their own link
//! tables and never create dependency edges. Content changes are pushed to
//! linked samplers immediately.

use std::fmt;

use rustc_hash::FxHashMap;
use serde::Serialize;
use tracing::debug;

use crate::dependency::SceneDependencyChecker;
use crate::error::LinkError;
use crate::link_manager::LinkManager;
use crate::links::{BufferLink, Link, LinkProvider, LinkTable, SceneLink, StreamLink};
use crate::scene::RendererScenes;
use crate::types::{
    DataSlotType, OffscreenBufferId, PayloadKind, SamplerContent, SamplerHandle, SceneId,
    SlotHandle, SlotRef, SlotRole, StreamBufferId, TextureHash,
};

/// What a texture consumer is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(tag = "kind", content = "id", rename_all = "snake_case")]
pub enum TextureProvider {
    SceneSlot(SlotRef),
    OffscreenBuffer(OffscreenBufferId),
    StreamBuffer(StreamBufferId),
}

impl TextureProvider {
    pub fn provider_scene(&self) -> Option<SceneId> {
        match self {
            TextureProvider::SceneSlot(slot) => Some(slot.scene),
            TextureProvider::OffscreenBuffer(_) | TextureProvider::StreamBuffer(_) => None,
        }
    }
}

impl fmt::Display for TextureProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TextureProvider::SceneSlot(slot) => write!(f, "{slot}"),
            TextureProvider::OffscreenBuffer(buffer) => write!(f, "{buffer}"),
            TextureProvider::StreamBuffer(stream) => write!(f, "{stream}"),
        }
    }
}

/// A removed or queried texture link of any provider kind
pub type TextureLink = Link<TextureProvider>;

#[derive(Debug, Default, Clone)]
pub struct TextureLinkManager {
    base: LinkManager,
    buffer_links: LinkTable<OffscreenBufferId>,
    stream_links: LinkTable<StreamBufferId>,
    /// (consumer scene, sampler) -> consumer slot, for every linked consumer
    sampler_slots: FxHashMap<(SceneId, SamplerHandle), SlotHandle>,
    slot_samplers: FxHashMap<SlotRef, SamplerHandle>,
}

impl TextureLinkManager {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn scene_links(&self) -> &LinkTable<SlotRef> {
        self.base.scene_links()
    }

    #[inline]
    pub fn buffer_links(&self) -> &LinkTable<OffscreenBufferId> {
        &self.buffer_links
    }

    #[inline]
    pub fn stream_links(&self) -> &LinkTable<StreamBufferId> {
        &self.stream_links
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
        let texture = match scenes.data_slot(provider)? {
            DataSlotType::TextureProvider(texture) => texture,
            other => {
                return Err(LinkError::wrong_slot(
                    provider,
                    other,
                    SlotRole::Provider,
                    PayloadKind::Texture,
                ))
            }
        };
        let sampler = consumer_sampler(scenes, consumer)?;

        if self.has_virtual_link(consumer) {
            return Err(LinkError::AlreadyHasVirtualLink { consumer });
        }
        self.base.validate(provider, consumer)?;

        let link = self.base.commit(provider, consumer);
        self.bind_sampler(scenes, consumer, sampler, SamplerContent::ClientTexture(texture));
        Ok(link)
    }

    pub fn create_buffer_link(
        &mut self,
        scenes: &mut RendererScenes,
        buffer: OffscreenBufferId,
        consumer: SlotRef,
    ) -> Result<BufferLink, LinkError> {
        let sampler = self.check_virtual_link(scenes, consumer)?;
        self.buffer_links.add_link(buffer, consumer);
        self.bind_sampler(scenes, consumer, sampler, SamplerContent::OffscreenBuffer(buffer));

        debug!(%buffer, %consumer, "offscreen buffer linked");
        Ok(Link { provider: buffer, consumer })
    }

    pub fn create_stream_link(
        &mut self,
        scenes: &mut RendererScenes,
        stream: StreamBufferId,
        consumer: SlotRef,
    ) -> Result<StreamLink, LinkError> {
        let sampler = self.check_virtual_link(scenes, consumer)?;
        self.stream_links.add_link(stream, consumer);
        self.bind_sampler(scenes, consumer, sampler, SamplerContent::StreamBuffer(stream));

        debug!(%stream, %consumer, "stream buffer linked");
        Ok(Link { provider: stream, consumer })
    }

    /// Unlink a consumer from whatever provider it has
    ///
    /// Virtual links are looked up first, then the scene link table. The
    /// sampler goes back to the content it had before linking.
    pub fn remove_data_link(
        &mut self,
        scenes: &mut RendererScenes,
        consumer: SlotRef,
    ) -> Result<TextureLink, LinkError> {
        let provider = if let Some(link) = self.buffer_links.remove_link(consumer) {
            debug!(buffer = %link.provider, %consumer, "offscreen buffer unlinked");
            TextureProvider::OffscreenBuffer(link.provider)
        } else if let Some(link) = self.stream_links.remove_link(consumer) {
            debug!(stream = %link.provider, %consumer, "stream buffer unlinked");
            TextureProvider::StreamBuffer(link.provider)
        } else {
            TextureProvider::SceneSlot(self.base.remove_data_link(consumer)?.provider)
        };

        self.unbind_sampler(scenes, consumer);
        Ok(Link { provider, consumer })
    }

    /// Remove scene links on both sides plus virtual links into the scene
    pub fn remove_scene_links(
        &mut self,
        scenes: &mut RendererScenes,
        scene: SceneId,
    ) -> Vec<TextureLink> {
        let mut removed: Vec<TextureLink> = self
            .base
            .remove_scene_links(scene)
            .into_iter()
            .map(|link| Link {
                provider: TextureProvider::SceneSlot(link.provider),
                consumer: link.consumer,
            })
            .collect();

        for link in self.buffer_links.linked_providers_of_scene(scene) {
            self.buffer_links.remove_link(link.consumer);
            removed.push(Link {
                provider: TextureProvider::OffscreenBuffer(link.provider),
                consumer: link.consumer,
            });
        }
        for link in self.stream_links.linked_providers_of_scene(scene) {
            self.stream_links.remove_link(link.consumer);
            removed.push(Link {
                provider: TextureProvider::StreamBuffer(link.provider),
                consumer: link.consumer,
            });
        }

        for link in &removed {
            self.unbind_sampler(scenes, link.consumer);
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
            self.unbind_sampler(scenes, link.consumer);
        }
        removed
    }

    /// The offscreen buffer went away; its consumers fall back
    pub fn remove_buffer_links(
        &mut self,
        scenes: &mut RendererScenes,
        buffer: OffscreenBufferId,
    ) -> Vec<BufferLink> {
        let removed = remove_virtual_links(&mut self.buffer_links, buffer);
        for link in &removed {
            self.unbind_sampler(scenes, link.consumer);
        }
        removed
    }

    pub fn remove_stream_links(
        &mut self,
        scenes: &mut RendererScenes,
        stream: StreamBufferId,
    ) -> Vec<StreamLink> {
        let removed = remove_virtual_links(&mut self.stream_links, stream);
        for link in &removed {
            self.unbind_sampler(scenes, link.consumer);
        }
        removed
    }

    /// Push new provider content to every linked sampler
    pub fn set_texture_to_consumers(
        &self,
        scenes: &mut RendererScenes,
        provider: SlotRef,
        texture: TextureHash,
    ) {
        for link in self.base.scene_links().linked_consumers(provider) {
            let Some(sampler) = self.slot_samplers.get(&link.consumer).copied() else {
                continue;
            };
            if let Some(scene) = scenes.get_mut(link.consumer_scene()) {
                scene.set_sampler_content_source(sampler, SamplerContent::ClientTexture(texture));
            }
        }
    }

    pub fn get_linked_provider(&self, consumer: SlotRef) -> Option<TextureProvider> {
        if let Some(link) = self.base.scene_links().linked_provider(consumer) {
            return Some(TextureProvider::SceneSlot(link.provider));
        }
        if let Some(link) = self.buffer_links.linked_provider(consumer) {
            return Some(TextureProvider::OffscreenBuffer(link.provider));
        }
        self.stream_links
            .linked_provider(consumer)
            .map(|link| TextureProvider::StreamBuffer(link.provider))
    }

    // ═══════════════════════════════════════════
    // SAMPLER QUERIES
    // ═══════════════════════════════════════════

    pub fn has_linked_texture(&self, scene: SceneId, sampler: SamplerHandle) -> bool {
        self.sampler_consumer(scene, sampler)
            .is_some_and(|consumer| self.base.scene_links().has_linked_provider(consumer))
    }

    /// Current texture of the provider slot feeding the sampler
    pub fn get_linked_texture(
        &self,
        scenes: &RendererScenes,
        scene: SceneId,
        sampler: SamplerHandle,
    ) -> Option<TextureHash> {
        let consumer = self.sampler_consumer(scene, sampler)?;
        let link = self.base.scene_links().linked_provider(consumer)?;
        scenes.data_slot(link.provider).ok()?.texture()
    }

    pub fn has_linked_offscreen_buffer(&self, scene: SceneId, sampler: SamplerHandle) -> bool {
        self.get_linked_offscreen_buffer(scene, sampler).is_some()
    }

    pub fn get_linked_offscreen_buffer(
        &self,
        scene: SceneId,
        sampler: SamplerHandle,
    ) -> Option<OffscreenBufferId> {
        let consumer = self.sampler_consumer(scene, sampler)?;
        self.buffer_links.linked_provider(consumer).map(|link| link.provider)
    }

    pub fn has_linked_stream_buffer(&self, scene: SceneId, sampler: SamplerHandle) -> bool {
        self.get_linked_stream_buffer(scene, sampler).is_some()
    }

    pub fn get_linked_stream_buffer(
        &self,
        scene: SceneId,
        sampler: SamplerHandle,
    ) -> Option<StreamBufferId> {
        let consumer = self.sampler_consumer(scene, sampler)?;
        self.stream_links.linked_provider(consumer).map(|link| link.provider)
    }

    // ═══════════════════════════════════════════
    // INTERNALS
    // ═══════════════════════════════════════════

    fn has_virtual_link(&self, consumer: SlotRef) -> bool {
        self.buffer_links.has_linked_provider(consumer)
            || self.stream_links.has_linked_provider(consumer)
    }

    fn check_virtual_link(
        &self,
        scenes: &RendererScenes,
        consumer: SlotRef,
    ) -> Result<SamplerHandle, LinkError> {
        let sampler = consumer_sampler(scenes, consumer)?;
        if let Some(link) = self.base.scene_links().linked_provider(consumer) {
            return Err(LinkError::AlreadyHasSceneLink { consumer, provider: link.provider });
        }
        if self.has_virtual_link(consumer) {
            return Err(LinkError::AlreadyHasVirtualLink { consumer });
        }
        Ok(sampler)
    }

    fn sampler_consumer(&self, scene: SceneId, sampler: SamplerHandle) -> Option<SlotRef> {
        self.sampler_slots
            .get(&(scene, sampler))
            .map(|slot| SlotRef::new(scene, *slot))
    }

    fn bind_sampler(
        &mut self,
        scenes: &mut RendererScenes,
        consumer: SlotRef,
        sampler: SamplerHandle,
        content: SamplerContent,
    ) {
        self.sampler_slots.insert((consumer.scene, sampler), consumer.slot);
        self.slot_samplers.insert(consumer, sampler);

        if let Some(scene) = scenes.get_mut(consumer.scene) {
            scene.store_sampler_fallback(sampler);
            scene.set_sampler_content_source(sampler, content);
        }
    }

    fn unbind_sampler(&mut self, scenes: &mut RendererScenes, consumer: SlotRef) {
        let Some(sampler) = self.slot_samplers.remove(&consumer) else {
            return;
        };
        self.sampler_slots.remove(&(consumer.scene, sampler));

        if let Some(scene) = scenes.get_mut(consumer.scene) {
            scene.restore_sampler_fallback(sampler);
        }
    }
}

fn consumer_sampler(
    scenes: &RendererScenes,
    consumer: SlotRef,
) -> Result<SamplerHandle, LinkError> {
    match scenes.data_slot(consumer)? {
        DataSlotType::TextureConsumer(sampler) => Ok(sampler),
        other => Err(LinkError::wrong_slot(
            consumer,
            other,
            SlotRole::Consumer,
            PayloadKind::Texture,
        )),
    }
}

fn remove_virtual_links<P: LinkProvider>(table: &mut LinkTable<P>, provider: P) -> Vec<Link<P>> {
    table
        .linked_consumers(provider)
        .into_iter()
        .filter_map(|link| table.remove_link(link.consumer))
        .collect()
}
