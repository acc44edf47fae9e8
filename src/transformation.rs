//! Transformation links: a consumer node takes its world matrix from a
//! provider node in another scene
//!
//! Resolution is driven by node traversal, so the manager keeps node to
//! slot indices for both sides. Changes are pushed: a provider node whose
//! transform changes marks every linked consumer subtree dirty, and the
//! dirtiness keeps flowing down link chains.

use glam::Mat4;
use rustc_hash::{FxHashMap, FxHashSet};
use tracing::debug;

use crate::dependency::SceneDependencyChecker;
use crate::error::LinkError;
use crate::link_manager::LinkManager;
use crate::links::{LinkTable, SceneLink};
use crate::scene::RendererScenes;
use crate::types::{
    DataSlotType, MatrixKind, NodeHandle, PayloadKind, SceneId, SlotHandle, SlotRef, SlotRole,
};

#[derive(Debug, Default, Clone)]
pub struct TransformationLinkManager {
    base: LinkManager,
    /// (consumer scene, node) -> consumer slot
    consumer_nodes: FxHashMap<(SceneId, NodeHandle), SlotHandle>,
    /// (provider scene, node) -> linked provider slots on that node
    provider_nodes: FxHashMap<(SceneId, NodeHandle), Vec<SlotHandle>>,
    /// Node behind every linked slot, both sides
    slot_nodes: FxHashMap<SlotRef, NodeHandle>,
}

impl TransformationLinkManager {
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
        let provider_node = match scenes.data_slot(provider)? {
            DataSlotType::TransformationProvider(node) => node,
            other => {
                return Err(LinkError::wrong_slot(
                    provider,
                    other,
                    SlotRole::Provider,
                    PayloadKind::Transformation,
                ))
            }
        };
        let consumer_node = match scenes.data_slot(consumer)? {
            DataSlotType::TransformationConsumer(node) => node,
            other => {
                return Err(LinkError::wrong_slot(
                    consumer,
                    other,
                    SlotRole::Consumer,
                    PayloadKind::Transformation,
                ))
            }
        };

        self.base.validate(provider, consumer)?;
        let link = self.base.commit(provider, consumer);

        self.consumer_nodes
            .insert((consumer.scene, consumer_node), consumer.slot);
        self.provider_nodes
            .entry((provider.scene, provider_node))
            .or_default()
            .push(provider.slot);
        self.slot_nodes.insert(consumer, consumer_node);
        self.slot_nodes.insert(provider, provider_node);

        self.mark_subtree_dirty(scenes, consumer.scene, consumer_node);
        Ok(link)
    }

    pub fn remove_data_link(
        &mut self,
        scenes: &mut RendererScenes,
        consumer: SlotRef,
    ) -> Result<SceneLink, LinkError> {
        let link = self.base.remove_data_link(consumer)?;
        self.forget_link(scenes, &link);
        Ok(link)
    }

    /// Tear down every link of the scene; consumers fall back to their own
    /// local transforms
    pub fn remove_scene_links(
        &mut self,
        scenes: &mut RendererScenes,
        scene: SceneId,
    ) -> Vec<SceneLink> {
        let removed = self.base.remove_scene_links(scene);
        for link in &removed {
            self.forget_link(scenes, link);
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
            self.forget_link(scenes, link);
        }
        removed
    }

    /// True if the node takes its transform from another scene
    pub fn node_has_data_link_to_provider(&self, scene: SceneId, node: NodeHandle) -> bool {
        self.consumer_nodes.contains_key(&(scene, node))
    }

    /// Provider matrix for a linked consumer node
    ///
    /// Follows the link to the provider node and returns its resolved world
    /// matrix, itself possibly coming from a further upstream link.
    pub fn get_linked_transformation_from_data_provider(
        &self,
        kind: MatrixKind,
        scenes: &RendererScenes,
        consumer_scene: SceneId,
        consumer_node: NodeHandle,
    ) -> Option<Mat4> {
        let (provider_scene, provider_node) =
            self.linked_provider_node(consumer_scene, consumer_node)?;
        let world = self.resolve_world_matrix(scenes, provider_scene, provider_node)?;
        Some(match kind {
            MatrixKind::World => world,
            MatrixKind::Object => world.inverse(),
        })
    }

    /// World matrix of any node, honoring links
    ///
    /// Clean nodes answer from their cache; dirty nodes are recomputed
    /// without writing anything back.
    pub fn resolve_world_matrix(
        &self,
        scenes: &RendererScenes,
        scene: SceneId,
        node: NodeHandle,
    ) -> Option<Mat4> {
        let renderer_scene = scenes.get(scene)?;
        if !renderer_scene.has_node(node) {
            return None;
        }
        if !renderer_scene.is_node_dirty(node) {
            return renderer_scene.world_matrix(node);
        }

        if let Some((provider_scene, provider_node)) = self.linked_provider_node(scene, node) {
            if let Some(world) = self.resolve_world_matrix(scenes, provider_scene, provider_node) {
                return Some(world);
            }
        }

        let local = renderer_scene.local_transform(node)?;
        match renderer_scene.node_parent(node) {
            Some(parent) => {
                let parent_world = self.resolve_world_matrix(scenes, scene, parent)?;
                Some(parent_world * local)
            }
            None => Some(local),
        }
    }

    /// Mark a node subtree dirty and push the dirtiness to linked consumers
    ///
    /// Each node is marked once even when several link paths reach it.
    /// Returns the number of nodes marked.
    pub fn mark_subtree_dirty(
        &self,
        scenes: &mut RendererScenes,
        scene: SceneId,
        node: NodeHandle,
    ) -> usize {
        let mut visited: FxHashSet<(SceneId, NodeHandle)> = FxHashSet::default();
        let mut pending = vec![(scene, node)];

        while let Some((scene, node)) = pending.pop() {
            if visited.contains(&(scene, node)) {
                continue;
            }
            let Some(renderer_scene) = scenes.get_mut(scene) else {
                continue;
            };
            for dirtied in renderer_scene.mark_subtree_dirty(node) {
                if visited.insert((scene, dirtied)) {
                    pending.extend(self.linked_consumer_nodes(scene, dirtied));
                }
            }
        }

        visited.len()
    }

    /// Called when a provider node's transform changed locally
    pub fn propagate_transformation_dirtiness_to_consumers(
        &self,
        scenes: &mut RendererScenes,
        provider_scene: SceneId,
        provider_node: NodeHandle,
    ) {
        for (scene, node) in self.linked_consumer_nodes(provider_scene, provider_node) {
            self.mark_subtree_dirty(scenes, scene, node);
        }
    }

    /// Per-frame pass: recompute dirty world matrices, providers first
    pub fn update_world_matrices(&self, scenes: &mut RendererScenes) {
        let mut order = self.base.dependency_checker().dependent_scenes_in_order();
        for scene in scenes.ids() {
            if !order.contains(&scene) {
                order.push(scene);
            }
        }

        for scene in order {
            let Some(renderer_scene) = scenes.get(scene) else {
                continue;
            };
            let resolved: Vec<(NodeHandle, Mat4)> = renderer_scene
                .dirty_nodes_in_hierarchy_order()
                .into_iter()
                .filter_map(|node| {
                    self.resolve_world_matrix(scenes, scene, node)
                        .map(|world| (node, world))
                })
                .collect();

            if let Some(renderer_scene) = scenes.get_mut(scene) {
                for (node, world) in resolved {
                    renderer_scene.set_world_matrix(node, world);
                }
            }
        }
    }

    fn linked_provider_node(
        &self,
        scene: SceneId,
        node: NodeHandle,
    ) -> Option<(SceneId, NodeHandle)> {
        let slot = self.consumer_nodes.get(&(scene, node))?;
        let link = self
            .base
            .scene_links()
            .linked_provider(SlotRef::new(scene, *slot))?;
        let provider_node = self.slot_nodes.get(&link.provider)?;
        Some((link.provider_scene(), *provider_node))
    }

    fn linked_consumer_nodes(
        &self,
        scene: SceneId,
        node: NodeHandle,
    ) -> Vec<(SceneId, NodeHandle)> {
        let Some(slots) = self.provider_nodes.get(&(scene, node)) else {
            return Vec::new();
        };

        slots
            .iter()
            .flat_map(|slot| {
                self.base
                    .scene_links()
                    .linked_consumers(SlotRef::new(scene, *slot))
            })
            .filter_map(|link| {
                self.slot_nodes
                    .get(&link.consumer)
                    .map(|consumer_node| (link.consumer_scene(), *consumer_node))
            })
            .collect()
    }

    /// Drop index entries of a removed link and let the consumer fall back
    fn forget_link(&mut self, scenes: &mut RendererScenes, link: &SceneLink) {
        let consumer_node = self.slot_nodes.remove(&link.consumer);
        if let Some(node) = consumer_node {
            self.consumer_nodes.remove(&(link.consumer_scene(), node));
        }

        if !self.base.scene_links().has_linked_consumers(link.provider) {
            if let Some(node) = self.slot_nodes.remove(&link.provider) {
                let key = (link.provider_scene(), node);
                if let Some(slots) = self.provider_nodes.get_mut(&key) {
                    slots.retain(|slot| *slot != link.provider.slot);
                    if slots.is_empty() {
                        self.provider_nodes.remove(&key);
                    }
                }
            }
        }

        if let Some(node) = consumer_node {
            self.mark_subtree_dirty(scenes, link.consumer_scene(), node);
        }
        debug!(consumer = %link.consumer, "transformation consumer falls back to local transform");
    }
}
