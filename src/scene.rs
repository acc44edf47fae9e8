//! In-memory renderer scenes
//!
//! The link managers only ever touch a scene through the narrow surface
//! here: read slot metadata, mark node subtrees dirty, write a data
//! instance, point a sampler at new content, and save/restore fallbacks.

use std::collections::hash_map::Entry;

use glam::Mat4;
use rustc_hash::FxHashMap;

use crate::error::LinkError;
use crate::types::{
    DataInstanceHandle, DataSlotType, DataType, DataValue, NodeHandle, SamplerContent,
    SamplerHandle, SceneId, SlotHandle, SlotRef, TextureHash,
};

#[derive(Debug, Clone)]
struct Node {
    parent: Option<NodeHandle>,
    children: Vec<NodeHandle>,
    local: Mat4,
    /// Last resolved world matrix, valid while `dirty` is false
    world: Mat4,
    dirty: bool,
}

#[derive(Debug, Clone)]
struct DataInstance {
    value: DataValue,
    /// Locally authored value saved while a provider overrides `value`
    fallback: Option<DataValue>,
}

#[derive(Debug, Clone)]
struct TextureSampler {
    content: SamplerContent,
    fallback: Option<SamplerContent>,
}

/// One scene as seen by the link layer
#[derive(Debug, Clone)]
pub struct RendererScene {
    id: SceneId,
    nodes: FxHashMap<NodeHandle, Node>,
    data_instances: FxHashMap<DataInstanceHandle, DataInstance>,
    samplers: FxHashMap<SamplerHandle, TextureSampler>,
    slots: FxHashMap<SlotHandle, DataSlotType>,
}

impl RendererScene {
    pub fn new(id: SceneId) -> Self {
        Self {
            id,
            nodes: FxHashMap::default(),
            data_instances: FxHashMap::default(),
            samplers: FxHashMap::default(),
            slots: FxHashMap::default(),
        }
    }

    #[inline]
    pub fn id(&self) -> SceneId {
        self.id
    }

    // ═══════════════════════════════════════════
    // NODES
    // ═══════════════════════════════════════════

    /// Add a node; an unknown parent makes it a root
    pub fn add_node(&mut self, node: NodeHandle, parent: Option<NodeHandle>) {
        let parent = parent.filter(|p| self.nodes.contains_key(p));
        if let Some(p) = parent.and_then(|p| self.nodes.get_mut(&p)) {
            p.children.push(node);
        }
        self.nodes.insert(
            node,
            Node {
                parent,
                children: Vec::new(),
                local: Mat4::IDENTITY,
                world: Mat4::IDENTITY,
                dirty: true,
            },
        );
    }

    #[inline]
    pub fn has_node(&self, node: NodeHandle) -> bool {
        self.nodes.contains_key(&node)
    }

    pub fn node_parent(&self, node: NodeHandle) -> Option<NodeHandle> {
        self.nodes.get(&node).and_then(|n| n.parent)
    }

    pub fn local_transform(&self, node: NodeHandle) -> Option<Mat4> {
        self.nodes.get(&node).map(|n| n.local)
    }

    /// Change a node's local matrix; returns the nodes marked dirty
    pub fn set_local_transform(&mut self, node: NodeHandle, local: Mat4) -> Vec<NodeHandle> {
        match self.nodes.get_mut(&node) {
            Some(n) => n.local = local,
            None => return Vec::new(),
        }
        self.mark_subtree_dirty(node)
    }

    /// Mark a node and all its descendants dirty; returns every node visited
    pub fn mark_subtree_dirty(&mut self, node: NodeHandle) -> Vec<NodeHandle> {
        let mut visited = Vec::new();
        let mut stack = vec![node];

        while let Some(current) = stack.pop() {
            if let Some(n) = self.nodes.get_mut(&current) {
                n.dirty = true;
                stack.extend(n.children.iter().copied());
                visited.push(current);
            }
        }

        visited
    }

    pub fn is_node_dirty(&self, node: NodeHandle) -> bool {
        self.nodes.get(&node).map(|n| n.dirty).unwrap_or(false)
    }

    /// Cached world matrix, `None` for unknown nodes
    pub fn world_matrix(&self, node: NodeHandle) -> Option<Mat4> {
        self.nodes.get(&node).map(|n| n.world)
    }

    /// Store a resolved world matrix and clear the dirty flag
    pub fn set_world_matrix(&mut self, node: NodeHandle, world: Mat4) {
        if let Some(n) = self.nodes.get_mut(&node) {
            n.world = world;
            n.dirty = false;
        }
    }

    /// Dirty nodes, parents before children
    pub fn dirty_nodes_in_hierarchy_order(&self) -> Vec<NodeHandle> {
        let mut roots: Vec<NodeHandle> = self
            .nodes
            .iter()
            .filter(|(_, n)| n.parent.is_none())
            .map(|(handle, _)| *handle)
            .collect();
        roots.sort();

        let mut ordered = Vec::new();
        let mut stack: Vec<NodeHandle> = roots.into_iter().rev().collect();
        while let Some(current) = stack.pop() {
            if let Some(n) = self.nodes.get(&current) {
                if n.dirty {
                    ordered.push(current);
                }
                stack.extend(n.children.iter().rev().copied());
            }
        }
        ordered
    }

    // ═══════════════════════════════════════════
    // DATA INSTANCES
    // ═══════════════════════════════════════════

    pub fn add_data_instance(&mut self, data: DataInstanceHandle, value: DataValue) {
        self.data_instances.insert(data, DataInstance { value, fallback: None });
    }

    /// Value currently visible to rendering
    pub fn data_value(&self, data: DataInstanceHandle) -> Option<DataValue> {
        self.data_instances.get(&data).map(|d| d.value)
    }

    pub fn data_type(&self, data: DataInstanceHandle) -> Option<DataType> {
        self.data_value(data).map(|v| v.data_type())
    }

    /// Client-side write
    ///
    /// While a provider overrides the instance the write lands in the saved
    /// fallback, so it becomes visible once the link goes away.
    pub fn set_data_value(&mut self, data: DataInstanceHandle, value: DataValue) -> bool {
        match self.data_instances.get_mut(&data) {
            Some(d) => {
                match d.fallback.as_mut() {
                    Some(fallback) => *fallback = value,
                    None => d.value = value,
                }
                true
            }
            None => false,
        }
    }

    /// Provider-side write, bypassing the fallback
    pub fn set_linked_data_value(&mut self, data: DataInstanceHandle, value: DataValue) {
        if let Some(d) = self.data_instances.get_mut(&data) {
            d.value = value;
        }
    }

    pub fn fallback_data_value(&self, data: DataInstanceHandle) -> Option<DataValue> {
        self.data_instances.get(&data).and_then(|d| d.fallback)
    }

    /// Save the current value; a second call keeps the first saved value
    pub fn store_data_fallback(&mut self, data: DataInstanceHandle) {
        if let Some(d) = self.data_instances.get_mut(&data) {
            d.fallback.get_or_insert(d.value);
        }
    }

    pub fn restore_data_fallback(&mut self, data: DataInstanceHandle) {
        if let Some(d) = self.data_instances.get_mut(&data) {
            if let Some(fallback) = d.fallback.take() {
                d.value = fallback;
            }
        }
    }

    // ═══════════════════════════════════════════
    // TEXTURE SAMPLERS
    // ═══════════════════════════════════════════

    pub fn add_sampler(&mut self, sampler: SamplerHandle, content: SamplerContent) {
        self.samplers.insert(sampler, TextureSampler { content, fallback: None });
    }

    pub fn sampler_content(&self, sampler: SamplerHandle) -> Option<SamplerContent> {
        self.samplers.get(&sampler).map(|s| s.content)
    }

    pub fn set_sampler_content_source(&mut self, sampler: SamplerHandle, content: SamplerContent) {
        if let Some(s) = self.samplers.get_mut(&sampler) {
            s.content = content;
        }
    }

    pub fn store_sampler_fallback(&mut self, sampler: SamplerHandle) {
        if let Some(s) = self.samplers.get_mut(&sampler) {
            s.fallback.get_or_insert(s.content);
        }
    }

    pub fn restore_sampler_fallback(&mut self, sampler: SamplerHandle) {
        if let Some(s) = self.samplers.get_mut(&sampler) {
            if let Some(fallback) = s.fallback.take() {
                s.content = fallback;
            }
        }
    }

    // ═══════════════════════════════════════════
    // DATA SLOTS
    // ═══════════════════════════════════════════

    pub fn add_data_slot(&mut self, slot: SlotHandle, slot_type: DataSlotType) {
        self.slots.insert(slot, slot_type);
    }

    pub fn data_slot(&self, slot: SlotHandle) -> Option<DataSlotType> {
        self.slots.get(&slot).copied()
    }

    /// Forget the slot; link teardown is the caller's job
    pub fn remove_data_slot(&mut self, slot: SlotHandle) -> Option<DataSlotType> {
        self.slots.remove(&slot)
    }

    /// Point a texture provider slot at new content
    pub fn set_slot_texture(&mut self, slot: SlotHandle, texture: TextureHash) -> bool {
        match self.slots.get_mut(&slot) {
            Some(slot_type @ DataSlotType::TextureProvider(_)) => {
                *slot_type = DataSlotType::TextureProvider(texture);
                true
            }
            _ => false,
        }
    }

    /// Slot handles, sorted
    pub fn slot_handles(&self) -> Vec<SlotHandle> {
        let mut handles: Vec<SlotHandle> = self.slots.keys().copied().collect();
        handles.sort();
        handles
    }
}

/// Handle-indexed arena of all scenes known to the renderer
#[derive(Debug, Default, Clone)]
pub struct RendererScenes {
    scenes: FxHashMap<SceneId, RendererScene>,
}

impl RendererScenes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create (or reset) a scene
    pub fn create_scene(&mut self, id: SceneId) -> &mut RendererScene {
        let scene = RendererScene::new(id);
        match self.scenes.entry(id) {
            Entry::Occupied(mut entry) => {
                entry.insert(scene);
                entry.into_mut()
            }
            Entry::Vacant(entry) => entry.insert(scene),
        }
    }

    /// Drop the scene's storage; links must be torn down first
    pub fn destroy_scene(&mut self, id: SceneId) -> Option<RendererScene> {
        self.scenes.remove(&id)
    }

    #[inline]
    pub fn contains(&self, id: SceneId) -> bool {
        self.scenes.contains_key(&id)
    }

    #[inline]
    pub fn get(&self, id: SceneId) -> Option<&RendererScene> {
        self.scenes.get(&id)
    }

    #[inline]
    pub fn get_mut(&mut self, id: SceneId) -> Option<&mut RendererScene> {
        self.scenes.get_mut(&id)
    }

    /// Slot metadata for a fully qualified slot
    pub fn data_slot(&self, slot: SlotRef) -> Result<DataSlotType, LinkError> {
        let scene = self
            .scenes
            .get(&slot.scene)
            .ok_or(LinkError::UnknownScene { scene: slot.scene })?;
        scene.data_slot(slot.slot).ok_or(LinkError::InvalidSlot {
            scene: slot.scene,
            slot: slot.slot,
        })
    }

    /// Scene ids, sorted
    pub fn ids(&self) -> Vec<SceneId> {
        let mut ids: Vec<SceneId> = self.scenes.keys().copied().collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.scenes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.scenes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec3;

    #[test]
    fn marks_whole_subtree_dirty() {
        let mut scene = RendererScene::new(SceneId(1));
        scene.add_node(NodeHandle(0), None);
        scene.add_node(NodeHandle(1), Some(NodeHandle(0)));
        scene.add_node(NodeHandle(2), Some(NodeHandle(1)));
        scene.add_node(NodeHandle(3), None);
        for n in 0..4 {
            scene.set_world_matrix(NodeHandle(n), Mat4::IDENTITY);
        }

        let dirtied = scene.mark_subtree_dirty(NodeHandle(1));

        assert_eq!(dirtied.len(), 2);
        assert!(!scene.is_node_dirty(NodeHandle(0)));
        assert!(scene.is_node_dirty(NodeHandle(1)));
        assert!(scene.is_node_dirty(NodeHandle(2)));
        assert!(!scene.is_node_dirty(NodeHandle(3)));
    }

    #[test]
    fn dirty_nodes_come_parents_first() {
        let mut scene = RendererScene::new(SceneId(1));
        scene.add_node(NodeHandle(5), None);
        scene.add_node(NodeHandle(2), Some(NodeHandle(5)));
        scene.add_node(NodeHandle(1), Some(NodeHandle(2)));

        let order = scene.dirty_nodes_in_hierarchy_order();
        assert_eq!(order, vec![NodeHandle(5), NodeHandle(2), NodeHandle(1)]);
    }

    #[test]
    fn client_write_while_overridden_updates_fallback() {
        let mut scene = RendererScene::new(SceneId(1));
        let data = DataInstanceHandle(0);
        scene.add_data_instance(data, DataValue::Float(1.0));

        scene.store_data_fallback(data);
        scene.set_linked_data_value(data, DataValue::Float(5.0));
        assert!(scene.set_data_value(data, DataValue::Float(2.0)));
        assert_eq!(scene.data_value(data), Some(DataValue::Float(5.0)));

        scene.restore_data_fallback(data);
        assert_eq!(scene.data_value(data), Some(DataValue::Float(2.0)));
        assert_eq!(scene.fallback_data_value(data), None);
    }

    #[test]
    fn sampler_fallback_round_trip() {
        let mut scene = RendererScene::new(SceneId(1));
        let sampler = SamplerHandle(3);
        let own = SamplerContent::ClientTexture(TextureHash(0xaa));
        scene.add_sampler(sampler, own);

        scene.store_sampler_fallback(sampler);
        scene.set_sampler_content_source(sampler, SamplerContent::ClientTexture(TextureHash(0xbb)));
        scene.store_sampler_fallback(sampler);
        scene.restore_sampler_fallback(sampler);

        assert_eq!(scene.sampler_content(sampler), Some(own));
    }

    #[test]
    fn local_transform_change_dirties_node() {
        let mut scene = RendererScene::new(SceneId(1));
        scene.add_node(NodeHandle(0), None);
        scene.set_world_matrix(NodeHandle(0), Mat4::IDENTITY);

        let m = Mat4::from_translation(Vec3::X);
        assert_eq!(scene.set_local_transform(NodeHandle(0), m), vec![NodeHandle(0)]);
        assert_eq!(scene.local_transform(NodeHandle(0)), Some(m));
        assert!(scene.is_node_dirty(NodeHandle(0)));
    }

    #[test]
    fn scenes_are_looked_up_by_handle() {
        let mut scenes = RendererScenes::new();
        scenes.create_scene(SceneId(4));
        scenes.create_scene(SceneId(3));

        assert_eq!(scenes.ids(), vec![SceneId(3), SceneId(4)]);
        assert!(scenes.destroy_scene(SceneId(3)).is_some());
        assert!(scenes.get(SceneId(3)).is_none());
        assert!(scenes.destroy_scene(SceneId(3)).is_none());
    }

    #[test]
    fn slot_lookup_reports_missing_scene_and_slot() {
        let mut scenes = RendererScenes::new();
        scenes
            .create_scene(SceneId(4))
            .add_data_slot(SlotHandle(54), DataSlotType::DataConsumer(DataInstanceHandle(0)));

        assert_eq!(
            scenes.data_slot(SlotRef::new(SceneId(4), SlotHandle(54))),
            Ok(DataSlotType::DataConsumer(DataInstanceHandle(0)))
        );
        assert_eq!(
            scenes.data_slot(SlotRef::new(SceneId(4), SlotHandle(1))),
            Err(LinkError::InvalidSlot { scene: SceneId(4), slot: SlotHandle(1) })
        );
        assert_eq!(
            scenes.data_slot(SlotRef::new(SceneId(9), SlotHandle(54))),
            Err(LinkError::UnknownScene { scene: SceneId(9) })
        );
    }
}
