//! YAML scenarios (v0.1)
//!
//! A scenario declares scenes with their nodes, data instances, samplers
//! and slots, then replays an ordered list of link commands against a
//! [`LinkRegistry`]. Failed commands are outcomes, not aborts: they show up
//! in the report and as failure events.

use std::fmt;

use glam::{Mat4, Quat, Vec2, Vec3, Vec4};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::LinkError;
use crate::events::RendererEvent;
use crate::registry::LinkRegistry;
use crate::scene_links_manager::LinkInfo;
use crate::texture::TextureProvider;
use crate::types::{
    DataInstanceHandle, DataSlotType, DataValue, NodeHandle, OffscreenBufferId, SamplerContent,
    SamplerHandle, SceneId, SlotHandle, SlotRef, StreamBufferId, TextureHash,
};

pub const SCHEMA: &str = "scene-links/scenario@0.1";

#[derive(Debug, Deserialize)]
pub struct Scenario {
    pub schema: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub scenes: Vec<SceneDef>,
    #[serde(default)]
    pub commands: Vec<Command>,
}

#[derive(Debug, Deserialize)]
pub struct SceneDef {
    pub id: SceneId,
    #[serde(default)]
    pub nodes: Vec<NodeDef>,
    #[serde(default)]
    pub data: Vec<DataDef>,
    #[serde(default)]
    pub samplers: Vec<SamplerDef>,
    #[serde(default)]
    pub slots: Vec<SlotDef>,
}

#[derive(Debug, Deserialize)]
pub struct NodeDef {
    pub id: NodeHandle,
    #[serde(default)]
    pub parent: Option<NodeHandle>,
    #[serde(default)]
    pub translation: Option<[f32; 3]>,
    #[serde(default)]
    pub scale: Option<[f32; 3]>,
}

#[derive(Debug, Deserialize)]
pub struct DataDef {
    pub id: DataInstanceHandle,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub value: ValueDef,
}

#[derive(Debug, Deserialize)]
pub struct SamplerDef {
    pub id: SamplerHandle,
    pub texture: TextureHash,
}

/// Typed value as written in YAML: `{ float: 2.5 }`, `{ vector3: [1, 0, 0] }`
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueDef {
    Int32(i32),
    Float(f32),
    Vector2([f32; 2]),
    Vector3([f32; 3]),
    Vector4([f32; 4]),
    /// Column-major
    Matrix4([f32; 16]),
}

impl From<ValueDef> for DataValue {
    fn from(value: ValueDef) -> Self {
        match value {
            ValueDef::Int32(v) => DataValue::Int32(v),
            ValueDef::Float(v) => DataValue::Float(v),
            ValueDef::Vector2(v) => DataValue::Vector2(Vec2::from_array(v)),
            ValueDef::Vector3(v) => DataValue::Vector3(Vec3::from_array(v)),
            ValueDef::Vector4(v) => DataValue::Vector4(Vec4::from_array(v)),
            ValueDef::Matrix4(m) => DataValue::Matrix4(Mat4::from_cols_array(&m)),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SlotDef {
    TransformationProvider { id: SlotHandle, node: NodeHandle },
    TransformationConsumer { id: SlotHandle, node: NodeHandle },
    DataProvider { id: SlotHandle, data: DataInstanceHandle },
    DataConsumer { id: SlotHandle, data: DataInstanceHandle },
    TextureProvider { id: SlotHandle, texture: TextureHash },
    TextureConsumer { id: SlotHandle, sampler: SamplerHandle },
}

impl SlotDef {
    pub fn id(&self) -> SlotHandle {
        match self {
            SlotDef::TransformationProvider { id, .. }
            | SlotDef::TransformationConsumer { id, .. }
            | SlotDef::DataProvider { id, .. }
            | SlotDef::DataConsumer { id, .. }
            | SlotDef::TextureProvider { id, .. }
            | SlotDef::TextureConsumer { id, .. } => *id,
        }
    }

    pub fn slot_type(&self) -> DataSlotType {
        match *self {
            SlotDef::TransformationProvider { node, .. } => {
                DataSlotType::TransformationProvider(node)
            }
            SlotDef::TransformationConsumer { node, .. } => {
                DataSlotType::TransformationConsumer(node)
            }
            SlotDef::DataProvider { data, .. } => DataSlotType::DataProvider(data),
            SlotDef::DataConsumer { data, .. } => DataSlotType::DataConsumer(data),
            SlotDef::TextureProvider { texture, .. } => DataSlotType::TextureProvider(texture),
            SlotDef::TextureConsumer { sampler, .. } => DataSlotType::TextureConsumer(sampler),
        }
    }
}

// ═══════════════════════════════════════════
// COMMANDS
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct LinkDef {
    pub provider: SlotRef,
    pub consumer: SlotRef,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct BufferLinkDef {
    pub buffer: OffscreenBufferId,
    pub consumer: SlotRef,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct StreamLinkDef {
    pub stream: StreamBufferId,
    pub consumer: SlotRef,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct UnlinkDef {
    pub consumer: SlotRef,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct RebindDef {
    pub consumer: SlotRef,
    pub provider: ProviderDef,
}

/// New provider of a rebind: `{ slot: {...} }`, `{ buffer: 7 }` or `{ stream: 9 }`
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum ProviderDef {
    Slot { slot: SlotRef },
    Buffer { buffer: OffscreenBufferId },
    Stream { stream: StreamBufferId },
}

impl From<ProviderDef> for TextureProvider {
    fn from(def: ProviderDef) -> Self {
        match def {
            ProviderDef::Slot { slot } => TextureProvider::SceneSlot(slot),
            ProviderDef::Buffer { buffer } => TextureProvider::OffscreenBuffer(buffer),
            ProviderDef::Stream { stream } => TextureProvider::StreamBuffer(stream),
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct TransformDef {
    pub scene: SceneId,
    pub node: NodeHandle,
    #[serde(default)]
    pub translation: Option<[f32; 3]>,
    #[serde(default)]
    pub scale: Option<[f32; 3]>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SetDataDef {
    pub scene: SceneId,
    pub data: DataInstanceHandle,
    #[serde(with = "serde_yaml::with::singleton_map")]
    pub value: ValueDef,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub struct SetTextureDef {
    pub slot: SlotRef,
    pub texture: TextureHash,
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Keyword {
    /// Run the per-frame resolution pass
    Update,
}

/// One scenario step - serde picks the variant by its key
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum Command {
    Link { link: LinkDef },
    LinkBuffer { link_buffer: BufferLinkDef },
    LinkStream { link_stream: StreamLinkDef },
    Rebind { rebind: RebindDef },
    Unlink { unlink: UnlinkDef },
    DestroyScene { destroy_scene: SceneId },
    UnmapScene { unmap_scene: SceneId },
    ReleaseSlot { release_slot: SlotRef },
    SetTransform { set_transform: TransformDef },
    SetData { set_data: SetDataDef },
    SetTexture { set_texture: SetTextureDef },
    DestroyBuffer { destroy_buffer: OffscreenBufferId },
    DestroyStream { destroy_stream: StreamBufferId },
    Keyword(Keyword),
}

impl Command {
    fn apply(&self, registry: &mut LinkRegistry) -> Result<(), LinkError> {
        match *self {
            Command::Link { link } => registry.create_data_link(link.provider, link.consumer),
            Command::LinkBuffer { link_buffer: l } => {
                registry.create_buffer_link(l.buffer, l.consumer)
            }
            Command::LinkStream { link_stream: l } => {
                registry.create_stream_link(l.stream, l.consumer)
            }
            Command::Rebind { rebind } => {
                registry.rebind_texture_consumer(rebind.provider.into(), rebind.consumer)
            }
            Command::Unlink { unlink } => registry.remove_data_link(unlink.consumer).map(|_| ()),
            Command::DestroyScene { destroy_scene } => registry.destroy_scene(destroy_scene),
            Command::UnmapScene { unmap_scene } => registry.unmap_scene(unmap_scene),
            Command::ReleaseSlot { release_slot } => {
                registry.release_data_slot(release_slot).map(|_| ())
            }
            Command::SetTransform { set_transform: t } => {
                registry.set_local_transform(t.scene, t.node, local_matrix(t.translation, t.scale))
            }
            Command::SetData { set_data: d } => {
                registry.set_data_value(d.scene, d.data, d.value.into())
            }
            Command::SetTexture { set_texture: t } => registry.set_texture(t.slot, t.texture),
            Command::DestroyBuffer { destroy_buffer } => {
                registry.destroy_offscreen_buffer(destroy_buffer);
                Ok(())
            }
            Command::DestroyStream { destroy_stream } => {
                registry.destroy_stream(destroy_stream);
                Ok(())
            }
            Command::Keyword(Keyword::Update) => {
                registry.update();
                Ok(())
            }
        }
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::Link { link } => write!(f, "link {} -> {}", link.provider, link.consumer),
            Command::LinkBuffer { link_buffer: l } => {
                write!(f, "link_buffer {} -> {}", l.buffer, l.consumer)
            }
            Command::LinkStream { link_stream: l } => {
                write!(f, "link_stream {} -> {}", l.stream, l.consumer)
            }
            Command::Rebind { rebind } => {
                let consumer = rebind.consumer;
                match rebind.provider {
                    ProviderDef::Slot { slot } => write!(f, "rebind {slot} -> {consumer}"),
                    ProviderDef::Buffer { buffer } => write!(f, "rebind {buffer} -> {consumer}"),
                    ProviderDef::Stream { stream } => write!(f, "rebind {stream} -> {consumer}"),
                }
            }
            Command::Unlink { unlink } => write!(f, "unlink {}", unlink.consumer),
            Command::DestroyScene { destroy_scene } => write!(f, "destroy_scene {destroy_scene}"),
            Command::UnmapScene { unmap_scene } => write!(f, "unmap_scene {unmap_scene}"),
            Command::ReleaseSlot { release_slot } => write!(f, "release_slot {release_slot}"),
            Command::SetTransform { set_transform: t } => {
                write!(f, "set_transform {}/{}", t.scene, t.node)
            }
            Command::SetData { set_data: d } => {
                write!(f, "set_data {}/{} = {}", d.scene, d.data, DataValue::from(d.value))
            }
            Command::SetTexture { set_texture: t } => {
                write!(f, "set_texture {} = {}", t.slot, t.texture)
            }
            Command::DestroyBuffer { destroy_buffer } => {
                write!(f, "destroy_buffer {destroy_buffer}")
            }
            Command::DestroyStream { destroy_stream } => {
                write!(f, "destroy_stream {destroy_stream}")
            }
            Command::Keyword(Keyword::Update) => f.write_str("update"),
        }
    }
}

fn local_matrix(translation: Option<[f32; 3]>, scale: Option<[f32; 3]>) -> Mat4 {
    Mat4::from_scale_rotation_translation(
        scale.map(Vec3::from_array).unwrap_or(Vec3::ONE),
        Quat::IDENTITY,
        translation.map(Vec3::from_array).unwrap_or(Vec3::ZERO),
    )
}

// ═══════════════════════════════════════════
// REPORT
// ═══════════════════════════════════════════

#[derive(Debug, Clone, Serialize)]
pub struct StepOutcome {
    pub step: usize,
    pub command: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl StepOutcome {
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }
}

/// Resolved value of one data instance after the run
#[derive(Debug, Clone, Serialize)]
pub struct DataSnapshot {
    pub scene: SceneId,
    pub data: DataInstanceHandle,
    pub value: String,
}

/// Content source of one sampler after the run
#[derive(Debug, Clone, Serialize)]
pub struct SamplerSnapshot {
    pub scene: SceneId,
    pub sampler: SamplerHandle,
    pub content: SamplerContent,
}

#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub steps: Vec<StepOutcome>,
    pub events: Vec<RendererEvent>,
    pub links: Vec<LinkInfo>,
    pub data: Vec<DataSnapshot>,
    pub samplers: Vec<SamplerSnapshot>,
}

impl ScenarioReport {
    pub fn failed_steps(&self) -> usize {
        self.steps.iter().filter(|s| !s.is_ok()).count()
    }
}

// ═══════════════════════════════════════════
// LOAD / VALIDATE / RUN
// ═══════════════════════════════════════════

impl Scenario {
    /// Parse and validate
    pub fn from_yaml(yaml: &str) -> Result<Self, LinkError> {
        let scenario: Scenario = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Structural checks: schema tag, unique ids, attachments declared
    pub fn validate(&self) -> Result<(), LinkError> {
        if self.schema != SCHEMA {
            return Err(LinkError::Scenario(format!(
                "Invalid schema: expected '{SCHEMA}', got '{}'",
                self.schema
            )));
        }

        let mut scene_ids = FxHashSet::default();
        for scene in &self.scenes {
            if !scene_ids.insert(scene.id) {
                return Err(LinkError::Scenario(format!("duplicate scene id {}", scene.id)));
            }
            scene.validate()?;
        }
        Ok(())
    }

    /// Registry holding the declared scenes, nothing linked yet
    pub fn build(&self) -> LinkRegistry {
        let mut registry = LinkRegistry::new();
        for def in &self.scenes {
            let scene = registry.create_scene(def.id);
            for node in &def.nodes {
                scene.add_node(node.id, node.parent);
                scene.set_local_transform(node.id, local_matrix(node.translation, node.scale));
            }
            for data in &def.data {
                scene.add_data_instance(data.id, data.value.into());
            }
            for sampler in &def.samplers {
                scene.add_sampler(sampler.id, SamplerContent::ClientTexture(sampler.texture));
            }
            for slot in &def.slots {
                scene.add_data_slot(slot.id(), slot.slot_type());
            }
        }
        registry
    }

    /// Replay every command, then snapshot events, links and values
    pub fn run(&self) -> ScenarioReport {
        let mut registry = self.build();
        let steps = self
            .commands
            .iter()
            .enumerate()
            .map(|(index, command)| {
                let error = command.apply(&mut registry).err().map(|e| e.to_string());
                debug!(step = index + 1, %command, ok = error.is_none(), "scenario step");
                StepOutcome { step: index + 1, command: command.to_string(), error }
            })
            .collect();

        let mut data = Vec::new();
        let mut samplers = Vec::new();
        for def in &self.scenes {
            for d in &def.data {
                if let Some(value) = registry.data_value(def.id, d.id) {
                    data.push(DataSnapshot { scene: def.id, data: d.id, value: value.to_string() });
                }
            }
            for s in &def.samplers {
                if let Some(content) = registry.sampler_content(def.id, s.id) {
                    samplers.push(SamplerSnapshot { scene: def.id, sampler: s.id, content });
                }
            }
        }

        ScenarioReport {
            steps,
            events: registry.consume_events(),
            links: registry.all_links(),
            data,
            samplers,
        }
    }
}

impl SceneDef {
    fn validate(&self) -> Result<(), LinkError> {
        let scene = self.id;
        let invalid = |what: String| LinkError::Scenario(format!("{scene}: {what}"));

        let mut nodes = FxHashSet::default();
        for node in &self.nodes {
            if let Some(parent) = node.parent {
                if !nodes.contains(&parent) {
                    let what = format!("parent {parent} of {} must be declared first", node.id);
                    return Err(invalid(what));
                }
            }
            if !nodes.insert(node.id) {
                return Err(invalid(format!("duplicate node {}", node.id)));
            }
        }

        let mut data = FxHashSet::default();
        for d in &self.data {
            if !data.insert(d.id) {
                return Err(invalid(format!("duplicate data instance {}", d.id)));
            }
        }

        let mut samplers = FxHashSet::default();
        for s in &self.samplers {
            if !samplers.insert(s.id) {
                return Err(invalid(format!("duplicate sampler {}", s.id)));
            }
        }

        let mut slots = FxHashSet::default();
        for slot in &self.slots {
            if !slots.insert(slot.id()) {
                return Err(invalid(format!("duplicate slot {}", slot.id())));
            }
            let attached = match slot.slot_type() {
                DataSlotType::TransformationProvider(node)
                | DataSlotType::TransformationConsumer(node) => nodes.contains(&node),
                DataSlotType::DataProvider(d) | DataSlotType::DataConsumer(d) => data.contains(&d),
                DataSlotType::TextureConsumer(sampler) => samplers.contains(&sampler),
                DataSlotType::TextureProvider(_) => true,
            };
            if !attached {
                let what = format!("slot {} is attached to undeclared content", slot.id());
                return Err(invalid(what));
            }
        }
        Ok(())
    }
}
