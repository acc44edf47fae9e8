//! Scene Links - cross-scene link registry for a multi-scene renderer

pub mod data_reference;
pub mod dependency;
pub mod error;
pub mod events;
pub mod link_manager;
pub mod links;
pub mod registry;
pub mod scenario;
pub mod scene;
pub mod scene_links_manager;
pub mod texture;
pub mod transformation;
pub mod types;

pub use data_reference::DataReferenceLinkManager;
pub use dependency::SceneDependencyChecker;
pub use error::{FixSuggestion, LinkError};
pub use events::{RendererEvent, RendererEventCollector, RendererEventKind};
pub use link_manager::LinkManager;
pub use links::{BufferLink, Link, LinkProvider, LinkTable, SceneLink, StreamLink};
pub use registry::LinkRegistry;
pub use scenario::{Scenario, ScenarioReport};
pub use scene::{RendererScene, RendererScenes};
pub use scene_links_manager::{LinkInfo, SceneLinksManager};
pub use texture::{TextureLink, TextureLinkManager, TextureProvider};
pub use transformation::TransformationLinkManager;
pub use types::{
    DataInstanceHandle, DataSlotType, DataType, DataValue, MatrixKind, NodeHandle,
    OffscreenBufferId, PayloadKind, SamplerContent, SamplerHandle, SceneId, SlotHandle, SlotRef,
    SlotRole, StreamBufferId, TextureHash,
};
