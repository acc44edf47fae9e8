//! Error types with fix suggestions

use thiserror::Error;

use crate::types::{
    DataInstanceHandle, DataSlotType, DataType, NodeHandle, PayloadKind, SceneId, SlotHandle,
    SlotRef, SlotRole,
};

/// Trait for errors that provide fix suggestions
pub trait FixSuggestion {
    fn fix_suggestion(&self) -> Option<&str>;
}

/// Every rejected link operation leaves the registry untouched.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum LinkError {
    // ─────────────────────────────────────────────────────────────
    // Link creation (LINK-010 to LINK-016)
    // ─────────────────────────────────────────────────────────────

    #[error("LINK-010: Consumer {consumer} is already linked to a provider")]
    ConsumerAlreadyLinked { consumer: SlotRef },

    #[error(
        "LINK-011: Linking {consumer_scene} to provider {provider_scene} \
         would create a dependency cycle"
    )]
    WouldCreateCycle { provider_scene: SceneId, consumer_scene: SceneId },

    #[error(
        "LINK-012: Provider {provider} has type {provider_type} \
         but consumer {consumer} expects {consumer_type}"
    )]
    TypeMismatch {
        provider: SlotRef,
        consumer: SlotRef,
        provider_type: DataType,
        consumer_type: DataType,
    },

    #[error("LINK-013: Consumer {consumer} is already linked to provider slot {provider}")]
    AlreadyHasSceneLink { consumer: SlotRef, provider: SlotRef },

    #[error("LINK-014: Consumer {consumer} is already linked to an offscreen buffer or stream")]
    AlreadyHasVirtualLink { consumer: SlotRef },

    #[error("LINK-015: Slot {slot} is not a {expected:?} slot")]
    SlotRoleMismatch { slot: SlotRef, expected: SlotRole },

    #[error("LINK-016: Slot {slot} carries {actual} content, expected {expected}")]
    PayloadMismatch { slot: SlotRef, expected: PayloadKind, actual: PayloadKind },

    // ─────────────────────────────────────────────────────────────
    // Link removal and lookup (LINK-020 to LINK-024)
    // ─────────────────────────────────────────────────────────────

    #[error("LINK-020: Consumer {consumer} has no active link")]
    NotLinked { consumer: SlotRef },

    #[error("LINK-021: Slot {slot} does not exist in {scene}")]
    InvalidSlot { scene: SceneId, slot: SlotHandle },

    #[error("LINK-022: Scene {scene} is not known to the renderer")]
    UnknownScene { scene: SceneId },

    #[error("LINK-023: Node {node} does not exist in {scene}")]
    UnknownNode { scene: SceneId, node: NodeHandle },

    #[error("LINK-024: Data instance {data} does not exist in {scene}")]
    UnknownDataInstance { scene: SceneId, data: DataInstanceHandle },

    // ─────────────────────────────────────────────────────────────
    // Scenario tooling (LINK-090 to LINK-092)
    // ─────────────────────────────────────────────────────────────

    #[error("LINK-090: YAML parse error: {0}")]
    YamlParse(String),

    #[error("LINK-091: IO error: {0}")]
    Io(String),

    #[error("LINK-092: Invalid scenario: {0}")]
    Scenario(String),
}

impl From<serde_yaml::Error> for LinkError {
    fn from(err: serde_yaml::Error) -> Self {
        LinkError::YamlParse(err.to_string())
    }
}

impl From<std::io::Error> for LinkError {
    fn from(err: std::io::Error) -> Self {
        LinkError::Io(err.to_string())
    }
}

impl LinkError {
    /// Error for a slot that exists but has the wrong role or payload
    pub fn wrong_slot(
        slot: SlotRef,
        actual: DataSlotType,
        role: SlotRole,
        payload: PayloadKind,
    ) -> Self {
        if actual.role() != role {
            LinkError::SlotRoleMismatch { slot, expected: role }
        } else {
            LinkError::PayloadMismatch { slot, expected: payload, actual: actual.payload() }
        }
    }

    /// Stable code, e.g. `LINK-011`
    pub fn code(&self) -> &'static str {
        match self {
            LinkError::ConsumerAlreadyLinked { .. } => "LINK-010",
            LinkError::WouldCreateCycle { .. } => "LINK-011",
            LinkError::TypeMismatch { .. } => "LINK-012",
            LinkError::AlreadyHasSceneLink { .. } => "LINK-013",
            LinkError::AlreadyHasVirtualLink { .. } => "LINK-014",
            LinkError::SlotRoleMismatch { .. } => "LINK-015",
            LinkError::PayloadMismatch { .. } => "LINK-016",
            LinkError::NotLinked { .. } => "LINK-020",
            LinkError::InvalidSlot { .. } => "LINK-021",
            LinkError::UnknownScene { .. } => "LINK-022",
            LinkError::UnknownNode { .. } => "LINK-023",
            LinkError::UnknownDataInstance { .. } => "LINK-024",
            LinkError::YamlParse(_) => "LINK-090",
            LinkError::Io(_) => "LINK-091",
            LinkError::Scenario(_) => "LINK-092",
        }
    }
}

impl FixSuggestion for LinkError {
    fn fix_suggestion(&self) -> Option<&str> {
        match self {
            LinkError::ConsumerAlreadyLinked { .. } => {
                Some("Unlink the consumer first, or rebind it explicitly")
            }
            LinkError::WouldCreateCycle { .. } => {
                Some("Scenes cannot depend on themselves, directly or through other scenes")
            }
            LinkError::TypeMismatch { .. } => {
                Some("Declare provider and consumer data with the same value type")
            }
            LinkError::AlreadyHasSceneLink { .. } => {
                Some("Remove the existing scene link before linking a buffer")
            }
            LinkError::AlreadyHasVirtualLink { .. } => {
                Some("Remove the existing buffer or stream link first")
            }
            LinkError::SlotRoleMismatch { .. } => {
                Some("Check argument order: provider scene/slot first, consumer second")
            }
            LinkError::PayloadMismatch { .. } => {
                Some("Link transformation, data and texture slots only to slots of the same kind")
            }
            LinkError::NotLinked { .. } => {
                Some("Nothing to unlink; check the consumer scene and slot")
            }
            LinkError::InvalidSlot { .. } => Some("Create the slot in the scene before linking it"),
            LinkError::UnknownScene { .. } => Some("Verify the scene exists and was not destroyed"),
            LinkError::UnknownNode { .. } => {
                Some("Declare the node in the scene before transforming it")
            }
            LinkError::UnknownDataInstance { .. } => {
                Some("Declare the data instance in the scene before writing it")
            }
            LinkError::YamlParse(_) => Some("Check YAML syntax: indentation and quoting"),
            LinkError::Io(_) => Some("Check file path and permissions"),
            LinkError::Scenario(_) => {
                Some("Use schema: scene-links/scenario@0.1 and unique scene ids")
            }
        }
    }
}
