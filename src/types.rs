//! Handle types shared by the scene model and the link managers
//!
//! Every entity is referenced by a small integer handle, never by pointer.
//! Scenes are destroyed independently of the link registry, so a stale
//! handle simply misses on lookup.

use std::fmt;

use glam::{Mat4, Vec2, Vec3, Vec4};
use serde::{Deserialize, Serialize};

macro_rules! handle_type {
    ($(#[$meta:meta])* $name:ident, $prefix:literal) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
        )]
        #[serde(transparent)]
        pub struct $name(pub u32);

        impl $name {
            #[inline]
            pub const fn new(value: u32) -> Self {
                Self(value)
            }

            #[inline]
            pub const fn value(self) -> u32 {
                self.0
            }
        }

        impl From<u32> for $name {
            fn from(value: u32) -> Self {
                Self(value)
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, concat!($prefix, "{}"), self.0)
            }
        }
    };
}

handle_type!(
    /// Identifies one independently-lifecycled scene
    SceneId,
    "scene:"
);
handle_type!(
    /// Data slot index, unique within its scene
    SlotHandle,
    "slot:"
);
handle_type!(NodeHandle, "node:");
handle_type!(DataInstanceHandle, "data:");
handle_type!(SamplerHandle, "sampler:");
handle_type!(
    /// Offscreen render target usable as a texture provider
    OffscreenBufferId,
    "buffer:"
);
handle_type!(
    /// Compositor stream usable as a texture provider
    StreamBufferId,
    "stream:"
);

/// Content hash of a client texture resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TextureHash(pub u64);

impl fmt::Display for TextureHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "texture:{:#x}", self.0)
    }
}

/// Fully qualified slot: scene plus slot handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SlotRef {
    pub scene: SceneId,
    pub slot: SlotHandle,
}

impl SlotRef {
    #[inline]
    pub const fn new(scene: SceneId, slot: SlotHandle) -> Self {
        Self { scene, slot }
    }
}

impl fmt::Display for SlotRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scene, self.slot)
    }
}

/// Which side of a link a slot sits on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotRole {
    Provider,
    Consumer,
}

/// What a slot carries across a link
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    Transformation,
    DataReference,
    Texture,
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PayloadKind::Transformation => "transformation",
            PayloadKind::DataReference => "data reference",
            PayloadKind::Texture => "texture",
        };
        f.write_str(name)
    }
}

/// A data slot together with the scene content it is attached to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataSlotType {
    TransformationProvider(NodeHandle),
    TransformationConsumer(NodeHandle),
    DataProvider(DataInstanceHandle),
    DataConsumer(DataInstanceHandle),
    TextureProvider(TextureHash),
    TextureConsumer(SamplerHandle),
}

impl DataSlotType {
    pub fn role(&self) -> SlotRole {
        match self {
            Self::TransformationProvider(_) | Self::DataProvider(_) | Self::TextureProvider(_) => {
                SlotRole::Provider
            }
            Self::TransformationConsumer(_) | Self::DataConsumer(_) | Self::TextureConsumer(_) => {
                SlotRole::Consumer
            }
        }
    }

    pub fn payload(&self) -> PayloadKind {
        match self {
            Self::TransformationProvider(_) | Self::TransformationConsumer(_) => {
                PayloadKind::Transformation
            }
            Self::DataProvider(_) | Self::DataConsumer(_) => PayloadKind::DataReference,
            Self::TextureProvider(_) | Self::TextureConsumer(_) => PayloadKind::Texture,
        }
    }

    pub fn node(&self) -> Option<NodeHandle> {
        match self {
            Self::TransformationProvider(node) | Self::TransformationConsumer(node) => Some(*node),
            _ => None,
        }
    }

    pub fn data_instance(&self) -> Option<DataInstanceHandle> {
        match self {
            Self::DataProvider(data) | Self::DataConsumer(data) => Some(*data),
            _ => None,
        }
    }

    pub fn sampler(&self) -> Option<SamplerHandle> {
        match self {
            Self::TextureConsumer(sampler) => Some(*sampler),
            _ => None,
        }
    }

    pub fn texture(&self) -> Option<TextureHash> {
        match self {
            Self::TextureProvider(hash) => Some(*hash),
            _ => None,
        }
    }
}

/// Declared value type of a data instance
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataType {
    Int32,
    Float,
    Vector2,
    Vector3,
    Vector4,
    Matrix4,
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DataType::Int32 => "int32",
            DataType::Float => "float",
            DataType::Vector2 => "vec2",
            DataType::Vector3 => "vec3",
            DataType::Vector4 => "vec4",
            DataType::Matrix4 => "mat4",
        };
        f.write_str(name)
    }
}

/// A typed value held by a data instance
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum DataValue {
    Int32(i32),
    Float(f32),
    Vector2(Vec2),
    Vector3(Vec3),
    Vector4(Vec4),
    Matrix4(Mat4),
}

impl DataValue {
    pub fn data_type(&self) -> DataType {
        match self {
            DataValue::Int32(_) => DataType::Int32,
            DataValue::Float(_) => DataType::Float,
            DataValue::Vector2(_) => DataType::Vector2,
            DataValue::Vector3(_) => DataType::Vector3,
            DataValue::Vector4(_) => DataType::Vector4,
            DataValue::Matrix4(_) => DataType::Matrix4,
        }
    }
}

impl fmt::Display for DataValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DataValue::Int32(v) => write!(f, "{v}"),
            DataValue::Float(v) => write!(f, "{v}"),
            DataValue::Vector2(v) => write!(f, "{v}"),
            DataValue::Vector3(v) => write!(f, "{v}"),
            DataValue::Vector4(v) => write!(f, "{v}"),
            DataValue::Matrix4(m) => write!(f, "{m}"),
        }
    }
}

/// Where a texture sampler currently draws its pixels from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SamplerContent {
    ClientTexture(TextureHash),
    OffscreenBuffer(OffscreenBufferId),
    StreamBuffer(StreamBufferId),
}

/// Which matrix a linked transformation lookup returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MatrixKind {
    World,
    /// Inverse of the world matrix
    Object,
}
