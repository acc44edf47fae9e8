//! Renderer events for link-level outcomes
//!
//! - RendererEvent: envelope with a monotonic id + kind
//! - RendererEventKind: link, unlink and slot-destruction outcomes
//! - RendererEventCollector: shareable, append-only, drained by the caller

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;

use crate::error::LinkError;
use crate::texture::TextureProvider;
use crate::types::SlotRef;

/// Single recorded outcome
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RendererEvent {
    /// Monotonic sequence id
    pub id: u64,
    pub kind: RendererEventKind,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RendererEventKind {
    // ═══════════════════════════════════════════
    // LINKING
    // ═══════════════════════════════════════════
    SceneDataLinked {
        provider: SlotRef,
        consumer: SlotRef,
    },
    SceneDataLinkFailed {
        provider: SlotRef,
        consumer: SlotRef,
        error: String,
    },
    /// Offscreen buffer or stream linked to a texture consumer
    SceneDataBufferLinked {
        provider: TextureProvider,
        consumer: SlotRef,
    },
    SceneDataBufferLinkFailed {
        provider: TextureProvider,
        consumer: SlotRef,
        error: String,
    },

    // ═══════════════════════════════════════════
    // UNLINKING
    // ═══════════════════════════════════════════
    SceneDataUnlinked {
        consumer: SlotRef,
    },
    SceneDataUnlinkFailed {
        consumer: SlotRef,
        error: String,
    },
    /// Link torn down because a slot, scene or buffer went away
    SceneDataUnlinkedAsResultOfClientSceneChange {
        consumer: SlotRef,
    },

    // ═══════════════════════════════════════════
    // SLOTS
    // ═══════════════════════════════════════════
    SceneDataSlotProviderDestroyed {
        provider: SlotRef,
    },
    SceneDataSlotConsumerDestroyed {
        consumer: SlotRef,
    },
}

impl RendererEventKind {
    pub fn link_failed(provider: SlotRef, consumer: SlotRef, error: &LinkError) -> Self {
        Self::SceneDataLinkFailed { provider, consumer, error: error.to_string() }
    }

    pub fn buffer_link_failed(
        provider: TextureProvider,
        consumer: SlotRef,
        error: &LinkError,
    ) -> Self {
        Self::SceneDataBufferLinkFailed { provider, consumer, error: error.to_string() }
    }

    pub fn unlink_failed(consumer: SlotRef, error: &LinkError) -> Self {
        Self::SceneDataUnlinkFailed { consumer, error: error.to_string() }
    }

    /// Consumer slot the event is about, if any
    pub fn consumer(&self) -> Option<SlotRef> {
        match self {
            Self::SceneDataLinked { consumer, .. }
            | Self::SceneDataLinkFailed { consumer, .. }
            | Self::SceneDataBufferLinked { consumer, .. }
            | Self::SceneDataBufferLinkFailed { consumer, .. }
            | Self::SceneDataUnlinked { consumer }
            | Self::SceneDataUnlinkFailed { consumer, .. }
            | Self::SceneDataUnlinkedAsResultOfClientSceneChange { consumer }
            | Self::SceneDataSlotConsumerDestroyed { consumer } => Some(*consumer),
            Self::SceneDataSlotProviderDestroyed { .. } => None,
        }
    }

    pub fn is_failure(&self) -> bool {
        matches!(
            self,
            Self::SceneDataLinkFailed { .. }
                | Self::SceneDataBufferLinkFailed { .. }
                | Self::SceneDataUnlinkFailed { .. }
        )
    }

    /// Short event name for text output
    pub fn name(&self) -> &'static str {
        match self {
            Self::SceneDataLinked { .. } => "SceneDataLinked",
            Self::SceneDataLinkFailed { .. } => "SceneDataLinkFailed",
            Self::SceneDataBufferLinked { .. } => "SceneDataBufferLinked",
            Self::SceneDataBufferLinkFailed { .. } => "SceneDataBufferLinkFailed",
            Self::SceneDataUnlinked { .. } => "SceneDataUnlinked",
            Self::SceneDataUnlinkFailed { .. } => "SceneDataUnlinkFailed",
            Self::SceneDataUnlinkedAsResultOfClientSceneChange { .. } => {
                "SceneDataUnlinkedAsResultOfClientSceneChange"
            }
            Self::SceneDataSlotProviderDestroyed { .. } => "SceneDataSlotProviderDestroyed",
            Self::SceneDataSlotConsumerDestroyed { .. } => "SceneDataSlotConsumerDestroyed",
        }
    }
}

/// Thread-safe, append-only event sink
///
/// Clones share the same buffer, so the update thread can emit while an
/// API-facing thread drains.
#[derive(Clone, Default)]
pub struct RendererEventCollector {
    events: Arc<RwLock<Vec<RendererEvent>>>,
    next_id: Arc<AtomicU64>,
}

impl RendererEventCollector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an event, returns its id
    pub fn emit(&self, kind: RendererEventKind) -> u64 {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.events.write().push(RendererEvent { id, kind });
        id
    }

    /// Pending events (cloned)
    pub fn events(&self) -> Vec<RendererEvent> {
        self.events.read().clone()
    }

    /// Take all pending events; ids keep counting up
    pub fn consume_events(&self) -> Vec<RendererEvent> {
        std::mem::take(&mut *self.events.write())
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self.events()).unwrap_or(Value::Null)
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl std::fmt::Debug for RendererEventCollector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererEventCollector")
            .field("pending", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{SceneId, SlotHandle};
    use std::thread;

    fn slot(scene: u32, slot: u32) -> SlotRef {
        SlotRef::new(SceneId(scene), SlotHandle(slot))
    }

    #[test]
    fn ids_are_monotonic_across_drains() {
        let collector = RendererEventCollector::new();
        let first = collector.emit(RendererEventKind::SceneDataUnlinked { consumer: slot(4, 54) });
        assert_eq!(collector.consume_events().len(), 1);
        assert!(collector.is_empty());

        let second = collector.emit(RendererEventKind::SceneDataUnlinked { consumer: slot(4, 54) });
        assert!(second > first);
    }

    #[test]
    fn failure_events_carry_error_text() {
        let error = LinkError::NotLinked { consumer: slot(4, 54) };
        let kind = RendererEventKind::unlink_failed(slot(4, 54), &error);

        assert!(kind.is_failure());
        assert_eq!(kind.consumer(), Some(slot(4, 54)));
        match kind {
            RendererEventKind::SceneDataUnlinkFailed { error, .. } => {
                assert!(error.starts_with("LINK-020"))
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn serializes_with_type_tag() {
        let collector = RendererEventCollector::new();
        collector.emit(RendererEventKind::SceneDataLinked {
            provider: slot(3, 51),
            consumer: slot(4, 54),
        });

        let json = collector.to_json();
        assert_eq!(json[0]["kind"]["type"], "scene_data_linked");
        assert_eq!(json[0]["id"], 0);
    }

    #[test]
    fn clones_share_one_buffer() {
        let collector = RendererEventCollector::new();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let c = collector.clone();
                thread::spawn(move || {
                    c.emit(RendererEventKind::SceneDataSlotProviderDestroyed {
                        provider: slot(i, 1),
                    });
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }

        let mut ids: Vec<u64> = collector.consume_events().iter().map(|e| e.id).collect();
        ids.sort();
        assert_eq!(ids, vec![0, 1, 2, 3]);
    }
}
