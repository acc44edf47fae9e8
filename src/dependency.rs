//! Scene dependency graph built from active links
//!
//! Edges point from provider scene to consumer scene and are
//! reference-counted: two links between the same pair of scenes produce
//! one edge with count 2, and the edge disappears only with the last link.

use std::collections::{BTreeSet, VecDeque};

use rustc_hash::{FxHashMap, FxHashSet};

use crate::types::SceneId;

/// Rejects dependency edges that would close a cycle between scenes
#[derive(Debug, Default, Clone)]
pub struct SceneDependencyChecker {
    /// (provider, consumer) -> number of links justifying the edge
    edges: FxHashMap<(SceneId, SceneId), usize>,
    /// provider -> consumers depending on it
    consumers: FxHashMap<SceneId, FxHashSet<SceneId>>,
    /// consumer -> providers it depends on
    providers: FxHashMap<SceneId, FxHashSet<SceneId>>,
}

impl SceneDependencyChecker {
    pub fn new() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// True if the scene is either end of any edge
    pub fn has_dependency(&self, scene: SceneId) -> bool {
        self.consumers.contains_key(&scene) || self.providers.contains_key(&scene)
    }

    /// True if the scene consumes from at least one other scene
    pub fn has_dependency_as_consumer(&self, scene: SceneId) -> bool {
        self.providers.contains_key(&scene)
    }

    /// Number of links currently justifying `provider -> consumer`
    pub fn link_count(&self, provider: SceneId, consumer: SceneId) -> usize {
        self.edges.get(&(provider, consumer)).copied().unwrap_or(0)
    }

    /// Check whether making `consumer` depend on `provider` closes a cycle
    ///
    /// A scene never depends on itself. Otherwise the edge is unsafe if
    /// `provider` already (transitively) consumes from `consumer`.
    pub fn would_create_cycle(&self, consumer: SceneId, provider: SceneId) -> bool {
        consumer == provider || self.has_path(consumer, provider)
    }

    /// Record one link's worth of `provider -> consumer`
    ///
    /// Returns false and leaves the graph untouched if the edge is unsafe.
    /// Callers are expected to have checked `would_create_cycle` first.
    pub fn add_dependency(&mut self, provider: SceneId, consumer: SceneId) -> bool {
        if self.would_create_cycle(consumer, provider) {
            return false;
        }

        *self.edges.entry((provider, consumer)).or_insert(0) += 1;
        self.consumers.entry(provider).or_default().insert(consumer);
        self.providers.entry(consumer).or_default().insert(provider);
        true
    }

    /// Drop one link's worth of `provider -> consumer`
    pub fn remove_dependency(&mut self, provider: SceneId, consumer: SceneId) {
        let Some(count) = self.edges.get_mut(&(provider, consumer)) else {
            return;
        };

        *count -= 1;
        if *count == 0 {
            self.edges.remove(&(provider, consumer));
            self.unlink_adjacency(provider, consumer);
        }
    }

    /// Drop every edge touching the scene, regardless of link count
    pub fn remove_scene(&mut self, scene: SceneId) {
        let consumers: Vec<SceneId> = self
            .consumers
            .get(&scene)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();
        let providers: Vec<SceneId> = self
            .providers
            .get(&scene)
            .map(|set| set.iter().copied().collect())
            .unwrap_or_default();

        for consumer in consumers {
            self.edges.remove(&(scene, consumer));
            self.unlink_adjacency(scene, consumer);
        }
        for provider in providers {
            self.edges.remove(&(provider, scene));
            self.unlink_adjacency(provider, scene);
        }
    }

    /// All scenes taking part in an edge, providers before their consumers
    ///
    /// Ties are broken by ascending scene id so the order is stable.
    pub fn dependent_scenes_in_order(&self) -> Vec<SceneId> {
        let mut in_degree: FxHashMap<SceneId, usize> = FxHashMap::default();
        for scene in self.consumers.keys().chain(self.providers.keys()) {
            in_degree.entry(*scene).or_insert(0);
        }
        for (consumer, providers) in &self.providers {
            in_degree.insert(*consumer, providers.len());
        }

        let mut ready: BTreeSet<SceneId> = in_degree
            .iter()
            .filter(|(_, degree)| **degree == 0)
            .map(|(scene, _)| *scene)
            .collect();
        let mut ordered = Vec::with_capacity(in_degree.len());

        while let Some(scene) = ready.pop_first() {
            ordered.push(scene);
            if let Some(consumers) = self.consumers.get(&scene) {
                for consumer in consumers {
                    if let Some(degree) = in_degree.get_mut(consumer) {
                        *degree -= 1;
                        if *degree == 0 {
                            ready.insert(*consumer);
                        }
                    }
                }
            }
        }

        ordered
    }

    /// BFS along provider -> consumer edges
    fn has_path(&self, from: SceneId, to: SceneId) -> bool {
        let mut visited: FxHashSet<SceneId> = FxHashSet::default();
        let mut queue: VecDeque<SceneId> = VecDeque::new();

        queue.push_back(from);
        visited.insert(from);

        while let Some(current) = queue.pop_front() {
            if let Some(neighbors) = self.consumers.get(&current) {
                for neighbor in neighbors {
                    if *neighbor == to {
                        return true;
                    }
                    if visited.insert(*neighbor) {
                        queue.push_back(*neighbor);
                    }
                }
            }
        }

        false
    }

    fn unlink_adjacency(&mut self, provider: SceneId, consumer: SceneId) {
        if let Some(set) = self.consumers.get_mut(&provider) {
            set.remove(&consumer);
            if set.is_empty() {
                self.consumers.remove(&provider);
            }
        }
        if let Some(set) = self.providers.get_mut(&consumer) {
            set.remove(&provider);
            if set.is_empty() {
                self.providers.remove(&consumer);
            }
        }
    }
}
