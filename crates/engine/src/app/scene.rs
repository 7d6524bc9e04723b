use std::cmp::Reverse;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use super::entity::{Entity, EntityDesc, EntityId, EntityIdAllocator, SceneRequest};
use super::input::InputSnapshot;
use super::movement::step_entity;
use super::render::{RenderContext, RenderReport};
use super::tools::{ObjectRef, ObjectTracker};
use crate::behavior::{BehaviorRegistry, TickEnv};
use crate::collision::CollisionGrid;
use crate::error::LoadError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MapInfo {
    pub visual_path: PathBuf,
    pub collision_path: PathBuf,
    pub width: u32,
    pub height: u32,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    pub updated: usize,
    pub collisions: usize,
    pub spawned: usize,
    pub despawned: usize,
}

#[derive(Debug)]
struct PendingSpawn {
    entity: Entity,
    behaviors: Vec<String>,
}

/// Entity set plus the collision grid and per-tick orchestration.
///
/// Entities are updated in insertion order. Spawns and despawns requested
/// during a tick are queued and applied once every entity has been updated, so
/// an entity spawned mid-tick receives its first update on the next tick.
#[derive(Debug)]
pub struct Scene {
    allocator: EntityIdAllocator,
    entities: Vec<Entity>,
    pending_spawns: Vec<PendingSpawn>,
    pending_despawns: Vec<EntityId>,
    collision_grid: Option<CollisionGrid>,
    map: Option<MapInfo>,
    active: bool,
    paused: bool,
    scene_data: BTreeMap<String, Value>,
    input: InputSnapshot,
    tick: u64,
    tracker: Option<ObjectTracker>,
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl Scene {
    pub fn new() -> Self {
        Self {
            allocator: EntityIdAllocator::default(),
            entities: Vec::new(),
            pending_spawns: Vec::new(),
            pending_despawns: Vec::new(),
            collision_grid: None,
            map: None,
            active: true,
            paused: false,
            scene_data: BTreeMap::new(),
            input: InputSnapshot::empty(),
            tick: 0,
            tracker: None,
        }
    }

    pub fn with_tracking(mut self) -> Self {
        self.tracker = Some(ObjectTracker::default());
        self
    }

    /// Queues an entity; it becomes visible after `apply_pending`.
    pub fn spawn(&mut self, desc: EntityDesc) -> EntityId {
        let id = self.allocator.allocate();
        let EntityDesc {
            state,
            methods,
            behaviors,
        } = desc;
        self.pending_spawns.push(PendingSpawn {
            entity: Entity::new(id, state, methods),
            behaviors,
        });
        id
    }

    pub fn despawn(&mut self, id: EntityId) -> bool {
        let exists_now = self.entities.iter().any(|entity| entity.id() == id);
        let pending_spawn = self
            .pending_spawns
            .iter()
            .any(|pending| pending.entity.id() == id);
        if !exists_now && !pending_spawn {
            return false;
        }
        self.pending_despawns.push(id);
        true
    }

    /// Applies queued despawns, then inserts queued spawns and attaches their
    /// behaviors. Returns `(spawned, despawned)`.
    pub fn apply_pending(&mut self, registry: &mut BehaviorRegistry) -> (usize, usize) {
        let mut despawned = 0;
        if !self.pending_despawns.is_empty() {
            self.pending_despawns.sort_unstable();
            self.pending_despawns.dedup();
            let pending = std::mem::take(&mut self.pending_despawns);
            let before = self.entities.len();
            self.entities
                .retain(|entity| pending.binary_search(&entity.id()).is_err());
            self.pending_spawns
                .retain(|spawn| pending.binary_search(&spawn.entity.id()).is_err());
            despawned = before - self.entities.len();
            if let Some(tracker) = &mut self.tracker {
                for id in &pending {
                    tracker.untrack_entity(*id);
                }
            }
        }

        let spawned = self.pending_spawns.len();
        let env = TickEnv::new(&self.input, self.collision_grid.as_ref(), self.tick);
        for PendingSpawn {
            mut entity,
            behaviors,
        } in self.pending_spawns.drain(..)
        {
            for name in &behaviors {
                let attached = entity.attach_behavior(registry, name, &env).is_some();
                if !attached {
                    warn!(entity = entity.id().0, behavior = %name, "spawn_behavior_missing");
                } else if let Some(tracker) = &mut self.tracker {
                    tracker.track_object(
                        name,
                        ObjectRef::Behavior {
                            entity: entity.id(),
                            name: name.clone(),
                        },
                    );
                }
            }
            self.entities.push(entity);
        }
        (spawned, despawned)
    }

    /// Advances one tick: no-op while inactive or paused.
    pub fn update(
        &mut self,
        dt: f32,
        input: &InputSnapshot,
        registry: &mut BehaviorRegistry,
    ) -> TickReport {
        let mut report = TickReport::default();
        self.input = *input;
        if !self.active || self.paused {
            return report;
        }
        self.tick = self.tick.saturating_add(1);

        let env = TickEnv::new(&self.input, self.collision_grid.as_ref(), self.tick);
        let mut requests = Vec::new();
        for entity in &mut self.entities {
            if entity.state.active {
                report.updated += 1;
            }
            if step_entity(entity, dt, &env) {
                report.collisions += 1;
            }
            if entity.state.has_pending_requests() {
                let id = entity.id();
                requests.extend(entity.take_requests().into_iter().map(|req| (id, req)));
            }
        }

        for (source, request) in requests {
            match request {
                SceneRequest::Spawn(desc) => {
                    let spawned = self.spawn(desc);
                    debug!(source = source.0, entity = spawned.0, "entity_spawn_queued");
                }
                SceneRequest::DespawnSelf => {
                    self.despawn(source);
                }
            }
        }
        let (spawned, despawned) = self.apply_pending(registry);
        report.spawned = spawned;
        report.despawned = despawned;
        report
    }

    pub fn attach_behavior(
        &mut self,
        id: EntityId,
        name: &str,
        registry: &mut BehaviorRegistry,
    ) -> bool {
        let env = TickEnv::new(&self.input, self.collision_grid.as_ref(), self.tick);
        let Some(entity) = self.entities.iter_mut().find(|entity| entity.id() == id) else {
            return false;
        };
        let fresh = !entity.has_behavior(name);
        if entity.attach_behavior(registry, name, &env).is_none() {
            return false;
        }
        if !fresh {
            return true;
        }
        if let Some(tracker) = &mut self.tracker {
            tracker.track_object(
                name,
                ObjectRef::Behavior {
                    entity: id,
                    name: name.to_string(),
                },
            );
        }
        true
    }

    pub fn detach_behavior(&mut self, id: EntityId, name: &str) -> bool {
        let env = TickEnv::new(&self.input, self.collision_grid.as_ref(), self.tick);
        let Some(entity) = self.entities.iter_mut().find(|entity| entity.id() == id) else {
            return false;
        };
        let detached = entity.detach_behavior(name, &env);
        if detached && !entity.has_behavior(name) {
            if let Some(tracker) = &mut self.tracker {
                tracker.untrack(&ObjectRef::Behavior {
                    entity: id,
                    name: name.to_string(),
                });
            }
        }
        detached
    }

    /// Detaches `name` from every entity hosting it. Returns how many did.
    pub fn detach_everywhere(&mut self, name: &str) -> usize {
        let hosts: Vec<EntityId> = self
            .entities
            .iter()
            .filter(|entity| entity.has_behavior(name))
            .map(Entity::id)
            .collect();
        hosts
            .into_iter()
            .filter(|id| self.detach_behavior(*id, name))
            .count()
    }

    pub fn load_map(&mut self, visual: &Path, collision: &Path) -> Result<(), LoadError> {
        let visual_size =
            image::image_dimensions(visual).map_err(|source| LoadError::DecodeImage {
                path: visual.to_path_buf(),
                source,
            })?;
        let grid = CollisionGrid::load(collision)?;
        let collision_size = (grid.width(), grid.height());
        if visual_size != collision_size {
            return Err(LoadError::MapSizeMismatch {
                visual: visual.to_path_buf(),
                visual_size,
                collision: collision.to_path_buf(),
                collision_size,
            });
        }

        info!(
            visual = %visual.display(),
            collision = %collision.display(),
            width = grid.width(),
            height = grid.height(),
            solid_pixels = grid.solid_count(),
            "map_loaded"
        );
        self.map = Some(MapInfo {
            visual_path: visual.to_path_buf(),
            collision_path: collision.to_path_buf(),
            width: grid.width(),
            height: grid.height(),
        });
        self.collision_grid = Some(grid);
        Ok(())
    }

    /// Replaces the collision grid wholesale.
    pub fn set_collision_grid(&mut self, grid: CollisionGrid) {
        self.collision_grid = Some(grid);
    }

    pub fn clear_collision_grid(&mut self) {
        self.collision_grid = None;
        self.map = None;
    }

    pub fn collision_grid(&self) -> Option<&CollisionGrid> {
        self.collision_grid.as_ref()
    }

    pub fn map(&self) -> Option<&MapInfo> {
        self.map.as_ref()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn set_active(&mut self, active: bool) {
        self.active = active;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn set_paused(&mut self, paused: bool) {
        self.paused = paused;
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn data(&self, key: &str) -> Option<&Value> {
        self.scene_data.get(key)
    }

    pub fn set_data(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.scene_data.insert(key.into(), value)
    }

    pub fn remove_data(&mut self, key: &str) -> Option<Value> {
        self.scene_data.remove(key)
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.iter().find(|entity| entity.id() == id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.iter_mut().find(|entity| entity.id() == id)
    }

    pub fn entities_with_tag<'a>(&'a self, tag: &'a str) -> impl Iterator<Item = &'a Entity> {
        self.entities
            .iter()
            .filter(move |entity| entity.state.has_tag(tag))
    }

    /// Visible entities in draw order: descending `render_order`, ties keep
    /// insertion order, so lower values draw last (on top).
    pub fn render_order(&self) -> Vec<EntityId> {
        let mut visible: Vec<&Entity> = self
            .entities
            .iter()
            .filter(|entity| entity.state.visible)
            .collect();
        visible.sort_by_key(|entity| Reverse(entity.state.render_order));
        visible.into_iter().map(Entity::id).collect()
    }

    /// Draws every visible entity. A failing entity is logged and skipped.
    pub fn render(&self, ctx: &mut dyn RenderContext) -> RenderReport {
        let mut report = RenderReport::default();
        for id in self.render_order() {
            let Some(entity) = self.entity(id) else {
                continue;
            };
            match entity.render(ctx) {
                Ok(()) => report.drawn += 1,
                Err(error) => {
                    warn!(entity = id.0, name = %entity.state.name, error = %error, "entity_render_failed");
                    report.failed += 1;
                }
            }
        }
        report
    }

    pub fn tracker(&self) -> Option<&ObjectTracker> {
        self.tracker.as_ref()
    }

    pub fn track_object(&mut self, name: &str, object: ObjectRef) -> bool {
        match &mut self.tracker {
            Some(tracker) => tracker.track_object(name, object),
            None => false,
        }
    }

    /// Current inspectable view of a tracked object, if it still exists.
    pub fn inspect(&self, object: &ObjectRef) -> Option<Value> {
        match object {
            ObjectRef::Scene => Some(self.snapshot()),
            ObjectRef::Entity(id) => self.entity(*id).map(Entity::snapshot),
            ObjectRef::Behavior { entity, name } => {
                let host = self.entity(*entity)?;
                let behavior = host.behavior(name)?;
                Some(json!({
                    "entity": entity,
                    "behavior": name,
                    "phase": host.behavior_phase(name),
                    "state": behavior.inspect(),
                }))
            }
        }
    }

    pub fn snapshot(&self) -> Value {
        json!({
            "active": self.active,
            "paused": self.paused,
            "tick": self.tick,
            "entity_count": self.entities.len(),
            "pending_spawns": self.pending_spawns.len(),
            "map": self.map,
            "has_collision_grid": self.collision_grid.is_some(),
            "data": self.scene_data,
        })
    }
}
