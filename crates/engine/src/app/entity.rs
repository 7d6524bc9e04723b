use std::collections::{BTreeMap, BTreeSet};
use std::task::Poll;

use serde::Serialize;
use serde_json::{json, Value};
use tracing::{debug, warn};

use super::render::{RenderContext, RenderError};
use crate::behavior::{Behavior, BehaviorContext, BehaviorRegistry, TickEnv};
use crate::intercept::{MethodTable, Override};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct EntityId(pub u64);

#[derive(Debug, Default)]
pub struct EntityIdAllocator {
    next: u64,
}

impl EntityIdAllocator {
    pub fn allocate(&mut self) -> EntityId {
        let id = EntityId(self.next);
        self.next = self.next.saturating_add(1);
        id
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn scaled(self, factor: f32) -> Self {
        Self {
            x: self.x * factor,
            y: self.y * factor,
        }
    }

    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }
}

impl std::ops::Add for Vec2 {
    type Output = Vec2;

    fn add(self, rhs: Vec2) -> Vec2 {
        Vec2 {
            x: self.x + rhs.x,
            y: self.y + rhs.y,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// Rotation is always radians. Behaviors that think in degrees go through
/// `set_rotation_degrees` / `rotation_degrees`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Transform {
    pub position: Vec2,
    pub rotation_radians: f32,
    pub scale: Vec2,
    pub velocity: Vec2,
}

impl Default for Transform {
    fn default() -> Self {
        Self {
            position: Vec2::default(),
            rotation_radians: 0.0,
            scale: Vec2::new(1.0, 1.0),
            velocity: Vec2::default(),
        }
    }
}

impl Transform {
    pub fn set_rotation_degrees(&mut self, degrees: f32) {
        self.rotation_radians = degrees.to_radians();
    }

    pub fn rotation_degrees(&self) -> f32 {
        self.rotation_radians.to_degrees()
    }
}

/// Axis-aligned collider, offset from the entity position.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CollisionBounds {
    pub width: f32,
    pub height: f32,
    pub offset: Vec2,
}

impl CollisionBounds {
    pub fn world_rect(&self, position: Vec2) -> Rect {
        Rect {
            x: position.x + self.offset.x,
            y: position.y + self.offset.y,
            width: self.width,
            height: self.height,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MovementPolicy {
    /// Integrate freely, then snap back to the pre-tick position on any hit.
    #[default]
    RevertOnHit,
    /// Move X then Y, undoing and zeroing velocity per blocked axis.
    AxisSeparated,
}

/// Deferred scene mutation raised while the scene is iterating.
#[derive(Debug)]
pub enum SceneRequest {
    Spawn(EntityDesc),
    DespawnSelf,
}

/// Plain entity data: what behaviors and intercepted methods operate on.
#[derive(Debug, Serialize)]
pub struct EntityState {
    pub name: String,
    pub transform: Transform,
    pub bounds: CollisionBounds,
    pub tags: BTreeSet<String>,
    pub custom_data: BTreeMap<String, Value>,
    pub active: bool,
    pub solid: bool,
    pub visible: bool,
    pub render_order: i32,
    pub movement: MovementPolicy,
    #[serde(skip)]
    outbox: Vec<SceneRequest>,
}

impl EntityState {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            transform: Transform::default(),
            bounds: CollisionBounds::default(),
            tags: BTreeSet::new(),
            custom_data: BTreeMap::new(),
            active: true,
            solid: false,
            visible: true,
            render_order: 0,
            movement: MovementPolicy::default(),
            outbox: Vec::new(),
        }
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(tag)
    }

    pub fn add_tag(&mut self, tag: impl Into<String>) -> bool {
        self.tags.insert(tag.into())
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        self.tags.remove(tag)
    }

    pub fn data(&self, key: &str) -> Option<&Value> {
        self.custom_data.get(key)
    }

    pub fn set_data(&mut self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.custom_data.insert(key.into(), value)
    }

    pub fn data_f64(&self, key: &str) -> f64 {
        self.data(key).and_then(Value::as_f64).unwrap_or(0.0)
    }

    pub fn world_rect(&self) -> Rect {
        self.bounds.world_rect(self.transform.position)
    }

    /// Queues a new entity; it joins the scene after the current tick.
    pub fn spawn(&mut self, desc: EntityDesc) {
        self.outbox.push(SceneRequest::Spawn(desc));
    }

    /// Queues removal of this entity after the current tick.
    pub fn despawn_self(&mut self) {
        self.outbox.push(SceneRequest::DespawnSelf);
    }

    pub fn has_pending_requests(&self) -> bool {
        !self.outbox.is_empty()
    }

    pub(crate) fn take_requests(&mut self) -> Vec<SceneRequest> {
        std::mem::take(&mut self.outbox)
    }
}

/// Everything needed to create an entity: initial state, base methods, and the
/// behaviors to attach once it is inserted into a scene.
#[derive(Debug)]
pub struct EntityDesc {
    pub state: EntityState,
    pub methods: MethodTable<EntityState>,
    pub behaviors: Vec<String>,
}

impl EntityDesc {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            state: EntityState::new(name),
            methods: MethodTable::new(),
            behaviors: Vec::new(),
        }
    }

    pub fn at(mut self, x: f32, y: f32) -> Self {
        self.state.transform.position = Vec2::new(x, y);
        self
    }

    pub fn with_velocity(mut self, vx: f32, vy: f32) -> Self {
        self.state.transform.velocity = Vec2::new(vx, vy);
        self
    }

    pub fn with_rotation_radians(mut self, radians: f32) -> Self {
        self.state.transform.rotation_radians = radians;
        self
    }

    pub fn with_bounds(mut self, width: f32, height: f32, offset: Vec2) -> Self {
        self.state.bounds = CollisionBounds {
            width,
            height,
            offset,
        };
        self
    }

    pub fn solid(mut self, solid: bool) -> Self {
        self.state.solid = solid;
        self
    }

    pub fn active(mut self, active: bool) -> Self {
        self.state.active = active;
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.state.visible = visible;
        self
    }

    pub fn with_render_order(mut self, render_order: i32) -> Self {
        self.state.render_order = render_order;
        self
    }

    pub fn with_movement(mut self, movement: MovementPolicy) -> Self {
        self.state.movement = movement;
        self
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.state.add_tag(tag);
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: Value) -> Self {
        self.state.set_data(key, value);
        self
    }

    pub fn with_method<F>(mut self, name: impl Into<String>, method: F) -> Self
    where
        F: FnMut(&mut EntityState, &[Value]) -> Value + 'static,
    {
        self.methods.define(name, method);
        self
    }

    pub fn with_behavior(mut self, name: impl Into<String>) -> Self {
        self.behaviors.push(name.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BehaviorPhase {
    /// In the behavior map, `init` not yet finished.
    Attaching,
    Active,
    /// `on_detach` started but not finished; removed once it completes.
    Detaching,
}

struct BehaviorSlot {
    name: String,
    phase: BehaviorPhase,
    instance: Box<dyn Behavior>,
}

pub struct Entity {
    id: EntityId,
    pub state: EntityState,
    methods: MethodTable<EntityState>,
    behaviors: Vec<BehaviorSlot>,
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("state", &self.state)
            .field("methods", &self.methods)
            .field("behaviors", &self.behavior_names().collect::<Vec<_>>())
            .finish()
    }
}

impl Entity {
    pub(crate) fn new(id: EntityId, state: EntityState, methods: MethodTable<EntityState>) -> Self {
        Self {
            id,
            state,
            methods,
            behaviors: Vec::new(),
        }
    }

    pub fn id(&self) -> EntityId {
        self.id
    }

    /// Attaches `name`, loading it through the registry on first use.
    ///
    /// Returns the existing instance if the slot is already taken (no second
    /// `init`), and `None` if the behavior cannot be loaded or its slot is
    /// still `Detaching`. The new slot is visible in the behavior map as
    /// `Attaching` before `init` finishes.
    pub fn attach_behavior(
        &mut self,
        registry: &mut BehaviorRegistry,
        name: &str,
        env: &TickEnv<'_>,
    ) -> Option<&mut dyn Behavior> {
        if let Some(index) = self.slot_index(name) {
            if self.behaviors[index].phase == BehaviorPhase::Detaching {
                warn!(
                    entity = self.id.0,
                    behavior = name,
                    "behavior_attach_while_detaching"
                );
                return None;
            }
            warn!(
                entity = self.id.0,
                behavior = name,
                "behavior_already_attached"
            );
            return Some(self.behaviors[index].instance.as_mut());
        }
        if !registry.load(name) {
            return None;
        }
        let instance = registry.descriptor(name)?.instantiate(&self.state);
        self.behaviors.push(BehaviorSlot {
            name: name.to_string(),
            phase: BehaviorPhase::Attaching,
            instance,
        });
        let index = self.behaviors.len() - 1;
        self.poll_slot(index, env);
        debug!(
            entity = self.id.0,
            behavior = name,
            phase = ?self.behaviors[index].phase,
            "behavior_attached"
        );
        Some(self.behaviors[index].instance.as_mut())
    }

    /// Starts detaching `name`. Returns false if no such behavior is attached.
    pub fn detach_behavior(&mut self, name: &str, env: &TickEnv<'_>) -> bool {
        let Some(index) = self.slot_index(name) else {
            return false;
        };
        if self.behaviors[index].phase == BehaviorPhase::Detaching {
            return true;
        }
        self.behaviors[index].phase = BehaviorPhase::Detaching;
        if self.poll_slot(index, env) {
            self.finish_detach(index);
        }
        true
    }

    pub fn has_behavior(&self, name: &str) -> bool {
        self.slot_index(name).is_some()
    }

    pub fn behavior_phase(&self, name: &str) -> Option<BehaviorPhase> {
        self.slot_index(name).map(|index| self.behaviors[index].phase)
    }

    /// Attached behavior names in attachment order.
    pub fn behavior_names(&self) -> impl Iterator<Item = &str> {
        self.behaviors.iter().map(|slot| slot.name.as_str())
    }

    pub fn behavior(&self, name: &str) -> Option<&dyn Behavior> {
        self.slot_index(name)
            .map(|index| self.behaviors[index].instance.as_ref())
    }

    pub fn behavior_as<T: Behavior>(&self, name: &str) -> Option<&T> {
        self.behavior(name)?.as_any().downcast_ref::<T>()
    }

    pub fn behavior_as_mut<T: Behavior>(&mut self, name: &str) -> Option<&mut T> {
        let index = self.slot_index(name)?;
        self.behaviors[index]
            .instance
            .as_mut()
            .as_any_mut()
            .downcast_mut::<T>()
    }

    /// Runs behaviors, then integrates velocity.
    pub fn update(&mut self, dt: f32, env: &TickEnv<'_>) {
        self.run_behaviors(dt, env);
        self.integrate(dt);
    }

    /// Resumes suspended `init` / `on_detach` hooks, then updates every active
    /// behavior in attachment order.
    pub fn run_behaviors(&mut self, dt: f32, env: &TickEnv<'_>) {
        let mut index = 0;
        while index < self.behaviors.len() {
            if self.behaviors[index].phase != BehaviorPhase::Active && self.poll_slot(index, env)
            {
                self.finish_detach(index);
                continue;
            }
            index += 1;
        }

        for slot in &mut self.behaviors {
            if slot.phase != BehaviorPhase::Active {
                continue;
            }
            let mut ctx = BehaviorContext::new(
                self.id,
                &mut self.state,
                &mut self.methods,
                &slot.name,
                env,
            );
            slot.instance.update(&mut ctx, dt);
        }
    }

    pub fn integrate(&mut self, dt: f32) {
        let transform = &mut self.state.transform;
        transform.position = transform.position + transform.velocity.scaled(dt);
    }

    pub fn call_method(&mut self, name: &str, args: &[Value]) -> Option<Value> {
        self.methods.call(name, &mut self.state, args)
    }

    pub fn methods(&self) -> &MethodTable<EntityState> {
        &self.methods
    }

    pub fn methods_mut(&mut self) -> &mut MethodTable<EntityState> {
        &mut self.methods
    }

    pub fn overrides<'a>(&'a mut self, owner: &'a str) -> Override<'a, EntityState> {
        Override::new(&mut self.methods, owner)
    }

    pub fn render(&self, ctx: &mut dyn RenderContext) -> Result<(), RenderError> {
        ctx.draw_entity(self.id, &self.state)?;
        for slot in &self.behaviors {
            if slot.phase == BehaviorPhase::Active {
                slot.instance.render(self.id, &self.state, ctx)?;
            }
        }
        Ok(())
    }

    pub fn snapshot(&self) -> Value {
        let behaviors: Vec<Value> = self
            .behaviors
            .iter()
            .map(|slot| {
                json!({
                    "name": slot.name,
                    "phase": slot.phase,
                    "state": slot.instance.inspect(),
                })
            })
            .collect();
        json!({
            "id": self.id,
            "state": serde_json::to_value(&self.state).unwrap_or(Value::Null),
            "behaviors": behaviors,
            "methods": self.methods.describe(),
        })
    }

    pub(crate) fn take_requests(&mut self) -> Vec<SceneRequest> {
        self.state.take_requests()
    }

    fn slot_index(&self, name: &str) -> Option<usize> {
        self.behaviors.iter().position(|slot| slot.name == name)
    }

    /// Polls the pending hook for the slot's phase. Returns true when a
    /// detach has completed and the slot should be removed.
    fn poll_slot(&mut self, index: usize, env: &TickEnv<'_>) -> bool {
        let slot = &mut self.behaviors[index];
        let mut ctx = BehaviorContext::new(
            self.id,
            &mut self.state,
            &mut self.methods,
            &slot.name,
            env,
        );
        match slot.phase {
            BehaviorPhase::Attaching => {
                if let Poll::Ready(()) = slot.instance.init(&mut ctx) {
                    slot.phase = BehaviorPhase::Active;
                }
                false
            }
            BehaviorPhase::Detaching => slot.instance.on_detach(&mut ctx).is_ready(),
            BehaviorPhase::Active => false,
        }
    }

    fn finish_detach(&mut self, index: usize) {
        let slot = self.behaviors.remove(index);
        let removed = self.methods.remove_owner(&slot.name);
        debug!(
            entity = self.id.0,
            behavior = %slot.name,
            interceptors_removed = removed,
            "behavior_detached"
        );
    }
}
