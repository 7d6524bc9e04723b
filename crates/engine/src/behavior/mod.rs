//! Script-style behaviors attached to entities by name.
//!
//! A behavior is created from a factory registered under its name, lives in
//! exactly one entity's behavior map, and is driven through `init`, `update`
//! and `on_detach`. `init` and `on_detach` may suspend by returning
//! `Poll::Pending`; the owning entity polls them again at the start of each of
//! its updates until they complete.

mod registry;

use std::any::Any;
use std::task::Poll;

use serde_json::Value;

use crate::app::{EntityId, EntityState, InputSnapshot, Rect, RenderContext, RenderError};
use crate::collision::CollisionGrid;
use crate::intercept::{MethodTable, Override};

pub use registry::{
    BehaviorDescriptor, BehaviorFactory, BehaviorModule, BehaviorRegistry, ModuleCatalog,
    ModuleLoader,
};

pub trait Behavior: Any {
    /// Called once on attach, and again each update while it returns `Pending`.
    /// The behavior receives no `update` calls until this completes.
    fn init(&mut self, _ctx: &mut BehaviorContext<'_>) -> Poll<()> {
        Poll::Ready(())
    }

    fn update(&mut self, _ctx: &mut BehaviorContext<'_>, _dt: f32) {}

    /// Called on detach, and again each update while it returns `Pending`.
    fn on_detach(&mut self, _ctx: &mut BehaviorContext<'_>) -> Poll<()> {
        Poll::Ready(())
    }

    fn render(
        &self,
        _entity: EntityId,
        _state: &EntityState,
        _ctx: &mut dyn RenderContext,
    ) -> Result<(), RenderError> {
        Ok(())
    }

    /// Inspectable view of the behavior's own state.
    fn inspect(&self) -> Value {
        Value::Null
    }

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

/// Read-only per-tick inputs shared by every entity update.
#[derive(Debug, Clone, Copy)]
pub struct TickEnv<'a> {
    pub input: &'a InputSnapshot,
    pub grid: Option<&'a CollisionGrid>,
    pub tick: u64,
}

impl<'a> TickEnv<'a> {
    pub fn new(input: &'a InputSnapshot, grid: Option<&'a CollisionGrid>, tick: u64) -> Self {
        Self { input, grid, tick }
    }

    /// True if `rect` hits solid pixels. With no grid loaded nothing blocks.
    pub fn blocked(&self, rect: Rect) -> bool {
        self.grid.is_some_and(|grid| {
            grid.rect_occupied(rect.x, rect.y, rect.width, rect.height)
        })
    }
}

/// What a behavior hook can reach: its entity's state and methods, plus the
/// tick's input and collision grid.
pub struct BehaviorContext<'a> {
    entity: EntityId,
    pub state: &'a mut EntityState,
    methods: &'a mut MethodTable<EntityState>,
    owner: &'a str,
    env: &'a TickEnv<'a>,
}

impl<'a> BehaviorContext<'a> {
    pub(crate) fn new(
        entity: EntityId,
        state: &'a mut EntityState,
        methods: &'a mut MethodTable<EntityState>,
        owner: &'a str,
        env: &'a TickEnv<'a>,
    ) -> Self {
        Self {
            entity,
            state,
            methods,
            owner,
            env,
        }
    }

    pub fn entity(&self) -> EntityId {
        self.entity
    }

    pub fn behavior_name(&self) -> &str {
        self.owner
    }

    pub fn input(&self) -> &InputSnapshot {
        self.env.input
    }

    pub fn collision_grid(&self) -> Option<&CollisionGrid> {
        self.env.grid
    }

    pub fn tick(&self) -> u64 {
        self.env.tick
    }

    pub fn blocked(&self, rect: Rect) -> bool {
        self.env.blocked(rect)
    }

    /// Interceptor installer for the entity's methods, owned by this behavior.
    /// Interceptors are removed when the behavior detaches.
    pub fn overrides(&mut self) -> Override<'_, EntityState> {
        Override::new(&mut *self.methods, self.owner)
    }

    pub fn call_method(&mut self, name: &str, args: &[Value]) -> Option<Value> {
        self.methods.call(name, &mut *self.state, args)
    }

    pub fn has_method(&self, name: &str) -> bool {
        self.methods.is_callable(name)
    }
}
