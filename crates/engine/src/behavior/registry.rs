use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use tracing::{debug, info, warn};

use super::Behavior;
use crate::app::{EntityState, Scene};
use crate::error::LoadError;

/// Builds a behavior instance for the entity it will be attached to.
pub type BehaviorFactory = Rc<dyn Fn(&EntityState) -> Box<dyn Behavior>>;

/// What a module loader hands back for a behavior name.
pub struct BehaviorModule {
    pub default_export: Option<BehaviorFactory>,
}

impl BehaviorModule {
    pub fn with_factory<F>(factory: F) -> Self
    where
        F: Fn(&EntityState) -> Box<dyn Behavior> + 'static,
    {
        Self {
            default_export: Some(Rc::new(factory)),
        }
    }

    pub fn without_factory() -> Self {
        Self {
            default_export: None,
        }
    }
}

/// Resolves behavior names to modules. The registry calls this at most once per
/// name while the name stays loaded.
pub trait ModuleLoader {
    fn load_module(&mut self, name: &str) -> Result<BehaviorModule, LoadError>;
}

/// In-process loader backed by factories registered up front.
#[derive(Default)]
pub struct ModuleCatalog {
    factories: HashMap<String, BehaviorFactory>,
}

impl ModuleCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<F>(&mut self, name: impl Into<String>, factory: F) -> Result<(), String>
    where
        F: Fn(&EntityState) -> Box<dyn Behavior> + 'static,
    {
        let name = name.into();
        if name.trim().is_empty() {
            return Err("behavior name cannot be empty".to_string());
        }
        if self.factories.contains_key(&name) {
            return Err(format!("duplicate behavior registration: {name}"));
        }
        self.factories.insert(name, Rc::new(factory));
        Ok(())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl ModuleLoader for ModuleCatalog {
    fn load_module(&mut self, name: &str) -> Result<BehaviorModule, LoadError> {
        self.factories
            .get(name)
            .map(|factory| BehaviorModule {
                default_export: Some(Rc::clone(factory)),
            })
            .ok_or_else(|| LoadError::ModuleNotFound {
                name: name.to_string(),
            })
    }
}

pub struct BehaviorDescriptor {
    name: String,
    factory: BehaviorFactory,
}

impl fmt::Debug for BehaviorDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorDescriptor")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl BehaviorDescriptor {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn instantiate(&self, owner: &EntityState) -> Box<dyn Behavior> {
        (self.factory)(owner)
    }
}

/// Name-indexed cache of behavior descriptors.
pub struct BehaviorRegistry {
    loader: Box<dyn ModuleLoader>,
    descriptors: HashMap<String, BehaviorDescriptor>,
}

impl fmt::Debug for BehaviorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BehaviorRegistry")
            .field("loaded", &self.loaded_names())
            .finish_non_exhaustive()
    }
}

impl BehaviorRegistry {
    pub fn new(loader: impl ModuleLoader + 'static) -> Self {
        Self {
            loader: Box::new(loader),
            descriptors: HashMap::new(),
        }
    }

    /// Loads `name` unless cached. Failures are logged and reported as false.
    pub fn load(&mut self, name: &str) -> bool {
        if self.descriptors.contains_key(name) {
            return true;
        }
        let factory = match self.loader.load_module(name) {
            Ok(BehaviorModule {
                default_export: Some(factory),
            }) => factory,
            Ok(BehaviorModule {
                default_export: None,
            }) => {
                let error = LoadError::MissingFactory {
                    name: name.to_string(),
                };
                warn!(behavior = name, error = %error, "behavior_load_failed");
                return false;
            }
            Err(error) => {
                warn!(behavior = name, error = %error, "behavior_load_failed");
                return false;
            }
        };
        self.descriptors.insert(
            name.to_string(),
            BehaviorDescriptor {
                name: name.to_string(),
                factory,
            },
        );
        debug!(behavior = name, "behavior_loaded");
        true
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.descriptors.contains_key(name)
    }

    pub fn descriptor(&self, name: &str) -> Option<&BehaviorDescriptor> {
        self.descriptors.get(name)
    }

    pub fn loaded_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.descriptors.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Detaches `name` from every entity in `scene`, then drops the descriptor.
    /// Returns whether a descriptor was cached.
    pub fn unload(&mut self, name: &str, scene: &mut Scene) -> bool {
        let detached = scene.detach_everywhere(name);
        let was_loaded = self.descriptors.remove(name).is_some();
        info!(
            behavior = name,
            detached_from = detached,
            was_loaded,
            "behavior_unloaded"
        );
        was_loaded
    }
}

#[cfg(test)]
mod tests {
    use std::any::Any;
    use std::cell::{Cell, RefCell};
    use std::task::Poll;

    use serde_json::{json, Value};

    use super::*;
    use crate::app::{BehaviorPhase, EntityDesc, InputSnapshot};
    use crate::behavior::{BehaviorContext, TickEnv};

    #[derive(Clone, Default)]
    struct Counters {
        inits: Rc<Cell<u32>>,
        detaches: Rc<Cell<u32>>,
    }

    struct Counting {
        counters: Counters,
        /// Polls of `on_detach` that report pending before it completes.
        lingering: u32,
    }

    impl Behavior for Counting {
        fn init(&mut self, _ctx: &mut BehaviorContext<'_>) -> Poll<()> {
            let inits = &self.counters.inits;
            inits.set(inits.get() + 1);
            Poll::Ready(())
        }

        fn on_detach(&mut self, _ctx: &mut BehaviorContext<'_>) -> Poll<()> {
            if self.lingering > 0 {
                self.lingering -= 1;
                return Poll::Pending;
            }
            let detaches = &self.counters.detaches;
            detaches.set(detaches.get() + 1);
            Poll::Ready(())
        }

        fn as_any(&self) -> &dyn Any {
            self
        }

        fn as_any_mut(&mut self) -> &mut dyn Any {
            self
        }
    }

    struct CountingLoader {
        fetches: Rc<RefCell<Vec<String>>>,
        counters: Counters,
    }

    impl CountingLoader {
        fn module(&self, lingering: u32) -> BehaviorModule {
            let counters = self.counters.clone();
            BehaviorModule::with_factory(move |_| {
                Box::new(Counting {
                    counters: counters.clone(),
                    lingering,
                })
            })
        }
    }

    impl ModuleLoader for CountingLoader {
        fn load_module(&mut self, name: &str) -> Result<BehaviorModule, LoadError> {
            self.fetches.borrow_mut().push(name.to_string());
            match name {
                "counting" => Ok(self.module(0)),
                "lingering" => Ok(self.module(1)),
                "hollow" => Ok(BehaviorModule::without_factory()),
                _ => Err(LoadError::ModuleNotFound {
                    name: name.to_string(),
                }),
            }
        }
    }

    fn counting_registry() -> (BehaviorRegistry, Rc<RefCell<Vec<String>>>, Counters) {
        let fetches = Rc::new(RefCell::new(Vec::new()));
        let counters = Counters::default();
        let registry = BehaviorRegistry::new(CountingLoader {
            fetches: Rc::clone(&fetches),
            counters: counters.clone(),
        });
        (registry, fetches, counters)
    }

    #[test]
    fn load_fetches_each_name_once() {
        let (mut registry, fetches, _) = counting_registry();
        assert!(!registry.is_loaded("counting"));
        assert!(registry.load("counting"));
        assert!(registry.load("counting"));
        assert!(registry.is_loaded("counting"));
        assert_eq!(*fetches.borrow(), vec!["counting".to_string()]);
    }

    #[test]
    fn load_failures_return_false_and_cache_nothing() {
        let (mut registry, _, _) = counting_registry();
        assert!(!registry.load("missing"));
        assert!(!registry.load("hollow"));
        assert!(registry.loaded_names().is_empty());
    }

    #[test]
    fn unload_detaches_from_scene_and_allows_refetch() {
        let (mut registry, fetches, counters) = counting_registry();
        let mut scene = Scene::new();
        let a = scene.spawn(EntityDesc::new("a").with_behavior("counting"));
        let b = scene.spawn(EntityDesc::new("b").with_behavior("counting"));
        let c = scene.spawn(EntityDesc::new("c"));
        scene.apply_pending(&mut registry);
        assert_eq!(counters.inits.get(), 2);
        assert_eq!(counters.detaches.get(), 0);

        assert!(registry.unload("counting", &mut scene));
        assert!(!registry.is_loaded("counting"));
        assert_eq!(counters.detaches.get(), 2);
        for id in [a, b, c] {
            assert!(!scene.entity(id).expect("entity").has_behavior("counting"));
        }

        assert!(scene.attach_behavior(a, "counting", &mut registry));
        assert_eq!(fetches.borrow().len(), 2);
        assert_eq!(counters.inits.get(), 3);
    }

    #[test]
    fn unload_leaves_suspended_detach_to_finish_on_later_ticks() {
        let (mut registry, _, counters) = counting_registry();
        let mut scene = Scene::new();
        let id = scene.spawn(EntityDesc::new("a").with_behavior("lingering"));
        scene.apply_pending(&mut registry);

        assert!(registry.unload("lingering", &mut scene));
        assert!(!registry.is_loaded("lingering"));
        assert_eq!(counters.detaches.get(), 0);
        assert_eq!(
            scene.entity(id).expect("entity").behavior_phase("lingering"),
            Some(BehaviorPhase::Detaching)
        );

        let input = InputSnapshot::empty();
        scene.update(1.0 / 60.0, &input, &mut registry);
        assert_eq!(counters.detaches.get(), 1);
        assert!(!scene.entity(id).expect("entity").has_behavior("lingering"));
        assert!(!registry.is_loaded("lingering"));
    }

    fn idle_counting(_owner: &EntityState) -> Box<dyn Behavior> {
        Box::new(Counting {
            counters: Counters::default(),
            lingering: 0,
        })
    }

    #[test]
    fn catalog_rejects_duplicates_and_reports_missing() {
        let mut catalog = ModuleCatalog::new();
        assert!(catalog.register("spin", idle_counting).is_ok());
        assert!(catalog.register("spin", idle_counting).is_err());
        assert!(catalog.register("  ", idle_counting).is_err());
        assert!(catalog.contains("spin"));
        assert!(matches!(
            catalog.load_module("other"),
            Err(LoadError::ModuleNotFound { .. })
        ));
    }

    #[test]
    fn factory_sees_owner_state() {
        struct Named(String);
        impl Behavior for Named {
            fn inspect(&self) -> Value {
                json!(self.0)
            }

            fn as_any(&self) -> &dyn Any {
                self
            }

            fn as_any_mut(&mut self) -> &mut dyn Any {
                self
            }
        }

        let mut catalog = ModuleCatalog::new();
        catalog
            .register("named", |owner| Box::new(Named(owner.name.clone())))
            .expect("register");
        let mut registry = BehaviorRegistry::new(catalog);
        let mut scene = Scene::new();
        let id = scene.spawn(EntityDesc::new("crate"));
        scene.apply_pending(&mut registry);
        let input = InputSnapshot::empty();
        let env = TickEnv::new(&input, None, 0);

        let entity = scene.entity_mut(id).expect("entity");
        let behavior = entity
            .attach_behavior(&mut registry, "named", &env)
            .expect("attached");
        assert_eq!(behavior.inspect(), json!("crate"));
    }
}
