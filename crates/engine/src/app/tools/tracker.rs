use std::collections::BTreeMap;

use serde::Serialize;

use crate::app::EntityId;

/// Handle to something the debug console can inspect. Resolved against the
/// scene at inspection time, so a handle may outlive its target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectRef {
    Scene,
    Entity(EntityId),
    Behavior { entity: EntityId, name: String },
}

impl ObjectRef {
    pub fn entity(&self) -> Option<EntityId> {
        match self {
            ObjectRef::Scene => None,
            ObjectRef::Entity(id) => Some(*id),
            ObjectRef::Behavior { entity, .. } => Some(*entity),
        }
    }
}

/// Name-indexed registry of inspectable objects. Tracking a name again
/// replaces the previous entry.
#[derive(Debug, Default)]
pub struct ObjectTracker {
    objects: BTreeMap<String, ObjectRef>,
}

impl ObjectTracker {
    pub fn track_object(&mut self, name: &str, object: ObjectRef) -> bool {
        let name = name.trim();
        if name.is_empty() {
            return false;
        }
        self.objects.insert(name.to_string(), object);
        true
    }

    pub fn get(&self, name: &str) -> Option<&ObjectRef> {
        self.objects.get(name)
    }

    /// Drops every name that points at `object`.
    pub fn untrack(&mut self, object: &ObjectRef) -> usize {
        let before = self.objects.len();
        self.objects.retain(|_, tracked| tracked != object);
        before - self.objects.len()
    }

    /// Drops the entity and every behavior tracked on it.
    pub fn untrack_entity(&mut self, id: EntityId) -> usize {
        let before = self.objects.len();
        self.objects.retain(|_, tracked| tracked.entity() != Some(id));
        before - self.objects.len()
    }

    /// Tracked names, sorted.
    pub fn names(&self) -> Vec<&str> {
        self.objects.keys().map(String::as_str).collect()
    }

    pub fn len(&self) -> usize {
        self.objects.len()
    }

    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retracking_a_name_replaces_it() {
        let mut tracker = ObjectTracker::default();
        assert!(tracker.track_object("p", ObjectRef::Entity(EntityId(1))));
        assert!(tracker.track_object("p", ObjectRef::Entity(EntityId(2))));
        assert_eq!(tracker.len(), 1);
        assert_eq!(tracker.get("p"), Some(&ObjectRef::Entity(EntityId(2))));
        assert!(!tracker.track_object("  ", ObjectRef::Scene));
    }

    #[test]
    fn untrack_entity_removes_its_behaviors_too() {
        let mut tracker = ObjectTracker::default();
        tracker.track_object("world", ObjectRef::Scene);
        tracker.track_object("player", ObjectRef::Entity(EntityId(3)));
        tracker.track_object(
            "shooter",
            ObjectRef::Behavior {
                entity: EntityId(3),
                name: "shooter".into(),
            },
        );
        tracker.track_object("other", ObjectRef::Entity(EntityId(4)));

        assert_eq!(tracker.untrack_entity(EntityId(3)), 2);
        assert_eq!(tracker.names(), vec!["other", "world"]);
        assert_eq!(tracker.untrack(&ObjectRef::Scene), 1);
        assert_eq!(tracker.names(), vec!["other"]);
    }
}
