//! Classifies raw watcher events into created/changed/removed notifications.

use std::collections::{HashMap, HashSet};

use kube::api::{DynamicObject, ObjectMeta};
use kube::core::TypeMeta;
use kube::runtime::watcher::Event;

use super::Notification;

/// What the tracker remembers about a reported object.
#[derive(Debug)]
struct Seen {
    types: Option<TypeMeta>,
    uid: Option<String>,
    resource_version: Option<String>,
}

impl Seen {
    fn of(obj: &DynamicObject) -> Self {
        Self {
            types: obj.types.clone(),
            uid: obj.metadata.uid.clone(),
            resource_version: obj.metadata.resource_version.clone(),
        }
    }

    fn same_revision(&self, obj: &DynamicObject) -> bool {
        self.resource_version.is_some()
            && self.resource_version == obj.metadata.resource_version
            && self.uid == obj.metadata.uid
    }

    /// Last known identity of an object that vanished from a re-list.
    fn tombstone(self, key: &ObjectKey) -> DynamicObject {
        DynamicObject {
            types: self.types,
            metadata: ObjectMeta {
                name: Some(key.name.clone()),
                namespace: key.namespace.clone(),
                uid: self.uid,
                resource_version: self.resource_version,
                ..ObjectMeta::default()
            },
            data: serde_json::Value::Object(serde_json::Map::new()),
        }
    }
}

/// Objects are identified by namespace and name, so an object recreated
/// under the same name is a change rather than a removal plus a creation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct ObjectKey {
    namespace: Option<String>,
    name: String,
}

impl ObjectKey {
    fn of(obj: &DynamicObject) -> Self {
        Self {
            namespace: obj.metadata.namespace.clone(),
            name: obj.metadata.name.clone().unwrap_or_default(),
        }
    }
}

/// Remembers the revision of every object the feed has reported.
///
/// The watcher only says an object was applied; whether that is a creation
/// or an update depends on whether the object was already known. A re-list
/// (`Init` .. `InitDone`) also implies removal of every known object that was
/// not listed again.
#[derive(Debug, Default)]
pub(super) struct ObjectTracker {
    known: HashMap<ObjectKey, Seen>,
    relisted: Option<HashSet<ObjectKey>>,
}

impl ObjectTracker {
    pub(super) fn observe(&mut self, event: Event<DynamicObject>) -> Vec<Notification> {
        match event {
            Event::Init => {
                self.relisted = Some(HashSet::new());
                Vec::new()
            }
            Event::InitApply(obj) => {
                if let Some(seen) = self.relisted.as_mut() {
                    seen.insert(ObjectKey::of(&obj));
                }
                self.apply(obj).into_iter().collect()
            }
            Event::InitDone => {
                let Some(listed) = self.relisted.take() else {
                    return Vec::new();
                };
                let gone: Vec<ObjectKey> = self
                    .known
                    .keys()
                    .filter(|k| !listed.contains(*k))
                    .cloned()
                    .collect();
                gone.into_iter()
                    .filter_map(|k| self.known.remove(&k).map(|seen| seen.tombstone(&k)))
                    .map(Notification::Removed)
                    .collect()
            }
            Event::Apply(obj) => self.apply(obj).into_iter().collect(),
            Event::Delete(obj) => {
                self.known.remove(&ObjectKey::of(&obj));
                vec![Notification::Removed(obj)]
            }
        }
    }

    fn apply(&mut self, obj: DynamicObject) -> Option<Notification> {
        match self.known.insert(ObjectKey::of(&obj), Seen::of(&obj)) {
            None => Some(Notification::Created(obj)),
            Some(prev) if prev.same_revision(&obj) => None,
            Some(_) => Some(Notification::Changed(obj)),
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.known.len()
    }
}
