//! The in-process repository store.
//!
//! Repositories are named entity stores (`<entity>-repository`,
//! case-insensitive, hyphens preserved) living for the process lifetime.
//! Iteration order is insertion order. After every committed mutation the
//! store synthesizes a [`RepositoryChange`] and emits a `<repo>-change`
//! event, which is how `Observer` feature sets see the change — with the
//! mutation already visible in the store.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::RwLock;
use tracing::debug;
use uuid::Uuid;

use aro_core::event::{ChangeKind, RepositoryChange};
use aro_core::value::RuntimeValue;

use crate::events::EventBus;

/// One named repository: an ordered map from entity id to entity.
#[derive(Debug, Default)]
struct Repository {
    entries: Vec<(String, RuntimeValue)>,
}

impl Repository {
    fn position(&self, id: &str) -> Option<usize> {
        self.entries.iter().position(|(entry_id, _)| entry_id == id)
    }
}

/// The process-wide repository store.
///
/// Writes are serialized per store; reads see the most recently committed
/// write. Change events are emitted after the mutation is visible.
pub struct RepositoryStore {
    repositories: RwLock<HashMap<String, Repository>>,
    bus: Arc<EventBus>,
}

impl RepositoryStore {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            repositories: RwLock::new(HashMap::new()),
            bus,
        }
    }

    /// Normalizes a repository name: lookups are case-insensitive, hyphens
    /// preserved.
    fn normalize(name: &str) -> String {
        name.to_ascii_lowercase()
    }

    /// Stores an entity, assigning a fresh unique id. Mapping entities get
    /// the id injected under `id`; other values are wrapped in a mapping
    /// with `id` and `value`. Returns the stored entity.
    pub fn store(&self, repository: &str, entity: RuntimeValue) -> RuntimeValue {
        let name = Self::normalize(repository);
        let id = Uuid::new_v4().to_string();
        let stored = match entity {
            RuntimeValue::Map(mut map) => {
                map.insert("id".to_string(), RuntimeValue::Text(id.clone()));
                RuntimeValue::Map(map)
            }
            other => RuntimeValue::map([
                ("id", RuntimeValue::Text(id.clone())),
                ("value", other),
            ]),
        };
        self.repositories
            .write()
            .entry(name.clone())
            .or_default()
            .entries
            .push((id.clone(), stored.clone()));
        debug!(repository = %name, %id, "Entity stored");
        self.emit_change(RepositoryChange {
            repository: name,
            kind: ChangeKind::Insert,
            entity_before: None,
            entity_after: Some(stored.clone()),
            entity_id: id,
        });
        stored
    }

    /// All entities in insertion order.
    pub fn retrieve_all(&self, repository: &str) -> RuntimeValue {
        let name = Self::normalize(repository);
        let repositories = self.repositories.read();
        let items = repositories
            .get(&name)
            .map(|repo| repo.entries.iter().map(|(_, v)| v.clone()).collect())
            .unwrap_or_default();
        RuntimeValue::List(items)
    }

    /// Entities matching a predicate, in insertion order.
    pub fn retrieve_where<P>(&self, repository: &str, predicate: P) -> RuntimeValue
    where
        P: Fn(&RuntimeValue) -> bool,
    {
        let name = Self::normalize(repository);
        let repositories = self.repositories.read();
        let items = repositories
            .get(&name)
            .map(|repo| {
                repo.entries
                    .iter()
                    .filter(|(_, v)| predicate(v))
                    .map(|(_, v)| v.clone())
                    .collect()
            })
            .unwrap_or_default();
        RuntimeValue::List(items)
    }

    /// Looks up a single entity by id.
    pub fn retrieve_by_id(&self, repository: &str, id: &str) -> Option<RuntimeValue> {
        let name = Self::normalize(repository);
        let repositories = self.repositories.read();
        let repo = repositories.get(&name)?;
        let position = repo.position(id)?;
        Some(repo.entries[position].1.clone())
    }

    /// Applies a mutator to the entity with the given id. Returns the
    /// updated entity, or `None` when the id is unknown.
    pub fn update<M>(&self, repository: &str, id: &str, mutate: M) -> Option<RuntimeValue>
    where
        M: FnOnce(&mut RuntimeValue),
    {
        let name = Self::normalize(repository);
        let (before, after) = {
            let mut repositories = self.repositories.write();
            let repo = repositories.get_mut(&name)?;
            let position = repo.position(id)?;
            let before = repo.entries[position].1.clone();
            mutate(&mut repo.entries[position].1);
            // The id is part of the entity's identity and survives mutation.
            if let RuntimeValue::Map(map) = &mut repo.entries[position].1 {
                map.insert("id".to_string(), RuntimeValue::Text(id.to_string()));
            }
            (before, repo.entries[position].1.clone())
        };
        self.emit_change(RepositoryChange {
            repository: name,
            kind: ChangeKind::Update,
            entity_before: Some(before),
            entity_after: Some(after.clone()),
            entity_id: id.to_string(),
        });
        Some(after)
    }

    /// Deletes every entity matching the predicate. Returns the removed
    /// entities in their former insertion order.
    pub fn delete_where<P>(&self, repository: &str, predicate: P) -> Vec<RuntimeValue>
    where
        P: Fn(&RuntimeValue) -> bool,
    {
        let name = Self::normalize(repository);
        let removed: Vec<(String, RuntimeValue)> = {
            let mut repositories = self.repositories.write();
            let Some(repo) = repositories.get_mut(&name) else {
                return Vec::new();
            };
            let (doomed, kept): (Vec<_>, Vec<_>) = repo
                .entries
                .drain(..)
                .partition(|(_, entity)| predicate(entity));
            repo.entries = kept;
            doomed
        };
        for (id, entity) in &removed {
            self.emit_change(RepositoryChange {
                repository: name.clone(),
                kind: ChangeKind::Delete,
                entity_before: Some(entity.clone()),
                entity_after: None,
                entity_id: id.clone(),
            });
        }
        removed.into_iter().map(|(_, entity)| entity).collect()
    }

    /// Number of entities currently stored.
    pub fn len(&self, repository: &str) -> usize {
        let name = Self::normalize(repository);
        self.repositories
            .read()
            .get(&name)
            .map_or(0, |repo| repo.entries.len())
    }

    pub fn is_empty(&self, repository: &str) -> bool {
        self.len(repository) == 0
    }

    fn emit_change(&self, change: RepositoryChange) {
        let event = change.event_name();
        self.bus.emit(event, change.into_value());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> (RepositoryStore, tokio::sync::mpsc::UnboundedReceiver<aro_core::event::EventEnvelope>) {
        let (bus, receiver) = EventBus::channel();
        (RepositoryStore::new(bus), receiver)
    }

    #[test]
    fn store_assigns_a_fresh_id() {
        let (repos, _rx) = store();
        let stored = repos.store("user-repository", RuntimeValue::map([("name", "Alice".into())]));
        let id = stored.property("id").and_then(RuntimeValue::as_text).unwrap();
        assert!(!id.is_empty());
        assert_eq!(stored.property("name"), Some(&RuntimeValue::Text("Alice".into())));
    }

    #[test]
    fn iteration_order_is_insertion_order() {
        let (repos, _rx) = store();
        for name in ["a", "b", "c"] {
            repos.store("item-repository", RuntimeValue::map([("name", name.into())]));
        }
        let all = repos.retrieve_all("item-repository");
        let names: Vec<_> = all
            .as_list()
            .unwrap()
            .iter()
            .map(|e| e.property("name").unwrap().to_string())
            .collect();
        assert_eq!(names, ["a", "b", "c"]);
    }

    #[test]
    fn lookups_are_case_insensitive() {
        let (repos, _rx) = store();
        repos.store("User-Repository", RuntimeValue::map([("name", "Alice".into())]));
        assert_eq!(repos.len("user-repository"), 1);
    }

    #[test]
    fn update_preserves_the_id_and_reports_both_states() {
        let (repos, mut rx) = store();
        let stored = repos.store("user-repository", RuntimeValue::map([("age", RuntimeValue::Int(30))]));
        let id = stored.property("id").and_then(RuntimeValue::as_text).unwrap().to_string();
        let _insert_event = rx.try_recv().unwrap();

        let updated = repos
            .update("user-repository", &id, |entity| {
                if let RuntimeValue::Map(map) = entity {
                    map.insert("age".into(), RuntimeValue::Int(31));
                }
            })
            .unwrap();
        assert_eq!(updated.property("age"), Some(&RuntimeValue::Int(31)));
        assert_eq!(updated.property("id"), Some(&RuntimeValue::Text(id.clone())));

        let change = rx.try_recv().unwrap();
        assert_eq!(change.kind, "user-repository-change");
        let before = change.payload.property("entity-before").unwrap();
        let after = change.payload.property("entity-after").unwrap();
        assert_eq!(before.property("age"), Some(&RuntimeValue::Int(30)));
        assert_eq!(after.property("age"), Some(&RuntimeValue::Int(31)));
    }

    #[test]
    fn delete_emits_one_change_per_entity() {
        let (repos, mut rx) = store();
        repos.store("x-repository", RuntimeValue::map([("keep", RuntimeValue::Bool(true))]));
        repos.store("x-repository", RuntimeValue::map([("keep", RuntimeValue::Bool(false))]));
        repos.store("x-repository", RuntimeValue::map([("keep", RuntimeValue::Bool(false))]));
        while rx.try_recv().is_ok() {}

        let removed = repos.delete_where("x-repository", |entity| {
            entity.property("keep") == Some(&RuntimeValue::Bool(false))
        });
        assert_eq!(removed.len(), 2);
        assert_eq!(repos.len("x-repository"), 1);

        let mut deletes = 0;
        while let Ok(envelope) = rx.try_recv() {
            assert_eq!(envelope.kind, "x-repository-change");
            assert_eq!(
                envelope.payload.property("change-kind"),
                Some(&RuntimeValue::Text("delete".into()))
            );
            deletes += 1;
        }
        assert_eq!(deletes, 2);
    }

    #[test]
    fn non_mapping_entities_are_wrapped() {
        let (repos, _rx) = store();
        let stored = repos.store("note-repository", RuntimeValue::Text("plain".into()));
        assert_eq!(stored.property("value"), Some(&RuntimeValue::Text("plain".into())));
        assert!(stored.property("id").is_some());
    }
}
