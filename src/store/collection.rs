use indexmap::{IndexMap, IndexSet};

use crate::{
    error::SyncError,
    model::{CollectionKey, Entity, Identity, Origin, ProvisionalId, ServerId},
};

/// Current best-known contents of one collection.
///
/// Authoritative entries keep the order of the last fetch; provisional entries keep
/// their creation order and are listed newest first, ahead of the fetched ones.
#[derive(Debug, Clone)]
pub struct EntityStore {
    collection: CollectionKey,
    authoritative: IndexMap<ServerId, Entity>,
    provisional: IndexMap<ProvisionalId, Entity>,
}

impl EntityStore {
    /// Empty store for `collection`.
    pub fn new(collection: CollectionKey) -> Self {
        Self {
            collection,
            authoritative: IndexMap::new(),
            provisional: IndexMap::new(),
        }
    }

    /// Collection this store holds.
    pub fn collection(&self) -> CollectionKey {
        self.collection
    }

    /// Replace every authoritative entry with `entities`, leaving provisional ones alone.
    ///
    /// Fails without touching the store when two entities share a backend id.
    pub fn replace_all(&mut self, entities: Vec<Entity>) -> Result<(), SyncError> {
        ensure_unique(self.collection, &entities)?;

        self.authoritative = entities
            .into_iter()
            .filter_map(|entity| entity.identity().server().map(|id| (id, entity)))
            .collect();
        Ok(())
    }

    /// Insert or replace a provisional entry. Entities with a backend identity are ignored.
    pub fn upsert_provisional(&mut self, entity: Entity) {
        if let Identity::Provisional(id) = entity.identity() {
            self.provisional.insert(id, entity);
        }
    }

    /// Remove the entry with `identity`, returning it when present.
    pub fn remove(&mut self, identity: Identity) -> Option<Entity> {
        match identity {
            Identity::Server(id) => self.authoritative.shift_remove(&id),
            Identity::Provisional(id) => self.provisional.shift_remove(&id),
        }
    }

    /// Remove provisional entries whose create response echoed `id`.
    pub fn remove_confirmed(&mut self, id: ServerId) -> usize {
        let before = self.provisional.len();
        self.provisional
            .retain(|_, entity| entity.confirmed_id() != Some(id));
        before - self.provisional.len()
    }

    /// Entry with `identity`, if present.
    pub fn get(&self, identity: Identity) -> Option<&Entity> {
        match identity {
            Identity::Server(id) => self.authoritative.get(&id),
            Identity::Provisional(id) => self.provisional.get(&id),
        }
    }

    /// Provisional entries, oldest first.
    pub fn provisional(&self) -> impl DoubleEndedIterator<Item = &Entity> + Clone {
        self.provisional.values()
    }

    /// Authoritative entries in fetch order.
    pub fn authoritative(&self) -> impl DoubleEndedIterator<Item = &Entity> + Clone {
        self.authoritative.values()
    }

    /// Replace the provisional entries, keeping the given oldest-first order.
    pub fn retain_provisional(&mut self, keep: &IndexSet<ProvisionalId>) {
        self.provisional.retain(|id, _| keep.contains(id));
    }

    /// Entries in display order: provisional newest first, then authoritative in fetch order.
    ///
    /// The iterator is lazy and can be cloned to walk the contents again.
    pub fn all(&self) -> impl Iterator<Item = &Entity> + Clone {
        self.provisional.values().rev().chain(self.authoritative.values())
    }

    /// Number of visible entries.
    pub fn len(&self) -> usize {
        self.provisional.len() + self.authoritative.len()
    }

    /// Whether the store holds nothing.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of entries with the given origin.
    pub fn count(&self, origin: Origin) -> usize {
        match origin {
            Origin::Authoritative => self.authoritative.len(),
            Origin::Provisional => self.provisional.len(),
        }
    }
}

/// Check that no backend id appears twice in a fetch result.
pub fn ensure_unique(collection: CollectionKey, entities: &[Entity]) -> Result<(), SyncError> {
    let mut seen = IndexSet::with_capacity(entities.len());
    for entity in entities {
        let Some(id) = entity.identity().server() else {
            continue;
        };
        if !seen.insert(id) {
            return Err(SyncError::DuplicateIdentity { collection, id });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityKind, Group, Payload};

    fn group(name: &str) -> Payload {
        Payload::Group(Group {
            name: name.into(),
            description: None,
        })
    }

    fn names(store: &EntityStore) -> Vec<String> {
        store
            .all()
            .map(|entity| match entity.payload() {
                Payload::Group(group) => group.name.clone(),
                other => panic!("unexpected payload {other:?}"),
            })
            .collect()
    }

    fn store() -> EntityStore {
        EntityStore::new(CollectionKey::root(EntityKind::Group))
    }

    #[test]
    fn provisional_entries_come_first_newest_first() {
        let mut store = store();
        store
            .replace_all(vec![
                Entity::authoritative(ServerId::new(2), group("Students")),
                Entity::authoritative(ServerId::new(1), group("Mentors")),
            ])
            .unwrap();
        store.upsert_provisional(Entity::provisional(ProvisionalId::mint(), group("Old"), None));
        store.upsert_provisional(Entity::provisional(ProvisionalId::mint(), group("New"), None));

        assert_eq!(names(&store), vec!["New", "Old", "Students", "Mentors"]);
    }

    #[test]
    fn all_can_be_walked_twice() {
        let mut store = store();
        store.upsert_provisional(Entity::provisional(ProvisionalId::mint(), group("A"), None));
        let iter = store.all();
        assert_eq!(iter.clone().count(), 1);
        assert_eq!(iter.count(), 1);
    }

    #[test]
    fn replace_all_keeps_provisional_entries() {
        let mut store = store();
        store.upsert_provisional(Entity::provisional(ProvisionalId::mint(), group("Draft"), None));
        store
            .replace_all(vec![Entity::authoritative(ServerId::new(1), group("Mentors"))])
            .unwrap();
        store.replace_all(Vec::new()).unwrap();

        assert_eq!(names(&store), vec!["Draft"]);
        assert_eq!(store.count(Origin::Authoritative), 0);
    }

    #[test]
    fn duplicate_ids_leave_the_store_untouched() {
        let mut store = store();
        store
            .replace_all(vec![Entity::authoritative(ServerId::new(1), group("Mentors"))])
            .unwrap();

        let err = store
            .replace_all(vec![
                Entity::authoritative(ServerId::new(5), group("A")),
                Entity::authoritative(ServerId::new(5), group("B")),
            ])
            .unwrap_err();

        assert_eq!(
            err,
            SyncError::DuplicateIdentity {
                collection: CollectionKey::root(EntityKind::Group),
                id: ServerId::new(5),
            }
        );
        assert_eq!(names(&store), vec!["Mentors"]);
    }

    #[test]
    fn remove_is_idempotent() {
        let mut store = store();
        store
            .replace_all(vec![Entity::authoritative(ServerId::new(1), group("Mentors"))])
            .unwrap();

        assert!(store.remove(Identity::Server(ServerId::new(1))).is_some());
        assert!(store.remove(Identity::Server(ServerId::new(1))).is_none());
        assert!(store.is_empty());
    }

    #[test]
    fn provisional_entries_can_be_walked_newest_first() {
        let mut store = store();
        store.upsert_provisional(Entity::provisional(ProvisionalId::mint(), group("Old"), None));
        store.upsert_provisional(Entity::provisional(ProvisionalId::mint(), group("New"), None));

        let newest = store.provisional().rev().next().map(|entity| entity.payload().clone());
        assert_eq!(newest, Some(group("New")));
    }

    #[test]
    fn upsert_replaces_by_provisional_id() {
        let mut store = store();
        let id = ProvisionalId::mint();
        store.upsert_provisional(Entity::provisional(id, group("Draft"), None));
        store.upsert_provisional(Entity::provisional(id, group("Final"), None));

        assert_eq!(store.len(), 1);
        assert_eq!(names(&store), vec!["Final"]);
    }
}
