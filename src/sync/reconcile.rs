use std::collections::HashSet;

use indexmap::IndexSet;

use crate::{
    error::SyncError,
    model::{CollectionKey, Entity, Identity, ProvisionalId},
    store::collection::ensure_unique,
    sync::keys::{ContentKey, KeyPolicy},
};

/// Result of merging a fetch with the provisional entries of a collection.
#[derive(Debug)]
pub struct Reconciled {
    /// Fetched entities, in fetch order.
    pub authoritative: Vec<Entity>,
    /// Provisional entries that stay visible.
    pub retained: IndexSet<ProvisionalId>,
    /// Provisional entries now represented by a fetched entity.
    pub superseded: Vec<ProvisionalId>,
    /// Provisional entries dropped because a newer one has the same key.
    pub collapsed: Vec<ProvisionalId>,
}

/// Decide the fate of each provisional entry against a fresh authoritative set.
///
/// A provisional entry is superseded when the fetch lists the id echoed by its create
/// response, or any entity with the same content key. Among the remaining entries only
/// the newest per key is retained. Fails before deciding anything when the fetch lists a
/// backend id twice.
pub fn reconcile<'a, I>(
    collection: CollectionKey,
    authoritative: Vec<Entity>,
    provisional: I,
    keys: &KeyPolicy,
) -> Result<Reconciled, SyncError>
where
    I: DoubleEndedIterator<Item = &'a Entity>,
{
    ensure_unique(collection, &authoritative)?;

    let fetched_ids = authoritative
        .iter()
        .filter_map(|entity| entity.identity().server())
        .collect::<HashSet<_>>();
    let fetched_keys = authoritative
        .iter()
        .map(|entity| keys.key(entity))
        .collect::<HashSet<_>>();

    let mut retained_keys: HashSet<ContentKey> = HashSet::new();
    let mut retained = Vec::new();
    let mut superseded = Vec::new();
    let mut collapsed = Vec::new();

    // Newest first, so the newest entry wins a key collision.
    for entity in provisional.rev() {
        let Identity::Provisional(id) = entity.identity() else {
            continue;
        };

        let echoed = entity
            .confirmed_id()
            .is_some_and(|confirmed| fetched_ids.contains(&confirmed));
        let key = keys.key(entity);

        if echoed || fetched_keys.contains(&key) {
            superseded.push(id);
        } else if retained_keys.insert(key) {
            retained.push(id);
        } else {
            collapsed.push(id);
        }
    }

    Ok(Reconciled {
        authoritative,
        retained: retained.into_iter().rev().collect(),
        superseded,
        collapsed,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{EntityKind, Group, Payload, Question, QuestionBody, ServerId};

    fn group(name: &str) -> Payload {
        Payload::Group(Group {
            name: name.into(),
            description: None,
        })
    }

    fn groups() -> CollectionKey {
        CollectionKey::root(EntityKind::Group)
    }

    #[test]
    fn matching_key_supersedes_provisional() {
        let pending = Entity::provisional(ProvisionalId::mint(), group("Mentors"), None);
        let fetched = vec![Entity::authoritative(ServerId::new(1), group("  mentors "))];

        let outcome =
            reconcile(groups(), fetched, [&pending].into_iter(), &KeyPolicy::default()).unwrap();

        assert!(outcome.retained.is_empty());
        assert_eq!(outcome.superseded.len(), 1);
    }

    #[test]
    fn echoed_id_supersedes_even_when_content_changed() {
        let pending =
            Entity::provisional(ProvisionalId::mint(), group("Mentors"), Some(ServerId::new(4)));
        let fetched = vec![Entity::authoritative(ServerId::new(4), group("Staff"))];

        let outcome =
            reconcile(groups(), fetched, [&pending].into_iter(), &KeyPolicy::default()).unwrap();

        assert_eq!(outcome.superseded.len(), 1);
        assert!(outcome.retained.is_empty());
    }

    #[test]
    fn unmatched_provisional_is_retained() {
        let pending = Entity::provisional(ProvisionalId::mint(), group("Students"), None);
        let fetched = vec![Entity::authoritative(ServerId::new(1), group("Mentors"))];

        let outcome =
            reconcile(groups(), fetched, [&pending].into_iter(), &KeyPolicy::default()).unwrap();

        assert_eq!(outcome.retained.len(), 1);
        assert_eq!(outcome.authoritative.len(), 1);
    }

    #[test]
    fn provisional_duplicates_collapse_to_the_newest() {
        let older = Entity::provisional(ProvisionalId::mint(), group("Students"), None);
        let newer = Entity::provisional(ProvisionalId::mint(), group("students"), None);

        let outcome = reconcile(
            groups(),
            Vec::new(),
            [&older, &newer].into_iter(),
            &KeyPolicy::default(),
        )
        .unwrap();

        let Identity::Provisional(newer_id) = newer.identity() else {
            panic!("expected provisional identity");
        };
        assert_eq!(outcome.retained.len(), 1);
        assert!(outcome.retained.contains(&newer_id));
        assert_eq!(outcome.collapsed.len(), 1);
    }

    #[test]
    fn every_provisional_with_a_fetched_key_is_superseded() {
        let first = Entity::provisional(ProvisionalId::mint(), group("Students"), None);
        let second = Entity::provisional(ProvisionalId::mint(), group("Students"), None);
        let fetched = vec![Entity::authoritative(ServerId::new(2), group("Students"))];

        let outcome = reconcile(
            groups(),
            fetched,
            [&first, &second].into_iter(),
            &KeyPolicy::default(),
        )
        .unwrap();

        assert_eq!(outcome.superseded.len(), 2);
        assert!(outcome.retained.is_empty());
    }

    #[test]
    fn questions_in_other_scopes_do_not_match() {
        let question = |kahoot: i64| {
            Payload::Question(Question {
                kahoot_id: ServerId::new(kahoot),
                body: QuestionBody::Written {
                    question: "Capital of Sweden?".into(),
                },
            })
        };
        let pending = Entity::provisional(ProvisionalId::mint(), question(7), None);
        let fetched = vec![Entity::authoritative(ServerId::new(1), question(8))];

        let outcome = reconcile(
            CollectionKey::questions(ServerId::new(7)),
            fetched,
            [&pending].into_iter(),
            &KeyPolicy::default(),
        )
        .unwrap();

        assert_eq!(outcome.retained.len(), 1);
    }

    #[test]
    fn duplicate_fetch_ids_fail() {
        let fetched = vec![
            Entity::authoritative(ServerId::new(5), group("A")),
            Entity::authoritative(ServerId::new(5), group("B")),
        ];
        let err = reconcile(groups(), fetched, std::iter::empty(), &KeyPolicy::default())
            .unwrap_err();
        assert!(matches!(err, SyncError::DuplicateIdentity { .. }));
    }
}
