use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::model::payload::Payload;

/// Collections managed by the admin client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Quiz collection ("Kahoot").
    Kahoot,
    /// Registered user.
    User,
    /// Group of users.
    Group,
    /// Question or presentation slide belonging to a Kahoot.
    Question,
}

impl EntityKind {
    /// Every kind, in navigation order.
    pub const ALL: [EntityKind; 4] = [
        EntityKind::Kahoot,
        EntityKind::User,
        EntityKind::Group,
        EntityKind::Question,
    ];

    /// Stable lowercase name used in logs and the command line.
    pub fn as_str(self) -> &'static str {
        match self {
            EntityKind::Kahoot => "kahoot",
            EntityKind::User => "user",
            EntityKind::Group => "group",
            EntityKind::Question => "question",
        }
    }

    /// Whether entities of this kind only exist below a parent Kahoot.
    pub fn is_scoped(self) -> bool {
        matches!(self, EntityKind::Question)
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifier assigned by the backend. Opaque apart from equality and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ServerId(i64);

impl ServerId {
    /// Wrap a raw backend identifier.
    pub const fn new(raw: i64) -> Self {
        Self(raw)
    }

    /// Raw backend identifier, used when building request paths.
    pub const fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for ServerId {
    fn from(raw: i64) -> Self {
        Self(raw)
    }
}

impl fmt::Display for ServerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Client-minted identifier for a record the backend has not been seen to list yet.
///
/// Each value is a fresh UUID v4, so identities are never reused within a session and
/// are never sent to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProvisionalId(Uuid);

impl ProvisionalId {
    /// Mint a new provisional identity.
    pub fn mint() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for ProvisionalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tmp-{}", self.0)
    }
}

/// Key of an entity inside a store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Identity {
    /// Identity assigned by the backend.
    Server(ServerId),
    /// Identity minted locally for a not-yet-listed record.
    Provisional(ProvisionalId),
}

impl Identity {
    /// Backend identity, if this is one.
    pub fn server(self) -> Option<ServerId> {
        match self {
            Identity::Server(id) => Some(id),
            Identity::Provisional(_) => None,
        }
    }
}

impl From<ServerId> for Identity {
    fn from(id: ServerId) -> Self {
        Identity::Server(id)
    }
}

impl From<ProvisionalId> for Identity {
    fn from(id: ProvisionalId) -> Self {
        Identity::Provisional(id)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identity::Server(id) => id.fmt(f),
            Identity::Provisional(id) => id.fmt(f),
        }
    }
}

/// Where the current copy of an entity came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// Returned by a fetch of the collection.
    Authoritative,
    /// Created locally and not yet seen in a fetch.
    Provisional,
}

/// Parent context narrowing a collection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum Scope {
    /// Top-level collection (Kahoots, users, groups).
    Root,
    /// Children of one Kahoot (its questions).
    Kahoot(ServerId),
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Root => f.write_str("root"),
            Scope::Kahoot(id) => write!(f, "kahoot:{id}"),
        }
    }
}

/// One synchronised collection: an entity kind within a scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollectionKey {
    /// Kind of the entities held.
    pub kind: EntityKind,
    /// Parent context of the entities held.
    pub scope: Scope,
}

impl CollectionKey {
    /// Top-level collection of `kind`.
    pub const fn root(kind: EntityKind) -> Self {
        Self {
            kind,
            scope: Scope::Root,
        }
    }

    /// Questions belonging to one Kahoot.
    pub const fn questions(kahoot: ServerId) -> Self {
        Self {
            kind: EntityKind::Question,
            scope: Scope::Kahoot(kahoot),
        }
    }
}

impl fmt::Display for CollectionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scope {
            Scope::Root => write!(f, "{}s", self.kind),
            scope => write!(f, "{}s@{scope}", self.kind),
        }
    }
}

/// One record of a collection as currently known to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Entity {
    identity: Identity,
    origin: Origin,
    /// Backend id echoed by the create response of a provisional record, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    confirmed_id: Option<ServerId>,
    payload: Payload,
}

impl Entity {
    /// Record returned by a fetch.
    pub fn authoritative(id: ServerId, payload: Payload) -> Self {
        Self {
            identity: Identity::Server(id),
            origin: Origin::Authoritative,
            confirmed_id: None,
            payload,
        }
    }

    /// Record created locally. Secrets are stripped from the payload before it is kept.
    pub fn provisional(id: ProvisionalId, payload: Payload, confirmed_id: Option<ServerId>) -> Self {
        Self {
            identity: Identity::Provisional(id),
            origin: Origin::Provisional,
            confirmed_id,
            payload: payload.without_secrets(),
        }
    }

    /// Store key of this record.
    pub fn identity(&self) -> Identity {
        self.identity
    }

    /// Whether this record came from a fetch or from a local create.
    pub fn origin(&self) -> Origin {
        self.origin
    }

    /// Kind of this record.
    pub fn kind(&self) -> EntityKind {
        self.payload.kind()
    }

    /// Kind-specific fields.
    pub fn payload(&self) -> &Payload {
        &self.payload
    }

    /// Collection this record belongs to.
    pub fn collection(&self) -> CollectionKey {
        self.payload.collection()
    }

    /// Backend id this record is known under: its identity for authoritative records, the
    /// echoed create id for provisional ones.
    pub fn server_id(&self) -> Option<ServerId> {
        self.identity.server().or(self.confirmed_id)
    }

    /// Backend id echoed when this provisional record was created.
    pub fn confirmed_id(&self) -> Option<ServerId> {
        self.confirmed_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::payload::{Group, Question, QuestionBody};

    #[test]
    fn provisional_ids_are_never_reused() {
        let first = ProvisionalId::mint();
        let second = ProvisionalId::mint();
        assert_ne!(first, second);
    }

    #[test]
    fn server_id_falls_back_to_confirmed_id() {
        let payload = Payload::Group(Group {
            name: "Mentors".into(),
            description: None,
        });
        let pending = Entity::provisional(ProvisionalId::mint(), payload.clone(), None);
        assert_eq!(pending.server_id(), None);

        let echoed = Entity::provisional(ProvisionalId::mint(), payload.clone(), Some(ServerId::new(3)));
        assert_eq!(echoed.server_id(), Some(ServerId::new(3)));
        assert_eq!(echoed.origin(), Origin::Provisional);

        let fetched = Entity::authoritative(ServerId::new(9), payload);
        assert_eq!(fetched.server_id(), Some(ServerId::new(9)));
    }

    #[test]
    fn question_collection_is_scoped_to_its_kahoot() {
        let entity = Entity::authoritative(
            ServerId::new(1),
            Payload::Question(Question {
                kahoot_id: ServerId::new(7),
                body: QuestionBody::Written {
                    question: "Capital of Sweden?".into(),
                },
            }),
        );
        assert_eq!(entity.collection(), CollectionKey::questions(ServerId::new(7)));
        assert_eq!(entity.collection().to_string(), "questions@kahoot:7");
        assert_eq!(CollectionKey::root(EntityKind::User).to_string(), "users");
    }
}
