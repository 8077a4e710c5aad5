/// Identities, origins, scopes and the entity record held by stores.
pub mod entity;
/// Kind-specific payloads carried by entities and create requests.
pub mod payload;
/// Validation helpers for create payloads.
pub mod validation;

pub use entity::{
    CollectionKey, Entity, EntityKind, Identity, Origin, ProvisionalId, Scope, ServerId,
};
pub use payload::{Group, Kahoot, Payload, Question, QuestionBody, User};
