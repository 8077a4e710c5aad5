//! Content-equality keys: how a locally created record is recognised in a later fetch.
//!
//! A provisional record never had a backend id, so reconciliation compares records by a
//! key derived from their visible content instead. Default keys per kind:
//!
//! | kind     | key                                                         |
//! |----------|-------------------------------------------------------------|
//! | Kahoot   | normalised title, language id                               |
//! | User     | normalised username (unique in the backend)                 |
//! | Group    | normalised name                                             |
//! | Question | parent Kahoot id, question type, normalised question text   |
//!
//! Presentation slides use their normalised title and text as question text. Text is
//! normalised by trimming, collapsing inner whitespace and lowercasing.

use std::collections::HashMap;
use std::fmt;

use crate::model::{Entity, EntityKind, Payload, QuestionBody};

/// Derived value identifying the real-world record behind an entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContentKey(String);

impl ContentKey {
    /// Build a key from already-normalised parts.
    pub fn from_parts<I, S>(parts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let joined = parts
            .into_iter()
            .map(|part| part.as_ref().to_string())
            .collect::<Vec<_>>()
            .join("\u{1f}");
        Self(joined)
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.replace('\u{1f}', " | "))
    }
}

/// Function deriving the content key of one entity.
pub type KeyFn = fn(&Entity) -> ContentKey;

/// One key function per entity kind.
#[derive(Clone, Default)]
pub struct KeyPolicy {
    overrides: HashMap<EntityKind, KeyFn>,
}

impl fmt::Debug for KeyPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPolicy")
            .field("overridden", &self.overrides.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl KeyPolicy {
    /// Replace the key function used for `kind`.
    pub fn with_key(mut self, kind: EntityKind, key: KeyFn) -> Self {
        self.overrides.insert(kind, key);
        self
    }

    /// Content key of `entity` under this policy.
    pub fn key(&self, entity: &Entity) -> ContentKey {
        match self.overrides.get(&entity.kind()) {
            Some(key) => key(entity),
            None => default_key(entity),
        }
    }
}

/// Trim, collapse inner whitespace and lowercase.
pub fn normalize(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn normalize_opt(text: Option<&str>) -> String {
    text.map(normalize).unwrap_or_default()
}

/// Built-in key for each kind, documented in the module header.
pub fn default_key(entity: &Entity) -> ContentKey {
    match entity.payload() {
        Payload::Kahoot(kahoot) => ContentKey::from_parts([
            "kahoot".to_string(),
            normalize(&kahoot.title),
            kahoot.language_id.to_string(),
        ]),
        Payload::User(user) => {
            ContentKey::from_parts(["user".to_string(), normalize(&user.username)])
        }
        Payload::Group(group) => {
            ContentKey::from_parts(["group".to_string(), normalize(&group.name)])
        }
        Payload::Question(question) => {
            let text = match &question.body {
                QuestionBody::TrueFalse { question, .. } | QuestionBody::Written { question } => {
                    normalize(question)
                }
                QuestionBody::Presentation { title, text } => format!(
                    "{}\u{1f}{}",
                    normalize_opt(title.as_deref()),
                    normalize_opt(text.as_deref())
                ),
            };
            ContentKey::from_parts([
                "question".to_string(),
                question.kahoot_id.to_string(),
                question.body.type_tag().to_string(),
                text,
            ])
        }
    }
}
