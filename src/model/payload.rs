use serde::{Deserialize, Serialize};
use validator::{Validate, ValidationError, ValidationErrors};

use crate::model::{
    entity::{CollectionKey, EntityKind, Scope, ServerId},
    validation::{validate_birthdate, validate_not_blank},
};

/// Kind-specific fields of an entity, also used as the body of a create request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Payload {
    /// Quiz collection.
    Kahoot(Kahoot),
    /// Registered user.
    User(User),
    /// Group of users.
    Group(Group),
    /// Question or slide of a Kahoot.
    Question(Question),
}

impl Payload {
    /// Kind of entity this payload describes.
    pub fn kind(&self) -> EntityKind {
        match self {
            Payload::Kahoot(_) => EntityKind::Kahoot,
            Payload::User(_) => EntityKind::User,
            Payload::Group(_) => EntityKind::Group,
            Payload::Question(_) => EntityKind::Question,
        }
    }

    /// Parent context implied by the payload.
    pub fn scope(&self) -> Scope {
        match self {
            Payload::Question(question) => Scope::Kahoot(question.kahoot_id),
            _ => Scope::Root,
        }
    }

    /// Collection a record with this payload belongs to.
    pub fn collection(&self) -> CollectionKey {
        CollectionKey {
            kind: self.kind(),
            scope: self.scope(),
        }
    }

    /// Copy of the payload without write-only fields such as passwords.
    pub fn without_secrets(self) -> Self {
        match self {
            Payload::User(user) => Payload::User(User {
                password: None,
                ..user
            }),
            other => other,
        }
    }
}

impl Validate for Payload {
    fn validate(&self) -> Result<(), ValidationErrors> {
        match self {
            Payload::Kahoot(kahoot) => kahoot.validate(),
            Payload::User(user) => user.validate(),
            Payload::Group(group) => group.validate(),
            Payload::Question(question) => question.validate(),
        }
    }
}

/// Quiz collection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Kahoot {
    /// Display title.
    #[validate(custom(function = "validate_not_blank"))]
    pub title: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
    /// Private Kahoots are hidden from other users.
    #[serde(default)]
    pub is_private: bool,
    /// Language reference.
    pub language_id: i64,
}

/// Registered user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    /// Unique login name.
    pub username: String,
    /// Contact address.
    pub email: String,
    /// Password, only present on create requests.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    /// Birth date formatted as `YYYY-MM-DD`.
    #[serde(default)]
    pub birthdate: Option<String>,
    /// Subscription reference.
    pub subscriptions_id: i64,
    /// Language reference.
    pub language_id: i64,
    /// Customer type reference.
    pub customer_type_id: i64,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Organisation the user belongs to.
    #[serde(default)]
    pub organisation: Option<String>,
}

impl Validate for User {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        if let Err(e) = validate_not_blank(&self.username) {
            errors.add("username", e);
        }

        if !validator::ValidateEmail::validate_email(&self.email) {
            let mut err = ValidationError::new("email");
            err.message = Some("email address is not valid".into());
            errors.add("email", err);
        }

        match self.password.as_deref() {
            Some(password) if !password.is_empty() => {}
            _ => {
                let mut err = ValidationError::new("required");
                err.message = Some("password is required".into());
                errors.add("password", err);
            }
        }

        match self.birthdate.as_deref() {
            Some(date) => {
                if let Err(e) = validate_birthdate(date) {
                    errors.add("birthdate", e);
                }
            }
            None => {
                let mut err = ValidationError::new("required");
                err.message = Some("birthdate is required".into());
                errors.add("birthdate", err);
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Group of users.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Validate)]
pub struct Group {
    /// Display name.
    #[validate(custom(function = "validate_not_blank"))]
    pub name: String,
    /// Free-form description.
    #[serde(default)]
    pub description: Option<String>,
}

/// Question or slide attached to a Kahoot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Question {
    /// Owning Kahoot.
    pub kahoot_id: ServerId,
    /// Type-specific content.
    #[serde(flatten)]
    pub body: QuestionBody,
}

/// Content of a question, by question type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum QuestionBody {
    /// True/false question with its correct answer.
    TrueFalse {
        /// Statement shown to players.
        question: String,
        /// Whether the statement is true.
        answer: bool,
    },
    /// Question stem whose accepted answers are managed separately.
    Written {
        /// Question shown to players.
        question: String,
    },
    /// Presentation slide without an answer.
    Presentation {
        /// Slide heading.
        #[serde(default)]
        title: Option<String>,
        /// Slide body.
        #[serde(default)]
        text: Option<String>,
    },
}

impl QuestionBody {
    /// Short tag naming the question type.
    pub fn type_tag(&self) -> &'static str {
        match self {
            QuestionBody::TrueFalse { .. } => "true_false",
            QuestionBody::Written { .. } => "written",
            QuestionBody::Presentation { .. } => "presentation",
        }
    }
}

impl Validate for Question {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();

        match &self.body {
            QuestionBody::TrueFalse { question, .. } | QuestionBody::Written { question } => {
                if let Err(e) = validate_not_blank(question) {
                    errors.add("question", e);
                }
            }
            QuestionBody::Presentation { title, text } => {
                let filled = |value: &Option<String>| {
                    value.as_deref().is_some_and(|v| !v.trim().is_empty())
                };
                if !filled(title) && !filled(text) {
                    let mut err = ValidationError::new("presentation_empty");
                    err.message = Some("a slide needs a title or a text".into());
                    errors.add("title", err);
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}
