use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::model::{
    CollectionKey, Entity, EntityKind, Group, Kahoot, Payload, Question, QuestionBody, Scope,
    ServerId, User,
};

use super::error::{HttpGatewayError, HttpResult};

pub const ALL_KAHOOTS: &str = "all_kahoots";
pub const ALL_USERS: &str = "all_users";
pub const ALL_GROUPS: &str = "all_groups";

#[derive(Debug, Deserialize)]
pub struct KahootRow {
    pub id: i64,
    #[serde(flatten)]
    pub kahoot: Kahoot,
}

#[derive(Debug, Deserialize)]
pub struct UserRow {
    pub id: i64,
    #[serde(flatten)]
    pub user: User,
}

#[derive(Debug, Deserialize)]
pub struct GroupRow {
    pub id: i64,
    #[serde(flatten)]
    pub group: Group,
}

/// Path of the list endpoint for a collection, when the backend has one.
pub fn list_path(collection: CollectionKey) -> Option<&'static str> {
    match (collection.kind, collection.scope) {
        (EntityKind::Kahoot, Scope::Root) => Some(ALL_KAHOOTS),
        (EntityKind::User, Scope::Root) => Some(ALL_USERS),
        (EntityKind::Group, Scope::Root) => Some(ALL_GROUPS),
        _ => None,
    }
}

/// Decode a list response into authoritative entities.
///
/// The body must be a JSON array and every row must decode; a single bad row fails the
/// whole fetch rather than dropping data silently.
pub fn decode_rows(kind: EntityKind, path: &str, body: Value) -> HttpResult<Vec<Entity>> {
    let rows = match body {
        Value::Array(rows) => rows,
        other => {
            return Err(HttpGatewayError::DeserializeValue {
                path: path.to_string(),
                source: serde::de::Error::custom(format!(
                    "expected a JSON array, got {}",
                    json_type(&other)
                )),
            });
        }
    };

    rows.into_iter()
        .map(|row| decode_row(kind, row))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|source| HttpGatewayError::DeserializeValue {
            path: path.to_string(),
            source,
        })
}

fn decode_row(kind: EntityKind, row: Value) -> Result<Entity, serde_json::Error> {
    let entity = match kind {
        EntityKind::Kahoot => {
            let row: KahootRow = serde_json::from_value(row)?;
            Entity::authoritative(row.id.into(), Payload::Kahoot(row.kahoot))
        }
        EntityKind::User => {
            let row: UserRow = serde_json::from_value(row)?;
            Entity::authoritative(row.id.into(), Payload::User(row.user).without_secrets())
        }
        EntityKind::Group => {
            let row: GroupRow = serde_json::from_value(row)?;
            Entity::authoritative(row.id.into(), Payload::Group(row.group))
        }
        EntityKind::Question => {
            return Err(serde::de::Error::custom("questions have no list representation"));
        }
    };
    Ok(entity)
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[derive(Debug, Serialize)]
pub struct TrueFalseBody<'a> {
    pub question: &'a str,
    pub answer: bool,
    pub your_kahoot_id: i64,
}

#[derive(Debug, Serialize)]
pub struct WrittenBody<'a> {
    pub question: &'a str,
    pub your_kahoot_id: i64,
}

#[derive(Debug, Serialize)]
pub struct PresentationBody<'a> {
    pub your_kahoot_id: i64,
    pub title: Option<&'a str>,
    pub text: Option<&'a str>,
}

/// Endpoint path and JSON body of a create request.
pub fn create_request(payload: &Payload) -> HttpResult<(&'static str, Value)> {
    let (path, body) = match payload {
        Payload::Kahoot(kahoot) => ("your_kahoot", serde_json::to_value(kahoot)),
        Payload::User(user) => ("user", serde_json::to_value(user)),
        Payload::Group(group) => ("group", serde_json::to_value(group)),
        Payload::Question(Question { kahoot_id, body }) => match body {
            QuestionBody::TrueFalse { question, answer } => (
                "true_false_quiz",
                serde_json::to_value(TrueFalseBody {
                    question,
                    answer: *answer,
                    your_kahoot_id: kahoot_id.get(),
                }),
            ),
            QuestionBody::Written { question } => (
                "written_quiz",
                serde_json::to_value(WrittenBody {
                    question,
                    your_kahoot_id: kahoot_id.get(),
                }),
            ),
            QuestionBody::Presentation { title, text } => (
                "presentation_classic",
                serde_json::to_value(PresentationBody {
                    your_kahoot_id: kahoot_id.get(),
                    title: title.as_deref(),
                    text: text.as_deref(),
                }),
            ),
        },
    };

    let body = body.map_err(|source| HttpGatewayError::DeserializeValue {
        path: path.to_string(),
        source,
    })?;
    Ok((path, body))
}

/// Path segments of the delete endpoint for a record.
pub fn delete_segments(id: ServerId, payload: &Payload) -> Vec<String> {
    let (endpoint, key) = match payload {
        Payload::Kahoot(_) => ("your_kahoot", id.to_string()),
        Payload::User(user) => ("users", user.username.clone()),
        Payload::Group(_) => ("groups", id.to_string()),
        Payload::Question(question) => match question.body {
            QuestionBody::TrueFalse { .. } => ("delete_quiz_with_true_false", id.to_string()),
            QuestionBody::Written { .. } => ("quiz_question_with_written_answer", id.to_string()),
            QuestionBody::Presentation { .. } => ("presentation_classic", id.to_string()),
        },
    };
    vec![endpoint.to_string(), key]
}

/// Pull the new record id out of a create response, tolerating bodies without one.
pub fn created_id(body: &Value) -> Option<ServerId> {
    match body {
        Value::Number(number) => number.as_i64().map(ServerId::new),
        Value::Object(fields) => fields
            .get("id")
            .and_then(Value::as_i64)
            .map(ServerId::new)
            .or_else(|| {
                fields
                    .values()
                    .filter_map(|nested| nested.as_object())
                    .find_map(|nested| nested.get("id").and_then(Value::as_i64))
                    .map(ServerId::new)
            }),
        _ => None,
    }
}

/// `detail` message of a FastAPI error body.
pub fn error_detail(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    match value.get("detail")? {
        Value::String(detail) => Some(detail.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}
