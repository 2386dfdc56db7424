//! Document <-> record mapping.
//!
//! Stored documents are loosely shaped. Everything that reads them goes
//! through here once: `null` fields are treated as missing, the document id
//! wins over any `id` field, and serde defaults fill the rest.

use crate::domain::models::{Post, UserProfile};
use document_store::{Document, Patch, StoreError, StoreResult};
use identity_core::UserId;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{Map, Value};

fn decode<T: DeserializeOwned>(doc: &Document) -> StoreResult<T> {
    let mut fields: Map<String, Value> = doc
        .fields
        .iter()
        .filter(|(_, value)| !value.is_null())
        .map(|(key, value)| (key.clone(), value.clone()))
        .collect();
    fields.insert("id".to_string(), Value::String(doc.id.clone()));

    serde_json::from_value(Value::Object(fields))
        .map_err(|e| StoreError::InvalidDocument(format!("{}: {e}", doc.id)))
}

pub fn profile_from_document(doc: &Document) -> StoreResult<UserProfile> {
    decode(doc)
}

/// A single bad user id rejects the whole post; the error names where it sits.
pub fn post_from_document(doc: &Document) -> StoreResult<Post> {
    decode(doc).map_err(|e| {
        let bad = invalid_post_user_ids(doc);
        if bad.is_empty() {
            e
        } else {
            StoreError::InvalidDocument(format!(
                "{}: invalid user id at {}",
                doc.id,
                bad.join(", ")
            ))
        }
    })
}

fn array<'a>(value: Option<&'a Value>) -> impl Iterator<Item = &'a Value> + 'a {
    value.and_then(Value::as_array).into_iter().flatten()
}

/// `path=value` for every user id in a post document that `UserId` rejects
fn invalid_post_user_ids(doc: &Document) -> Vec<String> {
    let mut bad = Vec::new();
    let mut check = |path: String, value: &Value| {
        if let Some(id) = value.as_str() {
            if UserId::new(id).is_err() {
                bad.push(format!("{path}={id:?}"));
            }
        }
    };

    if let Some(author) = doc.fields.get("authorId") {
        check("authorId".to_string(), author);
    }
    for (i, like) in array(doc.fields.get("likes")).enumerate() {
        check(format!("likes[{i}]"), like);
    }
    for (i, comment) in array(doc.fields.get("comments")).enumerate() {
        if let Some(author) = comment.get("authorId") {
            check(format!("comments[{i}].authorId"), author);
        }
    }
    let options = doc.fields.get("poll").and_then(|poll| poll.get("options"));
    for (i, option) in array(options).enumerate() {
        for (j, voter) in array(option.get("votes")).enumerate() {
            check(format!("poll.options[{i}].votes[{j}]"), voter);
        }
    }
    bad
}

/// Serialize a record into document fields
pub fn to_fields<T: Serialize>(record: &T) -> StoreResult<Map<String, Value>> {
    match serde_json::to_value(record)? {
        Value::Object(fields) => Ok(fields),
        other => Err(StoreError::InvalidDocument(format!(
            "expected an object, got {other}"
        ))),
    }
}

/// Patch that writes every given field as-is
pub fn set_all(fields: Map<String, Value>) -> Patch {
    fields
        .into_iter()
        .fold(Patch::new(), |patch, (field, value)| patch.set(field, value))
}
