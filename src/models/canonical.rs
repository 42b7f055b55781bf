//! Canonicalization of client-submitted scenario documents.
//!
//! Submitted scenarios are loosely shaped JSON: fields may be missing, `null`,
//! or carry client-only upload state. Before a scenario reaches the document
//! store it is reduced to a [`NewScenario`] in which every field is explicit,
//! and a pre-flight scan confirms no absent markers survived.

use serde_json::{Map, Value};
use thiserror::Error;
use tracing::error;

use super::scenario::NewScenario;
use super::turn::MAX_ID_LEN;

/// Character keys that only exist in the browser while editing.
const CLIENT_ONLY_CHARACTER_KEYS: [&str; 2] = ["avatarFile", "avatarPreview"];

/// Top-level keys owned by the server.
const SERVER_OWNED_KEYS: [&str; 3] = ["id", "createdAt", "updatedAt"];

#[derive(Debug, Error)]
pub enum CanonicalError {
    #[error("scenario payload must be a JSON object")]
    NotAnObject,
    #[error("invalid scenario payload: {0}")]
    Invalid(#[from] serde_json::Error),
    #[error("character id '{0}' exceeds {MAX_ID_LEN} chars")]
    CharacterIdTooLong(String),
    #[error("absent values at: {}", .0.join(", "))]
    AbsentValues(Vec<String>),
}

/// Enumerate the dotted paths of every `null` value in a JSON tree.
pub fn find_absent_paths(value: &Value) -> Vec<String> {
    let mut paths = Vec::new();
    collect_absent(value, "", &mut paths);
    paths
}

fn collect_absent(value: &Value, path: &str, paths: &mut Vec<String>) {
    let join = |key: &str| {
        if path.is_empty() {
            key.to_string()
        } else {
            format!("{path}.{key}")
        }
    };
    match value {
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = join(key);
                if child.is_null() {
                    paths.push(child_path);
                } else {
                    collect_absent(child, &child_path, paths);
                }
            }
        }
        Value::Array(items) => {
            for (i, child) in items.iter().enumerate() {
                let child_path = join(&i.to_string());
                if child.is_null() {
                    paths.push(child_path);
                } else {
                    collect_absent(child, &child_path, paths);
                }
            }
        }
        _ => {}
    }
}

/// Remove `null` object members and array elements, recursively.
pub fn strip_absent(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_absent(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .into_iter()
                .filter(|v| !v.is_null())
                .map(strip_absent)
                .collect(),
        ),
        other => other,
    }
}

fn resolve_avatar(character: &mut Map<String, Value>) {
    let avatar = character
        .get("avatar")
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .or_else(|| {
            character
                .get("avatarPreview")
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty() && !s.starts_with("blob:"))
        })
        .unwrap_or_default()
        .to_string();
    character.insert("avatar".to_string(), Value::String(avatar));
    for key in CLIENT_ONLY_CHARACTER_KEYS {
        character.remove(key);
    }
}

/// Turn a raw scenario document into a fully explicit [`NewScenario`].
pub fn canonicalize_scenario(raw: Value) -> Result<NewScenario, CanonicalError> {
    let Value::Object(mut doc) = raw else {
        return Err(CanonicalError::NotAnObject);
    };

    for key in SERVER_OWNED_KEYS {
        doc.remove(key);
    }

    if let Some(Value::Array(characters)) = doc.get_mut("characters") {
        for character in characters.iter_mut() {
            if let Value::Object(fields) = character {
                resolve_avatar(fields);
            }
        }
    }

    let mut scenario: NewScenario = serde_json::from_value(strip_absent(Value::Object(doc)))?;

    for character in scenario.characters.iter_mut() {
        if character.id.is_empty() {
            character.id = uuid::Uuid::new_v4().to_string();
        } else if character.id.len() > MAX_ID_LEN {
            return Err(CanonicalError::CharacterIdTooLong(character.id.clone()));
        }
    }

    let absent = find_absent_paths(&serde_json::to_value(&scenario)?);
    if !absent.is_empty() {
        error!("Scenario still carries absent values after canonicalization: {absent:?}");
        return Err(CanonicalError::AbsentValues(absent));
    }

    Ok(scenario)
}
