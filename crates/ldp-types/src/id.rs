use uuid::Uuid;

use crate::error::TypeError;

/// Source of fresh container identifiers.
pub trait IdGenerator: Send + Sync {
    fn next_id(&self) -> String;
}

/// Generates time-ordered UUID v7 identifiers.
#[derive(Clone, Copy, Debug, Default)]
pub struct UuidV7Generator;

impl IdGenerator for UuidV7Generator {
    fn next_id(&self) -> String {
        Uuid::now_v7().to_string()
    }
}

/// Validate that `id` can identify a container.
///
/// Ids must be non-empty, must not contain `/` (they are used as single path
/// segments) and must not contain control characters.
pub fn validate_container_id(id: &str) -> Result<(), TypeError> {
    let reason = if id.is_empty() {
        "must not be empty"
    } else if id.contains('/') {
        "must not contain '/'"
    } else if id.chars().any(char::is_control) {
        "must not contain control characters"
    } else {
        return Ok(());
    };
    Err(TypeError::InvalidId {
        id: id.to_string(),
        reason: reason.into(),
    })
}
