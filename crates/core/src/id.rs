//! Identifier generation

use uuid::Uuid;

/// Generate a fresh random identifier (UUID v4, hyphenated)
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
