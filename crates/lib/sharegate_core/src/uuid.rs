// Helpers for generating identifiers.
//
// Consumption records are append-only and listed newest-first, so they use
// UUIDv7 (timestamp-sortable) generated app-side. Token ids (`jti`) only need
// to be unique and unguessable and use v4.

use uuid::Uuid;

/// Generate a new UUIDv7 (timestamp-sortable).
pub fn uuidv7() -> Uuid {
    Uuid::now_v7()
}

/// Generate a random token identifier.
pub fn new_jti() -> String {
    Uuid::new_v4().simple().to_string()
}
