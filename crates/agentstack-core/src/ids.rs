//! Identifier generation for traces and spans.
//!
//! Ids are 128-bit, textual, and opaque to callers — nothing in this crate
//! or any downstream consumer parses structure out of them.

use uuid::Uuid;

/// Mint a new 128-bit identifier, rendered as a hyphenated lowercase string.
#[must_use]
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique() {
        let a = new_id();
        let b = new_id();
        assert_ne!(a, b);
        assert_eq!(a.len(), 36);
    }
}
