//! Content fingerprints for cached records.

use sha2::{Digest, Sha256};

/// Compute a fingerprint over an ordered list of field values.
///
/// Fields are separated by a NUL byte so `["ab", "c"]` and `["a", "bc"]`
/// never collide.
pub fn fingerprint<'a>(fields: impl IntoIterator<Item = &'a str>) -> String {
    let mut hasher = Sha256::new();
    for field in fields {
        hasher.update(field.as_bytes());
        hasher.update(b"\0");
    }
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fingerprint_stability() {
        assert_eq!(fingerprint(["Foo", "Journal X"]), fingerprint(["Foo", "Journal X"]));
    }

    #[test]
    fn test_fingerprint_field_boundaries() {
        assert_ne!(fingerprint(["ab", "c"]), fingerprint(["a", "bc"]));
    }

    #[test]
    fn test_fingerprint_format() {
        let hash = fingerprint(["Foo"]);
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
