//! Content fingerprints for resource bundles.
//!
//! A fingerprint is a CRC-32C over a canonical walk of the bundle: resource
//! types in a fixed order, entries within a type sorted, every field
//! length-prefixed. The checksum is then written in base 27 over an alphabet
//! without vowels, so versions are safe to embed in record names.

use crc32c::crc32c_append;

use crate::api::{EnvoyResource, EnvoyResources, EnvoySecretResource};

const SAFE_ALPHABET: &[u8] = b"bcdfghjklmnpqrstvwxz2456789";

/// Digits needed for any `u32` in base 27.
const ENCODED_LEN: usize = 7;

/// Fingerprint of a declared bundle. Insensitive to entry order within a type.
pub fn hash_resources(resources: &EnvoyResources) -> String {
    let mut crc = 0;
    for (tag, entries) in [
        ("endpoints", &resources.endpoints),
        ("clusters", &resources.clusters),
        ("routes", &resources.routes),
        ("listeners", &resources.listeners),
        ("runtimes", &resources.runtimes),
    ] {
        crc = feed_entries(crc, tag, entries);
    }
    crc = feed_secrets(crc, &resources.secrets);
    encode(crc)
}

/// Fingerprint of an ordered sequence of byte chunks.
pub fn hash_chunks<'a>(chunks: impl IntoIterator<Item = &'a [u8]>) -> String {
    let crc = chunks.into_iter().fold(0, feed);
    encode(crc)
}

fn feed_entries(crc: u32, tag: &str, entries: &[EnvoyResource]) -> u32 {
    let mut sorted: Vec<&EnvoyResource> = entries.iter().collect();
    sorted.sort();

    let mut crc = feed(crc, tag.as_bytes());
    crc = feed_len(crc, sorted.len());
    for entry in sorted {
        crc = feed(crc, entry.name.as_bytes());
        crc = feed(crc, entry.value.as_bytes());
    }
    crc
}

fn feed_secrets(crc: u32, entries: &[EnvoySecretResource]) -> u32 {
    let mut sorted: Vec<&EnvoySecretResource> = entries.iter().collect();
    sorted.sort();

    let mut crc = feed(crc, b"secrets");
    crc = feed_len(crc, sorted.len());
    for entry in sorted {
        crc = feed(crc, entry.name.as_bytes());
        crc = feed(crc, entry.secret_ref.name.as_bytes());
        crc = match &entry.secret_ref.namespace {
            Some(ns) => feed(crc32c_append(crc, &[1]), ns.as_bytes()),
            None => crc32c_append(crc, &[0]),
        };
    }
    crc
}

fn feed(crc: u32, bytes: &[u8]) -> u32 {
    let crc = feed_len(crc, bytes.len());
    crc32c_append(crc, bytes)
}

fn feed_len(crc: u32, len: usize) -> u32 {
    crc32c_append(crc, &(len as u64).to_le_bytes())
}

fn encode(crc: u32) -> String {
    let base = SAFE_ALPHABET.len() as u32;
    let mut digits = [SAFE_ALPHABET[0]; ENCODED_LEN];
    let mut rest = crc;
    for slot in digits.iter_mut().rev() {
        *slot = SAFE_ALPHABET[(rest % base) as usize];
        rest /= base;
    }
    digits.iter().map(|&b| b as char).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::SecretReference;

    fn bundle() -> EnvoyResources {
        EnvoyResources {
            endpoints: vec![
                EnvoyResource::new("e1", r#"{"cluster_name":"e1"}"#),
                EnvoyResource::new("e2", r#"{"cluster_name":"e2"}"#),
            ],
            clusters: vec![EnvoyResource::new("c1", r#"{"name":"c1"}"#)],
            secrets: vec![EnvoySecretResource::new("tls", "edge-cert")],
            ..Default::default()
        }
    }

    #[test]
    fn test_hash_is_deterministic() {
        assert_eq!(hash_resources(&bundle()), hash_resources(&bundle()));
    }

    #[test]
    fn test_hash_ignores_order_within_type() {
        let mut permuted = bundle();
        permuted.endpoints.reverse();
        assert_eq!(hash_resources(&bundle()), hash_resources(&permuted));
    }

    #[test]
    fn test_hash_changes_with_content() {
        let base = hash_resources(&bundle());

        let mut value_changed = bundle();
        value_changed.endpoints[0].value = r#"{"cluster_name":"e3"}"#.into();
        assert_ne!(base, hash_resources(&value_changed));

        let mut name_changed = bundle();
        name_changed.clusters[0].name = "c2".into();
        assert_ne!(base, hash_resources(&name_changed));

        let mut ref_changed = bundle();
        ref_changed.secrets[0].secret_ref = SecretReference {
            name: "edge-cert".into(),
            namespace: Some("other".into()),
        };
        assert_ne!(base, hash_resources(&ref_changed));
    }

    #[test]
    fn test_hash_distinguishes_resource_types() {
        let as_endpoint = EnvoyResources {
            endpoints: vec![EnvoyResource::new("x", "{}")],
            ..Default::default()
        };
        let as_cluster = EnvoyResources {
            clusters: vec![EnvoyResource::new("x", "{}")],
            ..Default::default()
        };
        assert_ne!(hash_resources(&as_endpoint), hash_resources(&as_cluster));
    }

    #[test]
    fn test_field_boundaries_are_not_ambiguous() {
        let a = EnvoyResources {
            runtimes: vec![EnvoyResource::new("ab", "c")],
            ..Default::default()
        };
        let b = EnvoyResources {
            runtimes: vec![EnvoyResource::new("a", "bc")],
            ..Default::default()
        };
        assert_ne!(hash_resources(&a), hash_resources(&b));
    }

    #[test]
    fn test_encoding_uses_safe_alphabet() {
        let version = hash_resources(&bundle());
        assert_eq!(version.len(), ENCODED_LEN);
        assert!(version.bytes().all(|b| SAFE_ALPHABET.contains(&b)));
    }

    #[test]
    fn test_encoding_is_base_27() {
        assert_eq!(encode(0), "bbbbbbb");
        assert_eq!(encode(1), "bbbbbbc");
        assert_eq!(encode(26), "bbbbbb9");
        assert_eq!(encode(27), "bbbbbcb");
        assert_eq!(encode(u32::MAX).len(), ENCODED_LEN);
        assert_ne!(encode(u32::MAX), encode(u32::MAX - 1));
    }

    #[test]
    fn test_hash_chunks_order_matters() {
        let a = hash_chunks([b"one".as_slice(), b"two".as_slice()]);
        let b = hash_chunks([b"two".as_slice(), b"one".as_slice()]);
        assert_ne!(a, b);
    }
}
