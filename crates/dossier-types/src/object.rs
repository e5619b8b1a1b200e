use std::fmt;

use chrono::{DateTime, Utc};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::category::Category;
use crate::error::TypeError;

/// Opaque key of a stored object in the backing bucket.
///
/// Keys are generated, never derived from the original filename, so they leak
/// no local paths and two uploads of `proposal.pdf` never collide. Layout:
/// `{category}/{uuid_v7}-{8 random bytes hex}`.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ObjectKey(String);

impl ObjectKey {
    /// Generate a fresh collision-resistant key under the category prefix.
    pub fn generate(category: Category) -> Self {
        let mut salt = [0u8; 8];
        rand::thread_rng().fill_bytes(&mut salt);
        Self(format!(
            "{}/{}-{}",
            category.as_str(),
            uuid::Uuid::now_v7().simple(),
            hex::encode(salt)
        ))
    }

    /// Wrap a key read back from the catalog or the store.
    pub fn from_raw(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// When a generated key was issued, read back from its UUID v7 segment.
    /// `None` for keys this crate did not generate.
    pub fn issued_at(&self) -> Option<DateTime<Utc>> {
        let (_, rest) = self.0.split_once('/')?;
        let (uuid, _) = rest.split_once('-')?;
        let (secs, nanos) = uuid::Uuid::try_parse(uuid).ok()?.get_timestamp()?.to_unix();
        DateTime::from_timestamp(i64::try_from(secs).ok()?, nanos)
    }
}

impl fmt::Debug for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjectKey({})", self.0)
    }
}

impl fmt::Display for ObjectKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// BLAKE3 digest of an uploaded file's bytes.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ContentHash([u8; 32]);

impl ContentHash {
    pub fn of(data: &[u8]) -> Self {
        Self(*blake3::hash(data).as_bytes())
    }

    pub fn from_hash(hash: [u8; 32]) -> Self {
        Self(hash)
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, TypeError> {
        let bytes = hex::decode(s).map_err(|e| TypeError::InvalidHash(e.to_string()))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|b: Vec<u8>| TypeError::InvalidHash(format!("expected 32 bytes, got {}", b.len())))?;
        Ok(Self(arr))
    }
}

impl TryFrom<String> for ContentHash {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value)
    }
}

impl From<ContentHash> for String {
    fn from(hash: ContentHash) -> Self {
        hash.to_hex()
    }
}

impl fmt::Debug for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ContentHash({})", hex::encode(&self.0[..4]))
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_keys_are_unique_and_prefixed() {
        let a = ObjectKey::generate(Category::Research);
        let b = ObjectKey::generate(Category::Research);
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("research/"));
    }

    #[test]
    fn generated_key_never_contains_a_filename() {
        let key = ObjectKey::generate(Category::Publication);
        let (_, tail) = key.as_str().split_once('/').unwrap();
        assert!(tail.chars().all(|c| c.is_ascii_hexdigit() || c == '-'));
    }

    #[test]
    fn issued_at_reads_the_key_timestamp() {
        let before = Utc::now() - chrono::Duration::seconds(1);
        let key = ObjectKey::generate(Category::CommunityService);
        let issued = key.issued_at().unwrap();
        assert!(issued >= before && issued <= Utc::now() + chrono::Duration::seconds(1));
        assert_eq!(ObjectKey::from_raw("legacy/proposal.pdf").issued_at(), None);
        assert_eq!(ObjectKey::from_raw("no-slash").issued_at(), None);
    }

    #[test]
    fn content_hash_is_deterministic() {
        assert_eq!(ContentHash::of(b"abc"), ContentHash::of(b"abc"));
        assert_ne!(ContentHash::of(b"abc"), ContentHash::of(b"abd"));
    }

    #[test]
    fn content_hash_hex_roundtrip() {
        let h = ContentHash::of(b"proposal");
        assert_eq!(ContentHash::from_hex(&h.to_hex()).unwrap(), h);
        assert!(ContentHash::from_hex("abcd").is_err());
        assert!(ContentHash::from_hex("zz").is_err());
    }
}
