use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    hash::{DefaultHasher, Hash, Hasher},
};

/// A block of the toy chain: an owner's message plus the nonce that mined it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    #[serde(rename = "ownerID")]
    pub owner_id: String,
    #[serde(rename = "ownerName")]
    pub owner_name: String,
    pub msg: String,
    pub hash: u64,
    pub nonce: u64,
    /// When the block was sealed. `None` until it is mined.
    pub timestamp: Option<DateTime<Utc>>,
}

impl Block {
    /// Creates an unmined block.
    pub fn new(
        owner_id: impl Into<String>,
        owner_name: impl Into<String>,
        msg: impl Into<String>,
    ) -> Self {
        Self {
            owner_id: owner_id.into(),
            owner_name: owner_name.into(),
            msg: msg.into(),
            hash: 0,
            nonce: 0,
            timestamp: None,
        }
    }

    /// Hash of the block contents combined with `nonce`.
    ///
    /// This is `DefaultHasher` (SipHash with fixed keys): stable within one
    /// build, and not a cryptographic commitment.
    pub fn digest(&self, nonce: u64) -> u64 {
        let mut hasher = DefaultHasher::new();
        self.owner_id.hash(&mut hasher);
        self.owner_name.hash(&mut hasher);
        self.msg.hash(&mut hasher);
        nonce.hash(&mut hasher);
        hasher.finish()
    }

    /// Records the mining result and stamps the block with the current time.
    pub fn seal(&mut self, hash: u64, nonce: u64) {
        self.hash = hash;
        self.nonce = nonce;
        self.timestamp = Some(Utc::now());
    }

    /// Whether the stored hash matches the contents and nonce.
    pub fn verify_integrity(&self) -> bool {
        self.hash == self.digest(self.nonce)
    }

    /// Whether `other` carries the same owner and message.
    pub fn same_payload(&self, other: &Self) -> bool {
        self.owner_id == other.owner_id
            && self.owner_name == other.owner_name
            && self.msg == other.msg
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let json = serde_json::to_string_pretty(self).map_err(|_| fmt::Error)?;
        f.write_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn block() -> Block {
        Block::new("42", "alice", "hello quorum")
    }

    #[test]
    fn sealed_block_passes_integrity() {
        let mut b = block();
        assert!(b.timestamp.is_none());

        let hash = b.digest(7);
        b.seal(hash, 7);
        assert!(b.verify_integrity());
        assert!(b.timestamp.is_some());

        b.msg.push('!');
        assert!(!b.verify_integrity(), "tampered message must not verify");
    }

    #[test]
    fn digest_depends_on_nonce_and_payload() {
        let b = block();
        assert_eq!(b.digest(1), b.digest(1));
        assert_ne!(b.digest(1), b.digest(2));
        assert_ne!(b.digest(1), Block::new("42", "alice", "bye").digest(1));
    }

    #[test]
    fn json_uses_prototype_field_names() {
        let mut b = block();
        b.seal(b.digest(3), 3);

        let value = serde_json::to_value(&b).unwrap();
        assert_eq!(value["ownerID"], "42");
        assert_eq!(value["ownerName"], "alice");
        assert_eq!(value["msg"], "hello quorum");
        assert_eq!(value["nonce"], 3);

        let back: Block = serde_json::from_value(value).unwrap();
        assert_eq!(back, b);
        assert!(b.to_string().contains("\"ownerID\": \"42\""));
    }
}
