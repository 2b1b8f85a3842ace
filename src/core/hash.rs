use std::fmt::{Debug, Display, Formatter};
use std::str::FromStr;

use anyhow::{Error, anyhow};
use md4::{Digest, Md4};

pub const HASH_LEN: usize = 16;

/// MD4 digest identifying either a whole file (content hash) or a single piece.
#[derive(PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord, Default)]
pub struct Hash(pub [u8; HASH_LEN]);

impl Hash {
    pub fn digest(data: &[u8]) -> Self {
        Self(Md4::digest(data).into())
    }

    /// Content hash of a file with the given piece hashes. A single piece file is identified
    /// by the hash of its only piece, larger files by the hash of all piece hashes.
    pub fn from_hash_set(hash_set: &[Hash]) -> Self {
        if let [single] = hash_set {
            return *single;
        }
        let mut hasher = Md4::new();
        for hash in hash_set {
            hasher.update(hash.0);
        }
        Self(hasher.finalize().into())
    }

    pub fn from_hex(hex: &str) -> anyhow::Result<Self> {
        let bytes = hex::decode(hex)?;
        Self::try_from(bytes.as_slice())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl TryFrom<&[u8]> for Hash {
    type Error = Error;

    fn try_from(bytes: &[u8]) -> anyhow::Result<Self> {
        let bytes: [u8; HASH_LEN] = bytes
            .try_into()
            .map_err(|_| anyhow!("invalid hash length {}", bytes.len()))?;
        Ok(Self(bytes))
    }
}

impl FromStr for Hash {
    type Err = Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        Self::from_hex(s)
    }
}

impl Display for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        for byte in self.0 {
            write!(f, "{:02x}", byte)?;
        }
        Ok(())
    }
}

impl Debug for Hash {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "Hash({})", self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md4_test_vectors() {
        assert_eq!(
            Hash::digest(b"").to_hex(),
            "31d6cfe0d16ae931b73c59d7e0c089c0"
        );
        assert_eq!(
            Hash::digest(b"abc").to_hex(),
            "a448017aaf21d8525fc10ae87aa6729d"
        );
    }

    #[test]
    fn single_piece_hash_set() {
        let piece = Hash::digest(b"piece");

        assert_eq!(Hash::from_hash_set(&[piece]), piece);
    }

    #[test]
    fn multi_piece_hash_set() {
        let first = Hash::digest(b"first");
        let second = Hash::digest(b"second");
        let mut concatenated = Vec::new();
        concatenated.extend_from_slice(&first.0);
        concatenated.extend_from_slice(&second.0);

        assert_eq!(
            Hash::from_hash_set(&[first, second]),
            Hash::digest(&concatenated)
        );
    }

    #[test]
    fn parse_hex() {
        let hash: Hash = "31D6CFE0D16AE931B73C59D7E0C089C0".parse().unwrap();

        assert_eq!(hash, Hash::digest(b""));
        assert!(Hash::from_hex("31d6").is_err());
        assert!(Hash::from_hex("not hex").is_err());
    }
}
