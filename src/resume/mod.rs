//! Resume data: what a transfer has to remember to continue after a restart.
//!
//! Stored as a bencoded dictionary:
//!
//! ```text
//! d
//!   4:hash    16:<content hash>
//!   7:hashset <16 * n>:<piece hashes>
//!   6:pieces  l <one entry per piece> e
//!   4:size    i<file size>e
//! e
//! ```
//!
//! A piece entry is `i0e` for a piece with nothing on disk, `i1e` for a verified piece and a
//! byte string bitfield of the blocks on disk for a partial one (most significant bit first).

use std::path::Path;

use anyhow::{Context, Error, Result, anyhow, bail};
use bit_set::BitSet;
use tokio::fs::File;

use crate::bencoding::value::Value;
use crate::codec::{AsyncDecoder, Encoder};
use crate::core::{HASH_LEN, Hash, Sizes};
use crate::error::ErrorCode;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PieceResumeData {
    Empty,
    Completed,
    /// Blocks known to be on disk
    Partial(BitSet),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumeData {
    pub hash: Hash,
    pub size: u64,
    pub hash_set: Vec<Hash>,
    pub pieces: Vec<PieceResumeData>,
}

impl ResumeData {
    pub async fn load(path: &Path) -> Result<Self> {
        let mut file = File::open(path)
            .await
            .with_context(|| format!("failed to open {}", path.display()))?;
        let value = Value::decode(&mut file)
            .await
            .with_context(|| format!("failed to decode {}", path.display()))?;
        Self::try_from(value).context(ErrorCode::InvalidResumeData)
    }

    /// Writes to a temporary file first, so a crash never leaves a truncated file behind
    pub async fn save(&self, path: &Path) -> Result<()> {
        let mut bytes = Vec::new();
        self.encode(&mut bytes)?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, bytes)
            .await
            .with_context(|| format!("failed to write {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("failed to rename {} -> {}", tmp.display(), path.display()))?;
        Ok(())
    }
}

impl TryFrom<&ResumeData> for Value {
    type Error = Error;

    fn try_from(resume: &ResumeData) -> Result<Self> {
        let size = i64::try_from(resume.size)
            .with_context(|| format!("file size {} is too large", resume.size))?;
        let hash_set: Vec<u8> = resume.hash_set.iter().flat_map(|hash| hash.0).collect();
        let pieces = resume.pieces.iter().map(|piece| match piece {
            PieceResumeData::Empty => Value::Integer(0),
            PieceResumeData::Completed => Value::Integer(1),
            PieceResumeData::Partial(blocks) => {
                Value::String(blocks.clone().into_bit_vec().to_bytes())
            }
        });
        Ok(Value::dictionary()
            .with_entry("hash", Value::string(resume.hash.0))
            .with_entry("size", Value::Integer(size))
            .with_entry("hashset", Value::String(hash_set))
            .with_entry("pieces", Value::List(pieces.collect())))
    }
}

impl Encoder for ResumeData {
    fn encode(&self, out: &mut impl std::io::Write) -> std::io::Result<()> {
        Value::try_from(self)
            .map_err(std::io::Error::other)?
            .encode(out)
    }
}

impl TryFrom<Value> for ResumeData {
    type Error = Error;

    fn try_from(mut value: Value) -> Result<Self> {
        let hash: Vec<u8> = value.remove_entry("hash")?.try_into()?;
        let hash = Hash::try_from(hash.as_slice())?;
        let size: u64 = value.remove_entry("size")?.try_into()?;
        let hash_set = {
            let bytes: Vec<u8> = value.remove_entry("hashset")?.try_into()?;
            if bytes.len() % HASH_LEN != 0 {
                bail!(
                    "invalid hash set length {}. must be a multiple of {}",
                    bytes.len(),
                    HASH_LEN
                );
            }
            bytes
                .chunks(HASH_LEN)
                .map(Hash::try_from)
                .collect::<Result<Vec<_>>>()?
        };
        let sizes = Sizes::new(size);
        if !hash_set.is_empty() {
            if hash_set.len() != sizes.total_pieces() {
                bail!(
                    "hash set has {} hashes, file has {} pieces",
                    hash_set.len(),
                    sizes.total_pieces()
                );
            }
            if Hash::from_hash_set(&hash_set) != hash {
                bail!("hash set does not match content hash {}", hash);
            }
        }

        let entries: Vec<Value> = value.remove_entry("pieces")?.try_into()?;
        if entries.len() != sizes.total_pieces() {
            bail!(
                "resume data has {} pieces, file has {}",
                entries.len(),
                sizes.total_pieces()
            );
        }
        let mut pieces = Vec::with_capacity(entries.len());
        for (piece, entry) in entries.into_iter().enumerate() {
            let data = match entry {
                Value::Integer(0) => PieceResumeData::Empty,
                Value::Integer(1) => PieceResumeData::Completed,
                Value::String(bytes) => {
                    let blocks = BitSet::from_bytes(&bytes);
                    let blocks_in_piece = sizes.blocks_in_piece(piece);
                    if let Some(block) = blocks.iter().find(|block| *block >= blocks_in_piece) {
                        bail!("piece {} has no block {}", piece, block);
                    }
                    PieceResumeData::Partial(blocks)
                }
                other => return Err(anyhow!("invalid entry for piece {}: {:?}", piece, other)),
            };
            pieces.push(data);
        }

        Ok(ResumeData {
            hash,
            size,
            hash_set,
            pieces,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{BLOCK_SIZE, PIECE_SIZE};

    fn hash_set(pieces: usize) -> Vec<Hash> {
        (0..pieces)
            .map(|piece| Hash::digest(&piece.to_be_bytes()))
            .collect()
    }

    fn resume_data() -> ResumeData {
        let hash_set = hash_set(3);
        ResumeData {
            hash: Hash::from_hash_set(&hash_set),
            size: 2 * PIECE_SIZE + 3 * BLOCK_SIZE,
            hash_set,
            pieces: vec![
                PieceResumeData::Completed,
                PieceResumeData::Partial(BitSet::from_iter([0, 9, 49])),
                PieceResumeData::Empty,
            ],
        }
    }

    fn encode(value: &impl Encoder) -> Vec<u8> {
        let mut bytes = Vec::new();
        value.encode(&mut bytes).unwrap();
        bytes
    }

    #[test]
    fn encode_pieces() {
        let value = Value::try_from(&resume_data()).unwrap();
        let Value::Dictionary(mut entries) = value else {
            panic!("not a dictionary");
        };

        let pieces = entries.remove("pieces").unwrap();

        let mut bitfield = vec![0u8; 7];
        bitfield[0] = 0b1000_0000;
        bitfield[1] = 0b0100_0000;
        bitfield[6] = 0b0100_0000;
        assert_eq!(
            pieces,
            Value::list()
                .with_value(Value::Integer(1))
                .with_value(Value::String(bitfield))
                .with_value(Value::Integer(0))
        );
    }

    #[test]
    fn decode_encoded() {
        let resume = resume_data();

        let value = Value::try_from(encode(&resume).as_slice()).unwrap();

        assert_eq!(ResumeData::try_from(value).unwrap(), resume);
    }

    #[test]
    fn reject_hash_set_of_other_file() {
        let mut resume = resume_data();
        resume.hash = Hash::digest(b"other");

        let result = ResumeData::try_from(Value::try_from(&resume).unwrap());

        assert!(result.is_err());
    }

    #[test]
    fn reject_wrong_piece_count() {
        let mut resume = resume_data();
        resume.pieces.pop();

        assert!(ResumeData::try_from(Value::try_from(&resume).unwrap()).is_err());
    }

    #[test]
    fn reject_block_beyond_last_piece() {
        let mut resume = resume_data();
        resume.pieces[2] = PieceResumeData::Partial(BitSet::from_iter([3]));

        assert!(ResumeData::try_from(Value::try_from(&resume).unwrap()).is_err());
    }

    #[test]
    fn accept_unknown_hash_set() {
        let mut resume = resume_data();
        resume.hash_set.clear();

        let decoded = ResumeData::try_from(Value::try_from(&resume).unwrap()).unwrap();

        assert!(decoded.hash_set.is_empty());
    }

    #[test]
    fn reject_invalid_piece_entry() {
        let value = Value::try_from(&resume_data()).unwrap();
        let Value::Dictionary(mut entries) = value else {
            panic!("not a dictionary");
        };
        entries.insert(
            "pieces".to_string(),
            Value::list()
                .with_value(Value::Integer(1))
                .with_value(Value::Integer(2))
                .with_value(Value::Integer(0)),
        );

        assert!(ResumeData::try_from(Value::Dictionary(entries)).is_err());
    }

    #[tokio::test]
    async fn save_and_load() {
        let path = std::env::temp_dir().join(format!("rustdonkey-resume-{}", std::process::id()));
        let resume = resume_data();

        resume.save(&path).await.unwrap();
        let loaded = ResumeData::load(&path).await.unwrap();

        assert_eq!(loaded, resume);
        assert!(!path.with_extension("tmp").exists());
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[tokio::test]
    async fn load_rejects_invalid_resume_data() {
        let path = std::env::temp_dir().join(format!(
            "rustdonkey-invalid-resume-{}",
            std::process::id()
        ));
        tokio::fs::write(&path, b"d4:sizei10ee").await.unwrap();

        let err = ResumeData::load(&path).await.unwrap_err();

        assert_eq!(
            err.downcast_ref::<ErrorCode>(),
            Some(&ErrorCode::InvalidResumeData)
        );
        tokio::fs::remove_file(&path).await.unwrap();
    }

    #[test]
    fn reject_size_beyond_integer_range() {
        let mut resume = resume_data();
        resume.size = u64::MAX;

        assert!(Value::try_from(&resume).is_err());
        let mut out = Vec::new();
        assert!(resume.encode(&mut out).is_err());
        assert!(out.is_empty());
    }
}
