use std::io::{ErrorKind, Result, SeekFrom};
use std::path::{Path, PathBuf};

use log::debug;
use md4::{Digest, Md4};
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tokio::sync::RwLock;

use crate::core::{BLOCK_SIZE, Hash, PieceBlock, Sizes};

/// File backing a single transfer. Every method opens the file on its own, so jobs of the same
/// transfer can run concurrently.
///
/// Jobs share a gate that `delete` takes exclusively: it waits for running jobs, and once the
/// file is gone no job touches it again.
#[derive(Debug)]
pub struct PieceManager {
    file_path: PathBuf,
    sizes: Sizes,
    deleted: RwLock<bool>,
}

impl PieceManager {
    pub fn new(file_path: PathBuf, sizes: Sizes) -> Self {
        Self {
            file_path,
            sizes,
            deleted: RwLock::new(false),
        }
    }

    pub fn file_path(&self) -> &Path {
        &self.file_path
    }

    pub fn sizes(&self) -> &Sizes {
        &self.sizes
    }

    pub async fn write_block(&self, block: PieceBlock, data: &[u8]) -> Result<()> {
        self.check_length(block, data.len())?;
        let deleted = self.deleted.read().await;
        self.check_not_deleted(*deleted)?;
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&self.file_path)
            .await?;
        file.seek(SeekFrom::Start(self.sizes.block_offset(block)))
            .await?;
        file.write_all(data).await?;
        file.flush().await?;
        Ok(())
    }

    pub async fn read_block(&self, block: PieceBlock, data: &mut [u8]) -> Result<()> {
        self.check_length(block, data.len())?;
        let deleted = self.deleted.read().await;
        self.check_not_deleted(*deleted)?;
        let mut file = File::open(&self.file_path).await?;
        file.seek(SeekFrom::Start(self.sizes.block_offset(block)))
            .await?;
        file.read_exact(data).await?;
        Ok(())
    }

    pub async fn hash_piece(&self, piece: usize) -> Result<Hash> {
        let deleted = self.deleted.read().await;
        self.check_not_deleted(*deleted)?;
        let mut file = File::open(&self.file_path).await?;
        file.seek(SeekFrom::Start(self.sizes.piece_offset(piece)))
            .await?;
        let mut hasher = Md4::new();
        let mut remaining = self.sizes.piece_size(piece);
        let mut buf = vec![0; BLOCK_SIZE as usize];
        while remaining > 0 {
            let chunk = remaining.min(BLOCK_SIZE) as usize;
            file.read_exact(&mut buf[..chunk]).await?;
            hasher.update(&buf[..chunk]);
            remaining -= chunk as u64;
        }
        Ok(Hash(hasher.finalize().into()))
    }

    /// Flushes the file to stable storage. A file that was never created is fine.
    pub async fn release(&self) -> Result<()> {
        let deleted = self.deleted.read().await;
        if *deleted {
            return Ok(());
        }
        match File::open(&self.file_path).await {
            Ok(file) => file.sync_all().await,
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err),
        }
    }

    /// Removes the file once every running job is done with it
    pub async fn delete(&self) -> Result<()> {
        let mut deleted = self.deleted.write().await;
        *deleted = true;
        debug!("deleting {}", self.file_path.display());
        tokio::fs::remove_file(&self.file_path).await?;
        if tokio::fs::try_exists(&self.file_path).await? {
            return Err(std::io::Error::other(format!(
                "{} still exists after removal",
                self.file_path.display()
            )));
        }
        Ok(())
    }

    fn check_not_deleted(&self, deleted: bool) -> Result<()> {
        if deleted {
            return Err(std::io::Error::new(
                ErrorKind::NotFound,
                format!("{} was deleted", self.file_path.display()),
            ));
        }
        Ok(())
    }

    fn check_length(&self, block: PieceBlock, length: usize) -> Result<()> {
        let expected = self.sizes.block_size(block);
        if length as u64 != expected {
            return Err(std::io::Error::new(
                ErrorKind::InvalidInput,
                format!("block {block} has {length} bytes, expected {expected}"),
            ));
        }
        Ok(())
    }
}
