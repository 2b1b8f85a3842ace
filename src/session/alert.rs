use crate::core::Hash;
use crate::error::ErrorCode;

/// Notification about something that happened to a transfer, possibly off the calling stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Alert {
    TransferAdded { hash: Hash },
    TransferFinished { hash: Hash },
    TransferPaused { hash: Hash },
    TransferResumed { hash: Hash },
    TransferDiskIoError {
        hash: Hash,
        error: ErrorCode,
        message: String,
    },
    PieceHashFailed { hash: Hash, piece: usize },
    TransferRemoved { hash: Hash },
}

/// Ask the source discovery layer for more peers holding a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourcesRequest {
    pub hash: Hash,
    pub size: u64,
}
