use std::fmt::Display;
use std::time::Duration;

use bit_set::BitSet;
use size::Size;

use crate::core::TransferRate;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferState {
    /// Blocks recorded in resume data are being read back from disk
    LoadingResumeData,
    Downloading,
    Finished,
}

impl Display for TransferState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match self {
            Self::LoadingResumeData => "loading resume data",
            Self::Downloading => "downloading",
            Self::Finished => "finished",
        };
        write!(f, "{state}")
    }
}

/// Snapshot of a transfer
#[derive(Debug, Clone)]
pub struct TransferStatus {
    pub state: TransferState,
    pub paused: bool,
    /// Fraction of the file downloaded, between 0 and 1
    pub progress: f32,
    /// Same as `progress`, in parts per million
    pub progress_ppm: u32,
    pub total_done: u64,
    pub total_wanted: u64,
    pub download_rate: TransferRate,
    pub download_payload_rate: TransferRate,
    pub upload_rate: TransferRate,
    pub upload_payload_rate: TransferRate,
    pub total_download: u64,
    pub total_download_payload: u64,
    pub total_upload: u64,
    pub total_upload_payload: u64,
    pub num_peers: usize,
    pub num_pieces: usize,
    /// Pieces downloaded and verified
    pub pieces: BitSet,
    /// Estimated time left at the current download rate
    pub eta: Option<Duration>,
}

impl Display for TransferStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{} {:.2}% ({} / {}), {} of {} pieces, {} peers, down {}, up {}",
            self.state,
            if self.paused { " (paused)" } else { "" },
            self.progress * 100.0,
            Size::from_bytes(self.total_done),
            Size::from_bytes(self.total_wanted),
            self.pieces.len(),
            self.num_pieces,
            self.num_peers,
            self.download_rate,
            self.upload_rate
        )
    }
}
