mod params;
mod stats;
mod status;

use std::collections::VecDeque;
use std::io;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use bit_set::BitSet;
use log::{debug, info, warn};
use tokio::time::Instant;

use crate::core::{BLOCK_SIZE, Hash, PIECE_SIZE, PieceBlock, Sizes};
use crate::disk::{Buffer, DiskCompletion, DiskHandle, DiskOperation, DiskPoll, PieceManager};
use crate::error::ErrorCode;
use crate::peer::{PeerConnection, Policy};
use crate::picker::{BlockState, PiecePicker};
use crate::resume::{PieceResumeData, ResumeData};
use crate::session::{Alert, SessionContext};

pub use params::*;
pub use stats::*;
pub use status::*;

/// Disk job submitted by a transfer, along with what to report if the job is lost
struct PendingOperation {
    handle: DiskHandle,
    kind: PendingKind,
}

#[derive(Debug, Clone, Copy)]
enum PendingKind {
    Block { block: PieceBlock, restore: bool },
    Hash { piece: usize },
    Release,
    Delete,
}

impl PendingKind {
    fn lost(self) -> DiskCompletion {
        let error = io::Error::other("disk job dropped");
        match self {
            Self::Block { block, restore } => DiskCompletion::Block {
                block,
                restore,
                buffer: None,
                result: Err(error),
            },
            Self::Hash { piece } => DiskCompletion::Hash {
                piece,
                result: Err(error),
            },
            Self::Release => DiskCompletion::Release { result: Err(error) },
            Self::Delete => DiskCompletion::Delete { result: Err(error) },
        }
    }
}

/// Download of a single file.
///
/// All state is mutated from one task: the network layer hands in blocks, the session calls
/// `second_tick` periodically. Disk jobs run elsewhere and their completions are applied during
/// the tick, strictly in submission order.
pub struct Transfer {
    hash: Hash,
    sizes: Sizes,
    hash_set: Vec<Hash>,
    picker: PiecePicker,
    policy: Policy,
    stats: Statistics,
    connections: Vec<Box<dyn PeerConnection>>,
    pending: VecDeque<PendingOperation>,
    manager: Arc<PieceManager>,
    context: Arc<SessionContext>,
    state: TransferState,
    paused: bool,
    aborted: bool,
    need_save_resume_data: bool,
    /// Restore jobs scheduled from resume data and not completed yet
    restores_outstanding: usize,
    last_sources_request: Option<Instant>,
    last_tick: Option<Instant>,
}

impl Transfer {
    pub fn new(params: AddTransferParams, context: Arc<SessionContext>) -> Self {
        let sizes = Sizes::new(params.size);
        let picker = PiecePicker::new(sizes.total_pieces(), sizes.blocks_in_last_piece());
        Self::with_picker(params, picker, context)
    }

    /// Creates a transfer around an existing picker
    pub fn with_picker(
        params: AddTransferParams,
        picker: PiecePicker,
        context: Arc<SessionContext>,
    ) -> Self {
        let sizes = Sizes::new(params.size);
        assert_eq!(
            picker.num_pieces(),
            sizes.total_pieces(),
            "picker does not match file size {}",
            params.size
        );

        let hash_set = if is_valid_hash_set(params.hash, sizes.total_pieces(), &params.hash_set) {
            params.hash_set
        } else if sizes.total_pieces() == 1 {
            vec![params.hash]
        } else {
            if !params.hash_set.is_empty() {
                warn!("ignoring hash set not matching {}", params.hash);
            }
            Vec::new()
        };

        let policy = Policy::new(&context.config);
        let manager = Arc::new(PieceManager::new(params.file_path, sizes));
        let mut transfer = Self {
            hash: params.hash,
            sizes,
            hash_set,
            picker,
            policy,
            stats: Statistics::default(),
            connections: Vec::new(),
            pending: VecDeque::new(),
            manager,
            context,
            state: TransferState::Downloading,
            paused: params.paused,
            aborted: false,
            need_save_resume_data: false,
            restores_outstanding: 0,
            last_sources_request: None,
            last_tick: None,
        };

        if let Some(resume_data) = params.resume_data {
            transfer.restore(resume_data);
        }
        if transfer.restores_outstanding > 0 {
            transfer.state = TransferState::LoadingResumeData;
        } else if transfer.picker.is_finished() {
            transfer.state = TransferState::Finished;
        }

        info!(
            "added transfer {} ({}, {} pieces, {})",
            transfer.hash,
            transfer.sizes.total_size(),
            transfer.sizes.total_pieces(),
            transfer.state
        );
        transfer.post_alert(Alert::TransferAdded {
            hash: transfer.hash,
        });
        transfer
    }

    fn restore(&mut self, resume_data: ResumeData) {
        if resume_data.hash != self.hash || resume_data.pieces.len() != self.picker.num_pieces() {
            warn!("resume data does not belong to {}, ignoring it", self.hash);
            return;
        }
        if self.hash_set.is_empty()
            && is_valid_hash_set(self.hash, self.picker.num_pieces(), &resume_data.hash_set)
        {
            self.hash_set = resume_data.hash_set;
        }

        let mut exhausted = false;
        for (piece, data) in resume_data.pieces.into_iter().enumerate() {
            match data {
                PieceResumeData::Empty => (),
                PieceResumeData::Completed => self.picker.restore_have(piece),
                PieceResumeData::Partial(_) if exhausted => (),
                PieceResumeData::Partial(blocks) => {
                    let blocks_in_piece = self.picker.blocks_in_piece(piece);
                    for block in blocks.iter().filter(|block| *block < blocks_in_piece) {
                        let Some(buffer) = self.context.buffer_pool.allocate() else {
                            debug!("buffer pool exhausted, remaining blocks will be downloaded");
                            exhausted = true;
                            break;
                        };
                        let block = PieceBlock::new(piece, block);
                        self.picker.mark_as_writing(block);
                        self.submit(
                            DiskOperation::Restore { block, buffer },
                            PendingKind::Block {
                                block,
                                restore: true,
                            },
                        );
                        self.restores_outstanding += 1;
                    }
                }
            }
        }
        debug!(
            "restored {} pieces of {}, {} blocks to read back",
            self.picker.num_have(),
            self.hash,
            self.restores_outstanding
        );
    }

    pub fn hash(&self) -> Hash {
        self.hash
    }

    pub fn size(&self) -> u64 {
        self.sizes.total_bytes()
    }

    pub fn file_path(&self) -> &Path {
        self.manager.file_path()
    }

    pub fn hash_set(&self) -> &[Hash] {
        &self.hash_set
    }

    pub fn state(&self) -> TransferState {
        self.state
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    pub fn is_finished(&self) -> bool {
        self.state == TransferState::Finished
    }

    pub fn picker(&self) -> &PiecePicker {
        &self.picker
    }

    pub fn num_connections(&self) -> usize {
        self.connections.len()
    }

    pub fn num_pending_disk_operations(&self) -> usize {
        self.pending.len()
    }

    /// Aborted and no disk job is left, the session may drop the transfer
    pub fn is_released(&self) -> bool {
        self.aborted && self.pending.is_empty()
    }

    /// Accepts the hash set received from a peer
    pub fn set_hash_set(&mut self, hash_set: Vec<Hash>) -> Result<(), ErrorCode> {
        if !is_valid_hash_set(self.hash, self.picker.num_pieces(), &hash_set) {
            warn!("hash set does not match {}", self.hash);
            return Err(ErrorCode::HashSetMismatch);
        }
        if !self.hash_set.is_empty() {
            return Ok(());
        }
        self.hash_set = hash_set;
        self.need_save_resume_data = true;
        // Pieces completed meanwhile can be verified now
        self.hash_finished_pieces();
        Ok(())
    }

    pub fn add_sources(&mut self, endpoints: impl IntoIterator<Item = SocketAddr>) -> usize {
        let now = Instant::now();
        endpoints
            .into_iter()
            .filter(|endpoint| self.policy.add_peer(*endpoint, now))
            .count()
    }

    pub fn num_connect_candidates(&self) -> usize {
        self.policy.num_connect_candidates()
    }

    pub fn attach_peer(&mut self, connection: Box<dyn PeerConnection>) -> Result<(), ErrorCode> {
        if self.aborted {
            return Err(ErrorCode::TransferAborted);
        }
        if self.is_finished() {
            return Err(ErrorCode::TransferFinished);
        }
        if self.paused {
            return Err(ErrorCode::TransferPaused);
        }
        debug!("peer {} attached to {}", connection.endpoint(), self.hash);
        self.policy.new_connection(connection.endpoint());
        self.connections.push(connection);
        Ok(())
    }

    /// A connected peer advertised these pieces
    pub fn inc_availability(&mut self, pieces: &BitSet) {
        self.picker.inc_availability(pieces);
    }

    pub fn dec_availability(&mut self, pieces: &BitSet) {
        self.picker.dec_availability(pieces);
    }

    /// Blocks to request from a peer having `peer_pieces`
    pub fn pick_blocks(&mut self, count: usize, peer_pieces: &BitSet) -> Vec<PieceBlock> {
        let mut blocks = Vec::with_capacity(count);
        if self.is_active() {
            self.picker.pick_pieces_for(&mut blocks, count, peer_pieces);
        }
        blocks
    }

    /// Payload of a requested block arrived, store it
    pub fn on_block_received(&mut self, block: PieceBlock, buffer: Buffer) -> Result<(), ErrorCode> {
        if self.aborted {
            return Err(ErrorCode::TransferAborted);
        }
        if self.paused {
            self.on_request_failed(block);
            return Err(ErrorCode::TransferPaused);
        }
        if block.piece >= self.picker.num_pieces()
            || block.block >= self.picker.blocks_in_piece(block.piece)
            || self.picker.block_state(block) != BlockState::Requested
        {
            debug!("unexpected block {} for {}", block, self.hash);
            return Err(ErrorCode::UnexpectedBlock);
        }
        if buffer.len() as u64 != self.sizes.block_size(block) {
            warn!(
                "block {} has {} bytes, expected {}",
                block,
                buffer.len(),
                self.sizes.block_size(block)
            );
            self.picker.abort_download(block);
            return Err(ErrorCode::UnexpectedBlock);
        }
        self.picker.mark_as_writing(block);
        self.submit(
            DiskOperation::Write { block, buffer },
            PendingKind::Block {
                block,
                restore: false,
            },
        );
        Ok(())
    }

    /// A request was rejected or timed out, the block may be picked again
    pub fn on_request_failed(&mut self, block: PieceBlock) {
        if block.piece < self.picker.num_pieces()
            && block.block < self.picker.blocks_in_piece(block.piece)
            && self.picker.block_state(block) == BlockState::Requested
        {
            self.picker.abort_download(block);
        }
    }

    /// Marks a verified piece as downloaded, finishing the transfer with its last piece
    pub fn piece_passed(&mut self, piece: usize) {
        let was_finished = self.picker.is_finished();
        self.picker.we_have(piece);
        debug!(
            "piece {} of {} passed ({}/{})",
            piece,
            self.hash,
            self.picker.num_have(),
            self.picker.num_pieces()
        );
        if !was_finished && self.picker.is_finished() {
            self.finish();
        }
    }

    fn finish(&mut self) {
        info!("transfer {} finished", self.hash);
        self.disconnect_all(ErrorCode::TransferFinished);
        self.submit(DiskOperation::Release, PendingKind::Release);
        self.state = TransferState::Finished;
        self.need_save_resume_data = true;
        self.post_alert(Alert::TransferFinished { hash: self.hash });
    }

    pub fn pause(&mut self) {
        if self.paused {
            return;
        }
        info!("pausing transfer {}", self.hash);
        self.paused = true;
        self.disconnect_all(ErrorCode::TransferPaused);
        self.need_save_resume_data = true;
        self.post_alert(Alert::TransferPaused { hash: self.hash });
    }

    pub fn resume(&mut self) {
        if !self.paused {
            return;
        }
        info!("resuming transfer {}", self.hash);
        self.paused = false;
        self.last_sources_request = None;
        self.need_save_resume_data = true;
        self.post_alert(Alert::TransferResumed { hash: self.hash });
        self.hash_finished_pieces();
    }

    /// Stops the transfer for good. Pending disk jobs are cancelled, the file is released.
    ///
    /// The lifecycle state is frozen from here on: a transfer aborted while loading its resume
    /// data keeps reporting `LoadingResumeData`.
    pub fn abort(&mut self) {
        if self.aborted {
            return;
        }
        info!("aborting transfer {} while {}", self.hash, self.state);
        if self.restores_outstanding > 0 {
            debug!(
                "{} blocks of {} were not read back",
                self.restores_outstanding, self.hash
            );
        }
        self.aborted = true;
        self.disconnect_all(ErrorCode::TransferAborted);
        for operation in self.pending.drain(..) {
            operation.handle.cancel();
        }
        self.restores_outstanding = 0;
        self.submit(DiskOperation::Release, PendingKind::Release);
    }

    /// Aborts the transfer and optionally deletes its file
    pub fn remove(&mut self, delete_file: bool) {
        self.abort();
        if delete_file {
            self.submit(DiskOperation::Delete, PendingKind::Delete);
        }
        self.post_alert(Alert::TransferRemoved { hash: self.hash });
    }

    pub fn second_tick(&mut self, now: Instant) {
        let elapsed = self
            .last_tick
            .map_or(self.context.config.tick_interval, |last| {
                now.saturating_duration_since(last)
            });
        self.last_tick = Some(now);

        if self.is_active() && self.connections.is_empty() {
            let interval = self.context.config.sources_request_interval;
            let due = self
                .last_sources_request
                .is_none_or(|last| now.saturating_duration_since(last) >= interval);
            if due {
                debug!("requesting sources for {}", self.hash);
                self.context
                    .send_sources_request(self.hash, self.sizes.total_bytes());
                self.last_sources_request = Some(now);
            }
        }

        for connection in self.connections.iter_mut() {
            self.stats.add(connection.second_tick(now));
        }
        let (disconnecting, connections): (Vec<_>, Vec<_>) = std::mem::take(&mut self.connections)
            .into_iter()
            .partition(|connection| connection.is_disconnecting());
        self.connections = connections;
        for connection in disconnecting {
            let reason = connection
                .disconnect_reason()
                .unwrap_or(ErrorCode::PeerDisconnected);
            self.connection_removed(connection, reason, now);
        }
        self.stats.second_tick(elapsed);

        if self.is_active() && self.connections.len() < self.context.config.max_connections {
            self.connect_one_peer(now);
        }

        self.drain_disk_completions(now);
    }

    fn connect_one_peer(&mut self, now: Instant) {
        let Some(connector) = self.context.connector.clone() else {
            return;
        };
        if let Some(endpoint) = self.policy.connect_one_peer(now) {
            debug!("connecting to {} for {}", endpoint, self.hash);
            let mut connection = connector.connect(self.hash, endpoint);
            connection.connect();
            self.connections.push(connection);
        }
    }

    /// Applies completed disk jobs in submission order, stopping at the first one still running
    fn drain_disk_completions(&mut self, now: Instant) {
        while let Some(operation) = self.pending.front_mut() {
            let completion = match operation.handle.poll() {
                DiskPoll::Pending => break,
                DiskPoll::Ready(completion) => completion,
                DiskPoll::Dropped => operation.kind.lost(),
            };
            self.pending.pop_front();
            self.on_disk_completion(completion, now);
        }
    }

    fn on_disk_completion(&mut self, completion: DiskCompletion, now: Instant) {
        match completion {
            DiskCompletion::Block {
                block,
                restore,
                buffer,
                result,
            } => {
                if let Some(buffer) = buffer {
                    self.context.buffer_pool.deallocate(buffer, now);
                }
                self.on_block_write_completed(block, restore, result);
            }
            DiskCompletion::Hash { piece, result } => self.on_piece_hash_completed(piece, result),
            DiskCompletion::Release { result } => {
                if let Err(err) = result {
                    warn!("failed releasing {}: {}", self.file_path().display(), err);
                }
            }
            DiskCompletion::Delete { result } => {
                if let Err(err) = result {
                    warn!("failed deleting {}: {}", self.file_path().display(), err);
                    self.post_alert(Alert::TransferDiskIoError {
                        hash: self.hash,
                        error: ErrorCode::UnableToDeleteFile,
                        message: err.to_string(),
                    });
                }
            }
        }
    }

    fn on_block_write_completed(&mut self, block: PieceBlock, restore: bool, result: io::Result<()>) {
        match result {
            Ok(()) => {
                self.picker.mark_as_finished(block);
                self.need_save_resume_data = true;
                if self.picker.is_piece_finished(block.piece) {
                    self.hash_piece(block.piece);
                }
            }
            Err(err) => {
                warn!("failed writing block {} of {}: {}", block, self.hash, err);
                self.picker.abort_download(block);
                self.post_alert(Alert::TransferDiskIoError {
                    hash: self.hash,
                    error: ErrorCode::IoException,
                    message: err.to_string(),
                });
                self.pause();
            }
        }

        if restore && self.restores_outstanding > 0 {
            self.restores_outstanding -= 1;
            if self.restores_outstanding == 0 && self.state == TransferState::LoadingResumeData {
                debug!("resume data of {} loaded", self.hash);
                self.state = TransferState::Downloading;
            }
        }
    }

    fn on_piece_hash_completed(&mut self, piece: usize, result: io::Result<Hash>) {
        match result {
            Ok(hash) if self.hash_set.get(piece) == Some(&hash) => self.piece_passed(piece),
            Ok(hash) => {
                warn!(
                    "piece {} of {} failed verification, got {}",
                    piece, self.hash, hash
                );
                self.picker.restore_piece(piece);
                self.post_alert(Alert::PieceHashFailed {
                    hash: self.hash,
                    piece,
                });
            }
            Err(err) => {
                warn!("failed hashing piece {} of {}: {}", piece, self.hash, err);
                self.picker.restore_piece(piece);
                self.post_alert(Alert::TransferDiskIoError {
                    hash: self.hash,
                    error: ErrorCode::IoException,
                    message: err.to_string(),
                });
                self.pause();
            }
        }
        self.need_save_resume_data = true;
    }

    fn hash_piece(&mut self, piece: usize) {
        if self.hash_set.is_empty() {
            debug!("hash set of {} unknown, piece {} waits", self.hash, piece);
            return;
        }
        if self.paused || self.aborted {
            debug!("{} is not active, piece {} waits", self.hash, piece);
            return;
        }
        let hashing = self
            .pending
            .iter()
            .any(|operation| matches!(operation.kind, PendingKind::Hash { piece: other } if other == piece));
        if hashing {
            return;
        }
        self.submit(DiskOperation::HashPiece { piece }, PendingKind::Hash { piece });
    }

    /// Verifies complete pieces whose hashing was put off
    fn hash_finished_pieces(&mut self) {
        for piece in 0..self.picker.num_pieces() {
            if self.picker.is_piece_finished(piece) {
                self.hash_piece(piece);
            }
        }
    }

    fn submit(&mut self, operation: DiskOperation, kind: PendingKind) {
        let handle = self
            .context
            .disk
            .submit(Arc::clone(&self.manager), operation);
        self.pending.push_back(PendingOperation { handle, kind });
    }

    fn disconnect_all(&mut self, reason: ErrorCode) {
        let now = Instant::now();
        for mut connection in std::mem::take(&mut self.connections) {
            connection.close(reason);
            self.connection_removed(connection, reason, now);
        }
    }

    fn connection_removed(
        &mut self,
        mut connection: Box<dyn PeerConnection>,
        reason: ErrorCode,
        now: Instant,
    ) {
        debug!(
            "peer {} left {}: {}",
            connection.endpoint(),
            self.hash,
            reason
        );
        for block in connection.take_requested_blocks() {
            self.on_request_failed(block);
        }
        self.policy
            .connection_closed(connection.endpoint(), reason, now);
    }

    fn is_active(&self) -> bool {
        !self.paused && !self.aborted && !self.is_finished()
    }

    fn post_alert(&self, alert: Alert) {
        self.context.post_alert(alert);
    }

    /// Bytes downloaded so far and size of the file.
    ///
    /// A block counts once its payload arrived, whether it is on disk yet or not. Every piece
    /// and block has the nominal size except the very last ones.
    pub fn bytes_done(&self) -> (u64, u64) {
        let total_wanted = self.sizes.total_bytes();
        let num_pieces = self.picker.num_pieces();
        if num_pieces == 0 {
            return (0, total_wanted);
        }
        let last_piece = num_pieces - 1;

        let mut total_done = self.picker.num_have() as u64 * PIECE_SIZE;
        if self.picker.have_piece(last_piece) {
            total_done = total_done + self.sizes.last_piece_size() - PIECE_SIZE;
        }

        for piece in self.picker.downloading_queue() {
            if self.picker.have_piece(piece.index()) {
                continue;
            }
            total_done += piece.downloaded_count() as u64 * BLOCK_SIZE;
            let last_block = piece.blocks_count() - 1;
            if piece.index() == last_piece && piece.is_downloaded(last_block) {
                total_done = total_done + self.sizes.last_block_size() - BLOCK_SIZE;
            }
        }

        (total_done, total_wanted)
    }

    pub fn status(&self) -> TransferStatus {
        let (total_done, total_wanted) = self.bytes_done();
        let (progress, progress_ppm) = if total_wanted == 0 {
            (1.0, 1_000_000)
        } else {
            (
                total_done as f32 / total_wanted as f32,
                (total_done as u128 * 1_000_000 / total_wanted as u128) as u32,
            )
        };
        let eta = self
            .stats
            .download_payload_rate()
            .eta(total_wanted.saturating_sub(total_done));
        TransferStatus {
            state: self.state,
            paused: self.paused,
            progress,
            progress_ppm,
            total_done,
            total_wanted,
            download_rate: self.stats.download_rate(),
            download_payload_rate: self.stats.download_payload_rate(),
            upload_rate: self.stats.upload_rate(),
            upload_payload_rate: self.stats.upload_payload_rate(),
            total_download: self.stats.total_download(),
            total_download_payload: self.stats.total_download_payload(),
            total_upload: self.stats.total_upload(),
            total_upload_payload: self.stats.total_upload_payload(),
            num_peers: self.connections.len(),
            num_pieces: self.picker.num_pieces(),
            pieces: self.picker.have_pieces().clone(),
            eta,
        }
    }

    pub fn need_save_resume_data(&self) -> bool {
        self.need_save_resume_data
    }

    /// Snapshot of the progress. Only blocks confirmed on disk are recorded, a block still
    /// being written will be downloaded again after a restart.
    pub fn resume_data(&self) -> ResumeData {
        let pieces = (0..self.picker.num_pieces())
            .map(|piece| {
                if self.picker.have_piece(piece) {
                    return PieceResumeData::Completed;
                }
                let Some(downloading) = self.picker.get_downloading_piece(piece) else {
                    return PieceResumeData::Empty;
                };
                let blocks: BitSet = (0..downloading.blocks_count())
                    .filter(|block| downloading.is_finished(*block))
                    .collect();
                if blocks.is_empty() {
                    PieceResumeData::Empty
                } else {
                    PieceResumeData::Partial(blocks)
                }
            })
            .collect();
        ResumeData {
            hash: self.hash,
            size: self.sizes.total_bytes(),
            hash_set: self.hash_set.clone(),
            pieces,
        }
    }

    /// Same as `resume_data`, and clears the dirty flag
    pub fn save_resume_data(&mut self) -> ResumeData {
        self.need_save_resume_data = false;
        self.resume_data()
    }
}

fn is_valid_hash_set(hash: Hash, num_pieces: usize, hash_set: &[Hash]) -> bool {
    !hash_set.is_empty() && hash_set.len() == num_pieces && Hash::from_hash_set(hash_set) == hash
}
