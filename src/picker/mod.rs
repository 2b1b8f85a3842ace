mod downloading_piece;

use std::cmp::Reverse;
use std::collections::BTreeMap;

use bit_set::BitSet;
use log::debug;

use crate::core::{BLOCKS_PER_PIECE, PieceBlock};

pub use downloading_piece::*;

/// Decides which blocks to request next and keeps track of the progress of every piece.
///
/// A piece is in exactly one of three states:
/// - have: downloaded and verified, tracked by a single bit
/// - in progress: has an entry with per-block state
/// - untouched: neither of the above
pub struct PiecePicker {
    num_pieces: usize,
    blocks_in_last_piece: usize,

    /// Pieces that were downloaded and passed hash verification
    have: BitSet,

    /// Number of connected peers advertising each piece
    availability: Vec<u32>,

    /// Pieces with at least one block that is not `BlockState::None`
    downloading: BTreeMap<usize, DownloadingPiece>,
}

impl PiecePicker {
    pub fn new(num_pieces: usize, blocks_in_last_piece: usize) -> Self {
        assert!(
            num_pieces == 0 || (1..=BLOCKS_PER_PIECE).contains(&blocks_in_last_piece),
            "invalid number of blocks in last piece: {}",
            blocks_in_last_piece
        );
        Self {
            num_pieces,
            blocks_in_last_piece,
            have: BitSet::with_capacity(num_pieces),
            availability: vec![0; num_pieces],
            downloading: BTreeMap::new(),
        }
    }

    pub fn num_pieces(&self) -> usize {
        self.num_pieces
    }

    pub fn num_have(&self) -> usize {
        self.have.len()
    }

    pub fn have_piece(&self, piece: usize) -> bool {
        self.have.contains(piece)
    }

    pub fn have_pieces(&self) -> &BitSet {
        &self.have
    }

    /// Every piece was downloaded and verified
    pub fn is_finished(&self) -> bool {
        self.num_have() == self.num_pieces
    }

    pub fn blocks_in_piece(&self, piece: usize) -> usize {
        assert!(piece < self.num_pieces, "invalid piece {}", piece);
        if piece + 1 == self.num_pieces {
            self.blocks_in_last_piece
        } else {
            BLOCKS_PER_PIECE
        }
    }

    pub fn get_downloading_piece(&self, piece: usize) -> Option<&DownloadingPiece> {
        self.downloading.get(&piece)
    }

    /// Pieces in progress, ordered by index
    pub fn downloading_queue(&self) -> impl Iterator<Item = &DownloadingPiece> {
        self.downloading.values()
    }

    pub fn block_state(&self, block: PieceBlock) -> BlockState {
        if self.have_piece(block.piece) {
            return BlockState::Finished;
        }
        self.downloading
            .get(&block.piece)
            .map_or(BlockState::None, |piece| piece.state(block.block))
    }

    /// All blocks of the piece are on disk and it is waiting for hash verification
    pub fn is_piece_finished(&self, piece: usize) -> bool {
        self.downloading
            .get(&piece)
            .is_some_and(DownloadingPiece::is_complete)
    }

    pub fn inc_availability(&mut self, pieces: &BitSet) {
        for piece in pieces.iter().filter(|piece| *piece < self.num_pieces) {
            self.availability[piece] += 1;
        }
    }

    pub fn dec_availability(&mut self, pieces: &BitSet) {
        for piece in pieces.iter().filter(|piece| *piece < self.num_pieces) {
            self.availability[piece] = self.availability[piece].saturating_sub(1);
        }
    }

    /// Appends up to `count` blocks to request into `out`, marking them as requested. Returns how
    /// many blocks were picked.
    pub fn pick_pieces(&mut self, out: &mut Vec<PieceBlock>, count: usize) -> usize {
        self.pick(out, count, |_| true)
    }

    /// Same as `pick_pieces`, limited to the pieces a peer advertised
    pub fn pick_pieces_for(
        &mut self,
        out: &mut Vec<PieceBlock>,
        count: usize,
        peer_pieces: &BitSet,
    ) -> usize {
        self.pick(out, count, |piece| peer_pieces.contains(piece))
    }

    pub fn mark_as_downloading(&mut self, block: PieceBlock) {
        if let Some(piece) = self.touch(block) {
            piece.request_block(block.block);
        }
    }

    pub fn mark_as_writing(&mut self, block: PieceBlock) {
        if let Some(piece) = self.touch(block) {
            piece.write_block(block.block);
        }
    }

    pub fn mark_as_finished(&mut self, block: PieceBlock) {
        if let Some(piece) = self.touch(block) {
            piece.finish_block(block.block);
        }
    }

    /// Makes a requested or writing block available for picking again. Finished blocks are left
    /// alone, only a failed hash check can invalidate them.
    pub fn abort_download(&mut self, block: PieceBlock) {
        assert!(block.piece < self.num_pieces, "invalid piece {}", block.piece);
        let Some(piece) = self.downloading.get_mut(&block.piece) else {
            return;
        };
        if !piece.is_finished(block.block) {
            piece.abort_downloading(block.block);
        }
        if piece.is_untouched() {
            self.downloading.remove(&block.piece);
        }
    }

    /// Forgets everything about a piece so that all of its blocks get downloaded again
    pub fn restore_piece(&mut self, piece: usize) {
        assert!(piece < self.num_pieces, "invalid piece {}", piece);
        debug!("restoring piece {}", piece);
        self.downloading.remove(&piece);
        self.have.remove(piece);
    }

    /// Marks a piece as downloaded and verified. Returns `false` if it already was.
    pub fn we_have(&mut self, piece: usize) -> bool {
        assert!(piece < self.num_pieces, "invalid piece {}", piece);
        self.downloading.remove(&piece);
        self.have.insert(piece)
    }

    /// Marks a piece known to be complete from resume data
    pub fn restore_have(&mut self, piece: usize) {
        self.we_have(piece);
    }

    fn touch(&mut self, block: PieceBlock) -> Option<&mut DownloadingPiece> {
        let blocks = self.blocks_in_piece(block.piece);
        if self.have.contains(block.piece) {
            debug!("ignoring block {} of a piece we already have", block);
            return None;
        }
        Some(
            self.downloading
                .entry(block.piece)
                .or_insert_with(|| DownloadingPiece::new(block.piece, blocks)),
        )
    }

    fn pick(
        &mut self,
        out: &mut Vec<PieceBlock>,
        count: usize,
        eligible: impl Fn(usize) -> bool,
    ) -> usize {
        let start = out.len();

        // Favor pieces which are already in progress in order to keep the number of open pieces
        // small, the ones closest to completion first
        let mut started: Vec<_> = self
            .downloading
            .values()
            .filter(|piece| eligible(piece.index()))
            .map(|piece| {
                let progress = piece.blocks_count() - piece.free_blocks().count();
                (Reverse(progress), piece.index())
            })
            .collect();
        started.sort();
        for (_, index) in started {
            let remaining = count - (out.len() - start);
            if remaining == 0 {
                break;
            }
            if let Some(piece) = self.downloading.get_mut(&index) {
                Self::take_free_blocks(piece, remaining, out);
            }
        }

        // Otherwise, open the rarest piece first
        while out.len() - start < count {
            let next = (0..self.num_pieces)
                .filter(|piece| !self.have.contains(*piece))
                .filter(|piece| !self.downloading.contains_key(piece))
                .filter(|piece| eligible(*piece))
                .min_by_key(|piece| (self.availability[*piece], *piece));
            let Some(index) = next else {
                break;
            };
            let mut piece = DownloadingPiece::new(index, self.blocks_in_piece(index));
            let remaining = count - (out.len() - start);
            Self::take_free_blocks(&mut piece, remaining, out);
            self.downloading.insert(index, piece);
        }

        out.len() - start
    }

    fn take_free_blocks(piece: &mut DownloadingPiece, n: usize, out: &mut Vec<PieceBlock>) {
        let blocks: Vec<_> = piece.free_blocks().take(n).collect();
        for block in blocks {
            piece.request_block(block);
            out.push(PieceBlock::new(piece.index(), block));
        }
    }
}
