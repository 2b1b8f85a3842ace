use size::Size;

use crate::core::PieceBlock;

/// Size of an eD2K part, the unit of hash verification
pub const PIECE_SIZE: u64 = 9_728_000;

/// Size of a block, the unit of network requests
pub const BLOCK_SIZE: u64 = 194_560;

pub const BLOCKS_PER_PIECE: usize = (PIECE_SIZE / BLOCK_SIZE) as usize;

/// Piece and block geometry of a single file. Every piece and block has a fixed size except the
/// last ones, which hold whatever remains of the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Sizes {
    total_size: u64,
    total_pieces: usize,
}

impl Sizes {
    pub fn new(total_size: u64) -> Self {
        let total_pieces = total_size.div_ceil(PIECE_SIZE) as usize;
        Self {
            total_size,
            total_pieces,
        }
    }

    pub fn total_size(&self) -> Size {
        Size::from_bytes(self.total_size)
    }

    pub fn total_bytes(&self) -> u64 {
        self.total_size
    }

    pub fn total_pieces(&self) -> usize {
        self.total_pieces
    }

    pub fn piece_offset(&self, piece: usize) -> u64 {
        piece as u64 * PIECE_SIZE
    }

    pub fn piece_size(&self, piece: usize) -> u64 {
        assert!(piece < self.total_pieces, "invalid piece {}", piece);
        let start = self.piece_offset(piece);
        (start + PIECE_SIZE).min(self.total_size) - start
    }

    pub fn blocks_in_piece(&self, piece: usize) -> usize {
        self.piece_size(piece).div_ceil(BLOCK_SIZE) as usize
    }

    pub fn block_offset(&self, block: PieceBlock) -> u64 {
        self.piece_offset(block.piece) + block.block as u64 * BLOCK_SIZE
    }

    pub fn block_size(&self, block: PieceBlock) -> u64 {
        let piece_size = self.piece_size(block.piece);
        let start = block.block as u64 * BLOCK_SIZE;
        assert!(start < piece_size, "invalid block {:?}", block);
        (start + BLOCK_SIZE).min(piece_size) - start
    }

    pub fn last_piece_size(&self) -> u64 {
        match self.total_pieces {
            0 => 0,
            pieces => self.piece_size(pieces - 1),
        }
    }

    pub fn blocks_in_last_piece(&self) -> usize {
        self.last_piece_size().div_ceil(BLOCK_SIZE) as usize
    }

    pub fn last_block_size(&self) -> u64 {
        match self.blocks_in_last_piece() {
            0 => 0,
            blocks => self.last_piece_size() - (blocks as u64 - 1) * BLOCK_SIZE,
        }
    }
}
