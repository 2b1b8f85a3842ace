use std::fmt::{Display, Formatter};

/// Address of a block: the piece it belongs to and its index inside that piece
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, PartialOrd, Ord)]
pub struct PieceBlock {
    pub piece: usize,
    pub block: usize,
}

impl PieceBlock {
    pub fn new(piece: usize, block: usize) -> Self {
        Self { piece, block }
    }
}

impl Display for PieceBlock {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.piece, self.block)
    }
}
