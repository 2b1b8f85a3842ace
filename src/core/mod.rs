mod hash;
mod piece_block;
mod sizes;
mod transfer_rate;

pub use hash::*;
pub use piece_block::*;
pub use sizes::*;
pub use transfer_rate::*;
