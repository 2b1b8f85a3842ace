//! Core of an eD2K download engine: which blocks to request, what to do with them once they
//! arrive, and how to remember it all across restarts.

pub mod bencoding;
pub mod codec;
pub mod config;
pub mod core;
pub mod disk;
pub mod error;
pub mod peer;
pub mod picker;
pub mod resume;
pub mod session;
pub mod transfer;
