mod connection;
mod policy;
mod stats;
#[cfg(test)]
pub mod testing;

pub use connection::*;
pub use policy::*;
pub use stats::*;
