use std::io::{Result, Write};

use tokio::io::AsyncRead;

/// Values written to resume files and other on-disk records
pub trait Encoder {
    fn encode(&self, out: &mut impl Write) -> Result<()>;
}

/// Values read back from an async stream, such as a resume file being loaded
pub trait AsyncDecoder: Sized {
    async fn decode<S: AsyncRead + Unpin>(stream: &mut S) -> Result<Self>;
}
