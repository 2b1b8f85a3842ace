/// Failures surfaced by transfers, either returned from the call that detected them or carried
/// by an alert when they happen off the calling stack.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    TransferPaused,
    TransferAborted,
    TransferFinished,
    UnableToDeleteFile,
    IoException,
    HashSetMismatch,
    InvalidResumeData,
    ConnectionTimeout,
    PeerDisconnected,
    UnexpectedBlock,
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let description = match self {
            Self::TransferPaused => "transfer is paused",
            Self::TransferAborted => "transfer was aborted",
            Self::TransferFinished => "transfer is finished",
            Self::UnableToDeleteFile => "unable to delete file",
            Self::IoException => "i/o error",
            Self::HashSetMismatch => "hash set does not match the file hash",
            Self::InvalidResumeData => "invalid resume data",
            Self::ConnectionTimeout => "connection timed out",
            Self::PeerDisconnected => "peer disconnected",
            Self::UnexpectedBlock => "block was not requested or has a wrong length",
        };
        write!(f, "{description}")
    }
}

impl std::error::Error for ErrorCode {}
