use std::ops::AddAssign;

/// Bytes moved by a connection since its previous tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PeerStats {
    pub download_payload: u64,
    pub download_protocol: u64,
    pub upload_payload: u64,
    pub upload_protocol: u64,
}

impl PeerStats {
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

impl AddAssign for PeerStats {
    fn add_assign(&mut self, rhs: Self) {
        self.download_payload += rhs.download_payload;
        self.download_protocol += rhs.download_protocol;
        self.upload_payload += rhs.upload_payload;
        self.upload_protocol += rhs.upload_protocol;
    }
}
