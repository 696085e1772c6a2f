use thiserror::Error;

/// A packet codec error.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PacketError {
    /// The supplied buffer is too small to hold the packet.
    #[error("insufficient buffer for {0} packet: required {1} bytes, got {2}")]
    InsufficientPacketBuffer(String, usize, usize),
}

/// A packet codec result.
pub type PacketResult<T> = Result<T, PacketError>;
