//! Error taxonomy for the core.
//!
//! Every error here is locally recoverable: the caller drops the offending
//! frame (or timer) and continues. The only error that escapes to the upper
//! layer is [`CoreError::Tx`], relayed through the MAC completion callback.

use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq, Clone, Copy)]
pub enum CoreError {
    #[error("neighbor table is full")]
    TableFull,

    #[error("keying scheme declined to produce a shared secret")]
    NoSecret,

    #[error("CCM*-MIC did not verify")]
    MicMismatch,

    #[error("frame counter was replayed")]
    Replayed,

    #[error("unexpected security level on inbound frame")]
    BadSecurityLevel,

    #[error("announce MIC offset exceeds payload bounds")]
    OutOfBounds,

    #[error("command frame received in the wrong neighbor state")]
    WrongState,

    #[error("no neighbor record for this peer")]
    NoNeighbor,

    #[error("bootstrap has not completed yet")]
    NotBootstrapped,

    #[error("frame dropped: sender is this node")]
    SelfSender,

    #[error("send failed at the MAC layer")]
    Tx,

    #[error("invalid security parameters")]
    BadParams,
}

pub type Result<T> = core::result::Result<T, CoreError>;
