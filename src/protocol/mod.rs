//! Protocol 2.0 framing and the sync transactions built on it.

mod group;
mod v2;

pub use self::group::{SyncRead, SyncWrite, TransactionState};
pub(crate) use self::v2::{write_tx_rx, MAX_ID, STATUS_PACKET_MIN_LEN};

#[cfg(test)]
pub(crate) use self::v2::{ReceivedInstruction, StatusPacket};
