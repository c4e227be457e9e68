//! Wire types for the daemon protocol.

mod event;
mod rpc;

pub use event::ReceiveEvent;
pub use rpc::{
    DecryptParams, DecryptResult, EncryptParams, ErrorData, JoinRoomParams, LoginParams,
    SendParams, SendResult, TrustParams,
};
