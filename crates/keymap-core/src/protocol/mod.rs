//! Keymap RPC message types, lazy repeated fields and the binary codec.

pub mod codec;
pub mod lazy;
pub mod messages;

pub use codec::{
    decode_frame, decode_header, decode_request, decode_request_frame, encode_notification,
    encode_request, encode_response, ProtocolError,
};
pub use lazy::Repeated;
pub use messages::*;
