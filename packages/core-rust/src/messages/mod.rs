//! Wire messages exchanged between the gateway and the domain services.
//!
//! All types use named `MsgPack` serialization (`rmp_serde::to_vec_named()`)
//! so field names travel with the payload and both sides can evolve
//! independently.

pub mod rpc;

pub use rpc::{decode, encode, RpcCall, RpcRequest, RpcResponse, RpcResult, WireError};
