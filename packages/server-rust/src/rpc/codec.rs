//! Length-delimited `MsgPack` framing for RPC streams.
//!
//! Framing errors (oversized or truncated frames, I/O) end the stream. A
//! frame that arrives intact but does not decode as the expected message is
//! yielded as `Err(WireError)` so the peer can answer it and keep the
//! connection open.

use std::io;
use std::marker::PhantomData;

use bytes::{Bytes, BytesMut};
use gridline_core::messages::{decode, encode, WireError};
use gridline_core::{RpcRequest, RpcResponse};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio_util::codec::{Decoder, Encoder, LengthDelimitedCodec};

/// Largest accepted frame body.
pub const MAX_FRAME_LEN: usize = 8 * 1024 * 1024;

/// Codec decoding `In` frames and encoding `Out` frames.
pub struct RpcCodec<In, Out> {
    frames: LengthDelimitedCodec,
    _marker: PhantomData<fn(Out) -> In>,
}

/// Server side: reads requests, writes responses.
pub type ServerCodec = RpcCodec<RpcRequest, RpcResponse>;
/// Client side: reads responses, writes requests.
pub type ClientCodec = RpcCodec<RpcResponse, RpcRequest>;

impl<In, Out> RpcCodec<In, Out> {
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_frame_len(MAX_FRAME_LEN)
    }

    #[must_use]
    pub fn with_max_frame_len(max: usize) -> Self {
        Self {
            frames: LengthDelimitedCodec::builder()
                .max_frame_length(max)
                .new_codec(),
            _marker: PhantomData,
        }
    }
}

impl<In, Out> Default for RpcCodec<In, Out> {
    fn default() -> Self {
        Self::new()
    }
}

impl<In: DeserializeOwned, Out> Decoder for RpcCodec<In, Out> {
    type Item = Result<In, WireError>;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<Self::Item>, io::Error> {
        Ok(self.frames.decode(src)?.map(|frame| decode(&frame)))
    }
}

impl<In, Out: Serialize> Encoder<Out> for RpcCodec<In, Out> {
    type Error = io::Error;

    fn encode(&mut self, item: Out, dst: &mut BytesMut) -> Result<(), io::Error> {
        let body = encode(&item).map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.frames.encode(Bytes::from(body), dst)
    }
}
