//! Stream and flow identifiers.
//!
//! A flow is identified by an opaque `KEY_SIZE`-byte key supplied by the
//! client; a stream is one numbered substream of a flow. Table keys come in
//! two kinds: `Stream` keys carry the full tuple, `Flow` keys fold every
//! stream of the flow together by forcing the stream id to zero.

use crate::seq::Seqno;

use std::hash::{BuildHasherDefault, Hash, Hasher};

use serde::{Deserialize, Serialize};

/// Size in bytes of the client-provided flow key.
pub const KEY_SIZE: usize = 2;

/// Identifies one packet stream within a flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StreamTuple {
    /// Client-provided key distinguishing one logical flow from another.
    pub flow_key: [u8; KEY_SIZE],
    /// Identifier of the packet stream within the flow. The pair
    /// `(flow_key, stream_id)` uniquely identifies a stream.
    pub stream_id: u8,
}

/// Per-packet metadata pushed by clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PacketInfo {
    pub stream: StreamTuple,
    /// Sequence number of the packet within its stream.
    pub seq: Seqno,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyKind {
    Stream,
    Flow,
}

/// A table key: a stream tuple tagged with the aggregation level.
///
/// The CRC of the key bytes is computed once at construction and reused as
/// the table hash. Deriving a `Flow` key from a `Stream` key rewrites the
/// tuple, so the CRC is recomputed rather than inherited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowKey {
    kind: KeyKind,
    tuple: StreamTuple,
    crc: u32,
}

impl FlowKey {
    /// Builds a stream-level key.
    pub fn stream(tuple: &StreamTuple) -> Self {
        let tuple = *tuple;
        FlowKey {
            kind: KeyKind::Stream,
            tuple,
            crc: key_crc(KeyKind::Stream, &tuple),
        }
    }

    /// Builds a flow-level key, mapping every stream id to 0.
    pub fn flow(tuple: &StreamTuple) -> Self {
        let mut tuple = *tuple;
        tuple.stream_id = 0;
        FlowKey {
            kind: KeyKind::Flow,
            tuple,
            crc: key_crc(KeyKind::Flow, &tuple),
        }
    }

    /// Derives the flow-level key covering this key's flow.
    pub fn to_flow(&self) -> Self {
        FlowKey::flow(&self.tuple)
    }

    pub fn kind(&self) -> KeyKind {
        self.kind
    }

    pub fn is_stream(&self) -> bool {
        self.kind == KeyKind::Stream
    }

    pub fn is_flow(&self) -> bool {
        self.kind == KeyKind::Flow
    }

    pub fn tuple(&self) -> &StreamTuple {
        &self.tuple
    }

    pub fn flow_key_bytes(&self) -> [u8; KEY_SIZE] {
        self.tuple.flow_key
    }
}

impl Hash for FlowKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        state.write_u32(self.crc);
    }
}

fn key_crc(kind: KeyKind, tuple: &StreamTuple) -> u32 {
    let mut bytes = [0u8; KEY_SIZE + 2];
    bytes[0] = match kind {
        KeyKind::Stream => 1,
        KeyKind::Flow => 2,
    };
    bytes[1..1 + KEY_SIZE].copy_from_slice(&tuple.flow_key);
    bytes[1 + KEY_SIZE] = tuple.stream_id;
    crc32c(&bytes)
}

/// Pass-through hasher: the key already carries its CRC.
#[derive(Default)]
pub struct KeyHasher(u64);

impl Hasher for KeyHasher {
    #[inline]
    fn finish(&self) -> u64 {
        self.0
    }

    #[inline]
    fn write(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.0 = (self.0 << 8) | u64::from(b);
        }
    }

    #[inline]
    fn write_u32(&mut self, value: u32) {
        self.0 = u64::from(value);
    }
}

pub type KeyHashBuilder = BuildHasherDefault<KeyHasher>;

// CRC32C (Castagnoli), reflected, the usual init/xorout.
const CRC32C_POLY: u32 = 0x82F6_3B38;

const fn crc32c_table() -> [u32; 256] {
    let mut table = [0u32; 256];
    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CRC32C_POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        table[i] = crc;
        i += 1;
    }
    table
}

static CRC32C_TABLE: [u32; 256] = crc32c_table();

pub(crate) fn crc32c(bytes: &[u8]) -> u32 {
    let mut crc = u32::MAX;
    for &b in bytes {
        crc = (crc >> 8) ^ CRC32C_TABLE[((crc ^ u32::from(b)) & 0xFF) as usize];
    }
    !crc
}
