use core::fmt;
use serde::Serialize;
use time::OffsetDateTime;

/// Largest payload a single frame can carry.
pub const MAX_PAYLOAD_LEN: usize = 255;

/// Message kind identifier (24-bit message id on the wire)
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize)]
#[serde(transparent)]
pub struct KindId(u32);

impl KindId {
    pub const fn new(id: u32) -> Self {
        Self(id & 0x00FF_FFFF)
    }

    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl fmt::Display for KindId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub struct MavHeader {
    pub system_id: u8,
    pub component_id: u8,
    pub sequence: u8,
}

/// A decoded protocol unit: who sent it, what shape it carries, and the raw payload.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct WireMessage {
    pub header: MavHeader,
    pub kind: KindId,
    pub payload: Vec<u8>,
}

impl WireMessage {
    pub fn new(kind: KindId, payload: &[u8]) -> Option<Self> {
        if payload.len() > MAX_PAYLOAD_LEN {
            return None;
        }
        Some(Self {
            header: MavHeader::default(),
            kind,
            payload: payload.to_vec(),
        })
    }

    pub fn with_header(mut self, header: MavHeader) -> Self {
        self.header = header;
        self
    }

    pub fn len(&self) -> usize {
        self.payload.len()
    }

    pub fn is_empty(&self) -> bool {
        self.payload.is_empty()
    }
}

/// Framing verdict reported by the link for each frame.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Hash)]
pub enum Framing {
    #[default]
    Ok,
    BadCrc,
    BadSignature,
}

impl Framing {
    pub fn is_ok(&self) -> bool {
        matches!(self, Framing::Ok)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Framing::Ok => "ok",
            Framing::BadCrc => "bad_crc",
            Framing::BadSignature => "bad_signature",
        }
    }
}

impl fmt::Display for Framing {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A frame as handed over by a [`crate::Link`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReceivedFrame {
    pub message: WireMessage,
    pub framing: Framing,
    pub timestamp: Option<Timestamp>,
}

impl ReceivedFrame {
    pub fn new(message: WireMessage, framing: Framing) -> Self {
        Self {
            message,
            framing,
            timestamp: None,
        }
    }

    pub fn kind(&self) -> KindId {
        self.message.kind
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct Timestamp(pub OffsetDateTime);

#[derive(Clone, Debug)]
pub struct LinkInfo {
    pub name: String,
    pub driver: String,
}
