// nexus_gateway/src/wire/codec.rs
//
// Wire codec: a 16-byte Header followed by one of five fixed-size
// payload variants, all big-endian on the wire. The codec never
// allocates — decode reads from a caller-owned byte slice and returns
// plain stack structs; encode writes into a caller-owned buffer.
//
// Primary framing is header-first: decode the header, trust its
// `payload_size`, then dispatch on the payload's own `messageType`
// tag. `decode_by_length` is kept as a legacy fallback for peers that
// still rely on total-length-implies-type framing.

use crate::types::Side;
use thiserror::Error;

pub const HEADER_SIZE: usize = 16;

pub mod tag {
    pub const NEW_ORDER: u16 = 1;
    pub const DELETE_ORDER: u16 = 2;
    pub const MODIFY_ORDER_QUANTITY: u16 = 3;
    pub const TRADE: u16 = 4;
    pub const ORDER_RESPONSE: u16 = 5;
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CodecError {
    #[error("buffer too short: expected at least {expected} bytes, got {actual}")]
    TooShort { expected: usize, actual: usize },
    #[error("unknown message type tag: {0}")]
    UnknownMessageType(u16),
    #[error("payload size mismatch: header/tag says {expected}, buffer has {actual}")]
    PayloadSizeMismatch { expected: u16, actual: u16 },
    #[error("invalid side byte: {0:#04x}")]
    InvalidSide(u8),
    #[error("quantity must be nonzero")]
    ZeroQuantity,
    #[error("invalid response status: {0}")]
    InvalidStatus(u16),
    #[error("no known message variant has total length {0}")]
    UnknownLength(usize),
}

/// The 16-byte common header, present on every message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub version: u16,
    pub payload_size: u16,
    pub sequence_number: u32,
    pub timestamp: u64,
}

impl Header {
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < HEADER_SIZE {
            return Err(CodecError::TooShort {
                expected: HEADER_SIZE,
                actual: buf.len(),
            });
        }
        Ok(Self {
            version: u16::from_be_bytes([buf[0], buf[1]]),
            payload_size: u16::from_be_bytes([buf[2], buf[3]]),
            sequence_number: u32::from_be_bytes([buf[4], buf[5], buf[6], buf[7]]),
            timestamp: u64::from_be_bytes([
                buf[8], buf[9], buf[10], buf[11], buf[12], buf[13], buf[14], buf[15],
            ]),
        })
    }

    pub fn encode(&self, out: &mut [u8]) -> Result<(), CodecError> {
        if out.len() < HEADER_SIZE {
            return Err(CodecError::TooShort {
                expected: HEADER_SIZE,
                actual: out.len(),
            });
        }
        out[0..2].copy_from_slice(&self.version.to_be_bytes());
        out[2..4].copy_from_slice(&self.payload_size.to_be_bytes());
        out[4..8].copy_from_slice(&self.sequence_number.to_be_bytes());
        out[8..16].copy_from_slice(&self.timestamp.to_be_bytes());
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseStatus {
    Accepted = 0,
    Rejected = 1,
}

impl ResponseStatus {
    fn to_wire(self) -> u16 {
        self as u16
    }

    fn from_wire(v: u16) -> Result<Self, CodecError> {
        match v {
            0 => Ok(ResponseStatus::Accepted),
            1 => Ok(ResponseStatus::Rejected),
            other => Err(CodecError::InvalidStatus(other)),
        }
    }
}

macro_rules! read_u64 {
    ($buf:expr, $off:expr) => {
        u64::from_be_bytes($buf[$off..$off + 8].try_into().unwrap())
    };
}

macro_rules! read_u16 {
    ($buf:expr, $off:expr) => {
        u16::from_be_bytes([$buf[$off], $buf[$off + 1]])
    };
}

/// NewOrder payload (35 bytes on the wire, tag 1).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NewOrder {
    pub listing_id: u64,
    pub order_id: u64,
    pub order_quantity: u64,
    pub order_price: u64,
    pub side: Side,
}

impl NewOrder {
    pub const WIRE_SIZE: usize = 35;

    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != Self::WIRE_SIZE {
            return Err(CodecError::PayloadSizeMismatch {
                expected: Self::WIRE_SIZE as u16,
                actual: buf.len() as u16,
            });
        }
        let listing_id = read_u64!(buf, 2);
        let order_id = read_u64!(buf, 10);
        let order_quantity = read_u64!(buf, 18);
        let order_price = read_u64!(buf, 26);
        let side = Side::from_wire(buf[34]).map_err(CodecError::InvalidSide)?;
        if order_quantity == 0 {
            return Err(CodecError::ZeroQuantity);
        }
        Ok(Self {
            listing_id,
            order_id,
            order_quantity,
            order_price,
            side,
        })
    }

    fn encode(&self, out: &mut [u8]) -> Result<(), CodecError> {
        if out.len() < Self::WIRE_SIZE {
            return Err(CodecError::TooShort {
                expected: Self::WIRE_SIZE,
                actual: out.len(),
            });
        }
        out[0..2].copy_from_slice(&tag::NEW_ORDER.to_be_bytes());
        out[2..10].copy_from_slice(&self.listing_id.to_be_bytes());
        out[10..18].copy_from_slice(&self.order_id.to_be_bytes());
        out[18..26].copy_from_slice(&self.order_quantity.to_be_bytes());
        out[26..34].copy_from_slice(&self.order_price.to_be_bytes());
        out[34] = self.side.to_wire();
        Ok(())
    }
}

/// DeleteOrder payload (10 bytes on the wire, tag 2).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeleteOrder {
    pub order_id: u64,
}

impl DeleteOrder {
    pub const WIRE_SIZE: usize = 10;

    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != Self::WIRE_SIZE {
            return Err(CodecError::PayloadSizeMismatch {
                expected: Self::WIRE_SIZE as u16,
                actual: buf.len() as u16,
            });
        }
        Ok(Self {
            order_id: read_u64!(buf, 2),
        })
    }

    fn encode(&self, out: &mut [u8]) -> Result<(), CodecError> {
        if out.len() < Self::WIRE_SIZE {
            return Err(CodecError::TooShort {
                expected: Self::WIRE_SIZE,
                actual: out.len(),
            });
        }
        out[0..2].copy_from_slice(&tag::DELETE_ORDER.to_be_bytes());
        out[2..10].copy_from_slice(&self.order_id.to_be_bytes());
        Ok(())
    }
}

/// ModifyOrderQuantity payload (18 bytes on the wire, tag 3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ModifyOrderQuantity {
    pub order_id: u64,
    pub new_quantity: u64,
}

impl ModifyOrderQuantity {
    pub const WIRE_SIZE: usize = 18;

    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != Self::WIRE_SIZE {
            return Err(CodecError::PayloadSizeMismatch {
                expected: Self::WIRE_SIZE as u16,
                actual: buf.len() as u16,
            });
        }
        let order_id = read_u64!(buf, 2);
        let new_quantity = read_u64!(buf, 10);
        if new_quantity == 0 {
            return Err(CodecError::ZeroQuantity);
        }
        Ok(Self {
            order_id,
            new_quantity,
        })
    }

    fn encode(&self, out: &mut [u8]) -> Result<(), CodecError> {
        if out.len() < Self::WIRE_SIZE {
            return Err(CodecError::TooShort {
                expected: Self::WIRE_SIZE,
                actual: out.len(),
            });
        }
        out[0..2].copy_from_slice(&tag::MODIFY_ORDER_QUANTITY.to_be_bytes());
        out[2..10].copy_from_slice(&self.order_id.to_be_bytes());
        out[10..18].copy_from_slice(&self.new_quantity.to_be_bytes());
        Ok(())
    }
}

/// Trade payload (34 bytes on the wire, tag 4).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trade {
    pub listing_id: u64,
    pub trade_id: u64,
    pub trade_quantity: u64,
    pub trade_price: u64,
}

impl Trade {
    pub const WIRE_SIZE: usize = 34;

    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != Self::WIRE_SIZE {
            return Err(CodecError::PayloadSizeMismatch {
                expected: Self::WIRE_SIZE as u16,
                actual: buf.len() as u16,
            });
        }
        let listing_id = read_u64!(buf, 2);
        let trade_id = read_u64!(buf, 10);
        let trade_quantity = read_u64!(buf, 18);
        let trade_price = read_u64!(buf, 26);
        if trade_quantity == 0 {
            return Err(CodecError::ZeroQuantity);
        }
        Ok(Self {
            listing_id,
            trade_id,
            trade_quantity,
            trade_price,
        })
    }

    fn encode(&self, out: &mut [u8]) -> Result<(), CodecError> {
        if out.len() < Self::WIRE_SIZE {
            return Err(CodecError::TooShort {
                expected: Self::WIRE_SIZE,
                actual: out.len(),
            });
        }
        out[0..2].copy_from_slice(&tag::TRADE.to_be_bytes());
        out[2..10].copy_from_slice(&self.listing_id.to_be_bytes());
        out[10..18].copy_from_slice(&self.trade_id.to_be_bytes());
        out[18..26].copy_from_slice(&self.trade_quantity.to_be_bytes());
        out[26..34].copy_from_slice(&self.trade_price.to_be_bytes());
        Ok(())
    }
}

/// OrderResponse payload (12 bytes on the wire, tag 5). Always
/// gateway-outbound; decode exists for symmetry and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderResponse {
    pub order_id: u64,
    pub status: ResponseStatus,
}

impl OrderResponse {
    pub const WIRE_SIZE: usize = 12;

    fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() != Self::WIRE_SIZE {
            return Err(CodecError::PayloadSizeMismatch {
                expected: Self::WIRE_SIZE as u16,
                actual: buf.len() as u16,
            });
        }
        let order_id = read_u64!(buf, 2);
        let status = ResponseStatus::from_wire(read_u16!(buf, 10))?;
        Ok(Self { order_id, status })
    }

    fn encode(&self, out: &mut [u8]) -> Result<(), CodecError> {
        if out.len() < Self::WIRE_SIZE {
            return Err(CodecError::TooShort {
                expected: Self::WIRE_SIZE,
                actual: out.len(),
            });
        }
        out[0..2].copy_from_slice(&tag::ORDER_RESPONSE.to_be_bytes());
        out[2..10].copy_from_slice(&self.order_id.to_be_bytes());
        out[10..12].copy_from_slice(&self.status.to_wire().to_be_bytes());
        Ok(())
    }
}

/// A decoded payload, tagged by the message-type it carried on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Payload {
    NewOrder(NewOrder),
    DeleteOrder(DeleteOrder),
    ModifyOrderQuantity(ModifyOrderQuantity),
    Trade(Trade),
    OrderResponse(OrderResponse),
}

impl Payload {
    pub fn wire_size(&self) -> usize {
        match self {
            Payload::NewOrder(_) => NewOrder::WIRE_SIZE,
            Payload::DeleteOrder(_) => DeleteOrder::WIRE_SIZE,
            Payload::ModifyOrderQuantity(_) => ModifyOrderQuantity::WIRE_SIZE,
            Payload::Trade(_) => Trade::WIRE_SIZE,
            Payload::OrderResponse(_) => OrderResponse::WIRE_SIZE,
        }
    }

    /// Decode a payload, dispatching on its leading `messageType` tag.
    pub fn decode(buf: &[u8]) -> Result<Self, CodecError> {
        if buf.len() < 2 {
            return Err(CodecError::TooShort {
                expected: 2,
                actual: buf.len(),
            });
        }
        let message_type = read_u16!(buf, 0);
        match message_type {
            tag::NEW_ORDER => Ok(Payload::NewOrder(NewOrder::decode(buf)?)),
            tag::DELETE_ORDER => Ok(Payload::DeleteOrder(DeleteOrder::decode(buf)?)),
            tag::MODIFY_ORDER_QUANTITY => {
                Ok(Payload::ModifyOrderQuantity(ModifyOrderQuantity::decode(buf)?))
            }
            tag::TRADE => Ok(Payload::Trade(Trade::decode(buf)?)),
            tag::ORDER_RESPONSE => Ok(Payload::OrderResponse(OrderResponse::decode(buf)?)),
            other => Err(CodecError::UnknownMessageType(other)),
        }
    }

    pub fn encode(&self, out: &mut [u8]) -> Result<usize, CodecError> {
        match self {
            Payload::NewOrder(p) => {
                p.encode(out)?;
                Ok(NewOrder::WIRE_SIZE)
            }
            Payload::DeleteOrder(p) => {
                p.encode(out)?;
                Ok(DeleteOrder::WIRE_SIZE)
            }
            Payload::ModifyOrderQuantity(p) => {
                p.encode(out)?;
                Ok(ModifyOrderQuantity::WIRE_SIZE)
            }
            Payload::Trade(p) => {
                p.encode(out)?;
                Ok(Trade::WIRE_SIZE)
            }
            Payload::OrderResponse(p) => {
                p.encode(out)?;
                Ok(OrderResponse::WIRE_SIZE)
            }
        }
    }
}

/// Header-first decode: the primary, mandated path. `buf` must contain
/// at least the header plus the header-declared payload size.
pub fn decode(buf: &[u8]) -> Result<(Header, Payload), CodecError> {
    let header = Header::decode(buf)?;
    let body = &buf[HEADER_SIZE..];
    if body.len() < header.payload_size as usize {
        return Err(CodecError::TooShort {
            expected: HEADER_SIZE + header.payload_size as usize,
            actual: buf.len(),
        });
    }
    let body = &body[..header.payload_size as usize];
    let payload = Payload::decode(body)?;
    if payload.wire_size() as u16 != header.payload_size {
        return Err(CodecError::PayloadSizeMismatch {
            expected: payload.wire_size() as u16,
            actual: header.payload_size,
        });
    }
    Ok((header, payload))
}

/// Legacy fallback: dispatch purely on the total received byte count,
/// the way the original length-typed framing did. Kept for
/// compatibility with peers that still send exactly one message per
/// `recv` with no header validation; the primary path is `decode`.
pub fn decode_by_length(buf: &[u8]) -> Result<(Header, Payload), CodecError> {
    let expected_total = match buf.len() {
        51 | 26 | 34 | 50 | 28 => buf.len(),
        other => return Err(CodecError::UnknownLength(other)),
    };
    let _ = expected_total;
    decode(buf)
}

/// Encode a full message (header + payload) into `out`, returning the
/// number of bytes written.
pub fn encode(header: &Header, payload: &Payload, out: &mut [u8]) -> Result<usize, CodecError> {
    let total = HEADER_SIZE + payload.wire_size();
    if out.len() < total {
        return Err(CodecError::TooShort {
            expected: total,
            actual: out.len(),
        });
    }
    header.encode(&mut out[..HEADER_SIZE])?;
    payload.encode(&mut out[HEADER_SIZE..])?;
    Ok(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header(payload_size: u16) -> Header {
        Header {
            version: 1,
            payload_size,
            sequence_number: 7,
            timestamp: 1_700_000_000_000_000_000,
        }
    }

    #[test]
    fn test_header_roundtrip() {
        let h = sample_header(35);
        let mut buf = [0u8; HEADER_SIZE];
        h.encode(&mut buf).unwrap();
        let decoded = Header::decode(&buf).unwrap();
        assert_eq!(h, decoded);
    }

    #[test]
    fn test_header_byte_exact_layout() {
        let h = Header {
            version: 1,
            payload_size: 35,
            sequence_number: 0x0102_0304,
            timestamp: 0x0001_0203_0405_0607,
        };
        let mut buf = [0u8; HEADER_SIZE];
        h.encode(&mut buf).unwrap();
        assert_eq!(&buf[0..2], &[0x00, 0x01]);
        assert_eq!(&buf[2..4], &[0x00, 0x23]);
        assert_eq!(&buf[4..8], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&buf[8..16], &[0x00, 0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07]);
    }

    #[test]
    fn test_new_order_roundtrip() {
        let p = NewOrder {
            listing_id: 1,
            order_id: 10,
            order_quantity: 60,
            order_price: 10_000_000,
            side: Side::Buy,
        };
        let mut buf = [0u8; NewOrder::WIRE_SIZE];
        p.encode(&mut buf).unwrap();
        assert_eq!(buf.len(), 35);
        assert_eq!(buf[34], b'B');
        let decoded = NewOrder::decode(&buf).unwrap();
        assert_eq!(p, decoded);
    }

    #[test]
    fn test_new_order_full_message_roundtrip() {
        let header = sample_header(NewOrder::WIRE_SIZE as u16);
        let payload = Payload::NewOrder(NewOrder {
            listing_id: 1,
            order_id: 10,
            order_quantity: 60,
            order_price: 10_000_000,
            side: Side::Sell,
        });
        let mut buf = [0u8; 51];
        let n = encode(&header, &payload, &mut buf).unwrap();
        assert_eq!(n, 51);
        let (decoded_header, decoded_payload) = decode(&buf).unwrap();
        assert_eq!(decoded_header, header);
        assert_eq!(decoded_payload, payload);
    }

    #[test]
    fn test_all_variant_sizes() {
        assert_eq!(HEADER_SIZE + NewOrder::WIRE_SIZE, 51);
        assert_eq!(HEADER_SIZE + DeleteOrder::WIRE_SIZE, 26);
        assert_eq!(HEADER_SIZE + ModifyOrderQuantity::WIRE_SIZE, 34);
        assert_eq!(HEADER_SIZE + Trade::WIRE_SIZE, 50);
        assert_eq!(HEADER_SIZE + OrderResponse::WIRE_SIZE, 28);
    }

    #[test]
    fn test_zero_quantity_rejected() {
        let mut buf = [0u8; NewOrder::WIRE_SIZE];
        let p = NewOrder {
            listing_id: 1,
            order_id: 1,
            order_quantity: 0,
            order_price: 1,
            side: Side::Buy,
        };
        p.encode(&mut buf).unwrap();
        assert_eq!(NewOrder::decode(&buf), Err(CodecError::ZeroQuantity));
    }

    #[test]
    fn test_invalid_side_rejected() {
        let mut buf = [0u8; NewOrder::WIRE_SIZE];
        let p = NewOrder {
            listing_id: 1,
            order_id: 1,
            order_quantity: 1,
            order_price: 1,
            side: Side::Buy,
        };
        p.encode(&mut buf).unwrap();
        buf[34] = b'X';
        assert_eq!(NewOrder::decode(&buf), Err(CodecError::InvalidSide(b'X')));
    }

    #[test]
    fn test_unknown_message_type() {
        let mut buf = [0u8; 10];
        buf[0..2].copy_from_slice(&99u16.to_be_bytes());
        assert_eq!(Payload::decode(&buf), Err(CodecError::UnknownMessageType(99)));
    }

    #[test]
    fn test_payload_size_mismatch_against_header() {
        let header = sample_header(999);
        let payload = Payload::DeleteOrder(DeleteOrder { order_id: 1 });
        let mut buf = [0u8; 26];
        // Encode with the real payload but a header lying about the size.
        header.encode(&mut buf[..HEADER_SIZE]).unwrap();
        payload.encode(&mut buf[HEADER_SIZE..]).unwrap();
        assert!(matches!(
            decode(&buf),
            Err(CodecError::TooShort { .. })
        ));
    }

    #[test]
    fn test_decode_too_short_buffer() {
        let buf = [0u8; 5];
        assert_eq!(
            Header::decode(&buf),
            Err(CodecError::TooShort {
                expected: HEADER_SIZE,
                actual: 5
            })
        );
    }

    #[test]
    fn test_order_response_roundtrip() {
        let p = OrderResponse {
            order_id: 999,
            status: ResponseStatus::Rejected,
        };
        let mut buf = [0u8; OrderResponse::WIRE_SIZE];
        p.encode(&mut buf).unwrap();
        assert_eq!(&buf[10..12], &[0x00, 0x01]);
        assert_eq!(OrderResponse::decode(&buf).unwrap(), p);
    }

    #[test]
    fn test_decode_by_length_delete_order() {
        let header = sample_header(DeleteOrder::WIRE_SIZE as u16);
        let payload = Payload::DeleteOrder(DeleteOrder { order_id: 42 });
        let mut buf = [0u8; 26];
        encode(&header, &payload, &mut buf).unwrap();
        let (decoded_header, decoded_payload) = decode_by_length(&buf).unwrap();
        assert_eq!(decoded_header, header);
        assert_eq!(decoded_payload, payload);
    }

    #[test]
    fn test_decode_by_length_rejects_unknown_length() {
        let buf = [0u8; 17];
        assert_eq!(decode_by_length(&buf), Err(CodecError::UnknownLength(17)));
    }
}
