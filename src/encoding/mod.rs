//! Deterministic, zero-dependency binary encoding for on-disk persistence.
//!
//! This module provides the [`Encode`] and [`Decode`] traits that back every
//! persisted record in TempusDB — WAL entries, row-group metadata, parquet
//! metadata.  Because the crate owns this format, the on-disk representation
//! **never** changes due to a dependency upgrade.
//!
//! # Wire format
//!
//! | Rust type          | Encoding                                     |
//! |--------------------|----------------------------------------------|
//! | `u8`               | 1 byte                                       |
//! | `u32`              | 4 bytes, big-endian                          |
//! | `u64`              | 8 bytes, big-endian                          |
//! | `f64`              | 8 bytes, IEEE-754 bit pattern, big-endian    |
//! | `bool`             | 1 byte (`0x00` = false, `0x01` = true)       |
//! | `String`           | `[u64 len][utf-8 bytes]`                     |
//!
//! All multi-byte integers are **big-endian**.  String lengths are encoded
//! as `u64` to match the column-file structures bit for bit.
//!
//! Timestamps inside column pages additionally use an unsigned varint
//! ([`encode_uvarint`] / [`decode_uvarint`]): 7 payload bits per byte,
//! low group first, high bit as continuation.
//!
//! # Safety limits
//!
//! Variable-length decoders enforce [`MAX_BYTE_LEN`] so a corrupted length
//! field cannot trigger an allocation bomb.
//!
//! # Zero-panic guarantee
//!
//! No function in this module uses `unwrap()`, `expect()`, or any other
//! panicking path.  All errors are propagated via [`EncodingError`].


use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Safety limits
// ------------------------------------------------------------------------------------------------

/// Maximum byte length for a single decoded `String` (16 MiB).
///
/// Any decoded length field exceeding this value is rejected immediately,
/// preventing allocation bombs from corrupted data.
pub const MAX_BYTE_LEN: u64 = 16 * 1024 * 1024;

/// Maximum number of bytes a uvarint may occupy (ceil(64 / 7)).
pub const MAX_UVARINT_LEN: usize = 10;

// ------------------------------------------------------------------------------------------------
// Error type
// ------------------------------------------------------------------------------------------------

/// Errors produced during encoding or decoding.
#[derive(Debug, Error)]
pub enum EncodingError {
    /// The buffer ran out of bytes before decoding completed.
    #[error("unexpected end of buffer (need {needed} bytes, have {available})")]
    UnexpectedEof {
        /// Bytes required to continue decoding.
        needed: usize,
        /// Bytes actually remaining.
        available: usize,
    },

    /// A bool field contained a byte other than `0x00` or `0x01`.
    #[error("invalid bool byte: 0x{0:02X} (expected 0x00 or 0x01)")]
    InvalidBool(u8),

    /// A byte sequence decoded as a string was not valid UTF-8.
    #[error("invalid UTF-8: {0}")]
    InvalidUtf8(#[from] std::string::FromUtf8Error),

    /// A length field exceeded its safety limit.
    #[error("length overflow: {0}")]
    LengthOverflow(String),

    /// A varint was truncated or longer than [`MAX_UVARINT_LEN`] bytes.
    #[error("invalid varint at byte {0}")]
    InvalidVarint(usize),
}

// ------------------------------------------------------------------------------------------------
// Core traits
// ------------------------------------------------------------------------------------------------

/// Serialize `self` into a byte buffer.
///
/// Implementations **must** produce deterministic output: the same logical
/// value always yields the exact same byte sequence.
pub trait Encode {
    /// Append the encoded representation of `self` to `buf`.
    fn encode_to(&self, buf: &mut Vec<u8>);
}

/// Deserialize a value from a byte slice.
///
/// Returns `(value, bytes_consumed)` on success so that callers can advance
/// a cursor through a buffer containing multiple encoded items.
pub trait Decode: Sized {
    /// Decode one value starting at `buf[0]`.
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError>;
}

/// Encode a value into a freshly-allocated `Vec<u8>`.
pub fn encode_to_vec<T: Encode>(value: &T) -> Vec<u8> {
    let mut buf = Vec::new();
    value.encode_to(&mut buf);
    buf
}

// ------------------------------------------------------------------------------------------------
// Internal helpers
// ------------------------------------------------------------------------------------------------

/// Verify that `buf` has at least `needed` bytes.
#[inline]
fn require(buf: &[u8], needed: usize) -> Result<(), EncodingError> {
    if buf.len() < needed {
        Err(EncodingError::UnexpectedEof {
            needed,
            available: buf.len(),
        })
    } else {
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Primitive implementations
// ------------------------------------------------------------------------------------------------

impl Encode for u8 {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.push(*self);
    }
}

impl Decode for u8 {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        require(buf, 1)?;
        Ok((buf[0], 1))
    }
}

impl Encode for u32 {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }
}

impl Decode for u32 {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        require(buf, 4)?;
        let mut bytes = [0u8; 4];
        bytes.copy_from_slice(&buf[..4]);
        Ok((u32::from_be_bytes(bytes), 4))
    }
}

impl Encode for u64 {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_be_bytes());
    }
}

impl Decode for u64 {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        require(buf, 8)?;
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&buf[..8]);
        Ok((u64::from_be_bytes(bytes), 8))
    }
}

impl Encode for f64 {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.extend_from_slice(&self.to_bits().to_be_bytes());
    }
}

impl Decode for f64 {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (bits, consumed) = u64::decode_from(buf)?;
        Ok((f64::from_bits(bits), consumed))
    }
}

impl Encode for bool {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) {
        buf.push(u8::from(*self));
    }
}

impl Decode for bool {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        require(buf, 1)?;
        match buf[0] {
            0 => Ok((false, 1)),
            1 => Ok((true, 1)),
            other => Err(EncodingError::InvalidBool(other)),
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Strings: [u64 len][utf-8 bytes]
// ------------------------------------------------------------------------------------------------

impl Encode for String {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) {
        (self.len() as u64).encode_to(buf);
        buf.extend_from_slice(self.as_bytes());
    }
}

impl Decode for String {
    #[inline]
    fn decode_from(buf: &[u8]) -> Result<(Self, usize), EncodingError> {
        let (len, mut offset) = u64::decode_from(buf)?;
        if len > MAX_BYTE_LEN {
            return Err(EncodingError::LengthOverflow(format!(
                "string length {len} exceeds MAX_BYTE_LEN ({MAX_BYTE_LEN})"
            )));
        }
        let len = len as usize;
        require(&buf[offset..], len)?;
        let s = String::from_utf8(buf[offset..offset + len].to_vec())?;
        offset += len;
        Ok((s, offset))
    }
}

impl Encode for &str {
    #[inline]
    fn encode_to(&self, buf: &mut Vec<u8>) {
        (self.len() as u64).encode_to(buf);
        buf.extend_from_slice(self.as_bytes());
    }
}

// ------------------------------------------------------------------------------------------------
// Unsigned varints — 7 payload bits per byte, low group first, high bit continues
// ------------------------------------------------------------------------------------------------

/// Append the uvarint encoding of `value` to `buf`, returning the number of
/// bytes written (1–10).
pub fn encode_uvarint(mut value: u64, buf: &mut Vec<u8>) -> usize {
    let mut written = 0;
    while value >= 0x80 {
        buf.push((value as u8 & 0x7F) | 0x80);
        value >>= 7;
        written += 1;
    }
    buf.push(value as u8);
    written + 1
}

/// Number of bytes [`encode_uvarint`] would emit for `value`.
pub fn uvarint_len(value: u64) -> usize {
    let bits = (64 - value.leading_zeros()) as usize;
    bits.max(1).div_ceil(7)
}

/// Decode a uvarint from the beginning of `buf`.
///
/// Returns `(value, bytes_consumed)`.  Fails on truncation or when the
/// encoding exceeds [`MAX_UVARINT_LEN`] bytes.
pub fn decode_uvarint(buf: &[u8]) -> Result<(u64, usize), EncodingError> {
    let mut value: u64 = 0;
    let mut shift = 0u32;
    for (i, &byte) in buf.iter().enumerate() {
        if i >= MAX_UVARINT_LEN {
            return Err(EncodingError::InvalidVarint(i));
        }
        value |= u64::from(byte & 0x7F) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
    }
    Err(EncodingError::InvalidVarint(buf.len()))
}
