//! Column codecs — delta timestamps and Gorilla-style XOR values.
//!
//! # Timestamps
//!
//! Per page, the first entry stores the absolute timestamp as an unsigned
//! varint; every later entry stores the delta from the previous absolute
//! value, same encoding.  Monotonic, low-cardinality deltas compress well
//! at byte granularity without bit packing.
//!
//! # Values
//!
//! Values are scaled by 10^5 and truncated to an integer before encoding;
//! decoding divides by 10^5.  The first entry on a page stores the 64-bit
//! scaled value verbatim.  Each later entry XORs with the previous scaled
//! value and is emitted under a 2-bit control prefix:
//!
//! | Prefix | Condition                                   | Payload |
//! |--------|---------------------------------------------|---------|
//! | `00`   | XOR is zero (repeat)                        | none |
//! | `01`   | leading/trailing counts match the previous  | meaningful-bit window |
//! | `10`   | counts differ, meaningful bits ≤ 50         | 6-bit leading, 6-bit length, window |
//! | `11`   | meaningful bits > 50                        | full 64-bit scaled value |
//!
//! Leading/trailing counts update on `01`/`10`, reset to `(0, 0)` on `11`,
//! and are left alone on `00`.  The threshold keeps case `10`'s fixed
//! 14-bit overhead from ever exceeding a verbatim emit.
//!
//! Both codecs carry a small mutable state (last value, last counts); a
//! partially filled page reloaded at startup replays its entries through
//! the reconstructors to restore that state before any further append.


use thiserror::Error;

use crate::bitio::{BitIoError, BitReader, BitWriter};
use crate::encoding::{self, EncodingError};

/// Errors produced while decoding a compressed value stream.
#[derive(Debug, Error)]
pub enum CodecError {
    /// The underlying bit stream ran out or a seek failed.
    #[error("bit stream error: {0}")]
    BitIo(#[from] BitIoError),

    /// The stream decoded to an impossible window description.
    #[error("corrupt value stream: {0}")]
    Corrupt(String),
}

/// Decimal scale factor applied to values before integer encoding.
const VALUE_SCALE: f64 = 100_000.0;

/// Meaningful-bit count above which an entry is emitted verbatim.
const FULL_EMIT_THRESHOLD: u8 = 50;

/// Scale a raw value to its integer bit pattern.
#[inline]
pub fn scale_value(value: f64) -> u64 {
    ((value * VALUE_SCALE).trunc() as i64) as u64
}

/// Invert [`scale_value`].
#[inline]
pub fn unscale_value(bits: u64) -> f64 {
    (bits as i64) as f64 / VALUE_SCALE
}

// ------------------------------------------------------------------------------------------------
// Timestamp compression
// ------------------------------------------------------------------------------------------------

/// Stateful delta encoder for one timestamp page.
#[derive(Debug, Default)]
pub struct TimestampCompressor {
    last_value: u64,
}

impl TimestampCompressor {
    /// Fresh compressor for an empty page.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore the compressor behind an already-populated page.
    pub fn resume(last_value: u64) -> Self {
        Self { last_value }
    }

    /// Byte size `compress_next` would emit for `timestamp` at
    /// `index_in_page` without mutating state.
    pub fn encoded_len(&self, timestamp: u64, index_in_page: u64) -> usize {
        if index_in_page == 0 {
            encoding::uvarint_len(timestamp)
        } else {
            encoding::uvarint_len(timestamp.wrapping_sub(self.last_value))
        }
    }

    /// Encode `timestamp` into `buf` — absolute for the first entry of a
    /// page, delta from the previous absolute value otherwise.  Returns the
    /// number of bytes written.
    pub fn compress_next(&mut self, timestamp: u64, index_in_page: u64, buf: &mut Vec<u8>) -> usize {
        let written = if index_in_page == 0 {
            encoding::encode_uvarint(timestamp, buf)
        } else {
            encoding::encode_uvarint(timestamp.wrapping_sub(self.last_value), buf)
        };
        self.last_value = timestamp;
        written
    }

    /// The last absolute timestamp encoded.
    pub fn last_value(&self) -> u64 {
        self.last_value
    }
}

/// Stateful delta decoder walking a timestamp page body.
#[derive(Debug)]
pub struct TimestampReconstructor<'a> {
    bytes: &'a [u8],
    offset: usize,
    last_value: u64,
    index: u64,
}

impl<'a> TimestampReconstructor<'a> {
    /// Create a reconstructor over a page body (header stripped).
    pub fn new(bytes: &'a [u8]) -> Self {
        Self {
            bytes,
            offset: 0,
            last_value: 0,
            index: 0,
        }
    }

    /// Decode the next timestamp, returning `(timestamp, bytes_read)`.
    ///
    /// Fails when the cursor is exhausted or the varint is malformed.
    pub fn reconstruct_next(&mut self) -> Result<(u64, usize), EncodingError> {
        if self.offset >= self.bytes.len() {
            return Err(EncodingError::UnexpectedEof {
                needed: 1,
                available: 0,
            });
        }
        let (raw, read) = encoding::decode_uvarint(&self.bytes[self.offset..])?;
        let timestamp = if self.index == 0 {
            raw
        } else {
            self.last_value.wrapping_add(raw)
        };
        self.offset += read;
        self.index += 1;
        self.last_value = timestamp;
        Ok((timestamp, read))
    }

    /// The last absolute timestamp reconstructed.
    pub fn last_value(&self) -> u64 {
        self.last_value
    }

    /// Bytes consumed so far.
    pub fn bytes_read(&self) -> usize {
        self.offset
    }
}

// ------------------------------------------------------------------------------------------------
// Value compression (Gorilla XOR)
// ------------------------------------------------------------------------------------------------

/// Control case selected for one encoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueControl {
    /// First entry of the page: 64 scaled bits, no prefix.
    First,
    /// Prefix `00` — XOR is zero.
    Zero,
    /// Prefix `01` — counts match the previous entry.
    SameWindow,
    /// Prefix `10` — counts differ, window emitted with lengths.
    NewWindow,
    /// Prefix `11` — verbatim 64-bit scaled value.
    Full,
}

/// One value entry, fully determined but not yet committed to a page.
///
/// Splitting computation from commitment lets a chunk size-check an entry
/// against the active page's padding and, on overflow, recompute it as the
/// first entry of a fresh page.
#[derive(Debug, Clone, Copy)]
pub struct CompressedValue {
    /// Control case.
    pub control: ValueControl,
    /// Scaled integer bit pattern of the value.
    pub scaled: u64,
    /// XOR with the previous scaled value (cases `01`/`10`).
    xor: u64,
    /// Leading-zero count of the XOR.
    leading: u8,
    /// Trailing-zero count of the XOR.
    trailing: u8,
}

impl CompressedValue {
    /// Size of this entry in bits.
    pub fn bit_len(&self) -> u32 {
        match self.control {
            ValueControl::First => 64,
            ValueControl::Zero => 2,
            ValueControl::SameWindow => 2 + u32::from(64 - self.leading - self.trailing),
            ValueControl::NewWindow => 14 + u32::from(64 - self.leading - self.trailing),
            ValueControl::Full => 66,
        }
    }

    /// Append this entry to a bit stream.
    pub fn write_to(&self, writer: &mut BitWriter) {
        match self.control {
            ValueControl::First => writer.write_bits(self.scaled, 64),
            ValueControl::Zero => writer.write_bits(0b00, 2),
            ValueControl::SameWindow => {
                let window = 64 - self.leading - self.trailing;
                writer.write_bits(0b01, 2);
                writer.write_bits(self.xor >> self.trailing, window);
            }
            ValueControl::NewWindow => {
                let window = 64 - self.leading - self.trailing;
                writer.write_bits(0b10, 2);
                writer.write_bits(u64::from(self.leading), 6);
                writer.write_bits(u64::from(window), 6);
                writer.write_bits(self.xor >> self.trailing, window);
            }
            ValueControl::Full => {
                writer.write_bits(0b11, 2);
                writer.write_bits(self.scaled, 64);
            }
        }
    }
}

/// Stateful Gorilla encoder for one value page.
#[derive(Debug, Default)]
pub struct ValueCompressor {
    last_scaled: u64,
    last_leading: u8,
    last_trailing: u8,
}

impl ValueCompressor {
    /// Fresh compressor for an empty page.
    pub fn new() -> Self {
        Self::default()
    }

    /// Restore the compressor behind an already-populated page.
    pub fn resume(last_scaled: u64, last_leading: u8, last_trailing: u8) -> Self {
        Self {
            last_scaled,
            last_leading,
            last_trailing,
        }
    }

    /// Compute the encoding of `value` at `index_in_page` without mutating
    /// state; the caller commits the result with [`ValueCompressor::commit`]
    /// once the owning page accepted it.
    pub fn compress_next(&self, value: f64, index_in_page: u64) -> CompressedValue {
        let scaled = scale_value(value);
        if index_in_page == 0 {
            return CompressedValue {
                control: ValueControl::First,
                scaled,
                xor: 0,
                leading: 0,
                trailing: 0,
            };
        }

        let xor = scaled ^ self.last_scaled;
        if xor == 0 {
            return CompressedValue {
                control: ValueControl::Zero,
                scaled,
                xor,
                leading: self.last_leading,
                trailing: self.last_trailing,
            };
        }

        let leading = xor.leading_zeros() as u8;
        let trailing = xor.trailing_zeros() as u8;
        let meaningful = 64 - leading - trailing;

        if leading == self.last_leading && trailing == self.last_trailing {
            CompressedValue {
                control: ValueControl::SameWindow,
                scaled,
                xor,
                leading,
                trailing,
            }
        } else if meaningful <= FULL_EMIT_THRESHOLD {
            CompressedValue {
                control: ValueControl::NewWindow,
                scaled,
                xor,
                leading,
                trailing,
            }
        } else {
            CompressedValue {
                control: ValueControl::Full,
                scaled,
                xor,
                leading: 0,
                trailing: 0,
            }
        }
    }

    /// Fold a just-written entry into the compressor state.
    pub fn commit(&mut self, cv: &CompressedValue) {
        match cv.control {
            ValueControl::Zero => {}
            ValueControl::First | ValueControl::Full => {
                self.last_scaled = cv.scaled;
                self.last_leading = 0;
                self.last_trailing = 0;
            }
            ValueControl::SameWindow | ValueControl::NewWindow => {
                self.last_scaled = cv.scaled;
                self.last_leading = cv.leading;
                self.last_trailing = cv.trailing;
            }
        }
    }

    /// The scaled bit pattern of the last committed value.
    pub fn last_scaled(&self) -> u64 {
        self.last_scaled
    }

    /// The last committed `(leading, trailing)` pair.
    pub fn last_window(&self) -> (u8, u8) {
        (self.last_leading, self.last_trailing)
    }
}

/// Stateful Gorilla decoder walking a value page's bit stream.
#[derive(Debug)]
pub struct ValueReconstructor<'a> {
    reader: BitReader<'a>,
    last_scaled: u64,
    last_leading: u8,
    last_trailing: u8,
    index: u64,
}

impl<'a> ValueReconstructor<'a> {
    /// Create a reconstructor over a page body (header stripped).
    pub fn new(body: &'a [u8]) -> Self {
        Self {
            reader: BitReader::new(body),
            last_scaled: 0,
            last_leading: 0,
            last_trailing: 0,
            index: 0,
        }
    }

    /// Decode the next value, consuming its prefix and payload and
    /// updating the window state.
    pub fn reconstruct_next(&mut self) -> Result<f64, CodecError> {
        if self.index == 0 {
            let scaled = self.reader.read_bits(64)?;
            self.last_scaled = scaled;
            self.last_leading = 0;
            self.last_trailing = 0;
            self.index = 1;
            return Ok(unscale_value(scaled));
        }

        let prefix = self.reader.read_bits(2)?;
        let scaled = match prefix {
            0b00 => self.last_scaled,
            0b01 => {
                let window = 64 - self.last_leading - self.last_trailing;
                let bits = self.reader.read_bits(window)?;
                let xor = bits << self.last_trailing;
                self.last_scaled ^ xor
            }
            0b10 => {
                let leading = self.reader.read_bits(6)? as u8;
                let window = self.reader.read_bits(6)? as u8;
                if leading + window > 64 || window == 0 {
                    return Err(CodecError::Corrupt(format!(
                        "window of {window} bits with {leading} leading zeros"
                    )));
                }
                let trailing = 64 - leading - window;
                let bits = self.reader.read_bits(window)?;
                let xor = bits << trailing;
                self.last_leading = leading;
                self.last_trailing = trailing;
                self.last_scaled ^ xor
            }
            _ => {
                let scaled = self.reader.read_bits(64)?;
                self.last_leading = 0;
                self.last_trailing = 0;
                scaled
            }
        };
        self.last_scaled = scaled;
        self.index += 1;
        Ok(unscale_value(scaled))
    }

    /// The scaled bit pattern of the last decoded value.
    pub fn last_scaled(&self) -> u64 {
        self.last_scaled
    }

    /// The current `(leading, trailing)` pair.
    pub fn last_window(&self) -> (u8, u8) {
        (self.last_leading, self.last_trailing)
    }

    /// Bit position of the cursor.
    pub fn bit_pos(&self) -> usize {
        self.reader.bit_pos()
    }
}
