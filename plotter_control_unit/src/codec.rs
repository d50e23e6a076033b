//! Target message codec.
//!
//! Wire format (ASCII, no separator required between messages):
//! ```text
//! noise ( <float> , <float> ) noise ( <float> , <float> ) ...
//! ```
//!
//! The decoder discards bytes until `(`, then accumulates the payload until
//! `)`. A `(` seen while collecting drops the partial payload and starts a new
//! one. The payload is bounded by [`MAX_TOKEN_LEN`]; longer payloads are a
//! protocol error and the decoder goes back to hunting.
//!
//! Each field is `[+-]?digits[.digits]` or `[+-]?.digits`, optionally padded
//! with ASCII whitespace. Exponents, `inf` and `nan` are rejected.

use heapless::Vec;
use plotter_common::axis::Axis;
use plotter_common::consts::{AXIS_COUNT, MAX_TOKEN_LEN};
use thiserror::Error;

const OPEN: u8 = b'(';
const CLOSE: u8 = b')';
const SEPARATOR: u8 = b',';

/// Parsed coordinate pair in caller units.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TargetPair {
    pub x: f64,
    pub y: f64,
}

impl TargetPair {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    #[inline]
    pub const fn get(&self, axis: Axis) -> f64 {
        match axis {
            Axis::X => self.x,
            Axis::Y => self.y,
        }
    }
}

/// Malformed target message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("target payload exceeds {limit} bytes")]
    TokenTooLong { limit: usize },

    #[error("expected 2 comma-separated fields, found {found}")]
    FieldCount { found: usize },

    #[error("field {field} is not a decimal number")]
    InvalidNumber { field: usize },
}

enum DecoderState {
    /// Discarding bytes until `(`.
    Hunting,
    /// Accumulating the payload until `)`.
    Collecting,
}

/// Streaming target decoder.
pub struct TargetDecoder {
    state: DecoderState,
    payload: Vec<u8, MAX_TOKEN_LEN>,
}

impl TargetDecoder {
    pub fn new() -> Self {
        Self {
            state: DecoderState::Hunting,
            payload: Vec::new(),
        }
    }

    /// Feed one byte.
    ///
    /// Returns `Some` when a message was closed (parsed or rejected) or the
    /// payload overflowed; `None` while more bytes are needed.
    pub fn push(&mut self, byte: u8) -> Option<Result<TargetPair, ProtocolError>> {
        match self.state {
            DecoderState::Hunting => {
                if byte == OPEN {
                    self.payload.clear();
                    self.state = DecoderState::Collecting;
                }
                None
            }
            DecoderState::Collecting => match byte {
                OPEN => {
                    self.payload.clear();
                    None
                }
                CLOSE => {
                    let result = parse_payload(&self.payload);
                    self.reset();
                    Some(result)
                }
                _ => {
                    if self.payload.push(byte).is_err() {
                        self.reset();
                        return Some(Err(ProtocolError::TokenTooLong {
                            limit: MAX_TOKEN_LEN,
                        }));
                    }
                    None
                }
            },
        }
    }

    /// Drop any partial payload and go back to hunting.
    pub fn reset(&mut self) {
        self.payload.clear();
        self.state = DecoderState::Hunting;
    }

    /// True between `(` and `)`.
    pub fn is_collecting(&self) -> bool {
        matches!(self.state, DecoderState::Collecting)
    }
}

impl Default for TargetDecoder {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse a payload (delimiters excluded) into a coordinate pair.
pub fn parse_payload(payload: &[u8]) -> Result<TargetPair, ProtocolError> {
    let found = payload.split(|&b| b == SEPARATOR).count();
    if found != AXIS_COUNT {
        return Err(ProtocolError::FieldCount { found });
    }

    let mut fields = payload.split(|&b| b == SEPARATOR);
    let mut values = [0.0; AXIS_COUNT];
    for (field, value) in values.iter_mut().enumerate() {
        let raw = fields.next().ok_or(ProtocolError::FieldCount { found })?;
        *value = parse_decimal(raw).ok_or(ProtocolError::InvalidNumber { field })?;
    }
    Ok(TargetPair::new(values[0], values[1]))
}

fn parse_decimal(raw: &[u8]) -> Option<f64> {
    let text = raw.trim_ascii();
    let unsigned = match text.first() {
        Some(b'+' | b'-') => &text[1..],
        _ => text,
    };

    let (int_part, frac_part) = match unsigned.iter().position(|&b| b == b'.') {
        Some(dot) => (&unsigned[..dot], Some(&unsigned[dot + 1..])),
        None => (unsigned, None),
    };

    let all_digits = |s: &[u8]| s.iter().all(u8::is_ascii_digit);
    let valid = match frac_part {
        Some(frac) => !frac.is_empty() && all_digits(frac) && all_digits(int_part),
        None => !int_part.is_empty() && all_digits(int_part),
    };
    if !valid {
        return None;
    }

    // Grammar is a subset of Rust's float syntax, so this cannot fail.
    std::str::from_utf8(text).ok()?.parse().ok()
}

/// Outbound message for a target, e.g. `(1.5,-2.25)\n`.
pub fn encode_target(x: f64, y: f64) -> String {
    format!("({x},{y})\n")
}
