//! HDLC-style byte-stuffed frame extraction (C2).
//!
//! Consumes one byte at a time and reassembles `7E 07 ... 7E 08` delimited,
//! CRC-16-CCITT-validated frames. Grounded on `parser.py::_accumulate` /
//! `_decode_frame`, restructured as an explicit state enum in the idiom of
//! `ThomasHabets-rustradio/src/hdlc_deframer.rs`.

use crate::crc::crc16_ccitt;
use crate::types::{FrameType, LinkAddress};
use serde::Serialize;

const MAX_FRAME_SIZE: usize = 256;

/// Maps an in-frame escape byte to its unescaped value.
fn unescape(byte: u8) -> Option<u8> {
    match byte {
        0x00 => Some(0x7E),
        0x01 => Some(0x24),
        0x02 => Some(0x23),
        0x03 => Some(0x25),
        0x04 => Some(0xA4),
        0x05 => Some(0xA3),
        0x06 => Some(0xA5),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Noise,
    StartOfFrame,
    Frame,
    FrameEscape,
    Giant,
    GiantEscape,
}

/// A validated, decoded link-layer frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub address: LinkAddress,
    pub frame_type_raw: u16,
    pub payload: Vec<u8>,
}

impl Frame {
    pub fn frame_type(&self) -> FrameType {
        FrameType::from_u16(self.frame_type_raw)
    }
}

/// Frame-extraction statistics, exposed via [`crate::parser::Parser::counters`].
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct FrameCounters {
    pub frames_received: u64,
    pub crc_errors: u64,
    pub runts: u64,
    pub giants: u64,
    pub noise_bytes: u64,
}

/// Byte-at-a-time frame reassembly state machine.
pub struct FrameExtractor {
    state: State,
    buffer: Vec<u8>,
    counters: FrameCounters,
}

impl Default for FrameExtractor {
    fn default() -> Self {
        FrameExtractor {
            state: State::Idle,
            buffer: Vec::with_capacity(MAX_FRAME_SIZE),
            counters: FrameCounters::default(),
        }
    }
}

impl FrameExtractor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn counters(&self) -> FrameCounters {
        self.counters
    }

    /// Clears in-progress frame accumulation; counters are left untouched.
    pub fn reset(&mut self) {
        self.state = State::Idle;
        self.buffer.clear();
    }

    /// Feeds one byte; returns a decoded [`Frame`] when a complete,
    /// CRC-valid frame closes on this byte.
    pub fn push_byte(&mut self, byte: u8) -> Option<Frame> {
        let old_state = self.state;

        let next_state = match self.state {
            State::Idle | State::Noise => match byte {
                0x00 | 0xFF => State::Idle,
                0x7E => State::StartOfFrame,
                _ => State::Noise,
            },
            State::StartOfFrame => {
                if byte == 0x07 {
                    self.buffer.clear();
                    State::Frame
                } else {
                    State::Noise
                }
            }
            State::Frame => {
                if byte == 0x7E {
                    State::FrameEscape
                } else if self.buffer.len() < MAX_FRAME_SIZE {
                    self.buffer.push(byte);
                    State::Frame
                } else {
                    State::Giant
                }
            }
            State::FrameEscape => {
                if byte == 0x08 {
                    let frame = Self::decode_frame(&self.buffer, &mut self.counters);
                    self.buffer.clear();
                    self.state = State::Idle;
                    return frame;
                } else if byte == 0x07 {
                    self.buffer.clear();
                    State::Frame
                } else if let Some(unescaped) = unescape(byte) {
                    if self.buffer.len() < MAX_FRAME_SIZE {
                        self.buffer.push(unescaped);
                        State::Frame
                    } else {
                        self.buffer.clear();
                        State::Giant
                    }
                } else {
                    self.buffer.clear();
                    State::Noise
                }
            }
            State::Giant => {
                if byte == 0x7E {
                    State::GiantEscape
                } else {
                    State::Giant
                }
            }
            State::GiantEscape => match byte {
                0x07 => {
                    self.buffer.clear();
                    State::Frame
                }
                0x08 => State::Idle,
                _ => State::Giant,
            },
        };

        if next_state == State::Noise && old_state != State::Noise {
            self.counters.noise_bytes += 1;
        }
        if next_state == State::Giant && !matches!(old_state, State::Giant | State::GiantEscape) {
            self.buffer.clear();
            self.counters.giants += 1;
        }

        self.state = next_state;
        None
    }

    fn decode_frame(buffer: &[u8], counters: &mut FrameCounters) -> Option<Frame> {
        if buffer.len() < 6 {
            counters.runts += 1;
            return None;
        }
        let body = &buffer[..buffer.len() - 2];
        let expected_crc = u16::from_le_bytes([buffer[buffer.len() - 2], buffer[buffer.len() - 1]]);
        if crc16_ccitt(body) != expected_crc {
            counters.crc_errors += 1;
            return None;
        }
        counters.frames_received += 1;
        let address = LinkAddress::from_u16(u16::from_be_bytes([buffer[0], buffer[1]]));
        let frame_type_raw = u16::from_be_bytes([buffer[2], buffer[3]]);
        let payload = buffer[4..buffer.len() - 2].to_vec();
        Some(Frame { address, frame_type_raw, payload })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Direction;

    fn feed(bytes: &[u8]) -> Vec<Frame> {
        let mut extractor = FrameExtractor::new();
        bytes.iter().filter_map(|&b| extractor.push_byte(b)).collect()
    }

    #[test]
    fn crc_of_empty_buffer_is_0x8408() {
        assert_eq!(crc16_ccitt(&[]), 0x8408);
    }

    #[test]
    fn well_formed_frame_is_extracted() {
        let body = [0x12u8, 0x01, 0x0B, 0x00, 0x01];
        let crc = crc16_ccitt(&body);
        let mut stream = vec![0x7E, 0x07];
        stream.extend_from_slice(&body);
        stream.extend_from_slice(&crc.to_le_bytes());
        stream.extend_from_slice(&[0x7E, 0x08]);

        let frames = feed(&stream);
        assert_eq!(frames.len(), 1);
        let frame = &frames[0];
        assert_eq!(frame.address.gateway_id, 0x1201);
        assert_eq!(frame.address.direction, Direction::HostToGateway);
        assert_eq!(frame.frame_type_raw, 0x0B00);
        assert_eq!(frame.payload, vec![0x01]);
    }

    #[test]
    fn bad_crc_is_dropped_and_counted() {
        let body = [0x12u8, 0x01, 0x0B, 0x00, 0x01];
        let mut stream = vec![0x7E, 0x07];
        stream.extend_from_slice(&body);
        stream.extend_from_slice(&[0xFF, 0xFF]);
        stream.extend_from_slice(&[0x7E, 0x08]);

        let mut extractor = FrameExtractor::new();
        let frames: Vec<Frame> = stream.iter().filter_map(|&b| extractor.push_byte(b)).collect();
        assert!(frames.is_empty());
        assert_eq!(extractor.counters().crc_errors, 1);
    }

    #[test]
    fn restart_mid_frame_discards_partial() {
        let body = [0xAAu8, 0xBB, 0xCC, 0xDD, 0x01];
        let crc = crc16_ccitt(&body);
        let mut stream = vec![0x7E, 0x07, 0x11, 0x22, 0x7E, 0x07];
        stream.extend_from_slice(&body);
        stream.extend_from_slice(&crc.to_le_bytes());
        stream.extend_from_slice(&[0x7E, 0x08]);

        let frames = feed(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, vec![0x01]);
    }

    #[test]
    fn escape_table_round_trips() {
        let body = [0x7Eu8, 0x24, 0x23, 0x25, 0xA4, 0xA3, 0xA5];
        let crc = crc16_ccitt(&body);
        let mut stream = vec![0x7E, 0x07];
        for &b in &body {
            match b {
                0x7E => stream.extend_from_slice(&[0x7E, 0x00]),
                0x24 => stream.extend_from_slice(&[0x7E, 0x01]),
                0x23 => stream.extend_from_slice(&[0x7E, 0x02]),
                0x25 => stream.extend_from_slice(&[0x7E, 0x03]),
                0xA4 => stream.extend_from_slice(&[0x7E, 0x04]),
                0xA3 => stream.extend_from_slice(&[0x7E, 0x05]),
                0xA5 => stream.extend_from_slice(&[0x7E, 0x06]),
                other => stream.push(other),
            }
        }
        stream.extend_from_slice(&crc.to_le_bytes());
        stream.extend_from_slice(&[0x7E, 0x08]);

        let frames = feed(&stream);
        assert_eq!(frames.len(), 1);
        assert_eq!(frames[0].payload, body.to_vec());
    }

    #[test]
    fn runt_frame_is_dropped_and_counted() {
        let mut extractor = FrameExtractor::new();
        let stream = [0x7E, 0x07, 0x01, 0x02, 0x7E, 0x08];
        for &b in &stream {
            extractor.push_byte(b);
        }
        assert_eq!(extractor.counters().runts, 1);
    }

    #[test]
    fn split_feed_matches_single_feed() {
        let body = [0x12u8, 0x01, 0x0B, 0x00, 0x01];
        let crc = crc16_ccitt(&body);
        let mut stream = vec![0x7E, 0x07];
        stream.extend_from_slice(&body);
        stream.extend_from_slice(&crc.to_le_bytes());
        stream.extend_from_slice(&[0x7E, 0x08]);

        let whole = feed(&stream);

        let mut extractor = FrameExtractor::new();
        let mut split = Vec::new();
        for chunk in stream.chunks(3) {
            for &b in chunk {
                if let Some(f) = extractor.push_byte(b) {
                    split.push(f);
                }
            }
        }
        assert_eq!(whole, split);
    }
}
