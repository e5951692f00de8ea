//! Receive-side frame recogniser
//!
//! [`FrameParser`] consumes the line one byte at a time and yields a frame
//! once a complete, header-valid one has been seen. Any unexpected byte
//! throws away the partial frame: the parser falls back to `Start`, or to
//! `FlagRcv` if the offending byte is itself a FLAG, since a new frame may be
//! starting there. The payload checksum is carried through unverified; see
//! [`crate::codec::verify_payload`].
use crate::contracts::{Address, Control, Frame, FLAG};
use crate::errors::FramingError;
use crate::stuffing;

/// Parser automaton state
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParserState {
    /// Hunting for an opening FLAG
    Start,
    /// Opening FLAG seen; runs of FLAG stay here
    FlagRcv,
    /// Address accepted
    ARcv(Address),
    /// Control accepted
    CRcv(Address, Control),
    /// Header checksum matched
    BccOk(Address, Control),
    /// Accumulating the stuffed data field of an information frame
    DataRcv(Address, Control),
}

/// A frame recognised on the line, before payload verification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReceivedFrame {
    /// Decoded frame with its destuffed payload
    pub frame: Frame,

    /// BCC2 as received, for information frames
    pub payload_checksum: Option<u8>,
}

/// Byte-at-a-time frame recogniser
#[derive(Debug)]
pub struct FrameParser {
    state: ParserState,
    buffer: Vec<u8>,
    max_stuffed: usize,
    resyncs: u64,
}

impl FrameParser {
    /// Create a parser accepting payloads of up to `max_payload` bytes
    pub fn new(max_payload: usize) -> Self {
        // Worst case every payload byte and the checksum are escaped.
        let max_stuffed = (max_payload + 1) * 2;
        Self {
            state: ParserState::Start,
            buffer: Vec::new(),
            max_stuffed,
            resyncs: 0,
        }
    }

    /// Current automaton state
    pub fn state(&self) -> &ParserState {
        &self.state
    }

    /// Number of partial frames thrown away so far
    pub fn resync_count(&self) -> u64 {
        self.resyncs
    }

    /// Drop any partial frame and return to `Start`
    pub fn reset(&mut self) {
        self.state = ParserState::Start;
        self.buffer.clear();
    }

    /// Feed one byte from the line
    ///
    /// Returns a frame when `byte` completes one, `None` otherwise.
    pub fn feed(&mut self, byte: u8) -> Option<ReceivedFrame> {
        let state = std::mem::replace(&mut self.state, ParserState::Start);
        match state {
            ParserState::Start => {
                if byte == FLAG {
                    self.state = ParserState::FlagRcv;
                }
                None
            }

            ParserState::FlagRcv => {
                if byte == FLAG {
                    self.state = ParserState::FlagRcv;
                } else if let Some(address) = Address::from_byte(byte) {
                    self.state = ParserState::ARcv(address);
                } else {
                    self.resync(byte, None);
                }
                None
            }

            ParserState::ARcv(address) => {
                match Control::from_byte(byte) {
                    Some(control) => self.state = ParserState::CRcv(address, control),
                    None => self.resync(byte, None),
                }
                None
            }

            ParserState::CRcv(address, control) => {
                if byte == address.as_byte() ^ control.as_byte() {
                    self.state = ParserState::BccOk(address, control);
                } else {
                    self.resync(byte, None);
                }
                None
            }

            ParserState::BccOk(address, control) => {
                if control.is_information() {
                    if byte == FLAG {
                        self.resync(byte, Some(FramingError::EmptyInformationField));
                    } else {
                        self.buffer.clear();
                        self.buffer.push(byte);
                        self.state = ParserState::DataRcv(address, control);
                    }
                    return None;
                }

                if byte == FLAG {
                    return Some(ReceivedFrame {
                        frame: Frame::supervisory(address, control),
                        payload_checksum: None,
                    });
                }
                self.resync(byte, None);
                None
            }

            ParserState::DataRcv(address, control) => {
                if byte == FLAG {
                    return self.finish_information(address, control);
                }
                if self.buffer.len() >= self.max_stuffed {
                    let limit = self.max_stuffed;
                    self.resync(byte, Some(FramingError::Oversized { limit }));
                    return None;
                }
                self.buffer.push(byte);
                self.state = ParserState::DataRcv(address, control);
                None
            }
        }
    }

    fn finish_information(&mut self, address: Address, control: Control) -> Option<ReceivedFrame> {
        let stuffed = std::mem::take(&mut self.buffer);
        let mut data = match stuffing::destuff(&stuffed) {
            Ok(data) => data,
            Err(err) => {
                self.resync(FLAG, Some(err));
                return None;
            }
        };

        let Some(bcc2) = data.pop() else {
            self.resync(FLAG, Some(FramingError::EmptyInformationField));
            return None;
        };

        Some(ReceivedFrame {
            frame: Frame {
                address,
                control,
                payload: data,
            },
            payload_checksum: Some(bcc2),
        })
    }

    fn resync(&mut self, byte: u8, reason: Option<FramingError>) {
        self.resyncs += 1;
        self.buffer.clear();
        self.state = if byte == FLAG {
            ParserState::FlagRcv
        } else {
            ParserState::Start
        };
        match reason {
            Some(err) => log::debug!("parser resync: {err}"),
            None => log::debug!("parser resync on byte {byte:#04x}"),
        }
    }
}

impl Default for FrameParser {
    fn default() -> Self {
        Self::new(crate::MAX_PAYLOAD_SIZE)
    }
}
