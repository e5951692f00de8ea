//! Core data structures for the link protocol
//!
//! Wire constants, the address and control field vocabularies, and the
//! [`Frame`] value type. Frames are plain values: checksums are derived from
//! the unstuffed fields whenever they are needed, never stored.
use std::fmt;

/// Frame delimiter
pub const FLAG: u8 = 0x7E;

/// Escape byte used by byte stuffing
pub const ESCAPE: u8 = 0x7D;

/// Value XORed into an escaped byte
pub const ESCAPE_OFFSET: u8 = 0x20;

/// Length of every supervisory frame on the wire
pub const SUPERVISORY_FRAME_LEN: usize = 5;

/// Address field
///
/// Identifies which end opened the exchange a frame belongs to, not which
/// end sent the frame: a reply carries the address of the command it
/// answers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Address {
    /// Commands sent by the transmitter and the receiver's replies to them
    Transmitter,
    /// Commands sent by the receiver and the transmitter's replies to them
    Receiver,
}

impl Address {
    /// Wire value of this address
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Transmitter => 0x03,
            Self::Receiver => 0x01,
        }
    }

    /// Parse a wire address byte
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x03 => Some(Self::Transmitter),
            0x01 => Some(Self::Receiver),
            _ => None,
        }
    }
}

/// One-bit alternating sequence number
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Seq {
    /// Sequence number 0
    #[default]
    Zero,
    /// Sequence number 1
    One,
}

impl Seq {
    /// The other sequence number
    pub const fn flip(self) -> Self {
        match self {
            Self::Zero => Self::One,
            Self::One => Self::Zero,
        }
    }

    /// Numeric value (0 or 1)
    pub const fn as_bit(self) -> u8 {
        match self {
            Self::Zero => 0,
            Self::One => 1,
        }
    }
}

impl fmt::Display for Seq {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_bit())
    }
}

/// Control field
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Control {
    /// Connection setup request
    Set,
    /// Unnumbered acknowledgment
    Ua,
    /// Disconnect request
    Disc,
    /// Receiver ready for the tagged sequence number
    Rr(Seq),
    /// Reject, retransmission of the tagged sequence number requested
    Rej(Seq),
    /// Information frame carrying a payload
    Info(Seq),
}

impl Control {
    /// Wire value of this control field
    pub const fn as_byte(self) -> u8 {
        match self {
            Self::Set => 0x03,
            Self::Ua => 0x07,
            Self::Disc => 0x0B,
            Self::Rr(Seq::Zero) => 0xAA,
            Self::Rr(Seq::One) => 0xAB,
            Self::Rej(Seq::Zero) => 0x54,
            Self::Rej(Seq::One) => 0x55,
            Self::Info(Seq::Zero) => 0x00,
            Self::Info(Seq::One) => 0x80,
        }
    }

    /// Parse a wire control byte
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x03 => Some(Self::Set),
            0x07 => Some(Self::Ua),
            0x0B => Some(Self::Disc),
            0xAA => Some(Self::Rr(Seq::Zero)),
            0xAB => Some(Self::Rr(Seq::One)),
            0x54 => Some(Self::Rej(Seq::Zero)),
            0x55 => Some(Self::Rej(Seq::One)),
            0x00 => Some(Self::Info(Seq::Zero)),
            0x80 => Some(Self::Info(Seq::One)),
            _ => None,
        }
    }

    /// True for information frames, which carry a data field
    pub const fn is_information(self) -> bool {
        matches!(self, Self::Info(_))
    }
}

impl fmt::Display for Control {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Set => write!(f, "SET"),
            Self::Ua => write!(f, "UA"),
            Self::Disc => write!(f, "DISC"),
            Self::Rr(seq) => write!(f, "RR{seq}"),
            Self::Rej(seq) => write!(f, "REJ{seq}"),
            Self::Info(seq) => write!(f, "I{seq}"),
        }
    }
}

/// A logical frame
///
/// `payload` is only meaningful for information frames and is always empty
/// for supervisory ones.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    /// Address field
    pub address: Address,

    /// Control field
    pub control: Control,

    /// Unstuffed information field
    pub payload: Vec<u8>,
}

impl Frame {
    /// Create a supervisory (payload-less) frame
    pub fn supervisory(address: Address, control: Control) -> Self {
        debug_assert!(
            !control.is_information(),
            "information control used for a supervisory frame"
        );
        Self {
            address,
            control,
            payload: Vec::new(),
        }
    }

    /// Create an information frame tagged with `seq`
    ///
    /// Information frames always travel on the transmitter's address.
    pub fn information(seq: Seq, payload: Vec<u8>) -> Self {
        Self {
            address: Address::Transmitter,
            control: Control::Info(seq),
            payload,
        }
    }

    /// True if this frame carries a data field
    pub fn is_information(&self) -> bool {
        self.control.is_information()
    }

    /// BCC1: address XOR control
    pub fn header_checksum(&self) -> u8 {
        self.address.as_byte() ^ self.control.as_byte()
    }

    /// BCC2: XOR-fold of the unstuffed payload, for information frames
    pub fn payload_checksum(&self) -> Option<u8> {
        self.is_information()
            .then(|| crate::codec::xor_fold(&self.payload))
    }

    /// True if this frame has exactly this address and control
    pub fn matches(&self, address: Address, control: Control) -> bool {
        self.address == address && self.control == control
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{:#04x}", self.control, self.address.as_byte())?;
        if self.is_information() {
            write!(f, " ({} bytes)", self.payload.len())?;
        }
        Ok(())
    }
}
