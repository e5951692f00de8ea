//! Frame codec
//!
//! Encoding lives here; decoding is the job of [`crate::parser::FrameParser`]
//! followed by [`verify_payload`], so a checksum failure can be told apart
//! from a framing failure.
use crate::contracts::{Frame, FLAG, SUPERVISORY_FRAME_LEN};
use crate::parser::ReceivedFrame;
use crate::stuffing;

/// XOR-fold of `bytes` (BCC2 over an unstuffed payload)
pub fn xor_fold(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0u8, |acc, &b| acc ^ b)
}

/// Wire length of `frame` once encoded
pub fn encoded_len(frame: &Frame) -> usize {
    match frame.payload_checksum() {
        None => SUPERVISORY_FRAME_LEN,
        Some(bcc2) => {
            SUPERVISORY_FRAME_LEN
                + stuffing::stuffed_len(&frame.payload)
                + stuffing::stuffed_len(&[bcc2])
        }
    }
}

/// Serialise `frame` into its stuffed wire representation
///
/// Layout: `FLAG, A, C, BCC1, [stuffed(payload ++ BCC2)], FLAG`. The
/// checksums are computed over unstuffed values first; the payload and its
/// checksum then go through the stuffer as one uniform sequence.
pub fn encode(frame: &Frame) -> Vec<u8> {
    let mut wire = Vec::with_capacity(encoded_len(frame));
    wire.push(FLAG);
    wire.push(frame.address.as_byte());
    wire.push(frame.control.as_byte());
    wire.push(frame.header_checksum());

    if let Some(bcc2) = frame.payload_checksum() {
        stuffing::stuff_into(&frame.payload, &mut wire);
        stuffing::stuff_into(&[bcc2], &mut wire);
    }

    wire.push(FLAG);
    wire
}

/// Compare the received BCC2 against one recomputed over the payload
///
/// Supervisory frames carry no BCC2 and always verify.
pub fn verify_payload(received: &ReceivedFrame) -> bool {
    match received.payload_checksum {
        Some(bcc2) => xor_fold(&received.frame.payload) == bcc2,
        None => true,
    }
}
