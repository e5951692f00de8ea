//! Receiver half of the link protocol
//!
//! Accepting a connection, in-order delivery with duplicate suppression, and
//! the receiver's side of teardown. Replies to the transmitter's commands
//! (UA, RR, REJ) are sent once and never retried: if one is lost, the
//! transmitter's retransmission brings the same command back and it is
//! answered again.
use std::time::Instant;

use crate::ack_manager::Verdict;
use crate::codec;
use crate::contracts::{Address, Control, Frame, Seq};
use crate::errors::{LinkError, Result};
use crate::parser::ReceivedFrame;
use crate::session::{Role, Session};
use crate::transport::Transport;

/// What the receiver does with one information frame
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Disposition {
    /// Payload checksum mismatch: REJ and discard
    Corrupt,
    /// Already delivered: re-acknowledge and discard
    Duplicate(Seq),
    /// Next in order: acknowledge and deliver
    Fresh(Seq),
}

fn classify(received: &ReceivedFrame, expected: Seq) -> Option<Disposition> {
    let Control::Info(seq) = received.frame.control else {
        return None;
    };
    Some(if !codec::verify_payload(received) {
        Disposition::Corrupt
    } else if seq == expected {
        Disposition::Fresh(seq)
    } else {
        Disposition::Duplicate(seq)
    })
}

impl<T: Transport> Session<T> {
    /// Wait for SET@T, answer UA@T
    pub(crate) fn accept_receiver(&mut self) -> Result<()> {
        loop {
            let Some(received) = self.next_frame(None)? else {
                continue;
            };
            if received.frame.matches(Address::Transmitter, Control::Set) {
                self.stats.frames_accepted += 1;
                return self.send_frame(&Frame::supervisory(Address::Transmitter, Control::Ua));
            }
            log::debug!("ignoring {} while awaiting SET", received.frame);
        }
    }

    /// Block until the next in-order payload arrives and return it
    ///
    /// Corrupted frames are answered with REJ, duplicates are acknowledged
    /// again and dropped, and a repeated SET is answered with UA. None of
    /// these are reported to the caller. A transport error leaves the
    /// session [`Failed`](crate::session::SessionState::Failed).
    pub fn read(&mut self) -> Result<Vec<u8>> {
        self.require_open("read", Role::Receiver)?;
        self.next_payload().map_err(|err| self.fail(err))
    }

    fn next_payload(&mut self) -> Result<Vec<u8>> {
        loop {
            let Some(received) = self.next_frame(None)? else {
                continue;
            };

            if received.frame.matches(Address::Transmitter, Control::Set) {
                log::debug!("SET repeated, acknowledging again");
                self.send_frame(&Frame::supervisory(Address::Transmitter, Control::Ua))?;
                continue;
            }

            match classify(&received, self.expected_rx_seq) {
                Some(Disposition::Corrupt) => {
                    self.stats.frames_rejected += 1;
                    let expected = self.expected_rx_seq;
                    log::warn!("payload checksum mismatch on {}, sending REJ{expected}", received.frame);
                    self.send_frame(&Frame::supervisory(Address::Transmitter, Control::Rej(expected)))?;
                }
                Some(Disposition::Duplicate(seq)) => {
                    self.acknowledge_duplicate(seq)?;
                }
                Some(Disposition::Fresh(seq)) => {
                    self.send_frame(&Frame::supervisory(Address::Transmitter, Control::Rr(seq.flip())))?;
                    self.expected_rx_seq = seq.flip();
                    self.stats.frames_accepted += 1;
                    self.stats.bytes_delivered += received.frame.payload.len() as u64;
                    return Ok(received.frame.payload);
                }
                None => log::debug!("ignoring {} while reading", received.frame),
            }
        }
    }

    /// Wait (bounded) for DISC@T, then DISC@R awaiting UA@R
    pub(crate) fn disconnect_receiver(&mut self) -> Result<()> {
        let policy = self.config.retry_policy();
        let attempts = policy.retry_budget.saturating_add(1);
        let deadline = policy
            .ack_timeout
            .checked_mul(attempts)
            .and_then(|wait| Instant::now().checked_add(wait));

        loop {
            let Some(received) = self.next_frame(deadline)? else {
                log::warn!("no DISC from the transmitter, giving up");
                return Err(LinkError::LinkTimeout {
                    attempts,
                    awaiting: "DISC",
                });
            };

            if received.frame.matches(Address::Transmitter, Control::Disc) {
                self.stats.frames_accepted += 1;
                break;
            }
            // The transmitter may still be retrying the last frame whose
            // RR it never saw. A fresh frame cannot be delivered any more, so
            // it stays unacknowledged and the transmitter's write times out.
            match classify(&received, self.expected_rx_seq) {
                Some(Disposition::Duplicate(seq)) => self.acknowledge_duplicate(seq)?,
                Some(Disposition::Fresh(seq)) => {
                    log::warn!("I{seq} arrived after close began, not acknowledging");
                }
                _ => log::debug!("ignoring {} while awaiting DISC", received.frame),
            }
        }

        let disc = Frame::supervisory(Address::Receiver, Control::Disc);
        self.exchange(&disc, "UA", |r| {
            if r.frame.matches(Address::Receiver, Control::Ua) {
                Verdict::Qualifying
            } else {
                Verdict::Ignore
            }
        })?;
        Ok(())
    }

    fn acknowledge_duplicate(&mut self, seq: Seq) -> Result<()> {
        self.stats.duplicates += 1;
        log::debug!("duplicate I{seq}, acknowledging again");
        self.send_frame(&Frame::supervisory(Address::Transmitter, Control::Rr(seq.flip())))
    }
}
