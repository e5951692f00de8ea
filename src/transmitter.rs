//! Transmitter half of the link protocol
//!
//! Connection setup, stop-and-wait delivery of information frames, and the
//! transmitter's side of teardown. Every exchange goes through the
//! retransmission controller in [`crate::ack_manager`].
use std::time::Instant;

use crate::ack_manager::Verdict;
use crate::contracts::{Address, Control, Frame};
use crate::errors::{LinkError, Result};
use crate::session::{Role, Session};
use crate::transport::Transport;

impl<T: Transport> Session<T> {
    /// SET@T, wait for UA@T
    pub(crate) fn connect_transmitter(&mut self) -> Result<()> {
        let set = Frame::supervisory(Address::Transmitter, Control::Set);
        self.exchange(&set, "UA", |r| {
            if r.frame.matches(Address::Transmitter, Control::Ua) {
                Verdict::Qualifying
            } else {
                Verdict::Ignore
            }
        })?;
        Ok(())
    }

    /// Deliver one payload reliably
    ///
    /// Sends it as an information frame tagged with the current sequence
    /// number and blocks until the receiver acknowledges it with the
    /// complementary RR. A matching REJ triggers an immediate retransmission
    /// that counts against the retry budget. Returns the payload length.
    ///
    /// A [`LinkError::LinkTimeout`] or transport error leaves the session
    /// [`Failed`](crate::session::SessionState::Failed): further writes are
    /// refused and the caller must close it.
    pub fn write(&mut self, payload: &[u8]) -> Result<usize> {
        self.require_open("write", Role::Transmitter)?;

        let max = self.config.max_payload();
        if payload.len() > max {
            return Err(LinkError::PayloadTooLarge {
                size: payload.len(),
                max,
            });
        }

        let seq = self.next_tx_seq;
        let frame = Frame::information(seq, payload.to_vec());
        let started = Instant::now();

        let outcome = self.exchange(&frame, "RR", |r| {
            if r.frame.address != Address::Transmitter {
                return Verdict::Ignore;
            }
            match r.frame.control {
                Control::Rr(ack) if ack == seq.flip() => Verdict::Qualifying,
                Control::Rej(nak) if nak == seq => Verdict::Retransmit,
                _ => Verdict::Ignore,
            }
        });
        self.stats.data_time += started.elapsed();
        if let Err(err) = outcome {
            return Err(self.fail(err));
        }

        self.next_tx_seq = seq.flip();
        self.stats.bytes_acknowledged += payload.len() as u64;
        log::debug!("I{seq} acknowledged ({} bytes)", payload.len());
        Ok(payload.len())
    }

    /// DISC@T, wait for DISC@R, then UA@R once
    pub(crate) fn disconnect_transmitter(&mut self) -> Result<()> {
        let disc = Frame::supervisory(Address::Transmitter, Control::Disc);
        self.exchange(&disc, "DISC", |r| {
            if r.frame.matches(Address::Receiver, Control::Disc) {
                Verdict::Qualifying
            } else {
                Verdict::Ignore
            }
        })?;

        // A lost final UA is not retransmitted; the receiver's own bounded
        // wait ends its side.
        self.send_frame(&Frame::supervisory(Address::Receiver, Control::Ua))
    }
}
