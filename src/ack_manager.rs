//! Retransmission controller
//!
//! Wraps "send a frame, wait for a qualifying reply". The frame goes out, a
//! single-shot deadline is armed, and the line is polled one byte at a time.
//! Each recognised frame is classified by the caller. When the deadline
//! elapses (or the peer sends REJ, which counts as an early expiry) the
//! identical wire bytes are written again, until the retry budget runs out.
//!
//! The deadline is polled between byte reads; nothing preempts a read.
use std::time::{Duration, Instant};

use crate::contracts::Frame;
use crate::errors::{LinkError, Result};
use crate::parser::{FrameParser, ReceivedFrame};
use crate::stats::Statistics;
use crate::transport::Transport;

/// Caller's classification of a frame received while waiting
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The reply being waited for
    Qualifying,
    /// Anything else; keep waiting
    Ignore,
    /// Peer asked for a retransmission right away
    Retransmit,
}

/// Retry configuration for one exchange
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retransmissions allowed after the first transmission
    pub retry_budget: u32,
    /// How long to wait for a reply before retransmitting
    pub ack_timeout: Duration,
}

/// Cancellable single-shot deadline
///
/// At most one deadline is armed at a time; arming an armed timer is a bug
/// in the caller. A timeout too large to represent as an [`Instant`] arms a
/// deadline that never fires.
#[derive(Debug, Default)]
pub struct Alarm {
    armed: bool,
    deadline: Option<Instant>,
}

impl Alarm {
    /// Create a disarmed alarm
    pub fn new() -> Self {
        Self {
            armed: false,
            deadline: None,
        }
    }

    /// Arm for `timeout` from now
    pub fn arm(&mut self, timeout: Duration) {
        debug_assert!(!self.armed, "alarm armed while already armed");
        self.armed = true;
        self.deadline = Instant::now().checked_add(timeout);
    }

    /// Cancel a pending deadline
    pub fn disarm(&mut self) {
        self.armed = false;
        self.deadline = None;
    }

    /// True while a deadline is pending
    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Check the deadline; an elapsed deadline fires once and disarms
    pub fn fired(&mut self) -> bool {
        match self.deadline {
            Some(deadline) if self.armed && Instant::now() >= deadline => {
                self.disarm();
                true
            }
            _ => false,
        }
    }
}

/// Retransmission state for one outstanding frame
#[derive(Debug)]
pub struct RetransmissionState {
    /// Transmissions so far (1 after the first send)
    pub attempt: u32,

    /// Time of the first transmission
    pub first_sent: Instant,

    /// Time of the most recent transmission
    pub last_sent: Instant,
}

impl RetransmissionState {
    /// State right after the first transmission
    pub fn new() -> Self {
        let now = Instant::now();
        Self {
            attempt: 1,
            first_sent: now,
            last_sent: now,
        }
    }

    /// True once every allowed retransmission has been used
    pub fn is_exhausted(&self, retry_budget: u32) -> bool {
        self.attempt > retry_budget
    }

    /// Record a retransmission
    pub fn record_retransmit(&mut self) {
        self.attempt += 1;
        self.last_sent = Instant::now();
    }
}

impl Default for RetransmissionState {
    fn default() -> Self {
        Self::new()
    }
}

/// Transmit `frame` and wait for a reply that `classify` accepts
///
/// Exactly `retry_budget + 1` transmissions happen before giving up with
/// [`LinkError::LinkTimeout`]. Transport errors propagate immediately.
/// `awaiting` names the expected reply in logs and errors.
#[allow(clippy::too_many_arguments)]
pub fn exchange<T, F>(
    transport: &mut T,
    parser: &mut FrameParser,
    alarm: &mut Alarm,
    stats: &mut Statistics,
    policy: RetryPolicy,
    frame: &Frame,
    awaiting: &'static str,
    mut classify: F,
) -> Result<ReceivedFrame>
where
    T: Transport + ?Sized,
    F: FnMut(&ReceivedFrame) -> Verdict,
{
    let wire = crate::codec::encode(frame);
    transport.write_bytes(&wire)?;
    stats.frames_sent += 1;
    log::debug!("sent {frame}, awaiting {awaiting}");

    let mut state = RetransmissionState::new();
    alarm.arm(policy.ack_timeout);

    loop {
        let mut expired = false;

        if let Some(byte) = transport.read_byte()? {
            if let Some(received) = parser.feed(byte) {
                match classify(&received) {
                    Verdict::Qualifying => {
                        alarm.disarm();
                        stats.frames_accepted += 1;
                        log::debug!(
                            "received {} after {} transmission(s)",
                            received.frame,
                            state.attempt
                        );
                        return Ok(received);
                    }
                    Verdict::Ignore => {
                        log::debug!("ignoring {} while awaiting {awaiting}", received.frame);
                    }
                    Verdict::Retransmit => {
                        log::warn!("peer rejected {frame}, retransmitting");
                        stats.frames_rejected += 1;
                        alarm.disarm();
                        expired = true;
                    }
                }
            }
        }

        if !expired && alarm.fired() {
            stats.timeouts += 1;
            expired = true;
        }

        if expired {
            if state.is_exhausted(policy.retry_budget) {
                log::warn!(
                    "no {awaiting} after {} transmission(s), giving up",
                    state.attempt
                );
                return Err(LinkError::LinkTimeout {
                    attempts: state.attempt,
                    awaiting,
                });
            }

            transport.write_bytes(&wire)?;
            state.record_retransmit();
            stats.frames_sent += 1;
            stats.retransmissions += 1;
            log::warn!(
                "retransmitting {frame} (attempt {}/{})",
                state.attempt,
                policy.retry_budget.saturating_add(1)
            );
            alarm.arm(policy.ack_timeout);
        }
    }
}
