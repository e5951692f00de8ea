//! Link statistics
//!
//! Counters and timings collected while a session runs. The engine only ever
//! writes to them; reading them is for reporting.
use std::fmt;
use std::time::{Duration, Instant};

use crate::session::Role;

/// Accumulated per-session statistics
#[derive(Debug, Clone)]
pub struct Statistics {
    /// Frames written to the line, retransmissions included
    pub frames_sent: u64,

    /// Frames written again after a timeout or REJ
    pub retransmissions: u64,

    /// Deadlines that elapsed without a qualifying reply
    pub timeouts: u64,

    /// Frames accepted from the line (control and new information frames)
    pub frames_accepted: u64,

    /// Information frames refused because of a payload checksum mismatch,
    /// plus REJ replies received by the transmitter
    pub frames_rejected: u64,

    /// Duplicate information frames re-acknowledged and discarded
    pub duplicates: u64,

    /// Partial frames thrown away by the parser
    pub resyncs: u64,

    /// Unstuffed payload bytes handed to the application
    pub bytes_delivered: u64,

    /// Unstuffed payload bytes acknowledged by the peer
    pub bytes_acknowledged: u64,

    /// Time spent in control exchanges (SET/UA, DISC/DISC/UA)
    pub control_time: Duration,

    /// Time spent getting information frames acknowledged
    pub data_time: Duration,

    started: Instant,
}

impl Statistics {
    /// Start a fresh accumulator now
    pub fn new() -> Self {
        Self {
            frames_sent: 0,
            retransmissions: 0,
            timeouts: 0,
            frames_accepted: 0,
            frames_rejected: 0,
            duplicates: 0,
            resyncs: 0,
            bytes_delivered: 0,
            bytes_acknowledged: 0,
            control_time: Duration::ZERO,
            data_time: Duration::ZERO,
            started: Instant::now(),
        }
    }

    /// Time since the session was opened
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Average payload bytes per accepted frame
    pub fn average_frame_size(&self, role: Role) -> u64 {
        let bytes = match role {
            Role::Transmitter => self.bytes_acknowledged,
            Role::Receiver => self.bytes_delivered,
        };
        bytes.checked_div(self.frames_accepted).unwrap_or(0)
    }

    /// Build a human-readable report for `role`
    pub fn report(&self, role: Role) -> StatisticsReport<'_> {
        StatisticsReport { stats: self, role }
    }
}

impl Default for Statistics {
    fn default() -> Self {
        Self::new()
    }
}

/// Display adapter produced by [`Statistics::report`]
pub struct StatisticsReport<'a> {
    stats: &'a Statistics,
    role: Role,
}

impl fmt::Display for StatisticsReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.stats;
        writeln!(f, "link-layer statistics ({})", self.role)?;
        writeln!(f, "  frames:")?;
        match self.role {
            Role::Receiver => {
                writeln!(f, "    unstuffed bytes received: {}", s.bytes_delivered)?
            }
            Role::Transmitter => {
                writeln!(f, "    unstuffed bytes sent: {}", s.bytes_acknowledged)?
            }
        }
        writeln!(f, "    frames sent: {}", s.frames_sent)?;
        writeln!(f, "    accepted frames: {}", s.frames_accepted)?;
        writeln!(f, "    error frames: {}", s.frames_rejected)?;
        writeln!(f, "    duplicate frames: {}", s.duplicates)?;
        writeln!(f, "    retransmissions: {} ({} timeouts)", s.retransmissions, s.timeouts)?;
        writeln!(f, "    parser resyncs: {}", s.resyncs)?;
        writeln!(f, "    average frame size: {}", s.average_frame_size(self.role))?;
        writeln!(f, "  efficiency:")?;

        let elapsed = s.elapsed().as_secs_f64();
        match self.role {
            Role::Receiver => {
                let rate = if elapsed > 0.0 {
                    s.bytes_delivered as f64 * 8.0 / elapsed
                } else {
                    0.0
                };
                writeln!(f, "    reception rate: {rate:.2} bit/s")?;
                write!(f, "    overall time: {elapsed:.3} s")
            }
            Role::Transmitter => {
                let busy = (s.control_time + s.data_time).as_secs_f64();
                let per_frame = if s.frames_accepted > 0 {
                    busy / s.frames_accepted as f64
                } else {
                    0.0
                };
                writeln!(f, "    control frame time: {:.3} s", s.control_time.as_secs_f64())?;
                writeln!(f, "    data frame time: {:.3} s", s.data_time.as_secs_f64())?;
                write!(f, "    average time per frame: {per_frame:.3} s")
            }
        }
    }
}
