//! Link sessions
//!
//! A [`Session`] owns one transport exclusively, together with the sequence
//! counters, the retransmission alarm, the frame parser and the statistics
//! for that connection. Every operation is synchronous and blocking.
//!
//! ```text
//!  Closed ──open──▶ Connecting ──SET/UA──▶ Open ──close──▶ Closing ──DISC/DISC/UA──▶ Closed
//!                                           │                   ▲
//!                                           └─ error ─▶ Failed ─┘
//! ```
//!
//! A failed transfer leaves the session `Failed`: only `close` is accepted.
//!
//! Role-specific halves of the protocol live in [`crate::transmitter`] and
//! [`crate::receiver`].
use std::fmt;
use std::time::{Duration, Instant};

use crate::ack_manager::{self, Alarm, RetryPolicy, Verdict};
use crate::codec;
use crate::contracts::{Frame, Seq};
use crate::errors::{LinkError, Result};
use crate::parser::{FrameParser, ReceivedFrame};
use crate::stats::Statistics;
use crate::transport::Transport;

/// Which end of the link a session drives
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Sends information frames
    Transmitter,
    /// Receives information frames
    Receiver,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transmitter => write!(f, "transmitter"),
            Self::Receiver => write!(f, "receiver"),
        }
    }
}

/// Session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// No connection
    Closed,
    /// Establishment handshake in progress
    Connecting,
    /// Data transfer allowed
    Open,
    /// Teardown handshake in progress
    Closing,
    /// A transfer failed; the session can only be closed
    Failed,
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// Link configuration
///
/// Immutable once the session is open.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LinkConfig {
    role: Role,
    retry_budget: u32,
    ack_timeout: Duration,
    max_payload: usize,
}

impl LinkConfig {
    /// Defaults for `role`
    pub fn new(role: Role) -> Self {
        Self {
            role,
            retry_budget: crate::DEFAULT_RETRY_BUDGET,
            ack_timeout: crate::DEFAULT_ACK_TIMEOUT,
            max_payload: crate::MAX_PAYLOAD_SIZE,
        }
    }

    /// Set how many retransmissions a frame gets after its first send
    pub fn with_retry_budget(mut self, retries: u32) -> Self {
        self.retry_budget = retries;
        self
    }

    /// Set how long to wait for a reply before retransmitting
    pub fn with_ack_timeout(mut self, timeout: Duration) -> Self {
        self.ack_timeout = timeout;
        self
    }

    /// Set the largest payload a single information frame may carry
    pub fn with_max_payload(mut self, max_payload: usize) -> Self {
        self.max_payload = max_payload;
        self
    }

    /// Configured role
    pub fn role(&self) -> Role {
        self.role
    }

    /// Configured retry budget
    pub fn retry_budget(&self) -> u32 {
        self.retry_budget
    }

    /// Configured reply timeout
    pub fn ack_timeout(&self) -> Duration {
        self.ack_timeout
    }

    /// Configured maximum payload
    pub fn max_payload(&self) -> usize {
        self.max_payload
    }

    /// Check the settings a session cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.ack_timeout.is_zero() {
            return Err(LinkError::InvalidConfig {
                reason: "ack timeout must be positive",
            });
        }
        Ok(())
    }

    pub(crate) fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            retry_budget: self.retry_budget,
            ack_timeout: self.ack_timeout,
        }
    }
}

/// One end of an established link
#[derive(Debug)]
pub struct Session<T: Transport> {
    pub(crate) transport: T,
    pub(crate) config: LinkConfig,
    pub(crate) state: SessionState,
    pub(crate) next_tx_seq: Seq,
    pub(crate) expected_rx_seq: Seq,
    pub(crate) parser: FrameParser,
    pub(crate) alarm: Alarm,
    pub(crate) stats: Statistics,
}

impl<T: Transport> Session<T> {
    /// Establish the link over `transport`
    ///
    /// The transmitter sends SET and waits for UA under the retry policy.
    /// The receiver blocks until a SET arrives and answers it with UA.
    /// On failure, including an invalid `config`, the transport is released
    /// before the error is returned.
    pub fn open(transport: T, config: LinkConfig) -> Result<Self> {
        let mut session = Self {
            parser: FrameParser::new(config.max_payload),
            transport,
            config,
            state: SessionState::Connecting,
            next_tx_seq: Seq::Zero,
            expected_rx_seq: Seq::Zero,
            alarm: Alarm::new(),
            stats: Statistics::new(),
        };

        let started = Instant::now();
        let outcome = session.config.validate().and_then(|()| match session.config.role {
            Role::Transmitter => session.connect_transmitter(),
            Role::Receiver => session.accept_receiver(),
        });
        session.stats.control_time += started.elapsed();
        session.sync_parser_stats();

        match outcome {
            Ok(()) => {
                session.state = SessionState::Open;
                log::info!("{} connected", session.config.role);
                Ok(session)
            }
            Err(err) => {
                log::warn!("{} failed to connect: {err}", session.config.role);
                if let Err(close_err) = session.release_transport() {
                    log::debug!("error releasing transport: {close_err}");
                }
                Err(err)
            }
        }
    }

    /// Tear the link down and release the transport
    ///
    /// Closing a closed session is a no-op. The transport is released even
    /// when the handshake fails; the handshake's outcome is still reported.
    /// With `want_statistics` the session's statistics are logged.
    pub fn close(&mut self, want_statistics: bool) -> Result<()> {
        if self.state == SessionState::Closed {
            return Ok(());
        }

        let role = self.config.role;
        self.state = SessionState::Closing;
        self.alarm.disarm();

        let started = Instant::now();
        let outcome = match role {
            Role::Transmitter => self.disconnect_transmitter(),
            Role::Receiver => self.disconnect_receiver(),
        };
        self.stats.control_time += started.elapsed();
        self.sync_parser_stats();

        match &outcome {
            Ok(()) => log::info!("{role} disconnected"),
            Err(err) => log::warn!("{role} disconnect incomplete: {err}"),
        }
        if want_statistics {
            log::info!("{}", self.stats.report(role));
        }

        let released = self.release_transport();
        outcome.and(released)
    }

    /// Role this session plays
    pub fn role(&self) -> Role {
        self.config.role
    }

    /// Current lifecycle state
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Configuration the session was opened with
    pub fn config(&self) -> &LinkConfig {
        &self.config
    }

    /// Sequence number the next information frame will carry
    pub fn next_tx_seq(&self) -> Seq {
        self.next_tx_seq
    }

    /// Sequence number the receiver will deliver next
    pub fn expected_rx_seq(&self) -> Seq {
        self.expected_rx_seq
    }

    /// Statistics so far
    pub fn statistics(&self) -> &Statistics {
        &self.stats
    }

    /// Borrow the underlying transport
    pub fn transport(&self) -> &T {
        &self.transport
    }

    pub(crate) fn require_open(&self, operation: &'static str, role: Role) -> Result<()> {
        if self.config.role != role {
            return Err(LinkError::WrongRole {
                operation,
                role: self.config.role,
            });
        }
        if self.state != SessionState::Open {
            return Err(LinkError::NotOpen { state: self.state });
        }
        Ok(())
    }

    /// Record a transfer failure; only `close` is accepted afterwards
    pub(crate) fn fail(&mut self, err: LinkError) -> LinkError {
        log::warn!("{} transfer failed: {err}", self.config.role);
        self.state = SessionState::Failed;
        self.alarm.disarm();
        err
    }

    /// Write a frame once, without waiting for anything
    pub(crate) fn send_frame(&mut self, frame: &Frame) -> Result<()> {
        self.transport.write_bytes(&codec::encode(frame))?;
        self.stats.frames_sent += 1;
        log::debug!("sent {frame}");
        Ok(())
    }

    /// Send `frame` under the retry policy until `classify` accepts a reply
    pub(crate) fn exchange<F>(
        &mut self,
        frame: &Frame,
        awaiting: &'static str,
        classify: F,
    ) -> Result<ReceivedFrame>
    where
        F: FnMut(&ReceivedFrame) -> Verdict,
    {
        let policy = self.config.retry_policy();
        let result = ack_manager::exchange(
            &mut self.transport,
            &mut self.parser,
            &mut self.alarm,
            &mut self.stats,
            policy,
            frame,
            awaiting,
            classify,
        );
        self.alarm.disarm();
        result
    }

    /// Block until the parser yields a frame, or `deadline` passes
    pub(crate) fn next_frame(&mut self, deadline: Option<Instant>) -> Result<Option<ReceivedFrame>> {
        loop {
            if let Some(byte) = self.transport.read_byte()? {
                if let Some(received) = self.parser.feed(byte) {
                    return Ok(Some(received));
                }
            }
            if deadline.is_some_and(|d| Instant::now() >= d) {
                return Ok(None);
            }
        }
    }

    fn sync_parser_stats(&mut self) {
        self.stats.resyncs = self.parser.resync_count();
    }

    fn release_transport(&mut self) -> Result<()> {
        self.state = SessionState::Closed;
        self.alarm.disarm();
        self.parser.reset();
        self.transport.close().map_err(LinkError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contracts::{Address, Control};
    use crate::simulator::ScriptedTransport;

    fn ua_responder() -> ScriptedTransport {
        let ua = codec::encode(&Frame::supervisory(Address::Transmitter, Control::Ua));
        ScriptedTransport::new(move |index, _| if index == 0 { ua.clone() } else { Vec::new() })
    }

    #[test]
    fn test_config_builder() {
        let config = LinkConfig::new(Role::Receiver)
            .with_retry_budget(5)
            .with_ack_timeout(Duration::from_millis(250))
            .with_max_payload(64);

        assert_eq!(config.role(), Role::Receiver);
        assert_eq!(config.retry_budget(), 5);
        assert_eq!(config.ack_timeout(), Duration::from_millis(250));
        assert_eq!(config.max_payload(), 64);
    }

    #[test]
    fn test_config_defaults() {
        let config = LinkConfig::new(Role::Transmitter);
        assert_eq!(config.retry_budget(), crate::DEFAULT_RETRY_BUDGET);
        assert_eq!(config.ack_timeout(), crate::DEFAULT_ACK_TIMEOUT);
        assert_eq!(config.max_payload(), crate::MAX_PAYLOAD_SIZE);
    }

    #[test]
    fn test_zero_ack_timeout_is_refused() {
        let config = LinkConfig::new(Role::Transmitter).with_ack_timeout(Duration::ZERO);
        assert!(matches!(config.validate(), Err(LinkError::InvalidConfig { .. })));
        let err = Session::open(ua_responder(), config).unwrap_err();
        assert!(matches!(err, LinkError::InvalidConfig { .. }));
    }

    #[test]
    fn test_huge_ack_timeout_does_not_overflow() {
        let config = LinkConfig::new(Role::Transmitter).with_ack_timeout(Duration::from_secs(u64::MAX));
        let session = Session::open(ua_responder(), config).unwrap();
        assert_eq!(session.state(), SessionState::Open);
    }

    #[test]
    fn test_open_failure_releases_transport() {
        let config = LinkConfig::new(Role::Transmitter)
            .with_retry_budget(0)
            .with_ack_timeout(Duration::from_millis(5));
        let err = Session::open(ScriptedTransport::silent(), config).unwrap_err();
        assert!(err.is_timeout());
    }

    #[test]
    fn test_wrong_role_is_refused() {
        let config = LinkConfig::new(Role::Transmitter).with_ack_timeout(Duration::from_millis(5));
        let mut session = Session::open(ua_responder(), config).unwrap();
        assert_eq!(session.state(), SessionState::Open);
        assert!(matches!(
            session.read(),
            Err(LinkError::WrongRole { role: Role::Transmitter, .. })
        ));
    }

    #[test]
    fn test_double_close_is_noop() {
        let config = LinkConfig::new(Role::Transmitter)
            .with_retry_budget(0)
            .with_ack_timeout(Duration::from_millis(5));
        let mut session = Session::open(ua_responder(), config).unwrap();

        // Nobody answers DISC: teardown fails but the transport is released.
        assert!(session.close(false).unwrap_err().is_timeout());
        assert_eq!(session.state(), SessionState::Closed);
        assert!(session.transport().is_closed());

        assert!(session.close(true).is_ok());
        assert!(matches!(
            session.write(b"late"),
            Err(LinkError::NotOpen { state: SessionState::Closed })
        ));
    }
}
