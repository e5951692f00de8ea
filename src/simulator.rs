//! Simulated serial lines for testing
//!
//! Real lines drop and corrupt bytes. To exercise retransmission, duplicate
//! suppression and resynchronisation without hardware, this module offers:
//!
//! | Type                  | Use                                              |
//! |-----------------------|--------------------------------------------------|
//! | [`duplex`]            | two connected endpoints for a threaded peer pair |
//! | [`FaultPlan`]         | per-endpoint loss / corruption of outgoing writes |
//! | [`ScriptedTransport`] | single-threaded peer driven by a closure         |
//!
//! Faults apply per write call, and the session writes exactly one frame per
//! call, so "drop the 2nd write" means "lose the 2nd frame this end sends".
//! Random faults come from a seeded RNG so failures are reproducible.
use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::transport::Transport;

/// How long an idle read waits before reporting "no byte"
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Fault-injection model for one direction of a simulated line
///
/// Probabilities are in `[0.0, 1.0]`. The default plan is a clean line.
#[derive(Debug, Clone, Default)]
pub struct FaultPlan {
    /// Zero-based indices of writes that are silently lost
    pub drop_writes: HashSet<usize>,
    /// Zero-based indices of writes that get one bit flipped
    pub corrupt_writes: HashSet<usize>,
    /// Probability that any write is lost
    pub loss_rate: f64,
    /// Probability that any write gets one bit flipped
    pub corruption_rate: f64,
    /// RNG seed for the random faults
    pub seed: u64,
}

impl FaultPlan {
    /// A line that delivers everything
    pub fn clean() -> Self {
        Self::default()
    }

    /// Lose the writes at these indices
    pub fn dropping(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            drop_writes: indices.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Flip one bit in the writes at these indices
    pub fn corrupting(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            corrupt_writes: indices.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Set the random loss probability
    pub fn with_loss_rate(mut self, rate: f64) -> Self {
        self.loss_rate = rate;
        self
    }

    /// Set the random corruption probability
    pub fn with_corruption_rate(mut self, rate: f64) -> Self {
        self.corruption_rate = rate;
        self
    }

    /// Set the RNG seed
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// Shared record of every write an endpoint attempted, faults or not
#[derive(Debug, Clone, Default)]
pub struct WireTap {
    writes: Arc<Mutex<Vec<Vec<u8>>>>,
}

impl WireTap {
    fn record(&self, bytes: &[u8]) {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(bytes.to_vec());
    }

    /// Copy of every write so far, in order
    pub fn writes(&self) -> Vec<Vec<u8>> {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Number of writes so far
    pub fn count(&self) -> usize {
        self.writes.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    /// Number of writes byte-identical to `wire`
    pub fn count_of(&self, wire: &[u8]) -> usize {
        self.writes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|w| w.as_slice() == wire)
            .count()
    }
}

/// One end of an in-memory serial line
#[derive(Debug)]
pub struct ChannelTransport {
    tx: Sender<u8>,
    rx: Receiver<u8>,
    plan: FaultPlan,
    rng: StdRng,
    writes: usize,
    poll: Duration,
    tap: WireTap,
}

impl ChannelTransport {
    /// Handle on this endpoint's outgoing write log
    pub fn tap(&self) -> WireTap {
        self.tap.clone()
    }

    /// Change how long an idle read waits
    pub fn with_poll_interval(mut self, poll: Duration) -> Self {
        self.poll = poll;
        self
    }

    fn apply_faults(&mut self, index: usize, bytes: &[u8]) -> Option<Vec<u8>> {
        if self.plan.drop_writes.contains(&index)
            || (self.plan.loss_rate > 0.0 && self.rng.gen_bool(self.plan.loss_rate))
        {
            log::debug!("simulator: dropping write #{index} ({} bytes)", bytes.len());
            return None;
        }

        let mut out = bytes.to_vec();
        let corrupt = self.plan.corrupt_writes.contains(&index)
            || (self.plan.corruption_rate > 0.0 && self.rng.gen_bool(self.plan.corruption_rate));
        if corrupt && out.len() > 2 {
            // Never touch the delimiters, so the damage lands inside a frame.
            let at = self.rng.gen_range(1..out.len() - 1);
            let bit: u32 = self.rng.gen_range(0..8);
            out[at] ^= 1u8 << bit;
            log::debug!("simulator: corrupting write #{index} at offset {at}");
        }
        Some(out)
    }
}

impl Transport for ChannelTransport {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        match self.rx.recv_timeout(self.poll) {
            Ok(byte) => Ok(Some(byte)),
            Err(RecvTimeoutError::Timeout) => Ok(None),
            Err(RecvTimeoutError::Disconnected) => {
                // Peer hung up: behave like a silent line.
                std::thread::sleep(self.poll);
                Ok(None)
            }
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        let index = self.writes;
        self.writes += 1;
        self.tap.record(bytes);

        if let Some(out) = self.apply_faults(index, bytes) {
            for byte in out {
                // Nobody listening is not an error on a serial line.
                if self.tx.send(byte).is_err() {
                    break;
                }
            }
        }
        Ok(())
    }
}

/// Create two connected endpoints
///
/// `plan_a` applies to bytes written by the first endpoint, `plan_b` to
/// bytes written by the second.
pub fn duplex(plan_a: FaultPlan, plan_b: FaultPlan) -> (ChannelTransport, ChannelTransport) {
    let (a_tx, b_rx) = mpsc::channel();
    let (b_tx, a_rx) = mpsc::channel();

    let a = ChannelTransport {
        tx: a_tx,
        rx: a_rx,
        rng: StdRng::seed_from_u64(plan_a.seed),
        plan: plan_a,
        writes: 0,
        poll: DEFAULT_POLL_INTERVAL,
        tap: WireTap::default(),
    };
    let b = ChannelTransport {
        tx: b_tx,
        rx: b_rx,
        rng: StdRng::seed_from_u64(plan_b.seed),
        plan: plan_b,
        writes: 0,
        poll: DEFAULT_POLL_INTERVAL,
        tap: WireTap::default(),
    };
    (a, b)
}

/// Responder invoked for every write: `(write_index, bytes) -> reply bytes`
pub type Responder = Box<dyn FnMut(usize, &[u8]) -> Vec<u8> + Send>;

/// A single-threaded scripted peer
///
/// Every write is recorded and handed to the responder; whatever it returns
/// is queued for reading. Reads return `None` once the queue is empty.
pub struct ScriptedTransport {
    inbound: VecDeque<u8>,
    written: Vec<Vec<u8>>,
    responder: Responder,
    closed: bool,
}

impl ScriptedTransport {
    /// Create a transport answering writes with `responder`
    pub fn new(responder: impl FnMut(usize, &[u8]) -> Vec<u8> + Send + 'static) -> Self {
        Self {
            inbound: VecDeque::new(),
            written: Vec::new(),
            responder: Box::new(responder),
            closed: false,
        }
    }

    /// A peer that never answers
    pub fn silent() -> Self {
        Self::new(|_, _| Vec::new())
    }

    /// Queue bytes for reading before anything is written
    pub fn with_inbound(mut self, bytes: &[u8]) -> Self {
        self.inbound.extend(bytes);
        self
    }

    /// Queue more bytes for reading
    pub fn push_inbound(&mut self, bytes: &[u8]) {
        self.inbound.extend(bytes);
    }

    /// Every write so far, in order
    pub fn written(&self) -> &[Vec<u8>] {
        &self.written
    }

    /// True once [`Transport::close`] has been called
    pub fn is_closed(&self) -> bool {
        self.closed
    }
}

impl std::fmt::Debug for ScriptedTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedTransport")
            .field("inbound", &self.inbound.len())
            .field("written", &self.written.len())
            .field("closed", &self.closed)
            .finish()
    }
}

impl Transport for ScriptedTransport {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        Ok(self.inbound.pop_front())
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        let index = self.written.len();
        self.written.push(bytes.to_vec());
        let reply = (self.responder)(index, bytes);
        self.inbound.extend(reply);
        Ok(())
    }

    fn close(&mut self) -> io::Result<()> {
        self.closed = true;
        Ok(())
    }
}
