//! hdlc_link - reliable framed transport over an unreliable byte line
//!
//! A stop-and-wait ARQ data-link layer in the style of simplified HDLC. It
//! turns a byte-oriented serial channel that may drop or corrupt bytes into
//! an ordered, acknowledged, framed transport.
//!
//! # Layers
//! - [`stuffing`]: byte escaping so payloads may contain any value
//! - [`codec`]: frame encoding and checksums
//! - [`parser`]: byte-at-a-time frame recogniser with resynchronisation
//! - [`ack_manager`]: timeout driven retransmission with a bounded budget
//! - [`session`]: open / write / read / close on top of a [`Transport`]
//!
//! # Example
//! ```no_run
//! use std::fs::OpenOptions;
//! use hdlc_link::{LinkConfig, Role, Session, StreamTransport};
//!
//! # fn main() -> hdlc_link::Result<()> {
//! let device = OpenOptions::new().read(true).write(true).open("/dev/ttyS0")?;
//! let mut link = Session::open(StreamTransport::new(device), LinkConfig::new(Role::Transmitter))?;
//! link.write(b"hello")?;
//! link.close(true)?;
//! # Ok(())
//! # }
//! ```

use std::time::Duration;

pub mod ack_manager;
pub mod codec;
pub mod contracts;
pub mod errors;
pub mod parser;
pub mod receiver;
pub mod session;
pub mod simulator;
pub mod stats;
pub mod stuffing;
pub mod transmitter;
pub mod transport;

pub use contracts::{Address, Control, Frame, Seq};
pub use errors::{FramingError, LinkError, Result};
pub use session::{LinkConfig, Role, Session, SessionState};
pub use stats::Statistics;
pub use transport::{StreamTransport, Transport};

/// Largest payload an information frame carries by default
pub const MAX_PAYLOAD_SIZE: usize = 1000;

/// Retransmissions allowed after the first transmission, by default
pub const DEFAULT_RETRY_BUDGET: u32 = 3;

/// How long to wait for a reply before retransmitting, by default
pub const DEFAULT_ACK_TIMEOUT: Duration = Duration::from_secs(3);
