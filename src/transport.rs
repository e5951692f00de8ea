//! Byte transport abstraction
//!
//! The link layer only needs two primitives from the physical line: read
//! one byte without blocking indefinitely, and write a whole frame. All
//! protocol logic lives elsewhere; this module owns only byte I/O.
use std::io::{self, ErrorKind, Read, Write};

/// An ordered, byte-oriented channel
///
/// Implementations must never reorder or coalesce bytes. A session is the
/// only reader and the only writer of its transport.
pub trait Transport {
    /// Read one byte if one is available
    ///
    /// `Ok(None)` means "nothing yet"; the caller polls its retransmission
    /// deadline and tries again.
    fn read_byte(&mut self) -> io::Result<Option<u8>>;

    /// Write all of `bytes`, or fail
    ///
    /// A short write is an error, never a partial count.
    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Release the underlying channel
    fn close(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<T: Transport + ?Sized> Transport for Box<T> {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        (**self).read_byte()
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        (**self).write_bytes(bytes)
    }

    fn close(&mut self) -> io::Result<()> {
        (**self).close()
    }
}

/// Adapts any `Read + Write` stream to [`Transport`]
///
/// Works with a serial device file opened with a read timeout, a TCP
/// stream with `set_read_timeout`, or a pipe. Zero-length reads, timeouts
/// and would-block errors all count as "no byte available".
#[derive(Debug)]
pub struct StreamTransport<S> {
    inner: Option<S>,
}

impl<S: Read + Write> StreamTransport<S> {
    /// Wrap `inner`
    pub fn new(inner: S) -> Self {
        Self { inner: Some(inner) }
    }

    /// Borrow the wrapped stream, if it has not been closed
    pub fn get_ref(&self) -> Option<&S> {
        self.inner.as_ref()
    }

    fn stream(&mut self) -> io::Result<&mut S> {
        self.inner
            .as_mut()
            .ok_or_else(|| io::Error::new(ErrorKind::NotConnected, "transport already closed"))
    }
}

impl<S: Read + Write> Transport for StreamTransport<S> {
    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut byte = [0u8; 1];
        match self.stream()?.read(&mut byte) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(byte[0])),
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::WouldBlock | ErrorKind::TimedOut | ErrorKind::Interrupted
                ) =>
            {
                Ok(None)
            }
            Err(e) => Err(e),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stream = self.stream()?;
        stream.write_all(bytes)?;
        stream.flush()
    }

    fn close(&mut self) -> io::Result<()> {
        match self.inner.take() {
            Some(mut stream) => stream.flush(),
            None => Ok(()),
        }
    }
}
