//! Line ports
//!
//! A `LineSource` hands out the telemetry link one text line at a time.
//! Two implementations are provided:
//! - `serial::Port`, the real radio/serial link, polled through `mio`
//!   so that a read gives up after a timeout instead of hanging forever.
//! - `StreamPort`, wrapping anything implementing `io::Read`. This is used
//!   for captured telemetry files, stdin, and in-memory buffers.
//!
//! `open()` picks the right one from a url.

mod linebuf;
pub mod serial;

pub use linebuf::LINEBUF_SIZE;

use linebuf::LineBuf;
use std::fs::File;
use std::io;
use std::time::Duration;
use thiserror::Error;

/// Possible errors when reading a line from a port.
#[derive(Error, Debug)]
pub enum LinkError {
    /// No complete line arrived before the read timeout.
    #[error("no complete line available yet")]
    NotReady,
    /// The other end of the link is gone.
    #[error("link disconnected")]
    Disconnected,
    /// The line was not valid UTF-8. The line is consumed.
    #[error("line is not valid UTF-8: {0}")]
    Decode(#[from] std::str::Utf8Error),
    /// A line did not fit in the receive buffer and was dropped.
    #[error("line longer than {0} bytes dropped")]
    LineTooLong(usize),
    /// Low level IO error.
    #[error("link I/O error: {0}")]
    IO(#[from] io::Error),
}

impl LinkError {
    /// Whether the link cannot recover from this error. Everything else
    /// is worth logging and reading on.
    pub fn is_permanent(&self) -> bool {
        match self {
            LinkError::Disconnected => true,
            LinkError::IO(e) => matches!(
                e.kind(),
                io::ErrorKind::NotFound
                    | io::ErrorKind::NotConnected
                    | io::ErrorKind::BrokenPipe
                    | io::ErrorKind::PermissionDenied
                    | io::ErrorKind::UnexpectedEof
            ),
            _ => false,
        }
    }
}

/// Source of decoded text lines.
pub trait LineSource {
    /// Returns the next line with its trailing whitespace and newline
    /// removed. Blocks until a line is available, or until the port's read
    /// timeout elapses, in which case `LinkError::NotReady` is returned.
    fn next_line(&mut self) -> Result<String, LinkError>;
}

impl<T: LineSource + ?Sized> LineSource for Box<T> {
    fn next_line(&mut self) -> Result<String, LinkError> {
        (**self).next_line()
    }
}

/// Port reading lines from any byte stream.
///
/// End of stream is reported as `Disconnected`, after any final
/// unterminated line has been returned.
pub struct StreamPort<R: io::Read> {
    reader: R,
    rxbuf: LineBuf,
}

impl<R: io::Read> StreamPort<R> {
    pub fn new(reader: R) -> StreamPort<R> {
        StreamPort {
            reader,
            rxbuf: LineBuf::new(),
        }
    }
}

impl<R: io::Read> LineSource for StreamPort<R> {
    fn next_line(&mut self) -> Result<String, LinkError> {
        loop {
            if let Some(line) = self.rxbuf.take_line()? {
                return Ok(line);
            }
            match self.rxbuf.refill(&mut self.reader) {
                Ok(()) => {}
                Err(LinkError::Disconnected) => {
                    return match self.rxbuf.take_rest()? {
                        Some(line) => Ok(line),
                        None => Err(LinkError::Disconnected),
                    };
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Opens a line port from a url:
/// - `serial://PORT[:rate]` or a bare `PORT[:rate]` for a serial port,
///   e.g. `COM5`, `/dev/ttyUSB0:57600`;
/// - `file://PATH` for a captured telemetry file;
/// - `-` for stdin.
///
/// `timeout` bounds each `next_line()` call on serial ports.
pub fn open(url: &str, timeout: Duration) -> Result<Box<dyn LineSource + Send>, LinkError> {
    if url == "-" {
        return Ok(Box::new(StreamPort::new(io::stdin())));
    }
    if let Some(path) = url.strip_prefix("file://") {
        return Ok(Box::new(StreamPort::new(File::open(path)?)));
    }
    let port = url.strip_prefix("serial://").unwrap_or(url);
    Ok(Box::new(serial::Port::new(port, timeout)?))
}
