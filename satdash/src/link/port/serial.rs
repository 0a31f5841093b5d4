//! Serial Port
//!
//! Implements a `LineSource` for a serial port. The port is opened in
//! non-blocking mode and driven by a `mio::Poll`, so that `next_line()`
//! can give up after a timeout. Telemetry arrives as newline delimited
//! plain text.

use super::{linebuf::LineBuf, LineSource, LinkError};
use mio_serial::SerialPortBuilderExt;
use std::io;
use std::time::{Duration, Instant};

/// LineSource reading from a serial port
pub struct Port {
    /// Underlying serial port stream
    port: mio_serial::SerialStream,
    /// Poll instance the port is registered with.
    poll: mio::Poll,
    events: mio::Events,
    /// Incoming buffer, used to buffer partial lines.
    rxbuf: LineBuf,
    /// Instant when we received data most recently. This is used
    /// to clear out stale partial lines from `rxbuf`.
    last_rx: Instant,
    /// Set when the last poll reported the port readable and it has not
    /// been read down to `WouldBlock` yet. Readiness is edge triggered.
    readable: bool,
    /// Time when the port is initialized, used for startup_holdoff
    startup_time: Instant,
    /// If true, the next data received will be the first data and
    /// should be discarded since it's usually corrupt/stale.
    first_rx: bool,
    /// Longest time a single `next_line()` call waits.
    timeout: Duration,
}

/// Default data rate on the serial port.
pub static DEFAULT_RATE: u32 = 115200;

/// Discard anything for this long after the port is opened.
static HOLDOFF_TIME: Duration = Duration::from_millis(50);

/// A partial line idle for longer than this is dropped.
static STALE_TIME: Duration = Duration::from_millis(500);

/// Splits a `serial_port[:rate]` url into its port name and rate.
/// The rate defaults to 115200.
pub fn parse_url(url: &str) -> Result<(&str, u32), LinkError> {
    let url_tokens: Vec<&str> = url.split(':').collect();
    if url_tokens.is_empty() || url_tokens.len() > 2 || url_tokens[0].is_empty() {
        return Err(LinkError::IO(io::Error::from(io::ErrorKind::InvalidInput)));
    }
    let rate = if url_tokens.len() > 1 {
        if let Ok(rate) = url_tokens[1].parse::<u32>() {
            rate
        } else {
            return Err(LinkError::IO(io::Error::from(io::ErrorKind::InvalidInput)));
        }
    } else {
        DEFAULT_RATE
    };
    Ok((url_tokens[0], rate))
}

impl Port {
    /// Returns a new `serial::Port`. The `url` should look like
    /// `serial_port[:rate]`. It must start with a serial port,
    /// like `/dev/tty??` or `COMn`, optionally followed by the data rate.
    ///
    /// For example, `COM5:115200` or `/dev/ttyUSB0`.
    pub fn new(url: &str, timeout: Duration) -> Result<Port, LinkError> {
        let (port_name, rate) = parse_url(url)?;
        let mut mio_port = mio_serial::new(port_name, rate)
            .open_native_async()
            .map_err(io::Error::from)?;
        #[cfg(windows)]
        {
            // Windows requires some custom settings to replicate the unix behavior.
            use std::os::windows::io::AsRawHandle;
            use winapi::um::commapi::SetCommTimeouts;
            use winapi::um::winbase::COMMTIMEOUTS;
            let handle = mio_port.as_raw_handle();
            let mut timeouts = COMMTIMEOUTS {
                ReadIntervalTimeout: 0xFFFFFFFF,
                ReadTotalTimeoutMultiplier: 0xFFFFFFFF,
                ReadTotalTimeoutConstant: 0xFFFFFFFE,
                WriteTotalTimeoutMultiplier: 0,
                WriteTotalTimeoutConstant: 0,
            };
            if unsafe { SetCommTimeouts(handle, &mut timeouts) } == 0 {
                return Err(LinkError::IO(io::Error::last_os_error()));
            }
        }
        let poll = mio::Poll::new()?;
        poll.registry()
            .register(&mut mio_port, mio::Token(0), mio::Interest::READABLE)?;
        Ok(Port {
            port: mio_port,
            poll,
            events: mio::Events::with_capacity(1),
            rxbuf: LineBuf::new(),
            last_rx: Instant::now(),
            readable: true,
            startup_time: Instant::now(),
            first_rx: true,
            timeout,
        })
    }

    fn startup_holdoff(&self) -> bool {
        self.startup_time.elapsed() < HOLDOFF_TIME
    }
}

impl LineSource for Port {
    fn next_line(&mut self) -> Result<String, LinkError> {
        let deadline = Instant::now() + self.timeout;
        loop {
            if let Some(line) = self.rxbuf.take_line()? {
                return Ok(line);
            }
            if !self.readable {
                let now = Instant::now();
                if now >= deadline {
                    return Err(LinkError::NotReady);
                }
                self.poll.poll(&mut self.events, Some(deadline - now))?;
                if self.events.is_empty() {
                    continue;
                }
                self.readable = true;
                // Discard a partial line if the sender went quiet mid-line,
                // e.g. the board was reset.
                if !self.rxbuf.empty() && self.last_rx.elapsed() > STALE_TIME {
                    self.rxbuf.flush();
                }
            }
            match self.rxbuf.refill(&mut self.port) {
                Ok(()) => {
                    // The first data received is usually a mix of stale driver
                    // data and a partial line, so it's better to throw it away.
                    if self.first_rx || self.startup_holdoff() {
                        self.rxbuf.flush();
                        self.first_rx = false;
                    }
                    self.last_rx = Instant::now();
                }
                Err(LinkError::NotReady) => {
                    self.readable = false;
                }
                Err(e) => {
                    #[cfg(target_os = "macos")]
                    // On macos, disconnecting a serial port while connected will
                    // generate this error, so translate it.
                    if let LinkError::IO(ioerr) = &e {
                        if Some(6) == ioerr.raw_os_error() {
                            return Err(LinkError::Disconnected);
                        }
                    }
                    return Err(e);
                }
            }
        }
    }
}
