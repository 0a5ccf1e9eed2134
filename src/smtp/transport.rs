//! The connection a session writes replies to

use crate::smtp::error::SmtpError;

use log::debug;
use std::io::Write;
use std::net::{Shutdown, TcpStream};

/// Write side of one client connection.
///
/// Sessions never own the socket lifecycle; they only write, query and
/// close through this trait.
pub trait Transport {
    /// Send bytes to the client. Fails with `ConnectionClosed` once closed.
    fn write(&mut self, bytes: &[u8]) -> Result<(), SmtpError>;

    /// Close the connection. Closing twice is a no-op.
    fn close(&mut self);

    fn is_open(&self) -> bool;

    /// Peer address shown in the EHLO reply
    fn remote_address(&self) -> String;
}

/// Transport over a connected TCP stream
#[derive(Debug)]
pub struct TcpTransport {
    stream: TcpStream,
    remote: String,
    open: bool,
}

impl TcpTransport {
    /// Wrap an accepted stream, remembering the peer IP
    pub fn new(stream: TcpStream) -> Self {
        let remote = stream
            .peer_addr()
            .map(|addr| addr.ip().to_string())
            .unwrap_or_else(|_| "unknown".to_owned());

        Self {
            stream,
            remote,
            open: true,
        }
    }
}

impl Transport for TcpTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), SmtpError> {
        if !self.open {
            return Err(SmtpError::ConnectionClosed);
        }
        self.stream.write_all(bytes)?;
        self.stream.flush()?;
        Ok(())
    }

    fn close(&mut self) {
        if self.open {
            self.open = false;
            if let Err(e) = self.stream.shutdown(Shutdown::Both) {
                debug!("shutdown of {} failed: {e}", self.remote);
            }
        }
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn remote_address(&self) -> String {
        self.remote.clone()
    }
}

/// In-memory transport that records everything written to it
#[derive(Debug, Clone)]
pub struct BufferTransport {
    written: Vec<u8>,
    remote: String,
    open: bool,
}

impl BufferTransport {
    /// Empty buffer for a client at `remote`
    pub fn new(remote: &str) -> Self {
        Self {
            written: Vec::new(),
            remote: remote.to_owned(),
            open: true,
        }
    }

    /// Everything written so far
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.written).into_owned()
    }

    /// Return and clear everything written so far
    pub fn take_output(&mut self) -> String {
        let output = self.output();
        self.written.clear();
        output
    }
}

impl Default for BufferTransport {
    fn default() -> Self {
        Self::new("127.0.0.1")
    }
}

impl Transport for BufferTransport {
    fn write(&mut self, bytes: &[u8]) -> Result<(), SmtpError> {
        if !self.open {
            return Err(SmtpError::ConnectionClosed);
        }
        self.written.extend_from_slice(bytes);
        Ok(())
    }

    fn close(&mut self) {
        self.open = false;
    }

    fn is_open(&self) -> bool {
        self.open
    }

    fn remote_address(&self) -> String {
        self.remote.clone()
    }
}
