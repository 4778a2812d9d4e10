//! Stream wrapper over the supported point-to-point transports.

use std::io::{self, Read, Write};
use std::net::TcpStream;

use edigate_config::SocketEndpoint;

#[cfg(unix)]
use std::os::fd::{AsRawFd, RawFd};
#[cfg(unix)]
use std::os::unix::net::UnixStream;

/// A connected byte stream over one of the supported transports.
#[derive(Debug)]
pub enum SessionStream {
    /// TCP connection.
    Tcp(TcpStream),
    /// Unix domain socket connection.
    #[cfg(unix)]
    Unix(UnixStream),
}

impl SessionStream {
    /// Dials the given endpoint.
    ///
    /// # Errors
    ///
    /// Propagates connection errors; dialling a Unix endpoint on a platform
    /// without Unix sockets yields [`io::ErrorKind::Unsupported`].
    pub fn connect(endpoint: &SocketEndpoint) -> io::Result<Self> {
        match endpoint {
            SocketEndpoint::Tcp { host, port } => {
                TcpStream::connect((host.as_str(), *port)).map(Self::Tcp)
            }
            SocketEndpoint::Unix { path } => {
                #[cfg(unix)]
                {
                    UnixStream::connect(path.as_std_path()).map(Self::Unix)
                }
                #[cfg(not(unix))]
                {
                    Err(io::Error::new(
                        io::ErrorKind::Unsupported,
                        format!("unix endpoint '{path}' is unsupported on this platform"),
                    ))
                }
            }
        }
    }

    /// Human-readable identity of the remote peer, for logging.
    #[must_use]
    pub fn peer_description(&self) -> String {
        match self {
            Self::Tcp(stream) => stream
                .peer_addr()
                .map_or_else(|_| "tcp-peer".to_string(), |addr| addr.to_string()),
            #[cfg(unix)]
            Self::Unix(_) => "unix-peer".to_string(),
        }
    }
}

impl Read for SessionStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.read(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.read(buf),
        }
    }
}

impl Write for SessionStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            Self::Tcp(stream) => stream.write(buf),
            #[cfg(unix)]
            Self::Unix(stream) => stream.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            Self::Tcp(stream) => stream.flush(),
            #[cfg(unix)]
            Self::Unix(stream) => stream.flush(),
        }
    }
}

#[cfg(unix)]
impl AsRawFd for SessionStream {
    fn as_raw_fd(&self) -> RawFd {
        match self {
            Self::Tcp(stream) => stream.as_raw_fd(),
            Self::Unix(stream) => stream.as_raw_fd(),
        }
    }
}
