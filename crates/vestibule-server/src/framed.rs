//! Byte-level socket wrapper with per-read timeouts.
//!
//! Reads poll the non-blocking socket every ~10 ms; the timeout for a
//! read is measured from the start of *that* read attempt, not from a
//! connection-wide deadline. Multi-byte reads compose the single-byte
//! primitive. This trades a small constant CPU cost for never parking
//! a thread indefinitely on a dead peer, without reaching for async
//! I/O primitives.

use std::io::{ErrorKind, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::{Duration, Instant};

use vestibule_types::{Result, VestibuleError};

/// How long to sleep between polls of the socket.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Non-blocking TCP stream with polling reads and idempotent teardown.
pub struct FramedChannel {
    /// `None` once the connection has been killed.
    stream: Option<TcpStream>,
    /// Per-read timeout from configuration.
    timeout: Duration,
    /// Random id used to correlate log lines, not security-bearing.
    conn_id: u64,
}

impl FramedChannel {
    /// Wraps an accepted stream.
    ///
    /// # Errors
    ///
    /// Returns [`VestibuleError::Transport`] if the socket cannot be
    /// switched to non-blocking mode.
    pub fn new(stream: TcpStream, timeout: Duration, conn_id: u64) -> Result<Self> {
        stream
            .set_nonblocking(true)
            .map_err(|e| VestibuleError::Transport {
                reason: format!("failed to set non-blocking mode: {e}"),
            })?;
        Ok(Self {
            stream: Some(stream),
            timeout,
            conn_id,
        })
    }

    /// Connection id for log correlation.
    pub fn conn_id(&self) -> u64 {
        self.conn_id
    }

    /// Reads one byte, polling until data arrives or the timeout
    /// elapses.
    ///
    /// # Errors
    ///
    /// - [`VestibuleError::Timeout`] — nothing arrived in time; the
    ///   channel is killed before returning.
    /// - [`VestibuleError::Transport`] — peer closed or I/O failure;
    ///   the channel is killed before returning.
    pub fn read_u8(&mut self) -> Result<u8> {
        let started = Instant::now();
        loop {
            let stream = self.stream.as_mut().ok_or_else(|| VestibuleError::Transport {
                reason: "read on a killed connection".into(),
            })?;

            let mut buf = [0u8; 1];
            match stream.read(&mut buf) {
                Ok(1) => return Ok(buf[0]),
                Ok(_) => {
                    self.kill();
                    return Err(VestibuleError::Transport {
                        reason: "peer closed the connection".into(),
                    });
                }
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if started.elapsed() >= self.timeout {
                        self.kill();
                        tracing::debug!(conn = self.conn_id, "read timed out, killed connection");
                        return Err(VestibuleError::Timeout {
                            reason: format!("no data within {} ms", self.timeout.as_millis()),
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    self.kill();
                    tracing::debug!(conn = self.conn_id, "socket I/O error, killed connection");
                    return Err(VestibuleError::Transport {
                        reason: format!("socket read failed: {e}"),
                    });
                }
            }
        }
    }

    /// Reads exactly `n` bytes by composing [`read_u8`]
    /// (FramedChannel::read_u8) `n` times; each byte gets its own
    /// timeout window.
    pub fn read_exact(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(n);
        for _ in 0..n {
            buf.push(self.read_u8()?);
        }
        Ok(buf)
    }

    /// Appends raw bytes to the stream, retrying `WouldBlock` with the
    /// same polling cadence as reads.
    pub fn write_all(&mut self, data: &[u8]) -> Result<()> {
        let started = Instant::now();
        let mut written = 0;
        while written < data.len() {
            let stream = self.stream.as_mut().ok_or_else(|| VestibuleError::Transport {
                reason: "write on a killed connection".into(),
            })?;

            match stream.write(&data[written..]) {
                Ok(0) => {
                    self.kill();
                    return Err(VestibuleError::Transport {
                        reason: "peer stopped accepting data".into(),
                    });
                }
                Ok(n) => written += n,
                Err(e) if e.kind() == ErrorKind::WouldBlock => {
                    if started.elapsed() >= self.timeout {
                        self.kill();
                        return Err(VestibuleError::Timeout {
                            reason: format!("write stalled for {} ms", self.timeout.as_millis()),
                        });
                    }
                    std::thread::sleep(POLL_INTERVAL);
                }
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => {
                    self.kill();
                    return Err(VestibuleError::Transport {
                        reason: format!("socket write failed: {e}"),
                    });
                }
            }
        }
        Ok(())
    }

    /// Flushes buffered output to the peer.
    pub fn flush(&mut self) -> Result<()> {
        if let Some(stream) = self.stream.as_mut() {
            stream.flush().map_err(|e| VestibuleError::Transport {
                reason: format!("socket flush failed: {e}"),
            })?;
        }
        Ok(())
    }

    /// Kills the connection. Idempotent and safe from any error path;
    /// after this every read and write fails.
    pub fn kill(&mut self) {
        if let Some(stream) = self.stream.take() {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    /// Returns `true` once the channel has been killed.
    pub fn is_killed(&self) -> bool {
        self.stream.is_none()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    /// Builds a connected loopback pair.
    fn socket_pair() -> (TcpStream, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");
        let client = TcpStream::connect(addr).expect("connect");
        let (server, _) = listener.accept().expect("accept");
        (client, server)
    }

    #[test]
    fn reads_bytes_written_by_peer() -> std::result::Result<(), VestibuleError> {
        let (mut client, server) = socket_pair();
        let mut channel = FramedChannel::new(server, Duration::from_millis(500), 1)?;

        client.write_all(&[0xAA, 0xBB, 0xCC]).expect("peer write");
        assert_eq!(channel.read_u8()?, 0xAA);
        assert_eq!(channel.read_exact(2)?, vec![0xBB, 0xCC]);
        Ok(())
    }

    #[test]
    fn silent_peer_times_out_and_kills() -> std::result::Result<(), VestibuleError> {
        let (_client, server) = socket_pair();
        let mut channel = FramedChannel::new(server, Duration::from_millis(60), 2)?;

        let started = Instant::now();
        let err = channel.read_u8().unwrap_err();
        assert!(matches!(err, VestibuleError::Timeout { .. }));
        assert!(started.elapsed() >= Duration::from_millis(60));
        assert!(channel.is_killed());
        Ok(())
    }

    #[test]
    fn peer_close_is_transport_error() -> std::result::Result<(), VestibuleError> {
        let (client, server) = socket_pair();
        let mut channel = FramedChannel::new(server, Duration::from_millis(500), 3)?;

        drop(client);
        let err = channel.read_u8().unwrap_err();
        assert!(matches!(err, VestibuleError::Transport { .. }));
        assert!(channel.is_killed());
        Ok(())
    }

    #[test]
    fn kill_is_idempotent() -> std::result::Result<(), VestibuleError> {
        let (_client, server) = socket_pair();
        let mut channel = FramedChannel::new(server, Duration::from_millis(100), 4)?;

        channel.kill();
        channel.kill();
        assert!(channel.is_killed());
        assert!(channel.read_u8().is_err());
        assert!(channel.write_all(b"x").is_err());
        Ok(())
    }

    #[test]
    fn writes_reach_peer() -> std::result::Result<(), VestibuleError> {
        let (mut client, server) = socket_pair();
        let mut channel = FramedChannel::new(server, Duration::from_millis(500), 5)?;

        channel.write_all(b"hello")?;
        channel.flush()?;

        let mut buf = [0u8; 5];
        client.read_exact(&mut buf).expect("peer read");
        assert_eq!(&buf, b"hello");
        Ok(())
    }

    #[test]
    fn timeout_is_per_read_not_per_connection() -> std::result::Result<(), VestibuleError> {
        let (mut client, server) = socket_pair();
        let mut channel = FramedChannel::new(server, Duration::from_millis(150), 6)?;

        // Two reads separated by a delay longer than a single timeout
        // window both succeed, because each read restarts the clock.
        client.write_all(&[1]).expect("peer write");
        assert_eq!(channel.read_u8()?, 1);

        std::thread::sleep(Duration::from_millis(100));
        client.write_all(&[2]).expect("peer write");
        assert_eq!(channel.read_u8()?, 2);
        Ok(())
    }
}
