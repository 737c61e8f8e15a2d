use std::io;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use strata_protocol_core::Phase;
use tokio::io::AsyncWriteExt;
use tokio::net::tcp::OwnedWriteHalf;

/// Per-peer connection state. The reactor owns the socket's read half and
/// the inbound accumulator; the sender writes through [`write_frame`]; at
/// most one worker at a time holds [`handler_lock`] while routing a packet.
pub struct Connection {
    pub id: u64,
    pub peer: SocketAddr,
    phase: Mutex<Phase>,
    writer: tokio::sync::Mutex<Option<OwnedWriteHalf>>,
    /// Claimed by a worker for the duration of one handler run.
    pub handler_lock: std::sync::Arc<tokio::sync::Mutex<()>>,
    disconnecting: AtomicBool,
}

impl Connection {
    pub fn new(id: u64, peer: SocketAddr, writer: OwnedWriteHalf) -> Self {
        Self {
            id,
            peer,
            phase: Mutex::new(Phase::Handshake),
            writer: tokio::sync::Mutex::new(Some(writer)),
            handler_lock: std::sync::Arc::new(tokio::sync::Mutex::new(())),
            disconnecting: AtomicBool::new(false),
        }
    }

    /// A connection with no socket, for handler tests.
    #[cfg(test)]
    pub fn new_dummy(id: u64) -> Self {
        Self {
            id,
            peer: ([127, 0, 0, 1], 0).into(),
            phase: Mutex::new(Phase::Handshake),
            writer: tokio::sync::Mutex::new(None),
            handler_lock: std::sync::Arc::new(tokio::sync::Mutex::new(())),
            disconnecting: AtomicBool::new(false),
        }
    }

    pub fn phase(&self) -> Phase {
        *self.phase.lock().expect("phase lock poisoned")
    }

    pub fn set_phase(&self, phase: Phase) {
        *self.phase.lock().expect("phase lock poisoned") = phase;
    }

    pub fn is_disconnecting(&self) -> bool {
        self.disconnecting.load(Ordering::Acquire)
    }

    /// Mark the connection for teardown. The reactor closes the socket on
    /// its next wakeup; the sender still flushes already-queued frames.
    pub fn begin_disconnect(&self) {
        self.disconnecting.store(true, Ordering::Release);
        self.set_phase(Phase::Disconnecting);
    }

    /// Write one fully-framed packet. Only the sender task calls this.
    pub async fn write_frame(&self, frame: &[u8]) -> io::Result<()> {
        let mut writer = self.writer.lock().await;
        match writer.as_mut() {
            Some(writer) => writer.write_all(frame).await,
            None => Err(io::Error::new(
                io::ErrorKind::NotConnected,
                "connection has no socket",
            )),
        }
    }

    /// Half-close the socket so the peer sees EOF and the read loop winds
    /// down.
    pub async fn shutdown(&self) {
        let mut writer = self.writer.lock().await;
        if let Some(writer) = writer.as_mut() {
            let _ = writer.shutdown().await;
        }
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("peer", &self.peer)
            .field("phase", &self.phase())
            .field("disconnecting", &self.is_disconnecting())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_transitions() {
        let conn = Connection::new_dummy(1);
        assert_eq!(conn.phase(), Phase::Handshake);
        conn.set_phase(Phase::Status);
        assert_eq!(conn.phase(), Phase::Status);
    }

    #[test]
    fn test_begin_disconnect() {
        let conn = Connection::new_dummy(1);
        assert!(!conn.is_disconnecting());
        conn.begin_disconnect();
        assert!(conn.is_disconnecting());
        assert_eq!(conn.phase(), Phase::Disconnecting);
    }

    #[tokio::test]
    async fn test_dummy_write_fails() {
        let conn = Connection::new_dummy(1);
        assert!(conn.write_frame(b"data").await.is_err());
    }
}
