use crate::connection::Connection;
use crate::core::ServerCore;
use crate::handlers::{self, play};
use crate::router::{HandlerAction, PacketContext};
use bytes::BytesMut;
use std::sync::Arc;
use std::time::{Duration, Instant};
use strata_protocol_core::{extract_frame, read_varint, Phase};
use tokio::io::AsyncReadExt;
use tokio::net::tcp::OwnedReadHalf;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace, warn};

/// Bounded outbound queue; past this the workers apply backpressure.
pub const OUTBOUND_QUEUE_CAPACITY: usize = 4096;
/// How long a worker spins on a full outbound queue before dropping.
const ENQUEUE_DEADLINE: Duration = Duration::from_millis(250);
/// Workers block on the incoming queue at most this long, to notice
/// shutdown.
const WORKER_POP_TIMEOUT: Duration = Duration::from_millis(100);
/// Sender naps this long when the outbound queue is empty.
const SENDER_IDLE_SLEEP: Duration = Duration::from_millis(1);
/// A peer that never completes its handshake is dropped after this.
const HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(30);
/// Keep-alive cadence and kick threshold in Play.
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(15);
const KEEPALIVE_KICK: Duration = Duration::from_secs(30);

const READ_CHUNK: usize = 4096;

/// One framed inbound packet, detached by the reactor.
struct IncomingPacket {
    conn: Arc<Connection>,
    /// Packet id VarInt plus payload; the length prefix is stripped.
    frame: BytesMut,
}

/// One framed outbound packet for the sender to write.
struct OutboundPacket {
    conn: Arc<Connection>,
    frame: BytesMut,
    /// Half-close the socket after this frame (e.g. after a Disconnect).
    close_after: bool,
}

type IncomingTx = mpsc::UnboundedSender<IncomingPacket>;
type SharedIncomingRx = Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<IncomingPacket>>>;
type OutboundTx = mpsc::Sender<OutboundPacket>;

/// Spawn the whole network stack: acceptor/reactor, worker pool, sender
/// and keep-alive loops. Returns the task handles so the caller can await
/// a graceful exit.
pub fn start(core: Arc<ServerCore>, listener: TcpListener) -> Vec<JoinHandle<()>> {
    let (incoming_tx, incoming_rx) = mpsc::unbounded_channel();
    let incoming_rx: SharedIncomingRx = Arc::new(tokio::sync::Mutex::new(incoming_rx));
    let (outbound_tx, outbound_rx) = mpsc::channel(OUTBOUND_QUEUE_CAPACITY);

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(accept_loop(
        core.clone(),
        listener,
        incoming_tx.clone(),
    )));
    for worker_id in 0..core.config.workers {
        tasks.push(tokio::spawn(worker_loop(
            worker_id,
            core.clone(),
            incoming_rx.clone(),
            incoming_tx.clone(),
            outbound_tx.clone(),
        )));
    }
    tasks.push(tokio::spawn(sender_loop(core.clone(), outbound_rx)));
    tasks.push(tokio::spawn(keepalive_loop(core, outbound_tx)));
    tasks
}

// === Reactor ===

async fn accept_loop(core: Arc<ServerCore>, listener: TcpListener, incoming_tx: IncomingTx) {
    let mut shutdown = core.shutdown_signal();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                match accepted {
                    Ok((socket, peer)) => {
                        let _ = socket.set_nodelay(true);
                        let (read_half, write_half) = socket.into_split();
                        let conn = Arc::new(Connection::new(
                            core.next_connection_id(),
                            peer,
                            write_half,
                        ));
                        info!(peer = %peer, conn_id = conn.id, "New connection");
                        core.register_connection(conn.clone());
                        tokio::spawn(read_loop(
                            core.clone(),
                            conn,
                            read_half,
                            incoming_tx.clone(),
                        ));
                    }
                    Err(e) => {
                        error!("Failed to accept connection: {}", e);
                    }
                }
            }
            _ = shutdown.changed() => {
                debug!("Acceptor stopping");
                return;
            }
        }
    }
}

/// Per-connection read loop: accumulate bytes, detach complete frames onto
/// the incoming queue, tear the connection down on EOF, error, timeout or
/// disconnect flag.
async fn read_loop(
    core: Arc<ServerCore>,
    conn: Arc<Connection>,
    mut read_half: OwnedReadHalf,
    incoming_tx: IncomingTx,
) {
    let mut shutdown = core.shutdown_signal();
    let mut accumulator = BytesMut::with_capacity(READ_CHUNK);
    let mut read_buf = [0u8; READ_CHUNK];

    loop {
        if conn.is_disconnecting() {
            break;
        }

        let read = tokio::select! {
            read = read_half.read(&mut read_buf) => read,
            _ = tokio::time::sleep(HANDSHAKE_TIMEOUT), if conn.phase() == Phase::Handshake => {
                debug!(peer = %conn.peer, "Handshake idle timeout");
                break;
            }
            _ = shutdown.changed() => break,
        };

        let n = match read {
            Ok(0) => break,
            Ok(n) => n,
            Err(e) => {
                debug!(peer = %conn.peer, "Read error: {}", e);
                break;
            }
        };
        accumulator.extend_from_slice(&read_buf[..n]);

        // Several frames may arrive in one read; keep their order.
        loop {
            match extract_frame(&mut accumulator) {
                Ok(Some(frame)) => {
                    if incoming_tx
                        .send(IncomingPacket {
                            conn: conn.clone(),
                            frame,
                        })
                        .is_err()
                    {
                        return cleanup(&core, &conn).await;
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    warn!(peer = %conn.peer, "Malformed frame: {}", e);
                    conn.begin_disconnect();
                    break;
                }
            }
        }
    }

    cleanup(&core, &conn).await;
}

async fn cleanup(core: &ServerCore, conn: &Connection) {
    conn.begin_disconnect();
    conn.shutdown().await;
    core.remove_connection(conn.id);
}

// === Worker pool ===

enum Claim {
    /// A packet popped with its connection's handler lock held.
    Packet(IncomingPacket, tokio::sync::OwnedMutexGuard<()>),
    /// The connection was busy; the packet went back to the queue.
    Contended,
    /// Pop timed out with an empty queue.
    Idle,
}

async fn worker_loop(
    worker_id: usize,
    core: Arc<ServerCore>,
    incoming_rx: SharedIncomingRx,
    incoming_tx: IncomingTx,
    outbound_tx: OutboundTx,
) {
    loop {
        // The handler lock is claimed while the queue lock is still held:
        // otherwise two workers could pop consecutive packets of one peer
        // and race each other into handling them out of order.
        let claim = {
            let mut rx = incoming_rx.lock().await;
            match tokio::time::timeout(WORKER_POP_TIMEOUT, rx.recv()).await {
                Ok(Some(packet)) => {
                    match packet.conn.handler_lock.clone().try_lock_owned() {
                        Ok(guard) => Claim::Packet(packet, guard),
                        Err(_) => {
                            let _ = incoming_tx.send(packet);
                            Claim::Contended
                        }
                    }
                }
                Ok(None) => return,
                Err(_) => Claim::Idle,
            }
        };

        match claim {
            Claim::Packet(packet, _guard) => {
                process_packet(&core, packet, &outbound_tx).await;
            }
            Claim::Contended => {
                tokio::task::yield_now().await;
            }
            Claim::Idle => {
                if core.is_shutting_down() {
                    debug!(worker_id, "Worker stopping");
                    return;
                }
            }
        }
    }
}

async fn process_packet(core: &Arc<ServerCore>, packet: IncomingPacket, outbound_tx: &OutboundTx) {
    let conn = packet.conn;
    if conn.is_disconnecting() {
        return;
    }

    let mut body = packet.frame;
    let packet_id = match read_varint(&mut body) {
        Ok(id) => id,
        Err(e) => {
            warn!(peer = %conn.peer, "Unreadable packet id: {}", e);
            disconnect(core, &conn, outbound_tx, Vec::new()).await;
            return;
        }
    };

    let phase = conn.phase();
    let Some(handler) = core.router.lookup(phase, packet_id) else {
        warn!(
            peer = %conn.peer,
            ?phase,
            packet_id = format_args!("0x{:02X}", packet_id),
            "Protocol violation: packet not accepted in this phase"
        );
        let frames = handlers::disconnect_frames(core, phase, "Protocol violation");
        disconnect(core, &conn, outbound_tx, frames).await;
        return;
    };

    trace!(peer = %conn.peer, ?phase, packet_id, "Routing packet");
    let result = handler(&mut PacketContext {
        body: &mut body,
        conn: &conn,
        core,
    });

    match result {
        Ok(HandlerAction::None) => {}
        Ok(HandlerAction::Send(frames)) => {
            enqueue_frames(&conn, outbound_tx, frames, false).await;
        }
        Ok(HandlerAction::Disconnect(frames)) => {
            disconnect(core, &conn, outbound_tx, frames).await;
        }
        Err(e) => {
            warn!(peer = %conn.peer, "Handler error: {}", e);
            let frames = handlers::disconnect_frames(core, phase, "Internal error");
            disconnect(core, &conn, outbound_tx, frames).await;
        }
    }
}

async fn disconnect(
    core: &ServerCore,
    conn: &Arc<Connection>,
    outbound_tx: &OutboundTx,
    frames: Vec<BytesMut>,
) {
    let flushed = enqueue_frames(conn, outbound_tx, frames, true).await;
    conn.begin_disconnect();
    if !flushed {
        // Nothing queued to trigger the close, so close here.
        conn.shutdown().await;
    }
    core.remove_connection(conn.id);
}

/// Enqueue a handler's frames in order. The queue is bounded: on overflow
/// the worker spin-yields until the deadline, then drops the batch, warns
/// and disconnects the peer. Returns whether a closing frame was queued.
async fn enqueue_frames(
    conn: &Arc<Connection>,
    outbound_tx: &OutboundTx,
    frames: Vec<BytesMut>,
    close_after_last: bool,
) -> bool {
    let deadline = Instant::now() + ENQUEUE_DEADLINE;
    let count = frames.len();
    for (i, frame) in frames.into_iter().enumerate() {
        let mut packet = OutboundPacket {
            conn: conn.clone(),
            frame,
            close_after: close_after_last && i + 1 == count,
        };
        loop {
            match outbound_tx.try_send(packet) {
                Ok(()) => break,
                Err(TrySendError::Full(returned)) => {
                    if Instant::now() >= deadline {
                        warn!(peer = %conn.peer, "Outbound queue full, dropping packets");
                        conn.begin_disconnect();
                        return false;
                    }
                    packet = returned;
                    tokio::task::yield_now().await;
                }
                Err(TrySendError::Closed(_)) => return false,
            }
        }
    }
    close_after_last && count > 0
}

// === Sender ===

/// Single drain of the outbound queue: packets for one connection go out
/// in queue order, and a short write never drops the tail (`write_all`).
async fn sender_loop(core: Arc<ServerCore>, mut outbound_rx: mpsc::Receiver<OutboundPacket>) {
    loop {
        match outbound_rx.try_recv() {
            Ok(packet) => {
                if let Err(e) = packet.conn.write_frame(&packet.frame).await {
                    debug!(peer = %packet.conn.peer, "Write failed: {}", e);
                    packet.conn.begin_disconnect();
                    continue;
                }
                if packet.close_after {
                    packet.conn.shutdown().await;
                }
            }
            Err(mpsc::error::TryRecvError::Empty) => {
                if core.is_shutting_down() {
                    debug!("Sender stopping, queue drained");
                    return;
                }
                tokio::time::sleep(SENDER_IDLE_SLEEP).await;
            }
            Err(mpsc::error::TryRecvError::Disconnected) => return,
        }
    }
}

// === Keep-alive ===

/// Send Keep Alive to every Play-phase connection every 15 seconds and
/// kick peers that have not answered for 30.
async fn keepalive_loop(core: Arc<ServerCore>, outbound_tx: OutboundTx) {
    let started = Instant::now();
    let mut shutdown = core.shutdown_signal();
    let mut ticker = tokio::time::interval(KEEPALIVE_INTERVAL);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {}
            _ = shutdown.changed() => return,
        }

        for conn in core.connection_snapshot() {
            if conn.phase() != Phase::Play || conn.is_disconnecting() {
                continue;
            }
            let timed_out = core
                .with_player(conn.id, |player| {
                    player.pending_keepalive.is_some()
                        && player.last_keepalive.elapsed() >= KEEPALIVE_KICK
                })
                .unwrap_or(false);
            if timed_out {
                info!(peer = %conn.peer, "Keep-alive timeout, disconnecting");
                let frames = handlers::disconnect_frames(&core, Phase::Play, "Timed out");
                disconnect(&core, &conn, &outbound_tx, frames).await;
                continue;
            }

            // Hold the handler lock so the frame cannot land inside a
            // handler's batch; a busy connection just waits for next tick.
            let Ok(_guard) = conn.handler_lock.clone().try_lock_owned() else {
                continue;
            };
            let id = started.elapsed().as_millis() as i64;
            match play::keepalive_frame(&core, id) {
                Ok(frame) => {
                    // Track the id just sent; clients answer the most
                    // recent probe.
                    core.with_player(conn.id, |player| {
                        player.pending_keepalive = Some(id);
                    });
                    enqueue_frames(&conn, &outbound_tx, vec![frame], false).await;
                }
                Err(e) => warn!("Failed to encode keep alive: {}", e),
            }
        }
    }
}
