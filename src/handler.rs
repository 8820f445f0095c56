//! WebSocket connection handler
//!
//! Handles individual client connections: WebSocket handshake, the
//! read loop driving the session, and the write loop draining the
//! outbound queue with keepalive pings.

use std::sync::Arc;
use std::time::Duration;

use futures_util::{Sink, SinkExt, Stream, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval_at, timeout, Instant, MissedTickBehavior};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, error, info, warn};

use crate::config::ServerConfig;
use crate::error::AppError;
use crate::message::Payload;
use crate::server::ServerCommand;
use crate::session::Session;
use crate::types::ClientId;

/// Accept connections until shutdown, one handler task each
///
/// After shutdown is signalled, waits up to the write timeout for open
/// connections to flush their queues and close.
pub async fn serve(
    listener: TcpListener,
    cmd_tx: mpsc::Sender<ServerCommand>,
    config: Arc<ServerConfig>,
    mut shutdown: watch::Receiver<bool>,
) {
    // Each handler holds a clone; recv() yields None once the last one exits.
    let (done_tx, mut done_rx) = mpsc::channel::<()>(1);

    loop {
        tokio::select! {
            accepted = listener.accept() => match accepted {
                Ok((stream, addr)) => {
                    debug!("New connection from {}", addr);
                    let cmd_tx = cmd_tx.clone();
                    let config = config.clone();
                    let shutdown = shutdown.clone();
                    let done = done_tx.clone();

                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(stream, cmd_tx, config, shutdown).await {
                            error!("Connection handler error: {}", e);
                        }
                        drop(done);
                    });
                }
                Err(e) => {
                    error!("Failed to accept connection: {}", e);
                }
            },
            _ = shutdown_requested(&mut shutdown) => break,
        }
    }

    info!("No longer accepting connections");
    drop(done_tx);
    if timeout(config.write_timeout, done_rx.recv()).await.is_err() {
        warn!("Connections still open after {:?}", config.write_timeout);
    }
}

/// Resolves once `true` is published; never resolves if the sender is gone
async fn shutdown_requested(shutdown: &mut watch::Receiver<bool>) {
    while !*shutdown.borrow_and_update() {
        if shutdown.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Handle a new TCP connection
///
/// Performs the WebSocket handshake, runs the read and write loops
/// concurrently, and removes the connection from the registry once
/// either loop ends.
pub async fn handle_connection(
    stream: TcpStream,
    cmd_tx: mpsc::Sender<ServerCommand>,
    config: Arc<ServerConfig>,
    shutdown: watch::Receiver<bool>,
) -> Result<(), AppError> {
    let peer_addr = stream
        .peer_addr()
        .map(|a| a.to_string())
        .unwrap_or_else(|_| "unknown".to_string());

    // WebSocket handshake, bounded like any other silence from the peer
    let handshake =
        tokio_tungstenite::accept_async_with_config(stream, Some(config.websocket_config()));
    let ws_stream = timeout(config.idle_timeout, handshake)
        .await
        .map_err(|_| AppError::IdleTimeout(config.idle_timeout))??;
    let (ws_sender, ws_receiver) = ws_stream.split();

    let client_id = ClientId::new();
    info!("Client {} connected from {}", client_id, peer_addr);

    // Outbound queue; the session holds the sender until login hands it
    // to the registry.
    let (msg_tx, msg_rx) = mpsc::channel::<Payload>(config.queue_capacity);
    let session = Session::new(client_id, msg_tx);

    let mut read_task = tokio::spawn(read_loop(
        ws_receiver,
        session,
        cmd_tx.clone(),
        config.idle_timeout,
        shutdown,
    ));
    let mut write_task = tokio::spawn(write_loop(
        ws_sender,
        msg_rx,
        client_id,
        config.ping_interval,
        config.write_timeout,
    ));

    tokio::select! {
        result = &mut read_task => {
            log_exit(client_id, "Read", result);
            // The closed session releases the outbound queue, so the writer
            // flushes what is left and sends a close frame.
            match timeout(config.write_timeout, &mut write_task).await {
                Ok(result) => log_exit(client_id, "Write", result),
                Err(_) => {
                    warn!("Writer for {} did not finish, aborting", client_id);
                    write_task.abort();
                }
            }
        }
        result = &mut write_task => {
            read_task.abort();
            log_exit(client_id, "Write", result);
            // The aborted reader never got to close its session.
            let _ = cmd_tx.send(ServerCommand::Disconnect { client_id }).await;
        }
    }

    info!("Client {} disconnected", client_id);

    Ok(())
}

fn log_exit(
    client_id: ClientId,
    task: &str,
    result: Result<Result<(), AppError>, tokio::task::JoinError>,
) {
    match result {
        Ok(Ok(())) => debug!("{} task completed for {}", task, client_id),
        Ok(Err(e)) => warn!("{} task for {} failed: {}", task, client_id, e),
        Err(e) => error!("{} task for {} panicked: {}", task, client_id, e),
    }
}

/// Read frames until the peer goes away, falls silent, or shutdown
///
/// Every received frame, pongs included, resets the idle deadline.
async fn read_loop<S>(
    mut ws_receiver: S,
    mut session: Session,
    cmd_tx: mpsc::Sender<ServerCommand>,
    idle_timeout: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> Result<(), AppError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    let result = read_frames(
        &mut ws_receiver,
        &mut session,
        &cmd_tx,
        idle_timeout,
        &mut shutdown,
    )
    .await;

    if let Some(cmd) = session.close() {
        let _ = cmd_tx.send(cmd).await;
    }

    result
}

async fn read_frames<S>(
    ws_receiver: &mut S,
    session: &mut Session,
    cmd_tx: &mpsc::Sender<ServerCommand>,
    idle_timeout: Duration,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), AppError>
where
    S: Stream<Item = Result<Message, tungstenite::Error>> + Unpin,
{
    loop {
        let next = tokio::select! {
            next = timeout(idle_timeout, ws_receiver.next()) => match next {
                Ok(next) => next,
                Err(_) => return Err(AppError::IdleTimeout(idle_timeout)),
            },
            _ = shutdown_requested(shutdown) => {
                debug!("Shutdown, closing session of {}", session.nick());
                return Ok(());
            }
        };

        match next {
            Some(Ok(Message::Text(text))) => {
                if let Some(cmd) = session.handle_text(&text) {
                    cmd_tx.send(cmd).await.map_err(|_| AppError::ChannelSend)?;
                }
            }
            Some(Ok(Message::Close(_))) | None => {
                debug!(
                    "Peer closed connection ({} in {:?})",
                    session.nick(),
                    session.room()
                );
                return Ok(());
            }
            Some(Ok(Message::Pong(_))) => {
                debug!("Pong from {}", session.nick());
            }
            Some(Ok(_)) => {
                // Pings are answered by tungstenite; binary frames are ignored.
            }
            Some(Err(e)) => return Err(e.into()),
        }
    }
}

/// Drain the outbound queue onto the socket, pinging on a fixed period
///
/// Ends with a close frame when the queue is closed.
async fn write_loop<S>(
    mut ws_sender: S,
    mut msg_rx: mpsc::Receiver<Payload>,
    client_id: ClientId,
    ping_interval: Duration,
    write_timeout: Duration,
) -> Result<(), AppError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    let mut keepalive = interval_at(Instant::now() + ping_interval, ping_interval);
    keepalive.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            payload = msg_rx.recv() => {
                let Some(payload) = payload else {
                    debug!("Outbound queue closed for {}", client_id);
                    let _ = timeout(write_timeout, ws_sender.close()).await;
                    return Ok(());
                };
                send_with_deadline(&mut ws_sender, Message::Text(payload.to_string().into()), write_timeout).await?;
            }
            _ = keepalive.tick() => {
                send_with_deadline(&mut ws_sender, Message::Ping(Vec::new().into()), write_timeout).await?;
            }
        }
    }
}

async fn send_with_deadline<S>(
    ws_sender: &mut S,
    msg: Message,
    write_timeout: Duration,
) -> Result<(), AppError>
where
    S: Sink<Message, Error = tungstenite::Error> + Unpin,
{
    match timeout(write_timeout, ws_sender.send(msg)).await {
        Ok(result) => result.map_err(AppError::from),
        Err(_) => Err(AppError::WriteTimeout(write_timeout)),
    }
}
