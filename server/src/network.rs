//! Server network layer handling WebSocket connections and the tick loop

use futures_util::{SinkExt, StreamExt};
use log::{debug, error, info, warn};
use shared::Inbound;
use std::future::Future;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::accept_async;
use tokio_tungstenite::tungstenite::Message;

use crate::config::ServerConfig;
use crate::coordinator::Coordinator;
use crate::error::ServerError;
use crate::registry::{SessionHandle, SessionId};
use crate::store::WorldStore;
use crate::world::World;

/// Messages sent from connection tasks to the main server loop
#[derive(Debug)]
pub enum ServerMessage {
    Connected {
        addr: SocketAddr,
        handle: SessionHandle,
        reply: oneshot::Sender<Option<SessionId>>,
    },
    Received {
        session: SessionId,
        message: Inbound,
    },
    Disconnected {
        session: SessionId,
    },
}

/// Main server coordinating connections, input and the world economy
pub struct Server<S: WorldStore> {
    listener: Option<TcpListener>,
    local_addr: SocketAddr,
    coordinator: Coordinator,
    store: S,

    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
}

impl<S: WorldStore> Server<S> {
    /// Validates `config`, restores the world from `store` and binds the
    /// listening socket. Connections are not accepted until the server runs.
    pub async fn new(config: ServerConfig, mut store: S) -> Result<Self, ServerError> {
        config.validate()?;

        let snapshot = store.load().await?.unwrap_or_default();
        let world = World::restore(config.world.clone(), snapshot)?;
        let coordinator = Coordinator::with_default_menus(
            world,
            config.scheduler()?,
            config.identity(),
            config.max_clients,
        )?;

        let listener = TcpListener::bind(config.bind_addr()).await?;
        let local_addr = listener.local_addr()?;
        info!("Server listening on {}", local_addr);

        let (server_tx, server_rx) = mpsc::unbounded_channel();

        Ok(Server {
            listener: Some(listener),
            local_addr,
            coordinator,
            store,
            server_tx,
            server_rx,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn coordinator(&self) -> &Coordinator {
        &self.coordinator
    }

    /// Spawns task that accepts connections and hands each to its own task
    fn spawn_acceptor(&mut self) -> Option<JoinHandle<()>> {
        let listener = self.listener.take()?;
        let server_tx = self.server_tx.clone();

        Some(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, addr)) => {
                        tokio::spawn(handle_connection(stream, addr, server_tx.clone()));
                    }
                    Err(e) => {
                        error!("Error accepting connection: {}", e);
                        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
                    }
                }
            }
        }))
    }

    fn handle_message(&mut self, message: ServerMessage) {
        match message {
            ServerMessage::Connected {
                addr,
                handle,
                reply,
            } => {
                let session = match self.coordinator.connect(handle) {
                    Ok(session) => session,
                    Err(e) => {
                        error!("Could not name connection from {}: {}", addr, e);
                        None
                    }
                };
                match session {
                    Some(id) => info!("Client {} connected as session {}", addr, id),
                    None => info!("Client {} turned away", addr),
                }
                let _ = reply.send(session);
            }
            ServerMessage::Received { session, message } => {
                self.coordinator.handle_inbound(session, message);
            }
            ServerMessage::Disconnected { session } => {
                if self.coordinator.disconnect(session) {
                    info!("Session {} disconnected", session);
                }
            }
        }
    }

    /// Writes the current world to the store. Failures are logged only.
    async fn save(&mut self) {
        let snapshot = self.coordinator.world().snapshot();
        if let Err(e) = self.store.save(&snapshot).await {
            error!("Failed to save world: {}", e);
        }
    }

    /// Runs until Ctrl-C or SIGTERM
    pub async fn run(self) -> Result<(), ServerError> {
        self.run_until(shutdown_signal()).await?;
        Ok(())
    }

    /// Main server loop
    ///
    /// Stops when `shutdown` completes. Queued input is abandoned, the world
    /// is saved one last time and the closed store is handed back.
    pub async fn run_until<F>(mut self, shutdown: F) -> Result<S, ServerError>
    where
        F: Future<Output = ()>,
    {
        let acceptor = self.spawn_acceptor();
        let mut ticker = self.coordinator.scheduler().interval();
        tokio::pin!(shutdown);

        info!("Server started successfully");

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Server shutting down");
                    break;
                },

                message = self.server_rx.recv() => {
                    match message {
                        Some(message) => self.handle_message(message),
                        None => break,
                    }
                },

                _ = ticker.tick() => {
                    let report = self.coordinator.tick();
                    if report.economy.is_some() {
                        self.save().await;
                    }

                    // Periodic monitoring
                    if report.tick % 60 == 0 && !self.coordinator.registry().is_empty() {
                        let world = self.coordinator.world();
                        debug!(
                            "Tick {}: {} sessions, {} organisms, {} food, {} mass",
                            report.tick,
                            self.coordinator.registry().len(),
                            world.organism_count(),
                            world.food_count(),
                            world.total_mass().round_dp(2)
                        );
                    }
                },
            }
        }

        if let Some(acceptor) = acceptor {
            acceptor.abort();
        }
        if self.coordinator.pending_inputs() > 0 {
            debug!("Dropping {} queued inputs", self.coordinator.pending_inputs());
        }

        self.save().await;
        self.store.close().await?;
        Ok(self.store)
    }
}

/// Drives one WebSocket connection
///
/// A writer task forwards everything the session handle receives to the
/// socket; this task reads frames and feeds them to the server loop. The
/// writer ends once the coordinator drops the handle.
async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    server_tx: mpsc::UnboundedSender<ServerMessage>,
) {
    let ws = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!("WebSocket handshake with {} failed: {}", addr, e);
            return;
        }
    };
    let (mut sink, mut stream) = ws.split();
    let (handle, mut outbound_rx) = SessionHandle::channel();

    let writer = tokio::spawn(async move {
        while let Some(message) = outbound_rx.recv().await {
            let text = match message.encode() {
                Ok(text) => text,
                Err(e) => {
                    error!("Failed to encode message for {}: {}", addr, e);
                    continue;
                }
            };
            if let Err(e) = sink.send(Message::Text(text)).await {
                debug!("Write to {} failed: {}", addr, e);
                break;
            }
        }
        let _ = sink.close().await;
    });

    let (reply_tx, reply_rx) = oneshot::channel();
    let connected = ServerMessage::Connected {
        addr,
        handle,
        reply: reply_tx,
    };
    if server_tx.send(connected).is_err() {
        return;
    }
    let Ok(Some(session)) = reply_rx.await else {
        let _ = writer.await;
        return;
    };

    while let Some(frame) = stream.next().await {
        match frame {
            Ok(Message::Text(text)) => match Inbound::decode(&text) {
                Ok(Some(message)) => {
                    if server_tx
                        .send(ServerMessage::Received { session, message })
                        .is_err()
                    {
                        break;
                    }
                }
                Ok(None) => debug!("Session {} sent a message with nothing to do", session),
                Err(e) => warn!("Undecodable frame from session {}: {}", session, e),
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!("Read from session {} failed: {}", session, e);
                break;
            }
        }
    }

    let _ = server_tx.send(ServerMessage::Disconnected { session });
    let _ = writer.await;
}

/// Completes on Ctrl-C, or on SIGTERM where that exists.
pub async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
