//! Server network layer: UDP transport and the authoritative event loop
//!
//! Packets are received and decoded on a dedicated task. Handshake packets
//! are also validated there (nonce, hash binding, signature), since
//! validation needs no per-connection state. Everything that touches
//! connection state (admission, merging, compliance checks, disconnects)
//! runs on the single main loop, one message at a time.

use crate::client_manager::{ClientManager, CLIENT_TIMEOUT};
use crate::compliance::RecordUpdate;
use crate::config::ServerSettings;
use crate::error::HandshakeError;
use crate::handshake::{HandshakeMessage, HandshakeValidator};
use crate::nonce_registry::NonceRegistry;
use crate::orchestrator::{Decision, HandshakeOrchestrator, ServiceContext};
use crate::policy::PolicyHandle;
use crate::signature::SignatureVerifier;
use bincode::{deserialize, serialize};
use log::{debug, error, info, warn};
use shared::{Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::sync::{mpsc, RwLock};

/// Largest datagram the receiver accepts
const RECV_BUFFER_SIZE: usize = 65_536;

/// Messages sent from network tasks to main server loop
#[derive(Debug)]
pub enum ServerMessage {
    PacketReceived {
        packet: Packet,
        addr: SocketAddr,
    },
    HandshakeValidated {
        addr: SocketAddr,
        result: Result<RecordUpdate, HandshakeError>,
    },
    GraceElapsed {
        client_id: u32,
    },
    ClientTimeout {
        client_id: u32,
    },
    Shutdown,
}

/// Messages sent from main loop to the sender task
#[derive(Debug)]
pub enum OutboundMessage {
    SendPacket { packet: Packet, addr: SocketAddr },
}

/// Handshake server coordinating networking and compliance enforcement
pub struct Server {
    socket: Arc<UdpSocket>,
    clients: Arc<RwLock<ClientManager>>,
    orchestrator: HandshakeOrchestrator,
    validator: Arc<HandshakeValidator>,
    policy: PolicyHandle,
    grace_period: Duration,

    // Communication channels
    server_tx: mpsc::UnboundedSender<ServerMessage>,
    server_rx: mpsc::UnboundedReceiver<ServerMessage>,
    outbound_tx: mpsc::UnboundedSender<OutboundMessage>,
    outbound_rx: mpsc::UnboundedReceiver<OutboundMessage>,
}

impl Server {
    pub async fn new(
        addr: &str,
        max_clients: usize,
        settings: ServerSettings,
        verifier: SignatureVerifier,
        context: ServiceContext,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = Arc::new(UdpSocket::bind(addr).await?);
        info!("Server listening on {}", socket.local_addr()?);

        if !verifier.has_key() {
            warn!("No integrity public key loaded; signed attestations will fail");
        }

        let (server_tx, server_rx) = mpsc::unbounded_channel();
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        let nonces = NonceRegistry::new(settings.nonce_retention, settings.nonce_capacity);

        Ok(Server {
            socket,
            clients: Arc::new(RwLock::new(ClientManager::new(max_clients))),
            orchestrator: HandshakeOrchestrator::new(&context),
            validator: Arc::new(HandshakeValidator::new(nonces, verifier)),
            policy: context.policy.clone(),
            grace_period: settings.grace_period,
            server_tx,
            server_rx,
            outbound_tx,
            outbound_rx,
        })
    }

    pub fn local_addr(&self) -> std::io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Handle for swapping in a reloaded policy while the server runs.
    pub fn policy(&self) -> PolicyHandle {
        self.policy.clone()
    }

    /// Sender into the main loop, e.g. to request shutdown.
    pub fn control(&self) -> mpsc::UnboundedSender<ServerMessage> {
        self.server_tx.clone()
    }

    /// Spawns task that receives, decodes and validates incoming packets
    fn spawn_network_receiver(&self) {
        let socket = Arc::clone(&self.socket);
        let server_tx = self.server_tx.clone();
        let validator = Arc::clone(&self.validator);

        tokio::spawn(async move {
            let mut buffer = vec![0u8; RECV_BUFFER_SIZE];

            loop {
                match socket.recv_from(&mut buffer).await {
                    Ok((len, addr)) => {
                        let packet = match deserialize::<Packet>(&buffer[0..len]) {
                            Ok(packet) => packet,
                            Err(_) => {
                                warn!("Failed to deserialize packet from {}", addr);
                                continue;
                            }
                        };

                        let message = if packet.is_handshake() {
                            let Some(handshake) = HandshakeMessage::from_packet(packet) else {
                                continue;
                            };
                            ServerMessage::HandshakeValidated {
                                addr,
                                result: validator.validate(handshake),
                            }
                        } else {
                            ServerMessage::PacketReceived { packet, addr }
                        };

                        if let Err(e) = server_tx.send(message) {
                            error!("Failed to send packet to main loop: {}", e);
                            break;
                        }
                    }
                    Err(e) => {
                        error!("Error receiving packet: {}", e);
                        tokio::time::sleep(Duration::from_millis(10)).await;
                    }
                }
            }
        });
    }

    /// Spawns task that processes outgoing packet queue
    fn spawn_network_sender(&mut self) {
        let socket = Arc::clone(&self.socket);
        let mut outbound_rx = std::mem::replace(&mut self.outbound_rx, mpsc::unbounded_channel().1);

        tokio::spawn(async move {
            while let Some(message) = outbound_rx.recv().await {
                match message {
                    OutboundMessage::SendPacket { packet, addr } => {
                        if let Err(e) = Self::send_packet_impl(&socket, &packet, addr).await {
                            error!("Failed to send packet to {}: {}", addr, e);
                        }
                    }
                }
            }
        });
    }

    /// Spawns task that monitors client timeouts
    fn spawn_timeout_checker(&self) {
        let clients = Arc::clone(&self.clients);
        let server_tx = self.server_tx.clone();

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(Duration::from_secs(1));

            loop {
                interval.tick().await;

                let timed_out = {
                    let mut clients_guard = clients.write().await;
                    clients_guard.check_timeouts(CLIENT_TIMEOUT)
                };

                for client_id in timed_out {
                    if let Err(e) = server_tx.send(ServerMessage::ClientTimeout { client_id }) {
                        error!("Failed to send timeout message: {}", e);
                        return;
                    }
                }
            }
        });
    }

    /// Schedules the first full compliance check for a new connection
    fn schedule_grace_check(&self, client_id: u32) {
        let server_tx = self.server_tx.clone();
        let grace_period = self.grace_period;

        tokio::spawn(async move {
            tokio::time::sleep(grace_period).await;
            // The loop may already be gone on shutdown
            let _ = server_tx.send(ServerMessage::GraceElapsed { client_id });
        });
    }

    async fn send_packet_impl(
        socket: &UdpSocket,
        packet: &Packet,
        addr: SocketAddr,
    ) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        socket.send_to(&data, addr).await?;
        Ok(())
    }

    fn send_packet(&self, packet: Packet, addr: SocketAddr) {
        if let Err(e) = self
            .outbound_tx
            .send(OutboundMessage::SendPacket { packet, addr })
        {
            error!("Failed to queue packet for sending: {}", e);
        }
    }

    async fn client_for(&self, addr: SocketAddr) -> Option<u32> {
        let mut clients = self.clients.write().await;
        let client_id = clients.find_client_by_addr(addr)?;
        clients.touch(client_id);
        Some(client_id)
    }

    /// Removes a client from both the connection table and the orchestrator
    async fn drop_client(&mut self, client_id: u32) {
        let mut clients = self.clients.write().await;
        clients.remove_client(&client_id);
        self.orchestrator.remove(client_id);
    }

    async fn apply_decision(&mut self, client_id: u32, decision: Decision) {
        if let Decision::Disconnect { reason } = decision {
            let addr = {
                let clients = self.clients.read().await;
                clients.get(client_id).map(|c| c.addr)
            };
            if let Some(addr) = addr {
                self.send_packet(Packet::Disconnected { reason }, addr);
            }
            self.drop_client(client_id).await;
        }
    }

    async fn handle_connect(&mut self, addr: SocketAddr, client_version: u32, player_name: String) {
        info!(
            "Client {} connecting from {} (version: {})",
            player_name, addr, client_version
        );

        if client_version != PROTOCOL_VERSION {
            self.send_packet(
                Packet::Disconnected {
                    reason: format!("Unsupported protocol version {}", client_version),
                },
                addr,
            );
            return;
        }

        // Remove existing connection if present
        let existing_client_id = {
            let clients = self.clients.read().await;
            clients.find_client_by_addr(addr)
        };
        if let Some(existing_id) = existing_client_id {
            info!("Removing existing client {} from {}", existing_id, addr);
            self.drop_client(existing_id).await;
        }

        let client_id = {
            let mut clients = self.clients.write().await;
            clients.add_client(addr, &player_name)
        };

        match client_id {
            Some(client_id) => {
                self.orchestrator.admit(client_id, &player_name);
                self.send_packet(Packet::Connected { client_id }, addr);
                self.schedule_grace_check(client_id);
            }
            None => {
                self.send_packet(
                    Packet::Disconnected {
                        reason: "Server full".to_string(),
                    },
                    addr,
                );
            }
        }
    }

    /// Processes incoming non-handshake packets
    async fn handle_packet(&mut self, packet: Packet, addr: SocketAddr) {
        match packet {
            Packet::Connect {
                client_version,
                player_name,
            } => {
                self.handle_connect(addr, client_version, player_name)
                    .await;
            }

            Packet::Heartbeat => {
                if self.client_for(addr).await.is_none() {
                    debug!("Heartbeat from unknown address {}", addr);
                }
            }

            Packet::Disconnect => {
                if let Some(client_id) = self.client_for(addr).await {
                    self.drop_client(client_id).await;
                }
            }

            _ => {
                warn!("Unexpected packet type from client at {}", addr);
            }
        }
    }

    async fn handle_handshake(
        &mut self,
        addr: SocketAddr,
        result: Result<RecordUpdate, HandshakeError>,
    ) {
        let Some(client_id) = self.client_for(addr).await else {
            warn!("Handshake message from unconnected address {}", addr);
            return;
        };

        let decision = match result {
            Ok(update) => self.orchestrator.handle_update(client_id, update),
            Err(e) => self.orchestrator.handle_rejection(client_id, &e),
        };
        self.apply_decision(client_id, decision).await;
    }

    /// Main server loop
    pub async fn run(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        self.spawn_network_receiver();
        self.spawn_network_sender();
        self.spawn_timeout_checker();

        info!("Server started successfully");

        loop {
            match self.server_rx.recv().await {
                Some(ServerMessage::PacketReceived { packet, addr }) => {
                    self.handle_packet(packet, addr).await;
                }
                Some(ServerMessage::HandshakeValidated { addr, result }) => {
                    self.handle_handshake(addr, result).await;
                }
                Some(ServerMessage::GraceElapsed { client_id }) => {
                    let decision = self.orchestrator.on_grace_elapsed(client_id);
                    self.apply_decision(client_id, decision).await;
                }
                Some(ServerMessage::ClientTimeout { client_id }) => {
                    self.orchestrator.remove(client_id);
                }
                Some(ServerMessage::Shutdown) | None => {
                    info!("Server shutting down");
                    break;
                }
            }
        }

        Ok(())
    }
}
