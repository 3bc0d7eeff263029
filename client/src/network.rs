use bincode::{deserialize, serialize};
use log::{info, warn};
use shared::{Packet, PROTOCOL_VERSION};
use std::net::SocketAddr;
use std::time::Duration;
use tokio::net::UdpSocket;
use tokio::time::{interval, timeout, Instant};

/// How often the client tells the server it is still there
pub const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(1);

/// How the session ended from the client's point of view
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Still connected when the client stopped waiting
    Connected,
    /// The server ended the session
    Disconnected { reason: String },
}

pub struct Client {
    socket: UdpSocket,
    server_addr: SocketAddr,
    player_name: String,
    client_id: Option<u32>,
}

impl Client {
    pub async fn new(
        server_addr: &str,
        player_name: &str,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let socket = UdpSocket::bind("0.0.0.0:0").await?;
        let server_addr = server_addr.parse()?;

        Ok(Client {
            socket,
            server_addr,
            player_name: player_name.to_string(),
            client_id: None,
        })
    }

    pub fn client_id(&self) -> Option<u32> {
        self.client_id
    }

    pub async fn send_packet(&self, packet: &Packet) -> Result<(), Box<dyn std::error::Error>> {
        let data = serialize(packet)?;
        self.socket.send_to(&data, self.server_addr).await?;
        Ok(())
    }

    async fn recv_packet(&self) -> Result<Packet, Box<dyn std::error::Error>> {
        let mut buffer = [0u8; 4096];
        loop {
            let (len, addr) = self.socket.recv_from(&mut buffer).await?;
            if addr != self.server_addr {
                warn!("Ignoring packet from unexpected address {}", addr);
                continue;
            }
            return Ok(deserialize::<Packet>(&buffer[..len])?);
        }
    }

    /// Sends a connect request and waits for the server's answer.
    pub async fn connect(&mut self, wait: Duration) -> Result<u32, Box<dyn std::error::Error>> {
        info!("Connecting to server {} as {}...", self.server_addr, self.player_name);

        let packet = Packet::Connect {
            client_version: PROTOCOL_VERSION,
            player_name: self.player_name.clone(),
        };
        self.send_packet(&packet).await?;

        match timeout(wait, self.recv_packet()).await?? {
            Packet::Connected { client_id } => {
                info!("Connected! Client ID: {}", client_id);
                self.client_id = Some(client_id);
                Ok(client_id)
            }
            Packet::Disconnected { reason } => Err(format!("Connection refused: {}", reason).into()),
            other => Err(format!("Unexpected packet {:?}", other).into()),
        }
    }

    pub async fn send_handshake(&self, packets: &[Packet]) -> Result<(), Box<dyn std::error::Error>> {
        for packet in packets {
            self.send_packet(packet).await?;
        }
        Ok(())
    }

    /// Keeps the session alive with heartbeats until the server disconnects
    /// us or `duration` passes.
    pub async fn run(&mut self, duration: Duration) -> Result<SessionOutcome, Box<dyn std::error::Error>> {
        let deadline = Instant::now() + duration;
        let mut heartbeat = interval(HEARTBEAT_INTERVAL);

        let outcome = loop {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {
                    break SessionOutcome::Connected;
                }
                _ = heartbeat.tick() => {
                    self.send_packet(&Packet::Heartbeat).await?;
                }
                packet = self.recv_packet() => {
                    match packet? {
                        Packet::Disconnected { reason } => {
                            warn!("Disconnected: {}", reason);
                            break SessionOutcome::Disconnected { reason };
                        }
                        other => warn!("Unexpected packet type {:?}", other),
                    }
                }
            }
        };

        if let SessionOutcome::Disconnected { .. } = outcome {
            self.client_id = None;
        }
        Ok(outcome)
    }

    pub async fn disconnect(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if self.client_id.take().is_some() {
            self.send_packet(&Packet::Disconnect).await?;
        }
        Ok(())
    }
}
