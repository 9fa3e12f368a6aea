use crate::chair::{ChairChannel, ChairCommand, ConnectionState, TransportError};
use crate::config::ChairSettings;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::watch;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Reconnecting command client for the motion chair
pub struct ChairClient {
    settings: ChairSettings,
    stream: Option<TcpStream>,
    udp: Option<UdpSocket>,
    state_tx: watch::Sender<ConnectionState>,
}

impl ChairClient {
    pub fn new(settings: ChairSettings, state_tx: watch::Sender<ConnectionState>) -> Self {
        Self {
            settings,
            stream: None,
            udp: None,
            state_tx,
        }
    }

    #[cfg(test)]
    pub fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn set_state(&self, state: ConnectionState) {
        self.state_tx.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!("Chair connection: {:?} -> {:?}", current, state);
            *current = state;
            true
        });
    }

    /// Drops any existing connection and dials again.
    pub async fn connect(&mut self) -> Result<(), TransportError> {
        let reconnecting = self.stream.take().is_some();
        self.set_state(if reconnecting {
            ConnectionState::Reconnecting
        } else {
            ConnectionState::Connecting
        });

        let address = (self.settings.ip_address.as_str(), self.settings.tcp_port);
        let limit = self.settings.connect_timeout_ms;
        match timeout(Duration::from_millis(limit), TcpStream::connect(address)).await {
            Ok(Ok(stream)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    debug!("Could not set TCP_NODELAY: {}", e);
                }
                self.stream = Some(stream);
                self.set_state(ConnectionState::Connected);
                Ok(())
            }
            Ok(Err(e)) => {
                self.set_state(ConnectionState::Failed);
                Err(TransportError::Io(e))
            }
            Err(_) => {
                self.set_state(ConnectionState::Failed);
                Err(TransportError::Timeout(limit))
            }
        }
    }

    async fn write(&mut self, payload: &[u8]) -> Result<(), TransportError> {
        let stream = self.stream.as_mut().ok_or(TransportError::Disconnected)?;
        match stream.write_all(payload).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.stream = None;
                self.set_state(ConnectionState::Disconnected);
                Err(TransportError::Io(e))
            }
        }
    }

    /// Sends over TCP, reconnecting once if the first write fails.
    pub async fn send_tcp(&mut self, command: ChairCommand) -> Result<(), TransportError> {
        if self.stream.is_none() {
            self.connect().await?;
        }

        let payload = command.payload();
        match self.write(payload).await {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!("Chair send of {} failed ({}), reconnecting", command, first);
                self.connect().await?;
                self.write(payload).await
            }
        }
    }

    /// Fire-and-forget datagram
    pub async fn send_udp(&mut self, command: ChairCommand) -> Result<(), TransportError> {
        if self.udp.is_none() {
            self.udp = Some(UdpSocket::bind(("0.0.0.0", 0)).await?);
        }
        let socket = self.udp.as_ref().ok_or(TransportError::Disconnected)?;
        socket
            .send_to(
                command.payload(),
                (self.settings.ip_address.as_str(), self.settings.udp_port),
            )
            .await?;
        Ok(())
    }

    /// Runs one command, logging instead of failing.
    pub async fn execute(&mut self, command: ChairCommand) {
        debug!("Chair command {}", command);
        let result = match command.channel() {
            ChairChannel::Tcp => self.send_tcp(command).await,
            ChairChannel::Udp => self.send_udp(command).await,
            ChairChannel::Control => self.connect().await,
        };
        if let Err(e) = result {
            warn!("Chair command {} dropped: {}", command, e);
        }
    }

    pub fn close(&mut self) {
        if self.stream.take().is_some() {
            info!("Chair connection closed");
        }
        self.udp = None;
        self.set_state(ConnectionState::Disconnected);
    }
}
