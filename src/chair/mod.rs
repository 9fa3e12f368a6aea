//! Motion chair transport
//!
//! The tick loop never touches a socket. Commands are handed to a
//! [`ChairHandle`], which forwards them over an mpsc channel to a tokio task
//! owning the [`client::ChairClient`]. The task publishes its connection
//! state on a watch channel.
//!
//! ```text
//! Dispatcher ──try_send──► chair task ──TCP──► chair (on/off/park)
//!     ▲                        │      └─UDP──► chair (lights_off)
//!     └──── watch<ConnectionState> ◄┘
//! ```

pub mod client;

pub use client::ChairClient;

use crate::config::ChairSettings;
use std::fmt;
use std::str::FromStr;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const COMMAND_QUEUE: usize = 32;

#[derive(Clone, Default, Debug, PartialEq, Eq)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
    Failed,
    Reconnecting,
}

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("Chair not connected")]
    Disconnected,

    #[error("Chair connect timed out after {0} ms")]
    Timeout(u64),

    #[error("Chair I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChairChannel {
    Tcp,
    Udp,
    /// Handled by the client itself, nothing is sent
    Control,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChairCommand {
    On,
    Off,
    Park,
    LightsOff,
    Connect,
}

impl ChairCommand {
    pub fn payload(&self) -> &'static [u8] {
        match self {
            ChairCommand::On => &[0xA1],
            ChairCommand::Off => &[0xA2],
            ChairCommand::Park => &[0xA2, 0x01],
            ChairCommand::LightsOff => &[0xB2, 0x01, 0x01, 0x00, 0xFF, 0x00],
            ChairCommand::Connect => &[],
        }
    }

    pub fn channel(&self) -> ChairChannel {
        match self {
            ChairCommand::On | ChairCommand::Off | ChairCommand::Park => ChairChannel::Tcp,
            ChairCommand::LightsOff => ChairChannel::Udp,
            ChairCommand::Connect => ChairChannel::Control,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ChairCommand::On => "on",
            ChairCommand::Off => "off",
            ChairCommand::Park => "park",
            ChairCommand::LightsOff => "lights_off",
            ChairCommand::Connect => "connect",
        }
    }
}

impl fmt::Display for ChairCommand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for ChairCommand {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "on" => Ok(ChairCommand::On),
            "off" => Ok(ChairCommand::Off),
            "park" => Ok(ChairCommand::Park),
            "lights_off" => Ok(ChairCommand::LightsOff),
            "connect" => Ok(ChairCommand::Connect),
            other => Err(format!("unknown chair command '{}'", other)),
        }
    }
}

/// What the dispatcher sees of the chair
pub trait ChairSink: Send {
    /// Queues a command. Never blocks.
    fn submit(&mut self, command: ChairCommand);

    fn connection_state(&self) -> ConnectionState;

    /// Stops the transport. Returns the task still dropping its sockets, if
    /// there is one.
    fn close(&mut self) -> Option<JoinHandle<()>>;
}

/// Chair output when the chair is disabled in the configuration
#[derive(Debug, Default)]
pub struct NullChair;

impl ChairSink for NullChair {
    fn submit(&mut self, command: ChairCommand) {
        debug!("Chair disabled, dropping command {}", command);
    }

    fn connection_state(&self) -> ConnectionState {
        ConnectionState::Disconnected
    }

    fn close(&mut self) -> Option<JoinHandle<()>> {
        None
    }
}

/// Handle to the chair task
pub struct ChairHandle {
    command_tx: mpsc::Sender<ChairCommand>,
    state_rx: watch::Receiver<ConnectionState>,
    cancel: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl ChairHandle {
    /// Spawns the chair task. Must be called from within a tokio runtime.
    pub fn spawn(settings: ChairSettings) -> Self {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_QUEUE);
        let (state_tx, state_rx) = watch::channel(ConnectionState::Disconnected);
        let cancel = CancellationToken::new();

        info!(
            "Spawning chair transport for {} (tcp {}, udp {})",
            settings.ip_address, settings.tcp_port, settings.udp_port
        );
        let client = ChairClient::new(settings, state_tx);
        let task_handle = tokio::spawn(run_chair_task(client, command_rx, cancel.clone()));

        Self {
            command_tx,
            state_rx,
            cancel,
            task_handle: Some(task_handle),
        }
    }

    #[cfg(test)]
    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.state_rx.clone()
    }

    /// Cancels the task and waits for the sockets to close.
    pub async fn shutdown(&mut self) {
        if let Some(handle) = self.close() {
            await_chair_task(handle).await;
        }
    }
}

impl ChairSink for ChairHandle {
    fn submit(&mut self, command: ChairCommand) {
        if let Err(e) = self.command_tx.try_send(command) {
            warn!("Dropping chair command {}: {}", command, e);
        }
    }

    fn connection_state(&self) -> ConnectionState {
        self.state_rx.borrow().clone()
    }

    fn close(&mut self) -> Option<JoinHandle<()>> {
        debug!("Closing chair transport");
        self.cancel.cancel();
        self.task_handle.take()
    }
}

/// Waits for a closing chair task to finish
pub async fn await_chair_task(handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        error!("Chair task panicked: {}", e);
    }
}

impl Drop for ChairHandle {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

async fn run_chair_task(
    mut client: ChairClient,
    mut command_rx: mpsc::Receiver<ChairCommand>,
    cancel: CancellationToken,
) {
    // Initial connect is best effort, like every later one.
    if let Err(e) = client.connect().await {
        warn!("Chair not reachable at start: {}", e);
    }

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                info!("Chair transport shutting down");
                break;
            }
            command = command_rx.recv() => {
                match command {
                    Some(command) => client.execute(command).await,
                    None => {
                        debug!("Chair command channel closed");
                        break;
                    }
                }
            }
        }
    }

    client.close();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn payloads_match_the_chair_protocol() {
        assert_eq!(ChairCommand::On.payload(), &[0xA1]);
        assert_eq!(ChairCommand::Off.payload(), &[0xA2]);
        assert_eq!(ChairCommand::Park.payload(), &[0xA2, 0x01]);
        assert_eq!(
            ChairCommand::LightsOff.payload(),
            &[0xB2, 0x01, 0x01, 0x00, 0xFF, 0x00]
        );
        assert_eq!(ChairCommand::LightsOff.channel(), ChairChannel::Udp);
        assert_eq!(ChairCommand::Connect.channel(), ChairChannel::Control);
    }

    #[test]
    fn command_names_parse() {
        for command in [
            ChairCommand::On,
            ChairCommand::Off,
            ChairCommand::Park,
            ChairCommand::LightsOff,
            ChairCommand::Connect,
        ] {
            assert_eq!(command.name().parse::<ChairCommand>(), Ok(command));
        }
        assert!("launch".parse::<ChairCommand>().is_err());
    }
}
