//! The public, cloneable front door to a running multiplexer.

use std::net::SocketAddr;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use super::actor;
use super::command::{Command, MuxError, ReadResult, SocketHandle};

/// Commands queue here before the actor task picks them up; bounded so a runaway
/// caller applies backpressure instead of growing memory without limit.
const COMMAND_QUEUE_DEPTH: usize = 256;

#[derive(Clone)]
pub struct MultiplexerHandle {
    commands: mpsc::Sender<Command>,
}

impl MultiplexerHandle {
    /// Spawns the actor task and returns a handle to it. Dropping every clone of the
    /// handle closes the command channel, which the actor treats the same as `kill()`.
    pub fn spawn() -> Self {
        let (sender, receiver) = mpsc::channel(COMMAND_QUEUE_DEPTH);
        tokio::spawn(actor::run(receiver));
        Self { commands: sender }
    }

    pub async fn create_udp(&self, local_addr: SocketAddr) -> Result<SocketHandle, MuxError> {
        let (reply, result) = oneshot::channel();
        self.send(Command::CreateUdp { local_addr, reply }).await?;
        result.await.map_err(|_| MuxError::Shutdown)?
    }

    pub async fn create_tcp(
        &self,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
    ) -> Result<SocketHandle, MuxError> {
        let (reply, result) = oneshot::channel();
        self.send(Command::CreateTcp { local_addr, remote_addr, reply }).await?;
        result.await.map_err(|_| MuxError::Shutdown)?
    }

    pub async fn write(
        &self,
        handle: SocketHandle,
        bytes: Vec<u8>,
        remote: Option<SocketAddr>,
    ) -> Result<(), MuxError> {
        let (reply, result) = oneshot::channel();
        self.send(Command::Write { handle, bytes, remote, reply }).await?;
        result.await.map_err(|_| MuxError::Shutdown)?
    }

    pub async fn read(
        &self,
        handle: SocketHandle,
        max_bytes: usize,
        deadline: Instant,
    ) -> Result<ReadResult, MuxError> {
        let (reply, result) = oneshot::channel();
        self.send(Command::Read { handle, max_bytes, deadline, reply }).await?;
        result.await.map_err(|_| MuxError::Shutdown)?
    }

    pub async fn close(&self, handle: SocketHandle) {
        let _ = self.commands.send(Command::Close { handle }).await;
    }

    pub async fn kill(&self) {
        let _ = self.commands.send(Command::Kill).await;
    }

    pub async fn local_ips(&self) -> Result<Vec<std::net::IpAddr>, MuxError> {
        let (reply, result) = oneshot::channel();
        self.send(Command::GetLocalIps { reply }).await?;
        result.await.map_err(|_| MuxError::Shutdown)?
    }

    pub async fn local_addr(&self, handle: SocketHandle) -> Result<SocketAddr, MuxError> {
        let (reply, result) = oneshot::channel();
        self.send(Command::LocalAddr { handle, reply }).await?;
        result.await.map_err(|_| MuxError::Shutdown)?
    }

    async fn send(&self, command: Command) -> Result<(), MuxError> {
        self.commands.send(command).await.map_err(|_| MuxError::Shutdown)
    }
}
