//! The multiplexer's single-owner event loop.
//!
//! Modeled on `client.rs`'s `Client::run`: one task owns all sockets and processes
//! commands to completion before looking at the next one. Reads are the one operation
//! that can legitimately take a long time (a gateway may never answer), so they're
//! driven concurrently through a `JoinSet` keyed by handle instead of blocking the loop;
//! every other command (create, write, close) completes promptly and is handled inline.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpStream, UdpSocket};
use tokio::sync::mpsc;
use tokio::task::JoinSet;

use super::command::{Command, MuxError, ReadResult, SocketHandle};

/// Writes queued past this many bytes on a single socket are rejected with `WouldBlock`.
const SEND_BUFFER_CAP: usize = 64 * 1024;

enum SocketKind {
    Udp(Arc<UdpSocket>),
    Tcp(Arc<TcpStream>),
}

struct Slot {
    kind: SocketKind,
    generation: u64,
    outstanding_bytes: usize,
}

/// Runs the multiplexer until a `Kill` command arrives or the command channel closes.
/// Spawn with `tokio::spawn(run(receiver))`.
pub async fn run(mut commands: mpsc::Receiver<Command>) {
    let mut slots: Vec<Option<Slot>> = Vec::new();
    let mut next_generation: u64 = 0;
    let mut reads: JoinSet<()> = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            command = commands.recv() => {
                let Some(command) = command else { break };
                if !handle_command(command, &mut slots, &mut next_generation, &mut reads).await {
                    break;
                }
            }
            Some(_) = reads.join_next(), if !reads.is_empty() => {}
        }
    }

    // Drain in-flight reads so their oneshot replies still fire (with a shutdown error,
    // since the sockets are about to be dropped) rather than silently leaking.
    reads.shutdown().await;
}

fn next_free_slot(slots: &mut Vec<Option<Slot>>) -> usize {
    if let Some(index) = slots.iter().position(|slot| slot.is_none()) {
        index
    } else {
        slots.push(None);
        slots.len() - 1
    }
}

/// Returns `false` if the loop should stop after this command.
async fn handle_command(
    command: Command,
    slots: &mut Vec<Option<Slot>>,
    next_generation: &mut u64,
    reads: &mut JoinSet<()>,
) -> bool {
    match command {
        Command::CreateUdp { local_addr, reply } => {
            let _ = reply.send(create_udp(local_addr, slots, next_generation));
        }
        Command::CreateTcp { local_addr, remote_addr, reply } => {
            let _ = reply.send(create_tcp(local_addr, remote_addr, slots, next_generation).await);
        }
        Command::Write { handle, bytes, remote, reply } => {
            let _ = reply.send(write(handle, &bytes, remote, slots));
        }
        Command::Read { handle, max_bytes, deadline, reply } => {
            spawn_read(handle, max_bytes, deadline, reply, slots, reads);
        }
        Command::Close { handle } => {
            close(handle, slots);
        }
        Command::Kill => {
            return false;
        }
        Command::GetLocalIps { reply } => {
            let _ = reply.send(local_ips());
        }
        Command::LocalAddr { handle, reply } => {
            let _ = reply.send(local_addr(handle, slots));
        }
    }
    true
}

fn local_addr(handle: SocketHandle, slots: &mut Vec<Option<Slot>>) -> Result<SocketAddr, MuxError> {
    let slot = lookup(handle, slots)?;
    let addr = match &slot.kind {
        SocketKind::Udp(socket) => socket.local_addr()?,
        SocketKind::Tcp(stream) => stream.local_addr()?,
    };
    Ok(addr)
}

fn create_udp(
    local_addr: SocketAddr,
    slots: &mut Vec<Option<Slot>>,
    next_generation: &mut u64,
) -> Result<SocketHandle, MuxError> {
    // Binding is cheap and synchronous on a local address; no need to go through the
    // read-task pool for it.
    let socket = std::net::UdpSocket::bind(local_addr)?;
    socket.set_nonblocking(true)?;
    let socket = UdpSocket::from_std(socket)?;
    let generation = *next_generation;
    *next_generation += 1;
    let slot = next_free_slot(slots);
    slots[slot] = Some(Slot {
        kind: SocketKind::Udp(Arc::new(socket)),
        generation,
        outstanding_bytes: 0,
    });
    Ok(SocketHandle { slot, generation })
}

async fn connect_tcp(local_addr: SocketAddr, remote_addr: SocketAddr) -> std::io::Result<TcpStream> {
    let socket = if local_addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4()?
    } else {
        tokio::net::TcpSocket::new_v6()?
    };
    socket.bind(local_addr)?;
    socket.connect(remote_addr).await
}

/// Awaited inline: unlike `Read`, a connect attempt is driven by this crate's own
/// callers (the discovery engine and the mapper drivers), which already run one
/// attempt per candidate gateway concurrently via their own `JoinSet`s, so there's no
/// need for the multiplexer itself to multiplex connects too.
async fn create_tcp(
    local_addr: SocketAddr,
    remote_addr: SocketAddr,
    slots: &mut Vec<Option<Slot>>,
    next_generation: &mut u64,
) -> Result<SocketHandle, MuxError> {
    let stream = connect_tcp(local_addr, remote_addr).await?;
    let generation = *next_generation;
    *next_generation += 1;
    let slot = next_free_slot(slots);
    slots[slot] = Some(Slot {
        kind: SocketKind::Tcp(Arc::new(stream)),
        generation,
        outstanding_bytes: 0,
    });
    Ok(SocketHandle { slot, generation })
}

fn lookup<'a>(handle: SocketHandle, slots: &'a mut Vec<Option<Slot>>) -> Result<&'a mut Slot, MuxError> {
    match slots.get_mut(handle.slot).and_then(|slot| slot.as_mut()) {
        Some(slot) if slot.generation == handle.generation => Ok(slot),
        _ => Err(MuxError::UnknownHandle),
    }
}

fn write(
    handle: SocketHandle,
    bytes: &[u8],
    remote: Option<SocketAddr>,
    slots: &mut Vec<Option<Slot>>,
) -> Result<(), MuxError> {
    let slot = lookup(handle, slots)?;
    if slot.outstanding_bytes.saturating_add(bytes.len()) > SEND_BUFFER_CAP {
        return Err(MuxError::WouldBlock);
    }
    let result = match &slot.kind {
        SocketKind::Udp(socket) => match remote {
            Some(remote) => socket.try_send_to(bytes, remote),
            None => socket.try_send(bytes),
        },
        SocketKind::Tcp(stream) => stream.try_write(bytes),
    };
    match result {
        Ok(_) => Ok(()),
        Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
            slot.outstanding_bytes += bytes.len();
            Err(MuxError::WouldBlock)
        }
        Err(err) => Err(err.into()),
    }
}

fn close(handle: SocketHandle, slots: &mut Vec<Option<Slot>>) {
    if let Some(slot) = slots.get_mut(handle.slot) {
        if slot.as_ref().is_some_and(|slot| slot.generation == handle.generation) {
            *slot = None;
        }
    }
}

fn local_ips() -> Result<Vec<std::net::IpAddr>, MuxError> {
    // No portable stdlib way to enumerate interface addresses; approximate it by
    // asking the routing table which local address would be used to reach the
    // internet, for both address families. Good enough for picking a PCP/NAT-PMP
    // client address, which is all callers use this for.
    let mut addrs = Vec::new();
    if let Ok(socket) = std::net::UdpSocket::bind("0.0.0.0:0") {
        if socket.connect("8.8.8.8:80").is_ok() {
            if let Ok(addr) = socket.local_addr() {
                addrs.push(addr.ip());
            }
        }
    }
    if let Ok(socket) = std::net::UdpSocket::bind("[::]:0") {
        if socket.connect("[2001:4860:4860::8888]:80").is_ok() {
            if let Ok(addr) = socket.local_addr() {
                addrs.push(addr.ip());
            }
        }
    }
    Ok(addrs)
}

fn spawn_read(
    handle: SocketHandle,
    max_bytes: usize,
    deadline: std::time::Instant,
    reply: tokio::sync::oneshot::Sender<Result<ReadResult, MuxError>>,
    slots: &mut Vec<Option<Slot>>,
    reads: &mut JoinSet<()>,
) {
    let slot = match lookup(handle, slots) {
        Ok(slot) => slot,
        Err(err) => {
            let _ = reply.send(Err(err));
            return;
        }
    };
    let kind = match &slot.kind {
        SocketKind::Udp(socket) => SocketKind::Udp(Arc::clone(socket)),
        SocketKind::Tcp(stream) => SocketKind::Tcp(Arc::clone(stream)),
    };

    reads.spawn(async move {
        let outcome = tokio::time::timeout(
            deadline.saturating_duration_since(std::time::Instant::now()),
            read_once(kind, max_bytes),
        )
        .await
        .unwrap_or(Err(MuxError::Timeout));
        let _ = reply.send(outcome);
    });
}

async fn read_once(kind: SocketKind, max_bytes: usize) -> Result<ReadResult, MuxError> {
    let mut buf = vec![0u8; max_bytes];
    match kind {
        SocketKind::Udp(socket) => {
            let (len, from) = socket.recv_from(&mut buf).await?;
            buf.truncate(len);
            Ok(ReadResult { bytes: buf, from: Some(from) })
        }
        SocketKind::Tcp(stream) => loop {
            stream.readable().await?;
            match stream.try_read(&mut buf) {
                Ok(len) => {
                    buf.truncate(len);
                    return Ok(ReadResult { bytes: buf, from: None });
                }
                Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => continue,
                Err(err) => return Err(err.into()),
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::super::handle::MultiplexerHandle;
    use std::time::Duration;

    #[tokio::test]
    async fn round_trips_a_udp_datagram() {
        let mux = MultiplexerHandle::spawn();
        let a = mux.create_udp("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b = mux.create_udp("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let b_addr = mux.local_addr(b).await.unwrap();

        mux.write(a, b"hello".to_vec(), Some(b_addr)).await.unwrap();
        let deadline = std::time::Instant::now() + Duration::from_secs(2);
        let result = mux.read(b, 1500, deadline).await.unwrap();
        assert_eq!(result.bytes, b"hello");
    }

    #[tokio::test]
    async fn read_times_out_with_no_sender() {
        let mux = MultiplexerHandle::spawn();
        let a = mux.create_udp("127.0.0.1:0".parse().unwrap()).await.unwrap();
        let deadline = std::time::Instant::now() + Duration::from_millis(50);
        let result = mux.read(a, 1500, deadline).await;
        assert!(matches!(result, Err(super::super::command::MuxError::Timeout)));
    }

    #[tokio::test]
    async fn close_invalidates_the_handle() {
        let mux = MultiplexerHandle::spawn();
        let a = mux.create_udp("127.0.0.1:0".parse().unwrap()).await.unwrap();
        mux.close(a).await;
        let deadline = std::time::Instant::now() + Duration::from_millis(50);
        let result = mux.read(a, 1500, deadline).await;
        assert!(matches!(result, Err(super::super::command::MuxError::UnknownHandle)));
    }
}
