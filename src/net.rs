//! The abstract boundary between the discovery engine / mapper drivers and real
//! sockets, so both can be exercised against a fake network in tests.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::time::Instant;

use crate::mux::{MultiplexerHandle, MuxError, ReadResult, SocketHandle};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Object-safe so `discovery::discover` and the mapper drivers can hold it as
/// `Arc<dyn NetworkFacility>` without forcing every caller to monomorphize over a
/// concrete transport; implemented by hand instead of pulling in `async-trait` since
/// only this one boundary needs it.
pub trait NetworkFacility: Send + Sync {
    fn create_udp(&self, local_addr: SocketAddr) -> BoxFuture<'_, Result<SocketHandle, MuxError>>;
    fn create_tcp(
        &self,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
    ) -> BoxFuture<'_, Result<SocketHandle, MuxError>>;
    fn write(
        &self,
        handle: SocketHandle,
        bytes: Vec<u8>,
        remote: Option<SocketAddr>,
    ) -> BoxFuture<'_, Result<(), MuxError>>;
    fn read(
        &self,
        handle: SocketHandle,
        max_bytes: usize,
        deadline: Instant,
    ) -> BoxFuture<'_, Result<ReadResult, MuxError>>;
    fn close(&self, handle: SocketHandle) -> BoxFuture<'_, ()>;
    fn local_ips(&self) -> BoxFuture<'_, Result<Vec<IpAddr>, MuxError>>;
}

/// The real network, backed by the multiplexer actor.
#[derive(Clone)]
pub struct TokioNetwork {
    mux: MultiplexerHandle,
}

impl TokioNetwork {
    /// Spawns a fresh multiplexer and wraps it.
    pub fn spawn() -> Self {
        Self { mux: MultiplexerHandle::spawn() }
    }
}

impl NetworkFacility for TokioNetwork {
    fn create_udp(&self, local_addr: SocketAddr) -> BoxFuture<'_, Result<SocketHandle, MuxError>> {
        Box::pin(async move { self.mux.create_udp(local_addr).await })
    }

    fn create_tcp(
        &self,
        local_addr: SocketAddr,
        remote_addr: SocketAddr,
    ) -> BoxFuture<'_, Result<SocketHandle, MuxError>> {
        Box::pin(async move { self.mux.create_tcp(local_addr, remote_addr).await })
    }

    fn write(
        &self,
        handle: SocketHandle,
        bytes: Vec<u8>,
        remote: Option<SocketAddr>,
    ) -> BoxFuture<'_, Result<(), MuxError>> {
        Box::pin(async move { self.mux.write(handle, bytes, remote).await })
    }

    fn read(
        &self,
        handle: SocketHandle,
        max_bytes: usize,
        deadline: Instant,
    ) -> BoxFuture<'_, Result<ReadResult, MuxError>> {
        Box::pin(async move { self.mux.read(handle, max_bytes, deadline).await })
    }

    fn close(&self, handle: SocketHandle) -> BoxFuture<'_, ()> {
        Box::pin(async move { self.mux.close(handle).await })
    }

    fn local_ips(&self) -> BoxFuture<'_, Result<Vec<IpAddr>, MuxError>> {
        Box::pin(async move { self.mux.local_ips().await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tokio_network_reports_at_least_one_local_ip() {
        let net = TokioNetwork::spawn();
        let ips = net.local_ips().await.unwrap();
        // CI sandboxes without a default route may return zero; only assert the call
        // itself doesn't error.
        let _ = ips;
    }
}
