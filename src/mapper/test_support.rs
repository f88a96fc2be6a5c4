//! A scripted `NetworkFacility` so the mapper drivers can be tested without a socket,
//! the same isolation trick `discovery.rs`'s own tests use for its pure functions.

use std::future::Future;
use std::net::{IpAddr, SocketAddr};
use std::pin::Pin;
use std::sync::Mutex;
use std::time::Instant;

use crate::mux::{MuxError, ReadResult, SocketHandle};
use crate::net::NetworkFacility;

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Hands back one scripted response per `create_tcp`/`create_udp` connection, then
/// signals EOF on the next read — matching how `soap_round_trip` drains a `Connection:
/// Close` response. Every `write` is recorded so a test can assert on the bytes sent.
pub(crate) struct ScriptedNetwork {
    responses: Mutex<Vec<Vec<u8>>>,
    current: Mutex<Option<Vec<u8>>>,
    pub(crate) sent: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedNetwork {
    /// `responses` are consumed in order, one per connection opened.
    pub(crate) fn new(responses: Vec<Vec<u8>>) -> Self {
        let mut responses = responses;
        responses.reverse();
        Self { responses: Mutex::new(responses), current: Mutex::new(None), sent: Mutex::new(Vec::new()) }
    }

    fn open_connection(&self) -> SocketHandle {
        let next = self.responses.lock().unwrap().pop();
        *self.current.lock().unwrap() = next;
        SocketHandle { slot: 0, generation: 0 }
    }
}

impl NetworkFacility for ScriptedNetwork {
    fn create_udp(&self, _local_addr: SocketAddr) -> BoxFuture<'_, Result<SocketHandle, MuxError>> {
        let handle = self.open_connection();
        Box::pin(async move { Ok(handle) })
    }

    fn create_tcp(&self, _local_addr: SocketAddr, _remote_addr: SocketAddr) -> BoxFuture<'_, Result<SocketHandle, MuxError>> {
        let handle = self.open_connection();
        Box::pin(async move { Ok(handle) })
    }

    fn write(&self, _handle: SocketHandle, bytes: Vec<u8>, _remote: Option<SocketAddr>) -> BoxFuture<'_, Result<(), MuxError>> {
        self.sent.lock().unwrap().push(bytes);
        Box::pin(async { Ok(()) })
    }

    fn read(&self, _handle: SocketHandle, _max_bytes: usize, _deadline: Instant) -> BoxFuture<'_, Result<ReadResult, MuxError>> {
        let bytes = self.current.lock().unwrap().take().unwrap_or_default();
        Box::pin(async move { Ok(ReadResult { bytes, from: None }) })
    }

    fn close(&self, _handle: SocketHandle) -> BoxFuture<'_, ()> {
        Box::pin(async {})
    }

    fn local_ips(&self) -> BoxFuture<'_, Result<Vec<IpAddr>, MuxError>> {
        Box::pin(async { Ok(Vec::new()) })
    }
}
