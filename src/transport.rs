//! # Transport — Message Delivery Between Tiers
//!
//! A node only ever needs two capabilities: listen on an endpoint and receive
//! [`Message`]s from an inbox, and send a `Message` to a peer endpoint. The
//! [`Transport`] trait captures exactly that, so the same coordinator,
//! dispatcher and worker loops run over real sockets or in-process channels.
//!
//! ## TCP framing
//!
//! Each frame is a 4-byte big-endian length followed by that many bytes of
//! JSON. A connection carries any number of frames. Zero-length and oversized
//! frames end the connection with a warning; they never reach the node.
//!
//! ## Outbox
//!
//! Sends are queued per peer. Each peer gets its own delivery task that
//! retries with a fixed backoff, so one unreachable peer never delays
//! messages to the others and messages to one peer keep their order.

use anyhow::{Context, Result};
use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::lock_or_recover;
use crate::record::{Endpoint, Message};

/// Upper bound on one frame; a record for a 100k-digit number fits comfortably.
pub const MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

pub type Inbox = mpsc::UnboundedReceiver<Message>;

/// A message addressed to a peer, produced by a tier's state machine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub to: Endpoint,
    pub message: Message,
}

impl Outbound {
    pub fn new(to: Endpoint, message: Message) -> Self {
        Outbound { to, message }
    }
}

pub trait Transport: Clone + Send + Sync + 'static {
    /// Bind `bind_host:port` (port 0 picks a free one) and advertise the
    /// result under `advertise_host`.
    fn listen(
        &self,
        bind_host: &str,
        advertise_host: &str,
        port: u16,
    ) -> impl Future<Output = Result<(Endpoint, Inbox)>> + Send;

    /// Deliver one message. An error means the peer was not reachable and the
    /// caller may retry.
    fn send(&self, to: &Endpoint, message: &Message) -> impl Future<Output = Result<()>> + Send;
}

pub fn encode_frame(message: &Message) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(message)?;
    if body.len() > MAX_FRAME_BYTES {
        anyhow::bail!("frame too large: max {} got {}", MAX_FRAME_BYTES, body.len());
    }
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Read the next frame; `Ok(None)` on a clean end of stream between frames.
pub async fn read_frame<R>(reader: &mut R) -> Result<Option<Message>>
where
    R: AsyncRead + Unpin,
{
    let mut header = [0u8; 4];
    match reader.read_exact(&mut header).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let length = u32::from_be_bytes(header) as usize;
    if length == 0 {
        anyhow::bail!("frame length cannot be zero");
    }
    if length > MAX_FRAME_BYTES {
        anyhow::bail!("frame too large: max {} got {}", MAX_FRAME_BYTES, length);
    }
    let mut body = vec![0u8; length];
    reader
        .read_exact(&mut body)
        .await
        .context("frame body truncated")?;
    Ok(Some(serde_json::from_slice(&body)?))
}

/// Length-prefixed JSON over TCP, one cached connection per peer.
#[derive(Clone, Default)]
pub struct TcpTransport {
    connections: Arc<Mutex<HashMap<Endpoint, Arc<tokio::sync::Mutex<TcpStream>>>>>,
}

impl TcpTransport {
    pub fn new() -> Self {
        TcpTransport::default()
    }

    async fn connection(&self, to: &Endpoint) -> Result<Arc<tokio::sync::Mutex<TcpStream>>> {
        if let Some(conn) = lock_or_recover(&self.connections).get(to) {
            return Ok(Arc::clone(conn));
        }
        let stream = TcpStream::connect((to.host.as_str(), to.port))
            .await
            .with_context(|| format!("connecting to {}", to))?;
        stream.set_nodelay(true)?;
        let conn = Arc::new(tokio::sync::Mutex::new(stream));
        lock_or_recover(&self.connections).insert(to.clone(), Arc::clone(&conn));
        Ok(conn)
    }
}

impl Transport for TcpTransport {
    async fn listen(&self, bind_host: &str, advertise_host: &str, port: u16) -> Result<(Endpoint, Inbox)> {
        let listener = TcpListener::bind((bind_host, port))
            .await
            .with_context(|| format!("binding {}:{}", bind_host, port))?;
        let local = listener.local_addr()?;
        let endpoint = Endpoint::new(advertise_host, local.port());
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(accept_loop(listener, tx));
        Ok((endpoint, rx))
    }

    async fn send(&self, to: &Endpoint, message: &Message) -> Result<()> {
        let frame = encode_frame(message)?;
        let conn = self.connection(to).await?;
        let mut stream = conn.lock().await;
        let written = async {
            stream.write_all(&frame).await?;
            stream.flush().await
        }
        .await;
        if let Err(e) = written {
            // reconnect on the next attempt
            lock_or_recover(&self.connections).remove(to);
            return Err(e).with_context(|| format!("sending {} to {}", message.intent(), to));
        }
        Ok(())
    }
}

/// Accept until the node drops its inbox, then release the port.
async fn accept_loop(listener: TcpListener, tx: mpsc::UnboundedSender<Message>) {
    loop {
        tokio::select! {
            _ = tx.closed() => break,
            accepted = listener.accept() => match accepted {
                Ok((stream, peer)) => {
                    debug!(%peer, "connection accepted");
                    tokio::spawn(read_connection(stream, tx.clone()));
                }
                Err(e) => warn!(error = %e, "accept failed"),
            },
        }
    }
}

async fn read_connection(mut stream: TcpStream, tx: mpsc::UnboundedSender<Message>) {
    loop {
        match read_frame(&mut stream).await {
            Ok(Some(message)) => {
                if tx.send(message).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!(error = %e, "dropping connection after bad frame");
                break;
            }
        }
    }
}

/// In-process delivery through a shared endpoint registry.
#[derive(Clone)]
pub struct ChannelTransport {
    registry: Arc<Mutex<HashMap<Endpoint, mpsc::UnboundedSender<Message>>>>,
    next_port: Arc<AtomicU16>,
}

impl Default for ChannelTransport {
    fn default() -> Self {
        ChannelTransport {
            registry: Arc::new(Mutex::new(HashMap::new())),
            next_port: Arc::new(AtomicU16::new(40000)),
        }
    }
}

impl ChannelTransport {
    pub fn new() -> Self {
        ChannelTransport::default()
    }

    /// Number of endpoints whose inbox is still open.
    pub fn live_endpoints(&self) -> usize {
        lock_or_recover(&self.registry)
            .values()
            .filter(|tx| !tx.is_closed())
            .count()
    }
}

impl Transport for ChannelTransport {
    async fn listen(&self, _bind_host: &str, advertise_host: &str, port: u16) -> Result<(Endpoint, Inbox)> {
        let port = if port == 0 {
            self.next_port.fetch_add(1, Ordering::Relaxed)
        } else {
            port
        };
        let endpoint = Endpoint::new(advertise_host, port);
        let mut registry = lock_or_recover(&self.registry);
        if registry.get(&endpoint).is_some_and(|tx| !tx.is_closed()) {
            anyhow::bail!("address {} already in use", endpoint);
        }
        let (tx, rx) = mpsc::unbounded_channel();
        registry.insert(endpoint.clone(), tx);
        Ok((endpoint, rx))
    }

    async fn send(&self, to: &Endpoint, message: &Message) -> Result<()> {
        let tx = lock_or_recover(&self.registry)
            .get(to)
            .cloned()
            .with_context(|| format!("no listener at {}", to))?;
        tx.send(message.clone())
            .map_err(|_| anyhow::anyhow!("listener at {} is gone", to))
    }
}

/// Fixed-backoff retry policy for one peer.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub backoff: Duration,
    /// `None` retries until the outbox is closed.
    pub limit: Option<u32>,
}

/// Per-peer ordered delivery with retry.
pub struct Outbox<T: Transport> {
    transport: T,
    policy: RetryPolicy,
    queues: HashMap<Endpoint, mpsc::UnboundedSender<Message>>,
    tasks: Vec<JoinHandle<()>>,
}

impl<T: Transport> Outbox<T> {
    pub fn new(transport: T, policy: RetryPolicy) -> Self {
        Outbox {
            transport,
            policy,
            queues: HashMap::new(),
            tasks: Vec::new(),
        }
    }

    pub fn push(&mut self, outbound: Outbound) {
        let Outbound { to, message } = outbound;
        if let Some(queue) = self.queues.get(&to) {
            if queue.send(message.clone()).is_ok() {
                return;
            }
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let _ = tx.send(message);
        let task = tokio::spawn(deliver(self.transport.clone(), to.clone(), rx, self.policy));
        self.queues.insert(to, tx);
        self.tasks.push(task);
    }

    pub fn push_all(&mut self, batch: impl IntoIterator<Item = Outbound>) {
        for outbound in batch {
            self.push(outbound);
        }
    }

    /// Stop accepting messages and wait up to `grace` for queued ones to go out.
    pub async fn close(self, grace: Duration) {
        drop(self.queues);
        let deadline = tokio::time::Instant::now() + grace;
        for task in self.tasks {
            let abort = task.abort_handle();
            if tokio::time::timeout_at(deadline, task).await.is_err() {
                abort.abort();
            }
        }
    }
}

async fn deliver<T: Transport>(
    transport: T,
    to: Endpoint,
    mut queue: mpsc::UnboundedReceiver<Message>,
    policy: RetryPolicy,
) {
    while let Some(message) = queue.recv().await {
        let mut failures = 0u32;
        loop {
            match transport.send(&to, &message).await {
                Ok(()) => break,
                Err(e) => {
                    failures += 1;
                    if policy.limit.is_some_and(|limit| failures >= limit) {
                        warn!(peer = %to, intent = message.intent(), error = %e, failures, "giving up on peer");
                        return;
                    }
                    debug!(peer = %to, intent = message.intent(), error = %e, "send failed, retrying");
                    tokio::time::sleep(policy.backoff).await;
                }
            }
        }
    }
}
