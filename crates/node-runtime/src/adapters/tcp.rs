//! # TCP Transport
//!
//! Envelopes travel as frames: a `u32` big-endian length followed by the
//! bincode-encoded [`Envelope`]. Each destination address gets one
//! outbound task fed by an unbounded queue, so `send` never blocks; the
//! task (re)connects on demand with exponential backoff and drops frames
//! it cannot deliver, which consensus tolerates as message loss.
//!
//! Peers are resolved through the validator table; clients are dialled at
//! the reply address they put in their request.

use parking_lot::Mutex;
use ql_01_consensus::Transport;
use shared_types::{CodecError, Endpoint, Envelope, NodeId};
use std::collections::HashMap;
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::runtime::Handle;
use tokio::sync::mpsc::{unbounded_channel, UnboundedReceiver, UnboundedSender};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Frames larger than this are refused on both ends.
pub const DEFAULT_MAX_FRAME_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Error)]
pub enum FrameError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Frame of {size} bytes exceeds the {max} byte limit")]
    TooLarge { size: usize, max: usize },

    #[error(transparent)]
    Codec(#[from] CodecError),
}

/// Length-prefix an envelope.
pub fn encode_frame(envelope: &Envelope, max: usize) -> Result<Vec<u8>, FrameError> {
    let body = envelope.to_bytes()?;
    if body.len() > max {
        return Err(FrameError::TooLarge {
            size: body.len(),
            max,
        });
    }
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_be_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

/// Read one frame; `Ok(None)` on a clean end of stream.
pub async fn read_frame<R>(reader: &mut R, max: usize) -> Result<Option<Envelope>, FrameError>
where
    R: AsyncRead + Unpin,
{
    let mut len = [0u8; 4];
    match reader.read_exact(&mut len).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }
    let size = u32::from_be_bytes(len) as usize;
    if size > max {
        return Err(FrameError::TooLarge { size, max });
    }
    let mut body = vec![0u8; size];
    reader.read_exact(&mut body).await?;
    Ok(Some(Envelope::from_bytes(&body)?))
}

async fn write_frame<W>(writer: &mut W, frame: &[u8]) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(frame).await?;
    writer.flush().await
}

#[derive(Debug, Clone)]
pub struct TcpConfig {
    pub max_frame_bytes: usize,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    /// Connection attempts per frame before it is dropped.
    pub connect_attempts: u32,
}

impl Default for TcpConfig {
    fn default() -> Self {
        Self {
            max_frame_bytes: DEFAULT_MAX_FRAME_BYTES,
            initial_backoff: Duration::from_millis(50),
            max_backoff: Duration::from_secs(2),
            connect_attempts: 5,
        }
    }
}

pub struct TcpTransport {
    peers: HashMap<NodeId, String>,
    outbound: Mutex<HashMap<String, UnboundedSender<Vec<u8>>>>,
    runtime: Handle,
    config: TcpConfig,
}

impl TcpTransport {
    /// Must be called inside a tokio runtime; outbound tasks are spawned on it.
    pub fn new(peers: HashMap<NodeId, String>, config: TcpConfig) -> Result<Self, std::io::Error> {
        let runtime = Handle::try_current().map_err(|e| std::io::Error::other(e.to_string()))?;
        Ok(Self {
            peers,
            outbound: Mutex::new(HashMap::new()),
            runtime,
            config,
        })
    }

    fn resolve(&self, destination: &Endpoint) -> Option<String> {
        match destination {
            Endpoint::Node(id) => self.peers.get(id).cloned(),
            Endpoint::Client(address) if !address.is_empty() => Some(address.clone()),
            Endpoint::Client(_) => None,
        }
    }

    fn queue_for(&self, address: &str) -> UnboundedSender<Vec<u8>> {
        let mut outbound = self.outbound.lock();
        if let Some(tx) = outbound.get(address).filter(|tx| !tx.is_closed()) {
            return tx.clone();
        }
        let (tx, rx) = unbounded_channel();
        self.runtime
            .spawn(outbound_task(address.to_string(), rx, self.config.clone()));
        outbound.insert(address.to_string(), tx.clone());
        tx
    }

    /// Accept connections on `address`, feeding every decoded envelope into `inbox`.
    pub async fn listen(
        address: &str,
        inbox: UnboundedSender<Envelope>,
        max_frame_bytes: usize,
    ) -> Result<JoinHandle<()>, std::io::Error> {
        let listener = TcpListener::bind(address).await?;
        info!(address, "listening for envelopes");
        Ok(tokio::spawn(async move {
            loop {
                match listener.accept().await {
                    Ok((stream, remote)) => {
                        debug!(%remote, "inbound connection");
                        tokio::spawn(inbound_task(stream, inbox.clone(), max_frame_bytes));
                    }
                    Err(e) => warn!(error = %e, "accept failed"),
                }
                if inbox.is_closed() {
                    break;
                }
            }
        }))
    }
}

impl Transport for TcpTransport {
    fn send(&self, envelope: Envelope, destination: Endpoint) {
        let Some(address) = self.resolve(&destination) else {
            warn!(%destination, "no address for destination; dropping envelope");
            return;
        };
        let frame = match encode_frame(&envelope, self.config.max_frame_bytes) {
            Ok(frame) => frame,
            Err(e) => {
                warn!(%destination, error = %e, "cannot frame envelope");
                return;
            }
        };
        if self.queue_for(&address).send(frame).is_err() {
            debug!(address, "outbound task gone; frame dropped");
        }
    }
}

async fn connect(address: &str, config: &TcpConfig) -> Option<TcpStream> {
    let mut backoff = config.initial_backoff;
    for attempt in 1..=config.connect_attempts.max(1) {
        match TcpStream::connect(address).await {
            Ok(stream) => {
                let _ = stream.set_nodelay(true);
                return Some(stream);
            }
            Err(e) => {
                debug!(address, attempt, error = %e, "connect failed");
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(config.max_backoff);
            }
        }
    }
    None
}

async fn outbound_task(address: String, mut queue: UnboundedReceiver<Vec<u8>>, config: TcpConfig) {
    let mut stream: Option<TcpStream> = None;
    while let Some(frame) = queue.recv().await {
        for _ in 0..2 {
            if stream.is_none() {
                stream = connect(&address, &config).await;
            }
            let Some(conn) = stream.as_mut() else {
                warn!(address, "peer unreachable; frame dropped");
                break;
            };
            match write_frame(conn, &frame).await {
                Ok(()) => break,
                Err(e) => {
                    debug!(address, error = %e, "write failed; reconnecting");
                    stream = None;
                }
            }
        }
    }
}

async fn inbound_task(mut stream: TcpStream, inbox: UnboundedSender<Envelope>, max: usize) {
    loop {
        match read_frame(&mut stream, max).await {
            Ok(Some(envelope)) => {
                if inbox.send(envelope).is_err() {
                    return;
                }
            }
            Ok(None) => return,
            Err(e) => {
                warn!(error = %e, "closing connection after bad frame");
                return;
            }
        }
    }
}
