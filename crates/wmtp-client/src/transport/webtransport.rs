//! WebTransport client
//!
//! One QUIC connection, one bidirectional control stream. Outbound requests
//! are written as compact JSON; inbound bytes are run through
//! [`InboundDecoder`] by a reader task, and every message it yields is
//! published as [`TransportEvent::Message`] in arrival order.
//!
//! Explicit disconnects, remote end-of-stream and read errors all end in
//! one teardown path. Each successful connect gets a new generation
//! number, and teardown only acts on the generation it was asked for, so a
//! late reader from an old connection cannot close a newer one. Teardown
//! cancels the link's token first, which also aborts a write stalled on
//! flow control.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::BytesMut;
use tokio::sync::{broadcast, watch, Mutex};
use tokio_util::codec::Encoder;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use wtransport::endpoint::endpoint_side;
use wtransport::stream::{RecvStream, SendStream};
use wtransport::tls::Sha256Digest;
use wtransport::{ClientConfig as QuicConfig, Connection, Endpoint, VarInt};

use wmtp_core::config::ClientConfig;
use wmtp_core::{CertificateFingerprint, ConnectionState, Transport, TransportError, TransportEvent};
use wmtp_protocol::{InboundDecoder, JsonFrameCodec, ProtocolError, Request, Response};

/// Channel capacity for transport events.
///
/// Holds lifecycle notifications and inbound messages between the reader
/// task and subscribers. A subscriber that falls further behind than this
/// sees `Lagged` and skips ahead.
const TRANSPORT_EVENT_CHANNEL_CAPACITY: usize = 256;

/// Size of each read from the control stream
const READ_CHUNK_SIZE: usize = 8192;

/// How long a graceful close may wait for the peer to acknowledge `finish`
const CLOSE_GRACE: Duration = Duration::from_millis(500);

/// Connection parameters, fixed for the life of a client
#[derive(Debug, Clone)]
pub struct TransportOptions {
    /// `https://host:port[/path]`
    pub url: String,
    /// Trust exactly this certificate instead of the platform roots
    pub fingerprint: Option<CertificateFingerprint>,
    /// Bound on handshake plus stream open
    pub connect_timeout: Duration,
    pub keep_alive_interval: Option<Duration>,
    pub max_idle_timeout: Duration,
    /// Largest inbound message buffered before it is discarded
    pub max_frame_size: usize,
}

impl TransportOptions {
    /// Options for `url` with default timeouts and no pinned certificate
    pub fn new(url: impl Into<String>) -> Self {
        let defaults = ClientConfig::default();
        Self {
            url: url.into(),
            fingerprint: None,
            connect_timeout: defaults.connect_timeout,
            keep_alive_interval: defaults.keep_alive_interval,
            max_idle_timeout: defaults.max_idle_timeout,
            max_frame_size: defaults.max_frame_size,
        }
    }

    /// Pin the server certificate by its base64 SHA-256 digest
    pub fn with_fingerprint_base64(mut self, text: &str) -> Result<Self, TransportError> {
        self.fingerprint = Some(CertificateFingerprint::from_base64(text)?);
        Ok(self)
    }

    pub fn with_fingerprint(mut self, fingerprint: CertificateFingerprint) -> Self {
        self.fingerprint = Some(fingerprint);
        self
    }

    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// Build options from a loaded client configuration
    pub fn from_config(config: &ClientConfig) -> Result<Self, TransportError> {
        let fingerprint = match config.cert_hash.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(text) => Some(CertificateFingerprint::from_base64(text)?),
        };
        Ok(Self {
            url: config.url.clone(),
            fingerprint,
            connect_timeout: config.connect_timeout,
            keep_alive_interval: config.keep_alive_interval,
            max_idle_timeout: config.max_idle_timeout,
            max_frame_size: config.max_frame_size,
        })
    }

    fn check_url(&self) -> Result<(), TransportError> {
        match self.url.strip_prefix("https://") {
            Some(rest) if !rest.is_empty() => Ok(()),
            _ => Err(TransportError::InvalidAddress(format!(
                "expected an https:// URL, got '{}'",
                self.url
            ))),
        }
    }

    fn quic_config(&self) -> Result<QuicConfig, TransportError> {
        let builder = QuicConfig::builder().with_bind_default();
        let builder = match &self.fingerprint {
            Some(fp) => builder.with_server_certificate_hashes([Sha256Digest::new(*fp.as_bytes())]),
            None => builder.with_native_certs(),
        };
        let config = builder
            .keep_alive_interval(self.keep_alive_interval)
            .max_idle_timeout(Some(self.max_idle_timeout))
            .map_err(|e| {
                TransportError::CapabilityUnavailable(format!("idle timeout out of range: {:?}", e))
            })?
            .build();
        Ok(config)
    }
}

/// Handles owned by a live connection
struct Link {
    generation: u64,
    /// Kept alive for as long as the connection
    _endpoint: Endpoint<endpoint_side::Client>,
    connection: Connection,
    /// Locked separately from the link so a stalled write never blocks teardown
    send: Arc<Mutex<SendStream>>,
    /// Stops the reader and any in-flight write
    cancel: CancellationToken,
}

struct Inner {
    link: Mutex<Option<Link>>,
    /// Generation of the live link, 0 when there is none
    active: AtomicU64,
    next_generation: AtomicU64,
    state: watch::Sender<ConnectionState>,
    events: broadcast::Sender<TransportEvent>,
}

impl Inner {
    fn emit(&self, event: TransportEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    fn set_state(&self, state: ConnectionState) {
        self.state.send_replace(state);
    }

    fn is_active(&self, generation: u64) -> bool {
        self.active.load(Ordering::SeqCst) == generation
    }

    /// Release the link if it belongs to `generation` (any link for `None`).
    /// Returns whether this call did the teardown.
    async fn teardown(&self, generation: Option<u64>) -> bool {
        let link = {
            let mut guard = self.link.lock().await;
            match guard.as_ref() {
                Some(link) if generation.map_or(true, |g| g == link.generation) => guard.take(),
                _ => None,
            }
        };
        let Some(link) = link else {
            return false;
        };

        self.active.store(0, Ordering::SeqCst);
        link.cancel.cancel();

        // Best effort: finish the stream, then close with code 0
        let finish = async {
            let mut send = link.send.lock().await;
            send.finish().await
        };
        match tokio::time::timeout(CLOSE_GRACE, finish).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => debug!("Finishing control stream failed: {}", e),
            Err(_) => debug!("Finishing control stream timed out"),
        }
        link.connection.close(VarInt::from_u32(0), b"");

        self.set_state(ConnectionState::Disconnected);
        info!("Disconnected (generation {})", link.generation);
        self.emit(TransportEvent::Disconnected);
        true
    }
}

/// Holds the state at `Connecting` for one connect attempt
///
/// Dropping it without [`ConnectAttempt::succeed`] puts the state back to
/// `Disconnected`, including when the caller drops `connect` mid-handshake.
struct ConnectAttempt<'a> {
    inner: &'a Inner,
    succeeded: bool,
}

impl<'a> ConnectAttempt<'a> {
    fn begin(inner: &'a Inner) -> Self {
        inner.set_state(ConnectionState::Connecting);
        Self {
            inner,
            succeeded: false,
        }
    }

    fn succeed(mut self) {
        self.succeeded = true;
    }
}

impl Drop for ConnectAttempt<'_> {
    fn drop(&mut self) {
        if !self.succeeded {
            self.inner.set_state(ConnectionState::Disconnected);
        }
    }
}

/// [`Transport`] over WebTransport
pub struct WebTransportClient {
    options: TransportOptions,
    inner: Arc<Inner>,
    /// Serializes concurrent `connect` calls
    connecting: Mutex<()>,
}

impl WebTransportClient {
    pub fn new(options: TransportOptions) -> Self {
        let (events, _) = broadcast::channel(TRANSPORT_EVENT_CHANNEL_CAPACITY);
        let (state, _) = watch::channel(ConnectionState::Disconnected);
        Self {
            options,
            inner: Arc::new(Inner {
                link: Mutex::new(None),
                active: AtomicU64::new(0),
                next_generation: AtomicU64::new(1),
                state,
                events,
            }),
            connecting: Mutex::new(()),
        }
    }

    pub fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Watch connection state changes
    pub fn watch_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    async fn establish(
        &self,
        endpoint: &Endpoint<endpoint_side::Client>,
    ) -> Result<(Connection, SendStream, RecvStream), TransportError> {
        let connection = endpoint
            .connect(self.options.url.as_str())
            .await
            .map_err(|e| TransportError::Handshake(e.to_string()))?;

        let (send, recv) = connection
            .open_bi()
            .await
            .map_err(|e| TransportError::StreamOpen(e.to_string()))?
            .await
            .map_err(|e| TransportError::StreamOpen(e.to_string()))?;

        Ok((connection, send, recv))
    }

    fn encode(&self, request: &Request) -> Result<BytesMut, TransportError> {
        let mut codec = JsonFrameCodec::with_max_frame_size(self.options.max_frame_size);
        let mut buf = BytesMut::new();
        codec.encode(request, &mut buf)?;
        Ok(buf)
    }
}

#[async_trait]
impl Transport for WebTransportClient {
    async fn connect(&self) -> Result<(), TransportError> {
        let _connecting = self.connecting.lock().await;

        if self.state() == ConnectionState::Connected {
            debug!("Already connected");
            return Ok(());
        }

        self.options.check_url()?;
        if tokio::runtime::Handle::try_current().is_err() {
            return Err(TransportError::CapabilityUnavailable(
                "no Tokio runtime".to_string(),
            ));
        }
        let endpoint = Endpoint::client(self.options.quic_config()?)
            .map_err(|e| TransportError::CapabilityUnavailable(e.to_string()))?;

        let attempt = ConnectAttempt::begin(&self.inner);
        debug!("Connecting to {}", self.options.url);

        let established =
            match tokio::time::timeout(self.options.connect_timeout, self.establish(&endpoint)).await {
                Ok(result) => result,
                Err(_) => Err(TransportError::Timeout(self.options.connect_timeout)),
            };

        let (connection, send, recv) = match established {
            Ok(parts) => parts,
            Err(e) => {
                warn!("Connection to {} failed: {}", self.options.url, e);
                drop(attempt);
                self.inner.emit(TransportEvent::Error(e.to_string()));
                return Err(e);
            }
        };

        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let cancel = CancellationToken::new();
        {
            let mut guard = self.inner.link.lock().await;
            *guard = Some(Link {
                generation,
                _endpoint: endpoint,
                connection,
                send: Arc::new(Mutex::new(send)),
                cancel: cancel.clone(),
            });
        }
        self.inner.active.store(generation, Ordering::SeqCst);
        attempt.succeed();
        self.inner.set_state(ConnectionState::Connected);
        info!("Connected to {}", self.options.url);

        // Connected goes out before the reader can publish any message
        self.inner.emit(TransportEvent::Connected);
        tokio::spawn(read_loop(
            Arc::clone(&self.inner),
            generation,
            recv,
            cancel,
            self.options.max_frame_size,
        ));

        Ok(())
    }

    async fn disconnect(&self) {
        if self.inner.teardown(None).await {
            return;
        }
        debug!("Disconnect requested while not connected");
        // No link and no connect in flight: whatever the state says, it is Disconnected
        if let Ok(_idle) = self.connecting.try_lock() {
            if self.state() != ConnectionState::Disconnected {
                self.inner.set_state(ConnectionState::Disconnected);
            }
        }
    }

    async fn send(&self, request: &Request) -> Result<(), TransportError> {
        if self.state() != ConnectionState::Connected {
            return Err(TransportError::NotConnected);
        }
        let frame = self.encode(request)?;

        let (stream, cancel) = {
            let guard = self.inner.link.lock().await;
            let link = guard.as_ref().ok_or(TransportError::NotConnected)?;
            (Arc::clone(&link.send), link.cancel.clone())
        };

        let write = async {
            let mut stream = stream.lock().await;
            stream.write_all(&frame).await
        };
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                return Err(TransportError::Write("connection closed".to_string()));
            }
            written = write => {
                written.map_err(|e| TransportError::Write(e.to_string()))?;
            }
        }
        debug!("Sent {}", request.cmd);
        Ok(())
    }

    fn state(&self) -> ConnectionState {
        *self.inner.state.borrow()
    }

    fn subscribe(&self) -> broadcast::Receiver<TransportEvent> {
        self.inner.events.subscribe()
    }
}

/// Reader task for one connection generation
async fn read_loop(
    inner: Arc<Inner>,
    generation: u64,
    mut recv: RecvStream,
    cancel: CancellationToken,
    max_frame_size: usize,
) {
    let mut decoder = InboundDecoder::new(max_frame_size);
    let mut buf = vec![0u8; READ_CHUNK_SIZE];

    loop {
        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => return,
            read = recv.read(&mut buf) => read,
        };

        match read {
            Ok(Some(n)) => dispatch(&inner, decoder.feed(&buf[..n])),
            Ok(None) => {
                dispatch(&inner, decoder.finish());
                debug!("Control stream closed by server");
                break;
            }
            Err(e) => {
                if inner.is_active(generation) {
                    warn!("Read error on control stream: {}", e);
                    inner.emit(TransportEvent::Error(e.to_string()));
                }
                break;
            }
        }
    }

    inner.teardown(Some(generation)).await;
}

fn dispatch(inner: &Inner, decoded: Vec<Result<Response, ProtocolError>>) {
    for result in decoded {
        match result {
            Ok(message) => inner.emit(TransportEvent::Message(message)),
            Err(e) => warn!("Dropping inbound frame: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_options_from_config() {
        let fp = CertificateFingerprint::new([3u8; 32]);
        let config = ClientConfig {
            url: "https://example.com:4433".into(),
            cert_hash: Some(fp.to_base64()),
            connect_timeout: Duration::from_secs(3),
            ..Default::default()
        };
        let options = TransportOptions::from_config(&config).unwrap();
        assert_eq!(options.url, "https://example.com:4433");
        assert_eq!(options.fingerprint, Some(fp));
        assert_eq!(options.connect_timeout, Duration::from_secs(3));
    }

    #[test]
    fn test_bad_fingerprint_fails_at_construction() {
        let err = TransportOptions::new("https://h:1")
            .with_fingerprint_base64("@@@")
            .unwrap_err();
        assert!(matches!(err, TransportError::InvalidFingerprint(_)));

        let config = ClientConfig {
            cert_hash: Some("AAAA".into()),
            ..Default::default()
        };
        assert!(TransportOptions::from_config(&config).is_err());
    }

    #[tokio::test]
    async fn test_connect_rejects_non_https() {
        for url in ["wss://host:4433", "http://host", "https://"] {
            let client = WebTransportClient::new(TransportOptions::new(url));
            let mut events = client.subscribe();
            let err = client.connect().await.unwrap_err();
            assert!(matches!(err, TransportError::InvalidAddress(_)), "{}", url);
            assert_eq!(client.state(), ConnectionState::Disconnected);
            assert!(events.try_recv().is_err());
        }
    }

    #[tokio::test]
    async fn test_send_requires_connection() {
        let client = WebTransportClient::new(TransportOptions::new("https://localhost:4433"));
        let err = client.send(&Request::ping()).await.unwrap_err();
        assert!(matches!(err, TransportError::NotConnected));
    }

    #[tokio::test]
    async fn test_disconnect_when_idle_is_silent() {
        let client = WebTransportClient::new(TransportOptions::new("https://localhost:4433"));
        let mut events = client.subscribe();
        client.disconnect().await;
        client.disconnect().await;
        assert!(events.try_recv().is_err());
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_abandoned_connect_returns_to_disconnected() {
        // Nothing answers on the discard port, so the handshake never completes
        let options = TransportOptions::new("https://127.0.0.1:9")
            .with_connect_timeout(Duration::from_secs(30));
        let client = WebTransportClient::new(options);
        let mut states = client.watch_state();

        let _ = tokio::time::timeout(Duration::from_millis(300), client.connect()).await;
        assert!(states.has_changed().unwrap());
        assert_eq!(*states.borrow_and_update(), ConnectionState::Disconnected);
        assert_eq!(client.state(), ConnectionState::Disconnected);

        client.disconnect().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_connect_attempt_guard() {
        let client = WebTransportClient::new(TransportOptions::new("https://localhost:4433"));
        let inner = &client.inner;

        let attempt = ConnectAttempt::begin(inner);
        assert_eq!(client.state(), ConnectionState::Connecting);
        drop(attempt);
        assert_eq!(client.state(), ConnectionState::Disconnected);

        let attempt = ConnectAttempt::begin(inner);
        attempt.succeed();
        assert_eq!(client.state(), ConnectionState::Connecting);
    }

    #[tokio::test]
    async fn test_disconnect_clears_stale_state_without_link() {
        let client = WebTransportClient::new(TransportOptions::new("https://localhost:4433"));
        client.inner.set_state(ConnectionState::Connecting);

        client.disconnect().await;
        assert_eq!(client.state(), ConnectionState::Disconnected);
    }

    #[tokio::test]
    async fn test_offline_conformance() {
        let client = WebTransportClient::new(TransportOptions::new("https://localhost:4433"));
        crate::testing::assert_offline_conformance(&client).await;
    }
}
