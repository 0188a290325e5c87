//! Local socket transport
//!
//! Each connect attempt opens a fresh stream to the service, subscribes and
//! waits for the service to accept. Once accepted, a reader task decodes
//! pushed events and hands them to the sink from the blocking pool, one at a
//! time, so the sink may block without stalling the runtime.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio_util::sync::CancellationToken;

use tether_core::config::ClientConfig;
use tether_core::ipc::{decode_line, encode_line, CommandEvent, CommandRequest};
use tether_core::{
    ClientOptions, CommandTransport, EventSink, GroupIter, TransportClient, TransportError,
};

#[cfg(unix)]
use tether_core::ipc::COMMAND_SOCKET_NAME;
#[cfg(not(unix))]
use tether_core::ipc::{COMMAND_PORT_FILE_NAME, DEFAULT_COMMAND_PORT};

type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;
type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Where the service listens for command clients
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Endpoint {
    /// Unix-domain socket
    #[cfg(unix)]
    Unix(PathBuf),
    /// TCP address, `host:port`
    Tcp(String),
}

impl Endpoint {
    /// Endpoint of the service running in `working_directory`.
    ///
    /// On Unix this is the command socket inside the directory. Elsewhere the
    /// port is read from the port file, falling back to the default port.
    pub async fn resolve(working_directory: &Path) -> Self {
        #[cfg(unix)]
        {
            Endpoint::Unix(working_directory.join(COMMAND_SOCKET_NAME))
        }

        #[cfg(not(unix))]
        {
            let port = read_port_file(&working_directory.join(COMMAND_PORT_FILE_NAME))
                .await
                .unwrap_or(DEFAULT_COMMAND_PORT);
            Endpoint::Tcp(format!("127.0.0.1:{}", port))
        }
    }

    async fn open(&self) -> Result<(BoxedReader, BoxedWriter), TransportError> {
        match self {
            #[cfg(unix)]
            Endpoint::Unix(path) => {
                let stream = tokio::net::UnixStream::connect(path).await?;
                let (reader, writer) = stream.into_split();
                Ok((Box::new(reader), Box::new(writer)))
            }
            Endpoint::Tcp(address) => {
                let stream = TcpStream::connect(address.as_str()).await?;
                stream.set_nodelay(true)?;
                let (reader, writer) = stream.into_split();
                Ok((Box::new(reader), Box::new(writer)))
            }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            #[cfg(unix)]
            Endpoint::Unix(path) => write!(f, "unix:{}", path.display()),
            Endpoint::Tcp(address) => write!(f, "tcp:{}", address),
        }
    }
}

/// Read a TCP port from a port file, ignoring surrounding whitespace
#[cfg_attr(unix, allow(dead_code))]
pub(crate) async fn read_port_file(path: &Path) -> Option<u16> {
    let contents = tokio::fs::read_to_string(path).await.ok()?;
    match contents.trim().parse() {
        Ok(port) => Some(port),
        Err(e) => {
            tracing::warn!("Ignoring malformed port file {:?}: {}", path, e);
            None
        }
    }
}

/// Transport over the service's local command socket
#[derive(Debug, Clone)]
pub struct LocalTransport {
    handshake_timeout: Duration,
    endpoint: Option<Endpoint>,
}

impl LocalTransport {
    /// Create a transport that resolves the endpoint from the working directory
    pub fn new(handshake_timeout: Duration) -> Self {
        Self {
            handshake_timeout,
            endpoint: None,
        }
    }

    /// Create a transport using the handshake timeout from `config`
    pub fn from_config(config: &ClientConfig) -> Self {
        Self::new(config.handshake_timeout)
    }

    /// Always connect to `endpoint` instead of resolving one
    pub fn with_endpoint(mut self, endpoint: Endpoint) -> Self {
        self.endpoint = Some(endpoint);
        self
    }
}

impl Default for LocalTransport {
    fn default() -> Self {
        Self::from_config(&ClientConfig::default())
    }
}

impl CommandTransport for LocalTransport {
    type Client = LocalClient;

    fn new_client(
        &self,
        working_directory: &Path,
        sink: Arc<dyn EventSink>,
        options: ClientOptions,
    ) -> Result<LocalClient, TransportError> {
        Ok(LocalClient {
            working_directory: working_directory.to_path_buf(),
            endpoint: self.endpoint.clone(),
            handshake_timeout: self.handshake_timeout,
            options,
            sink,
            writer: None,
            reader_cancel: None,
        })
    }
}

/// One subscription over the local command socket
pub struct LocalClient {
    working_directory: PathBuf,
    endpoint: Option<Endpoint>,
    handshake_timeout: Duration,
    options: ClientOptions,
    sink: Arc<dyn EventSink>,
    /// Kept open for the lifetime of the subscription
    writer: Option<BoxedWriter>,
    reader_cancel: Option<CancellationToken>,
}

impl LocalClient {
    fn stop_reader(&mut self) {
        if let Some(cancel) = self.reader_cancel.take() {
            cancel.cancel();
        }
        self.writer = None;
    }
}

#[async_trait]
impl TransportClient for LocalClient {
    async fn connect(&mut self) -> Result<(), TransportError> {
        self.stop_reader();

        let endpoint = match &self.endpoint {
            Some(endpoint) => endpoint.clone(),
            None => Endpoint::resolve(&self.working_directory).await,
        };
        tracing::debug!(command = %self.options.command, "Connecting to {}", endpoint);

        let (reader, mut writer) = endpoint.open().await?;
        let mut reader = BufReader::new(reader);
        handshake(&self.options, self.handshake_timeout, &mut reader, &mut writer).await?;

        let cancel = CancellationToken::new();
        tokio::spawn(read_events(reader, Arc::clone(&self.sink), cancel.clone()));

        self.writer = Some(writer);
        self.reader_cancel = Some(cancel);
        Ok(())
    }

    fn disconnect(&mut self) -> Result<(), TransportError> {
        self.stop_reader();
        Ok(())
    }
}

impl Drop for LocalClient {
    fn drop(&mut self) {
        self.stop_reader();
    }
}

/// Subscribe and wait for the service to accept
async fn handshake(
    options: &ClientOptions,
    timeout: Duration,
    reader: &mut BufReader<BoxedReader>,
    writer: &mut BoxedWriter,
) -> Result<(), TransportError> {
    let request = encode_line(&CommandRequest::from(options))?;
    writer.write_all(request.as_bytes()).await?;
    writer.flush().await?;

    let mut line = String::new();
    let read = tokio::time::timeout(timeout, reader.read_line(&mut line))
        .await
        .map_err(|_| TransportError::Timeout(timeout))??;
    if read == 0 {
        return Err(TransportError::Closed);
    }

    match decode_line::<CommandEvent>(&line)? {
        CommandEvent::Ready => Ok(()),
        CommandEvent::Error { message } => Err(TransportError::Rejected(message)),
        other => Err(TransportError::Handshake(format!(
            "Unexpected reply to subscribe: {:?}",
            other
        ))),
    }
}

/// What the reader should do after delivering an event
enum Flow {
    Continue,
    Stop,
}

/// Forward events to the sink until the stream ends or the reader is cancelled
async fn read_events(
    mut reader: BufReader<BoxedReader>,
    sink: Arc<dyn EventSink>,
    cancel: CancellationToken,
) {
    deliver(&sink, |sink| sink.connected()).await;

    let mut line = String::new();
    loop {
        line.clear();

        let read = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                let reason = Some("closed by client".to_string());
                deliver(&sink, move |sink| sink.disconnected(reason)).await;
                return;
            }
            read = reader.read_line(&mut line) => read,
        };

        match read {
            Ok(0) => {
                tracing::debug!("Service closed the command stream");
                deliver(&sink, |sink| sink.disconnected(None)).await;
                return;
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("Command stream read failed: {}", e);
                let reason = e.to_string();
                deliver(&sink, move |sink| sink.disconnected(Some(reason))).await;
                return;
            }
        }

        if line.trim().is_empty() {
            continue;
        }

        let event = match decode_line::<CommandEvent>(&line) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!("Skipping undecodable event: {}", e);
                continue;
            }
        };

        if let Flow::Stop = dispatch_event(&sink, event).await {
            return;
        }
    }
}

async fn dispatch_event(sink: &Arc<dyn EventSink>, event: CommandEvent) -> Flow {
    match event {
        CommandEvent::Log { message } => {
            deliver(sink, move |sink| sink.write_log(message)).await;
        }
        CommandEvent::Status { status } => {
            deliver(sink, move |sink| sink.write_status(status)).await;
        }
        CommandEvent::Groups { groups } => {
            deliver(sink, move |sink| {
                sink.write_groups(groups.map(|g| Box::new(g.into_iter()) as GroupIter))
            })
            .await;
        }
        CommandEvent::Closed { reason } => {
            tracing::debug!("Service closed the subscription");
            deliver(sink, move |sink| sink.disconnected(reason)).await;
            return Flow::Stop;
        }
        CommandEvent::Error { message } => {
            tracing::warn!("Service reported an error: {}", message);
            deliver(sink, move |sink| sink.disconnected(Some(message))).await;
            return Flow::Stop;
        }
        CommandEvent::Ready => {
            tracing::debug!("Ignoring duplicate ready event");
        }
    }
    Flow::Continue
}

/// Run one sink callback on the blocking pool and wait for it
async fn deliver<F>(sink: &Arc<dyn EventSink>, callback: F)
where
    F: FnOnce(&dyn EventSink) + Send + 'static,
{
    let sink = Arc::clone(sink);
    if let Err(e) = tokio::task::spawn_blocking(move || callback(sink.as_ref())).await {
        tracing::error!("Event sink callback failed: {}", e);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tether_core::ipc::{COMMAND_PORT_FILE_NAME, DEFAULT_COMMAND_PORT};
    use tether_core::SubscriptionKind;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_resolve_uses_socket_in_working_directory() {
        let endpoint = Endpoint::resolve(Path::new("/var/run/tether")).await;
        assert_eq!(
            endpoint,
            Endpoint::Unix(PathBuf::from("/var/run/tether/command.sock"))
        );
        assert_eq!(endpoint.to_string(), "unix:/var/run/tether/command.sock");
    }

    #[tokio::test]
    async fn test_read_port_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(COMMAND_PORT_FILE_NAME);

        assert_eq!(read_port_file(&path).await, None);

        std::fs::write(&path, "40123\n").unwrap();
        assert_eq!(read_port_file(&path).await, Some(40123));

        std::fs::write(&path, "not a port").unwrap();
        assert_eq!(read_port_file(&path).await, None);
        assert_ne!(DEFAULT_COMMAND_PORT, 0);
    }

    #[tokio::test]
    async fn test_connect_without_service_fails() {
        let dir = tempfile::tempdir().unwrap();
        let transport = LocalTransport::new(Duration::from_millis(200))
            .with_endpoint(Endpoint::Tcp("127.0.0.1:1".to_string()));

        struct NullSink;
        impl EventSink for NullSink {
            fn connected(&self) {}
            fn disconnected(&self, _reason: Option<String>) {}
            fn write_log(&self, _message: Option<String>) {}
            fn write_status(&self, _message: Option<tether_core::StatusMessage>) {}
            fn write_groups(&self, _groups: Option<GroupIter>) {}
        }

        let mut client = transport
            .new_client(
                dir.path(),
                Arc::new(NullSink),
                ClientOptions::new(SubscriptionKind::Log),
            )
            .unwrap();

        assert!(client.connect().await.is_err());
        // Never connected, so these are no-ops.
        assert!(client.disconnect().is_ok());
        assert!(client.disconnect().is_ok());
    }
}
