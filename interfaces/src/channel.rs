//! JSON Command Channel
//!
//! One JSON request and one newline-terminated JSON reply per TCP connection.
//! The request needs no terminator; the connection is closed after every
//! exchange.

use crate::message_types::{decode_command, encode_line, Ack, CommandSet, ReplyStatus};
use crate::InterfaceError;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

/// Upper bound on a single request
pub const MAX_MESSAGE_BYTES: u64 = 64 * 1024;

/// Handler for the commands of one channel
#[async_trait]
pub trait CommandHandler: Send + Sync + 'static {
    type Command: CommandSet + Send;

    /// Handle a decoded command and produce the reply object
    async fn handle(&self, command: Self::Command, peer: SocketAddr) -> Value;
}

/// TCP listener dispatching each connection to a [`CommandHandler`]
pub struct CommandServer {
    listener: TcpListener,
    read_timeout: Duration,
}

impl CommandServer {
    /// Bind the listener
    pub async fn bind(addr: SocketAddr, read_timeout: Duration) -> Result<Self, InterfaceError> {
        let listener = TcpListener::bind(addr).await?;
        info!("Command channel listening on {}", listener.local_addr()?);
        Ok(Self {
            listener,
            read_timeout,
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr, InterfaceError> {
        Ok(self.listener.local_addr()?)
    }

    /// Accept connections forever, one task per connection
    pub async fn run<H: CommandHandler>(self, handler: Arc<H>) -> Result<(), InterfaceError> {
        loop {
            let (stream, peer) = match self.listener.accept().await {
                Ok(accepted) => accepted,
                Err(e) => {
                    warn!("Failed to accept command connection: {}", e);
                    continue;
                }
            };

            let handler = handler.clone();
            let read_timeout = self.read_timeout;
            tokio::spawn(async move {
                if let Err(e) = serve_connection(stream, peer, handler, read_timeout).await {
                    debug!("Command connection from {} ended with error: {}", peer, e);
                }
            });
        }
    }
}

/// Length of the first request held in `buf`, once it is complete
///
/// A request ends after one complete JSON value. A newline ends a request
/// that is not (yet) valid JSON.
fn request_end(buf: &[u8]) -> Option<usize> {
    let newline = buf.iter().position(|b| *b == b'\n');
    let mut values = serde_json::Deserializer::from_slice(buf).into_iter::<Value>();
    match values.next() {
        Some(Ok(_)) => Some(values.byte_offset()),
        Some(Err(e)) if e.is_eof() => newline,
        Some(Err(_)) => Some(newline.unwrap_or(buf.len())),
        None => newline,
    }
}

async fn serve_connection<H: CommandHandler>(
    mut stream: TcpStream,
    peer: SocketAddr,
    handler: Arc<H>,
    read_timeout: Duration,
) -> Result<(), InterfaceError> {
    let (mut read_half, mut write_half) = stream.split();
    let mut payload = Vec::new();
    let mut chunk = [0u8; 4096];

    let read_request = async {
        loop {
            if let Some(end) = request_end(&payload) {
                payload.truncate(end);
                break;
            }
            if payload.len() as u64 >= MAX_MESSAGE_BYTES {
                break;
            }
            let n = read_half.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            payload.extend_from_slice(&chunk[..n]);
        }
        Ok::<_, InterfaceError>(())
    };

    timeout(read_timeout, read_request)
        .await
        .map_err(|_| InterfaceError::Timeout(format!("request from {}", peer)))??;

    if payload.iter().all(|b| b.is_ascii_whitespace()) {
        debug!("Empty request from {}", peer);
        return Ok(());
    }

    let reply = match decode_command::<H::Command>(&payload) {
        Ok(command) => handler.handle(command, peer).await,
        Err(e) => {
            warn!("Rejected request from {}: {}", peer, e);
            serde_json::to_value(Ack::error(e.to_string()))?
        }
    };

    write_half.write_all(&encode_line(&reply)?).await?;
    write_half.shutdown().await?;
    Ok(())
}

/// Client side of the command channel
#[derive(Debug, Clone)]
pub struct CommandClient {
    addr: SocketAddr,
    timeout: Duration,
}

impl CommandClient {
    pub fn new(addr: SocketAddr, timeout: Duration) -> Self {
        Self { addr, timeout }
    }

    /// Send one command and return the raw reply object
    ///
    /// A reply carrying `"status": "error"` is turned into `Rejected`.
    pub async fn request_value<C: Serialize + Sync>(&self, command: &C) -> Result<Value, InterfaceError> {
        let peer = self.addr.to_string();
        let exchange = async {
            let mut stream = TcpStream::connect(self.addr).await.map_err(|e| {
                InterfaceError::PeerUnreachable {
                    peer: peer.clone(),
                    reason: e.to_string(),
                }
            })?;

            stream.write_all(&encode_line(command)?).await?;

            let mut reader = BufReader::new(stream).take(MAX_MESSAGE_BYTES);
            let mut line = Vec::new();
            reader.read_until(b'\n', &mut line).await?;
            Ok::<_, InterfaceError>(line)
        };

        let line = timeout(self.timeout, exchange)
            .await
            .map_err(|_| InterfaceError::Timeout(peer.clone()))??;

        if line.is_empty() {
            error!("Peer {} closed the channel without replying", peer);
            return Err(InterfaceError::MalformedMessage(format!("empty reply from {}", peer)));
        }

        let reply: Value = serde_json::from_slice(&line)
            .map_err(|e| InterfaceError::MalformedMessage(e.to_string()))?;

        if let Ok(ack) = serde_json::from_value::<Ack>(reply.clone()) {
            if ack.status == ReplyStatus::Error {
                return Err(InterfaceError::Rejected(ack.message.unwrap_or_default()));
            }
        }

        Ok(reply)
    }

    /// Send one command and decode the reply into `R`
    pub async fn request<C, R>(&self, command: &C) -> Result<R, InterfaceError>
    where
        C: Serialize + Sync,
        R: DeserializeOwned,
    {
        let reply = self.request_value(command).await?;
        serde_json::from_value(reply).map_err(|e| InterfaceError::MalformedMessage(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message_types::ProxyCommand;
    use common::UeId;
    use serde_json::json;

    struct Echo;

    #[async_trait]
    impl CommandHandler for Echo {
        type Command = ProxyCommand;

        async fn handle(&self, command: ProxyCommand, peer: SocketAddr) -> Value {
            match command {
                ProxyCommand::UeConnect { ue_id } => {
                    json!({"status": "ok", "ue_id": ue_id, "from": peer.ip()})
                }
                _ => json!({"status": "error", "message": "unsupported"}),
            }
        }
    }

    async fn spawn_echo() -> SocketAddr {
        let server = CommandServer::bind("127.0.0.1:0".parse().unwrap(), Duration::from_secs(1))
            .await
            .unwrap();
        let addr = server.local_addr().unwrap();
        tokio::spawn(server.run(Arc::new(Echo)));
        addr
    }

    #[tokio::test]
    async fn test_request_reply_roundtrip() {
        let addr = spawn_echo().await;
        let client = CommandClient::new(addr, Duration::from_secs(1));

        let reply = client
            .request_value(&ProxyCommand::UeConnect { ue_id: UeId(4) })
            .await
            .unwrap();
        assert_eq!(reply["ue_id"], "UE4");
        assert_eq!(reply["from"], "127.0.0.1");
    }

    #[tokio::test]
    async fn test_error_reply_becomes_rejected() {
        let addr = spawn_echo().await;
        let client = CommandClient::new(addr, Duration::from_secs(1));

        let err = client
            .request_value(&ProxyCommand::UeDisconnect { ue_id: UeId(4) })
            .await
            .unwrap_err();
        assert!(matches!(err, InterfaceError::Rejected(msg) if msg == "unsupported"));

        let err = client.request_value(&json!({"command": "reboot"})).await.unwrap_err();
        assert!(matches!(err, InterfaceError::Rejected(msg) if msg.contains("Unknown command")));
    }

    #[test]
    fn test_request_end() {
        let object = br#"{"command":"get_loads"}"#;
        assert_eq!(request_end(object), Some(object.len()));
        assert_eq!(request_end(br#"{"command":"get_lo"#), None);
        assert_eq!(request_end(b"{\"a\":1}\n{\"b\":2}"), Some(7));
        assert_eq!(request_end(b"not json\n"), Some(8));
        assert_eq!(request_end(b"   "), None);
        assert_eq!(request_end(b"\n"), Some(0));
    }

    #[tokio::test]
    async fn test_unterminated_request_gets_reply() {
        let addr = spawn_echo().await;
        let mut stream = TcpStream::connect(addr).await.unwrap();

        // Split across two writes, no newline and no half-close
        stream.write_all(br#"{"command":"ue_con"#).await.unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        stream.write_all(br#"nect","ue_id":"UE3"}"#).await.unwrap();

        let mut reply = Vec::new();
        timeout(Duration::from_millis(500), stream.read_to_end(&mut reply))
            .await
            .expect("reply before the read timeout")
            .unwrap();
        let reply: Value = serde_json::from_slice(&reply).unwrap();
        assert_eq!(reply["ue_id"], "UE3");
    }

    #[tokio::test]
    async fn test_unreachable_peer() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = CommandClient::new(addr, Duration::from_secs(1));
        let err = client.request_value(&json!({"command": "get_loads"})).await.unwrap_err();
        assert!(err.is_unreachable());
    }
}
