//! Request/response transport over a child process's stdio.
//!
//! One request is in flight at a time: the write-then-read cycle runs
//! under a mutex, so concurrent callers queue up in lock order instead
//! of interleaving frames on the stream.

use crate::error::RpcError;
use crate::lsp::codec::{read_frame, write_frame};
use crate::lsp::types::Message;
use serde::Serialize;
use serde_json::Value;
use tokio::io::{AsyncBufRead, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

struct Channel<W, R> {
    writer: W,
    reader: R,
    next_id: u64,
    /// Set after an I/O or framing failure; the stream is unusable from then on.
    broken: bool,
}

/// JSON-RPC transport with numeric request ids.
pub struct RpcTransport<W, R> {
    channel: Mutex<Channel<W, R>>,
    cancel: CancellationToken,
}

impl<W, R> RpcTransport<W, R>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncBufRead + Unpin + Send,
{
    /// Wrap a writer/reader pair. Every wait races `cancel`.
    pub fn new(writer: W, reader: R, cancel: CancellationToken) -> Self {
        Self {
            channel: Mutex::new(Channel {
                writer,
                reader,
                next_id: 0,
                broken: false,
            }),
            cancel,
        }
    }

    /// Send a request and wait for its response.
    ///
    /// Returns the `result` value (JSON `null` if the server sent none).
    /// Notifications and server-initiated requests that arrive meanwhile
    /// are read and dropped.
    pub async fn send<P: Serialize>(&self, method: &str, params: P) -> Result<Value, RpcError> {
        let params = serde_json::to_value(params)?;

        let mut channel = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(RpcError::Cancelled),
            guard = self.channel.lock() => guard,
        };
        channel.ensure_usable()?;

        channel.next_id += 1;
        let id = channel.next_id;
        let body = serde_json::to_vec(&Message::request(id, method, params))?;
        debug!("lsp -> {} (id {})", method, id);

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RpcError::Cancelled),
            result = channel.round_trip(id, &body) => result,
        };

        if let Err(ref e) = outcome {
            if !matches!(e, RpcError::Server { .. }) {
                channel.broken = true;
            }
        }
        outcome
    }

    /// Send a notification. No response is expected.
    pub async fn notify<P: Serialize>(&self, method: &str, params: P) -> Result<(), RpcError> {
        let params = serde_json::to_value(params)?;
        let body = serde_json::to_vec(&Message::notification(method, params))?;

        let mut channel = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Err(RpcError::Cancelled),
            guard = self.channel.lock() => guard,
        };
        channel.ensure_usable()?;
        debug!("lsp -> {} (notification)", method);

        let outcome = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(RpcError::Cancelled),
            result = write_frame(&mut channel.writer, &body) => result,
        };
        if outcome.is_err() {
            channel.broken = true;
        }
        outcome
    }

    /// Close the write half. The server sees EOF on its stdin.
    pub async fn close(&self) -> Result<(), RpcError> {
        let mut channel = self.channel.lock().await;
        channel.broken = true;
        channel.writer.shutdown().await?;
        Ok(())
    }
}

impl<W, R> Channel<W, R>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncBufRead + Unpin + Send,
{
    fn ensure_usable(&self) -> Result<(), RpcError> {
        if self.broken {
            return Err(RpcError::Framing(
                "transport is closed after an earlier failure".to_string(),
            ));
        }
        Ok(())
    }

    async fn round_trip(&mut self, id: u64, body: &[u8]) -> Result<Value, RpcError> {
        write_frame(&mut self.writer, body).await?;

        loop {
            let frame = read_frame(&mut self.reader).await?;
            let message: Message = serde_json::from_slice(&frame)?;

            if message.is_incoming_call() {
                trace!(
                    "lsp <- {} (skipped)",
                    message.method.as_deref().unwrap_or_default()
                );
                continue;
            }

            match (message.id_as_u64(), message.error) {
                (Some(got), Some(err)) if got == id => {
                    return Err(RpcError::Server {
                        code: err.code,
                        message: err.message,
                    });
                }
                // Errors with a null id (e.g. parse errors) belong to the only
                // request in flight.
                (None, Some(err)) if message.id.as_ref().map_or(true, Value::is_null) => {
                    return Err(RpcError::Server {
                        code: err.code,
                        message: err.message,
                    });
                }
                (Some(got), None) if got == id => {
                    debug!("lsp <- response (id {})", id);
                    return Ok(message.result.unwrap_or(Value::Null));
                }
                (other, _) => {
                    trace!("lsp <- unmatched response {:?} while waiting for {}", other, id);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsp::codec::encode_frame;
    use crate::lsp::types::Message;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{duplex, split, BufReader, DuplexStream, ReadHalf, WriteHalf};

    type TestTransport = RpcTransport<WriteHalf<DuplexStream>, BufReader<ReadHalf<DuplexStream>>>;

    /// Client transport plus the server's end of the pipe.
    fn pair(cancel: CancellationToken) -> (TestTransport, BufReader<ReadHalf<DuplexStream>>, WriteHalf<DuplexStream>) {
        let (client, server) = duplex(64 * 1024);
        let (client_read, client_write) = split(client);
        let (server_read, server_write) = split(server);
        (
            RpcTransport::new(client_write, BufReader::new(client_read), cancel),
            BufReader::new(server_read),
            server_write,
        )
    }

    async fn read_message(reader: &mut BufReader<ReadHalf<DuplexStream>>) -> Message {
        let body = read_frame(reader).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    async fn write_json(writer: &mut WriteHalf<DuplexStream>, value: Value) {
        write_frame(writer, &serde_json::to_vec(&value).unwrap())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_send_skips_notifications_and_returns_result() {
        let (transport, mut server_in, mut server_out) = pair(CancellationToken::new());

        let server = tokio::spawn(async move {
            let request = read_message(&mut server_in).await;
            assert_eq!(request.method.as_deref(), Some("workspace/symbol"));
            let id = request.id_as_u64().unwrap();

            write_json(&mut server_out, json!({"jsonrpc": "2.0", "method": "window/logMessage", "params": {"message": "loading"}})).await;
            write_json(&mut server_out, json!({"jsonrpc": "2.0", "result": null})).await;
            write_json(&mut server_out, json!({"jsonrpc": "2.0", "id": 99, "method": "window/workDoneProgress/create", "params": {}})).await;
            write_json(&mut server_out, serde_json::to_value(Message::response(id, json!(["ok"]))).unwrap()).await;
        });

        let result = transport.send("workspace/symbol", json!({"query": "x"})).await.unwrap();
        assert_eq!(result, json!(["ok"]));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_ids_increase_monotonically() {
        let (transport, mut server_in, mut server_out) = pair(CancellationToken::new());

        let server = tokio::spawn(async move {
            let mut seen = Vec::new();
            for _ in 0..3 {
                let request = read_message(&mut server_in).await;
                let id = request.id_as_u64().unwrap();
                seen.push(id);
                write_json(&mut server_out, serde_json::to_value(Message::response(id, json!(id))).unwrap()).await;
            }
            seen
        });

        for expected in 1..=3u64 {
            let result = transport.send("ping", json!({})).await.unwrap();
            assert_eq!(result, json!(expected));
        }
        assert_eq!(server.await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_server_error_becomes_result_error() {
        let (transport, mut server_in, mut server_out) = pair(CancellationToken::new());

        tokio::spawn(async move {
            let request = read_message(&mut server_in).await;
            let id = request.id_as_u64().unwrap();
            write_json(&mut server_out, json!({"jsonrpc": "2.0", "id": id, "error": {"code": -32601, "message": "method not found"}})).await;
            let request = read_message(&mut server_in).await;
            let id = request.id_as_u64().unwrap();
            write_json(&mut server_out, serde_json::to_value(Message::response(id, json!(1))).unwrap()).await;
        });

        let err = transport.send("bogus", json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::Server { code: -32601, .. }));

        // A server error leaves the stream intact.
        assert_eq!(transport.send("ping", json!({})).await.unwrap(), json!(1));
    }

    #[tokio::test]
    async fn test_matching_null_result_is_returned_as_null() {
        let (transport, mut server_in, mut server_out) = pair(CancellationToken::new());

        tokio::spawn(async move {
            let request = read_message(&mut server_in).await;
            let id = request.id_as_u64().unwrap();
            write_json(&mut server_out, json!({"jsonrpc": "2.0", "id": id, "result": null})).await;
        });

        assert_eq!(transport.send("shutdown", json!(null)).await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn test_stream_closure_is_fatal_and_sticky() {
        let (transport, server_in, server_out) = pair(CancellationToken::new());
        drop(server_out);
        drop(server_in);

        assert!(transport.send("ping", json!({})).await.is_err());
        let err = transport.send("ping", json!({})).await.unwrap_err();
        assert!(err.to_string().contains("earlier failure"));
    }

    #[tokio::test]
    async fn test_cancellation_unblocks_waiting_request() {
        let cancel = CancellationToken::new();
        let (transport, _server_in, _server_out) = pair(cancel.clone());

        let canceller = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            cancel.cancel();
        });

        let err = transport.send("textDocument/references", json!({})).await.unwrap_err();
        assert!(matches!(err, RpcError::Cancelled));
        canceller.await.unwrap();
    }

    #[tokio::test]
    async fn test_concurrent_requests_are_serialized() {
        let (transport, mut server_in, mut server_out) = pair(CancellationToken::new());
        let transport = Arc::new(transport);

        let server = tokio::spawn(async move {
            for _ in 0..2 {
                let request = read_message(&mut server_in).await;
                let id = request.id_as_u64().unwrap();
                let method = request.method.unwrap();
                write_json(&mut server_out, serde_json::to_value(Message::response(id, json!(method))).unwrap()).await;
            }
        });

        let a = {
            let t = Arc::clone(&transport);
            tokio::spawn(async move { t.send("a", json!({})).await })
        };
        let b = {
            let t = Arc::clone(&transport);
            tokio::spawn(async move { t.send("b", json!({})).await })
        };

        assert_eq!(a.await.unwrap().unwrap(), json!("a"));
        assert_eq!(b.await.unwrap().unwrap(), json!("b"));
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_notify_writes_frame_without_id() {
        let expected = serde_json::to_vec(&Message::notification("initialized", json!({}))).unwrap();
        let mock = tokio_test::io::Builder::new()
            .write(&encode_frame(&expected))
            .build();
        let (read_half, write_half) = split(mock);
        let transport = RpcTransport::new(write_half, BufReader::new(read_half), CancellationToken::new());

        transport.notify("initialized", json!({})).await.unwrap();
    }
}
