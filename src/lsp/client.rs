//! Language server client: handshake plus `textDocument/references`.
//!
//! `LanguageClient` speaks the protocol over any reader/writer pair.
//! `LspProcess` spawns the server binary and owns the child; closing it
//! kills the process without a `shutdown`/`exit` exchange.

use crate::config::LspConfig;
use crate::error::RpcError;
use crate::lsp::transport::RpcTransport;
use crate::lsp::types::{
    path_to_uri, FileLocation, InitializeParams, Location, Position, ReferenceContext,
    ReferenceParams, TextDocumentIdentifier,
};
use crate::lsp::CodeAnalyzer;
use async_trait::async_trait;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, BufReader};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Protocol-level client over an arbitrary byte stream.
pub struct LanguageClient<W, R> {
    transport: RpcTransport<W, R>,
    root: PathBuf,
}

impl<W, R> LanguageClient<W, R>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncBufRead + Unpin + Send,
{
    /// Run the `initialize` / `initialized` handshake.
    ///
    /// The client is only returned once the server has answered
    /// `initialize`; a failure here leaves nothing half-initialised.
    pub async fn connect(
        writer: W,
        reader: R,
        root: PathBuf,
        cancel: CancellationToken,
    ) -> Result<Self, RpcError> {
        let transport = RpcTransport::new(writer, reader, cancel);

        let params = InitializeParams {
            process_id: std::process::id(),
            root_uri: path_to_uri(&root).map_err(|e| RpcError::Handshake(Box::new(e)))?,
            capabilities: json!({}),
        };

        transport
            .send("initialize", params)
            .await
            .map_err(|e| RpcError::Handshake(Box::new(e)))?;
        transport
            .notify("initialized", json!({}))
            .await
            .map_err(|e| RpcError::Handshake(Box::new(e)))?;

        debug!("Language server initialized for {}", root.display());
        Ok(Self { transport, root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    async fn find_references(
        &self,
        file: &Path,
        position: Position,
    ) -> Result<Vec<FileLocation>, RpcError> {
        let absolute = if file.is_absolute() {
            file.to_path_buf()
        } else {
            self.root.join(file)
        };

        let params = ReferenceParams {
            text_document: TextDocumentIdentifier {
                uri: path_to_uri(&absolute)?,
            },
            position,
            context: ReferenceContext {
                include_declaration: true,
            },
        };

        let result = self.transport.send("textDocument/references", params).await?;
        if result.is_null() {
            return Ok(Vec::new());
        }

        let locations: Vec<Location> = serde_json::from_value(result)?;
        Ok(locations.into_iter().map(FileLocation::from).collect())
    }

    async fn close_transport(&self) {
        if let Err(e) = self.transport.close().await {
            debug!("Closing language server stdin failed: {}", e);
        }
    }
}

#[async_trait]
impl<W, R> CodeAnalyzer for LanguageClient<W, R>
where
    W: AsyncWrite + Unpin + Send,
    R: AsyncBufRead + Unpin + Send,
{
    async fn references(
        &self,
        file: &Path,
        position: Position,
    ) -> Result<Vec<FileLocation>, RpcError> {
        self.find_references(file, position).await
    }
}

/// A spawned language server process.
pub struct LspProcess {
    child: Child,
    client: LanguageClient<ChildStdin, BufReader<ChildStdout>>,
}

impl LspProcess {
    /// Spawn the configured server in `root` and complete the handshake.
    pub async fn spawn(
        root: &Path,
        config: &LspConfig,
        cancel: CancellationToken,
    ) -> Result<Self, RpcError> {
        let root = std::fs::canonicalize(root)?;
        info!("Starting language server: {}", config.command);

        let mut child = Command::new(&config.command)
            .args(&config.args)
            .current_dir(&root)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| RpcError::Spawn {
                command: config.command.clone(),
                source,
            })?;

        let (Some(stdin), Some(stdout)) = (child.stdin.take(), child.stdout.take()) else {
            let _ = child.start_kill();
            return Err(RpcError::Framing("language server stdio not captured".to_string()));
        };

        if let Some(stderr) = child.stderr.take() {
            let command = config.command.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!("[{}] {}", command, line);
                }
            });
        }

        match LanguageClient::connect(stdin, BufReader::new(stdout), root, cancel).await {
            Ok(client) => Ok(Self { child, client }),
            Err(e) => {
                let _ = child.start_kill();
                let _ = child.wait().await;
                Err(e)
            }
        }
    }

    pub fn root(&self) -> &Path {
        self.client.root()
    }

    /// Terminate the server process.
    pub async fn close(&mut self) {
        self.client.close_transport().await;
        if let Err(e) = self.child.start_kill() {
            // Already exited.
            debug!("Language server kill: {}", e);
        }
        match self.child.wait().await {
            Ok(status) => debug!("Language server exited: {}", status),
            Err(e) => warn!("Failed to reap language server: {}", e),
        }
    }
}

#[async_trait]
impl CodeAnalyzer for LspProcess {
    async fn references(
        &self,
        file: &Path,
        position: Position,
    ) -> Result<Vec<FileLocation>, RpcError> {
        self.client.references(file, position).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lsp::codec::{read_frame, write_frame};
    use crate::lsp::types::Message;
    use serde_json::Value;
    use tokio::io::{duplex, split};

    /// Plays a minimal language server on the other end of a duplex pipe.
    /// Answers `initialize`, expects `initialized`, then answers one
    /// references request with `reply` and returns the request it saw.
    async fn fake_server(
        stream: tokio::io::DuplexStream,
        reply: Value,
    ) -> (Message, Message, Message) {
        let (read_half, mut write_half) = split(stream);
        let mut reader = BufReader::new(read_half);

        let init: Message = serde_json::from_slice(&read_frame(&mut reader).await.unwrap()).unwrap();
        let id = init.id_as_u64().unwrap();
        let response = Message::response(id, json!({"capabilities": {}}));
        write_frame(&mut write_half, &serde_json::to_vec(&response).unwrap()).await.unwrap();

        let initialized: Message =
            serde_json::from_slice(&read_frame(&mut reader).await.unwrap()).unwrap();

        let refs: Message = serde_json::from_slice(&read_frame(&mut reader).await.unwrap()).unwrap();
        let id = refs.id_as_u64().unwrap();
        let response = Message::response(id, reply);
        write_frame(&mut write_half, &serde_json::to_vec(&response).unwrap()).await.unwrap();

        (init, initialized, refs)
    }

    #[tokio::test]
    async fn test_handshake_then_references() {
        let (client_end, server_end) = duplex(64 * 1024);
        let server = tokio::spawn(fake_server(
            server_end,
            json!([{
                "uri": "file:///work/pkg/a.go",
                "range": {"start": {"line": 10, "character": 1}, "end": {"line": 10, "character": 5}}
            }]),
        ));

        let (read_half, write_half) = split(client_end);
        let client = LanguageClient::connect(
            write_half,
            BufReader::new(read_half),
            PathBuf::from("/work"),
            CancellationToken::new(),
        )
        .await
        .unwrap();

        let refs = client
            .references(Path::new("pkg/a.go"), Position { line: 4, character: 2 })
            .await
            .unwrap();

        assert_eq!(refs.len(), 1);
        assert_eq!(refs[0].path, PathBuf::from("/work/pkg/a.go"));
        assert_eq!(refs[0].start.line, 10);

        let (init, initialized, request) = server.await.unwrap();
        assert_eq!(init.method.as_deref(), Some("initialize"));
        assert_eq!(init.params.as_ref().unwrap()["rootUri"], "file:///work");
        assert_eq!(initialized.method.as_deref(), Some("initialized"));
        assert!(initialized.id.is_none());

        let params = request.params.unwrap();
        assert_eq!(params["textDocument"]["uri"], "file:///work/pkg/a.go");
        assert_eq!(params["position"], json!({"line": 4, "character": 2}));
        assert_eq!(params["context"]["includeDeclaration"], true);
    }

    #[tokio::test]
    async fn test_empty_and_null_results_are_no_match() {
        for reply in [json!([]), Value::Null] {
            let (client_end, server_end) = duplex(64 * 1024);
            let server = tokio::spawn(fake_server(server_end, reply));

            let (read_half, write_half) = split(client_end);
            let client = LanguageClient::connect(
                write_half,
                BufReader::new(read_half),
                PathBuf::from("/work"),
                CancellationToken::new(),
            )
            .await
            .unwrap();

            let refs = client
                .references(Path::new("/work/main.go"), Position { line: 0, character: 0 })
                .await
                .unwrap();
            assert!(refs.is_empty());
            server.await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_handshake_failure_is_fatal() {
        let (client_end, server_end) = duplex(1024);
        tokio::spawn(async move {
            let (read_half, mut write_half) = split(server_end);
            let mut reader = BufReader::new(read_half);
            let init: Message =
                serde_json::from_slice(&read_frame(&mut reader).await.unwrap()).unwrap();
            let body = json!({
                "jsonrpc": "2.0",
                "id": init.id_as_u64().unwrap(),
                "error": {"code": -32002, "message": "server not ready"}
            });
            write_frame(&mut write_half, &serde_json::to_vec(&body).unwrap()).await.unwrap();
        });

        let (read_half, write_half) = split(client_end);
        let result = LanguageClient::connect(
            write_half,
            BufReader::new(read_half),
            PathBuf::from("/work"),
            CancellationToken::new(),
        )
        .await;

        match result {
            Err(RpcError::Handshake(inner)) => {
                assert!(inner.to_string().contains("server not ready"));
            }
            Err(other) => panic!("unexpected error: {}", other),
            Ok(_) => panic!("handshake should fail"),
        }
    }

    #[tokio::test]
    async fn test_spawn_missing_binary_reports_command() {
        let dir = tempfile::TempDir::new().unwrap();
        let config = LspConfig {
            command: "yoreviewer-no-such-language-server".to_string(),
            args: Vec::new(),
        };
        let err = LspProcess::spawn(dir.path(), &config, CancellationToken::new())
            .await
            .err()
            .unwrap();
        assert!(matches!(err, RpcError::Spawn { .. }));
        assert!(err.to_string().contains("yoreviewer-no-such-language-server"));
    }
}
