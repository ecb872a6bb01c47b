//! Language server access for cross-reference queries.
//!
//! This module provides the stdio JSON-RPC transport, the client that
//! performs the handshake, and the `CodeAnalyzer` contract the tools
//! depend on.

pub mod client;
pub mod codec;
pub mod transport;
pub mod types;

use crate::error::RpcError;
use async_trait::async_trait;
use std::path::Path;

pub use client::LspProcess;
pub use types::{FileLocation, Position};

/// Semantic cross-reference queries.
#[async_trait]
pub trait CodeAnalyzer: Send + Sync {
    /// References to the symbol at a 0-based `position` in `file`.
    ///
    /// An empty list means no match.
    async fn references(
        &self,
        file: &Path,
        position: Position,
    ) -> Result<Vec<FileLocation>, RpcError>;
}
