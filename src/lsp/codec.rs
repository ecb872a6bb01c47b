//! `Content-Length` framing for JSON-RPC over a byte stream.
//!
//! Every message is `Content-Length: <n>\r\n\r\n` followed by exactly
//! `n` bytes of JSON. Requests, responses and notifications share the
//! same framing.

use crate::error::RpcError;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncReadExt, AsyncWrite, AsyncWriteExt};

const CONTENT_LENGTH: &str = "Content-Length";

/// Prefix a JSON body with its header.
pub fn encode_frame(body: &[u8]) -> Vec<u8> {
    let mut frame = format!("{}: {}\r\n\r\n", CONTENT_LENGTH, body.len()).into_bytes();
    frame.extend_from_slice(body);
    frame
}

/// Write one framed message and flush it.
pub async fn write_frame<W>(writer: &mut W, body: &[u8]) -> Result<(), RpcError>
where
    W: AsyncWrite + Unpin,
{
    writer.write_all(&encode_frame(body)).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one framed message and return its body.
///
/// Headers are read line by line until a blank line. Other headers
/// (e.g. `Content-Type`) are ignored. A missing or non-numeric length,
/// EOF inside the headers and a short body are all framing errors: the
/// stream cannot be resynchronised after any of them.
pub async fn read_frame<R>(reader: &mut R) -> Result<Vec<u8>, RpcError>
where
    R: AsyncBufRead + Unpin,
{
    let mut content_length: Option<usize> = None;
    let mut seen_header = false;

    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 {
            return Err(RpcError::Framing(
                "stream closed while reading headers".to_string(),
            ));
        }

        let trimmed = line.trim_end_matches(['\r', '\n']);
        if trimmed.is_empty() {
            if !seen_header {
                // Stray blank line between frames.
                continue;
            }
            break;
        }
        seen_header = true;

        if let Some((name, value)) = trimmed.split_once(':') {
            if name.trim().eq_ignore_ascii_case(CONTENT_LENGTH) {
                let parsed = value.trim().parse::<usize>().map_err(|_| {
                    RpcError::Framing(format!("invalid Content-Length: {:?}", value.trim()))
                })?;
                content_length = Some(parsed);
            }
        } else {
            return Err(RpcError::Framing(format!("malformed header line: {:?}", trimmed)));
        }
    }

    let length = content_length
        .ok_or_else(|| RpcError::Framing("missing Content-Length header".to_string()))?;

    let mut body = vec![0u8; length];
    reader.read_exact(&mut body).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            RpcError::Framing(format!("truncated body: expected {} bytes", length))
        } else {
            RpcError::Io(e)
        }
    })?;

    Ok(body)
}
