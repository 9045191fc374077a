//! Shared helpers for integration tests: a raw-socket test client that
//! frames requests and decodes chunked responses.

use std::collections::HashMap;

use anyhow::Context;
use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

#[allow(dead_code)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

/// Writes a bare request with no body.
#[allow(dead_code)]
pub async fn send_request<S: AsyncWrite + Unpin>(
    stream: &mut S,
    method: &str,
    target: &str,
) -> anyhow::Result<()> {
    let raw = format!("{} {} HTTP/1.1\r\n\r\n", method, target);
    stream.write_all(raw.as_bytes()).await?;
    stream.flush().await?;
    Ok(())
}

/// Reads one chunked response off the stream: status line, headers
/// (lowercased keys), and the decoded body through the terminal chunk.
#[allow(dead_code)]
pub async fn read_response<S: AsyncRead + Unpin>(stream: &mut S) -> anyhow::Result<RawResponse> {
    let mut buf = BytesMut::with_capacity(4096);

    // Head
    let head_end = loop {
        if let Some(pos) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            break pos;
        }
        let n = stream.read_buf(&mut buf).await?;
        anyhow::ensure!(n > 0, "connection closed before response head");
    };

    let head = buf.split_to(head_end + 4);
    let head_str = std::str::from_utf8(&head[..head_end]).context("non-utf8 response head")?;
    let mut lines = head_str.split("\r\n");

    let status_line = lines.next().context("empty response")?;
    let status: u16 = status_line
        .split_whitespace()
        .nth(1)
        .context("bad status line")?
        .parse()?;

    let mut headers = HashMap::new();
    for line in lines {
        if let Some((k, v)) = line.split_once(':') {
            headers.insert(k.trim().to_ascii_lowercase(), v.trim().to_string());
        }
    }

    anyhow::ensure!(
        headers
            .get("transfer-encoding")
            .is_some_and(|v| v.eq_ignore_ascii_case("chunked")),
        "response is not chunked"
    );

    // Chunked body through the terminal frame
    let mut body = Vec::new();
    loop {
        let line_end = loop {
            if let Some(pos) = buf.windows(2).position(|w| w == b"\r\n") {
                break pos;
            }
            let n = stream.read_buf(&mut buf).await?;
            anyhow::ensure!(n > 0, "connection closed mid-body");
        };

        let size_str = std::str::from_utf8(&buf[..line_end])?.trim().to_string();
        let size = usize::from_str_radix(&size_str, 16)?;
        let frame_len = line_end + 2 + size + 2;

        while buf.len() < frame_len {
            let n = stream.read_buf(&mut buf).await?;
            anyhow::ensure!(n > 0, "connection closed mid-chunk");
        }

        let frame = buf.split_to(frame_len);
        if size == 0 {
            break;
        }
        body.extend_from_slice(&frame[line_end + 2..line_end + 2 + size]);
    }

    Ok(RawResponse {
        status,
        headers,
        body,
    })
}

/// True once the peer has closed the stream (read returns 0).
#[allow(dead_code)]
pub async fn peer_closed<S: AsyncRead + Unpin>(stream: &mut S) -> bool {
    let mut probe = [0u8; 16];
    matches!(stream.read(&mut probe).await, Ok(0))
}
