use tokio::io::{AsyncWrite, AsyncWriteExt};

use crate::http::response::ResponseDescriptor;

const HTTP_VERSION: &str = "HTTP/1.1";

fn serialize_head(resp: &ResponseDescriptor) -> Vec<u8> {
    let mut buf = Vec::new();

    // Status line
    let status_line = format!(
        "{} {} {}\r\n",
        HTTP_VERSION,
        resp.status.as_u16(),
        resp.status.reason_phrase()
    );
    buf.extend_from_slice(status_line.as_bytes());

    // Headers
    for (k, v) in &resp.headers {
        buf.extend_from_slice(k.as_bytes());
        buf.extend_from_slice(b": ");
        buf.extend_from_slice(v.as_bytes());
        buf.extend_from_slice(b"\r\n");
    }
    buf.extend_from_slice(b"Transfer-Encoding: chunked\r\n");

    // Header/body separator
    buf.extend_from_slice(b"\r\n");

    buf
}

fn serialize_chunk(data: &[u8]) -> Vec<u8> {
    let mut buf = format!("{:x}\r\n", data.len()).into_bytes();
    buf.extend_from_slice(data);
    buf.extend_from_slice(b"\r\n");
    buf
}

/// Frames a response descriptor onto the wire.
///
/// The frame order is fixed: the status/header frame first, then one chunk
/// frame per body chunk, then exactly one terminal frame (`0\r\n\r\n`). The
/// terminal frame is what lets the connection state machine reset for the
/// next request. A write failure mid-stream is propagated so the caller can
/// tear the connection down; no partial-response retry is attempted.
pub struct ResponseWriter {
    response: ResponseDescriptor,
}

impl ResponseWriter {
    pub fn new(response: ResponseDescriptor) -> Self {
        Self { response }
    }

    pub async fn write_to_stream<S>(&mut self, stream: &mut S) -> anyhow::Result<()>
    where
        S: AsyncWrite + Unpin,
    {
        stream.write_all(&serialize_head(&self.response)).await?;

        for chunk in &self.response.body {
            if chunk.is_empty() {
                // An empty data chunk would read as the terminal frame
                continue;
            }
            stream.write_all(&serialize_chunk(chunk)).await?;
        }

        // Terminal frame
        stream.write_all(b"0\r\n\r\n").await?;
        stream.flush().await?;

        Ok(())
    }
}
