use bytes::{Bytes, BytesMut};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite};
use tracing::debug;

use crate::dispatch::Dispatcher;
use crate::http::parser::{
    BodyLength, ChunkProgress, ChunkedDecoder, ParseError, body_length, parse_request_head,
};
use crate::http::request::{Request, RequestHead};
use crate::http::response::ResponseDescriptor;
use crate::http::writer::ResponseWriter;

/// Reject request heads larger than this outright.
const MAX_HEADER_BYTES: usize = 64 * 1024;

/// Per-connection request state machine.
///
/// Generic over the byte stream so it runs unchanged over a plain TCP
/// socket or a TLS session. Exactly one request is in flight at a time:
/// a new request may not begin assembly until the prior response has been
/// fully written, and bytes that arrive early are answered with a 400 and
/// the connection is closed after the response goes out.
pub struct Connection<S> {
    stream: S,
    buffer: BytesMut,
    dispatcher: Dispatcher,
    state: ConnectionState,
}

enum ConnectionState {
    /// Waiting for (more of) a request line and headers
    AwaitingHeaders,
    /// Head parsed; accumulating body chunks
    AssemblingBody {
        head: RequestHead,
        progress: BodyProgress,
        chunks: Vec<Bytes>,
    },
    /// Request fully assembled, not yet handed to the dispatcher
    Complete { request: Request },
    /// Response descriptor ready to be framed
    Writing { writer: ResponseWriter, close: bool },
    Closed,
}

enum BodyProgress {
    /// Content-Length framing: bytes still expected
    Remaining(usize),
    /// Chunked framing: decoder carries its own position
    Chunked(ChunkedDecoder),
}

/// What ended the wait on a dispatched request.
enum DispatchOutcome {
    Response(ResponseDescriptor),
    /// New request bytes arrived before the response: pipelining violation
    Violation,
    PeerClosed,
}

impl<S> Connection<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, dispatcher: Dispatcher) -> Self {
        Self {
            stream,
            buffer: BytesMut::with_capacity(4096),
            dispatcher,
            state: ConnectionState::AwaitingHeaders,
        }
    }

    /// Drives the connection until it closes.
    ///
    /// Protocol violations are answered with a framed 400 before the close;
    /// socket-level failures propagate as errors and tear the connection
    /// down without a response.
    pub async fn run(&mut self) -> anyhow::Result<()> {
        loop {
            match std::mem::replace(&mut self.state, ConnectionState::Closed) {
                ConnectionState::AwaitingHeaders => {
                    self.state = self.await_headers().await?;
                }

                ConnectionState::AssemblingBody {
                    head,
                    progress,
                    chunks,
                } => {
                    self.state = self.assemble_body(head, progress, chunks).await?;
                }

                ConnectionState::Complete { request } => {
                    self.state = self.dispatch(request).await?;
                }

                ConnectionState::Writing { mut writer, close } => {
                    writer.write_to_stream(&mut self.stream).await?;
                    self.state = if close {
                        ConnectionState::Closed
                    } else {
                        ConnectionState::AwaitingHeaders
                    };
                }

                ConnectionState::Closed => break,
            }
        }

        Ok(())
    }

    async fn await_headers(&mut self) -> anyhow::Result<ConnectionState> {
        match parse_request_head(&self.buffer) {
            Ok((head, consumed)) => {
                let _ = self.buffer.split_to(consumed);
                Ok(self.begin_body(head))
            }

            Err(ParseError::Incomplete) => {
                if self.buffer.len() > MAX_HEADER_BYTES {
                    return Ok(reject("request head too large"));
                }

                let n = self.stream.read_buf(&mut self.buffer).await?;
                if n == 0 {
                    if !self.buffer.is_empty() {
                        debug!("Peer closed mid-request");
                    }
                    return Ok(ConnectionState::Closed);
                }
                Ok(ConnectionState::AwaitingHeaders)
            }

            Err(ParseError::InvalidMethod) => Ok(reject("unrecognized method")),

            Err(e) => Ok(reject(e.to_string())),
        }
    }

    fn begin_body(&mut self, head: RequestHead) -> ConnectionState {
        match body_length(&head) {
            Ok(BodyLength::None) => ConnectionState::Complete {
                request: Request::new(head, Vec::new()),
            },
            Ok(BodyLength::Length(n)) => ConnectionState::AssemblingBody {
                head,
                progress: BodyProgress::Remaining(n),
                chunks: Vec::new(),
            },
            Ok(BodyLength::Chunked) => ConnectionState::AssemblingBody {
                head,
                progress: BodyProgress::Chunked(ChunkedDecoder::new()),
                chunks: Vec::new(),
            },
            Err(e) => reject(e.to_string()),
        }
    }

    async fn assemble_body(
        &mut self,
        head: RequestHead,
        mut progress: BodyProgress,
        mut chunks: Vec<Bytes>,
    ) -> anyhow::Result<ConnectionState> {
        // Consume whatever is already buffered
        let complete = match &mut progress {
            BodyProgress::Remaining(remaining) => {
                if *remaining > 0 && !self.buffer.is_empty() {
                    let take = self.buffer.len().min(*remaining);
                    chunks.push(self.buffer.split_to(take).freeze());
                    *remaining -= take;
                }
                *remaining == 0
            }
            BodyProgress::Chunked(decoder) => loop {
                match decoder.decode(&mut self.buffer) {
                    Ok(ChunkProgress::Chunk(data)) => chunks.push(data),
                    Ok(ChunkProgress::Done) => break true,
                    Ok(ChunkProgress::NeedMore) => break false,
                    Err(e) => return Ok(reject(e.to_string())),
                }
            },
        };

        if complete {
            return Ok(ConnectionState::Complete {
                request: Request::new(head, chunks),
            });
        }

        let n = self.stream.read_buf(&mut self.buffer).await?;
        if n == 0 {
            // Peer vanished mid-body; nothing left to answer
            debug!("Peer closed mid-body");
            return Ok(ConnectionState::Closed);
        }

        Ok(ConnectionState::AssemblingBody {
            head,
            progress,
            chunks,
        })
    }

    async fn dispatch(&mut self, request: Request) -> anyhow::Result<ConnectionState> {
        // Leftover bytes after a complete request mean the peer started a
        // second request before this response was written.
        if !self.buffer.is_empty() {
            debug!("Pipelining violation: request bytes buffered before response");
            return Ok(reject("second request before prior response completed"));
        }

        let keep_alive = request.keep_alive();

        let mut reply = match self.dispatcher.submit(request).await {
            Ok(reply) => reply,
            Err(e) => {
                // Dispatch unavailable is an application error, not a
                // protocol one; the connection stays reusable.
                return Ok(ConnectionState::Writing {
                    writer: ResponseWriter::new(ResponseDescriptor::internal_error(e.to_string())),
                    close: !keep_alive,
                });
            }
        };

        // While dispatched we keep watching the socket: any bytes that show
        // up before the response are a pipelining violation.
        let Self { stream, buffer, .. } = self;
        let outcome = tokio::select! {
            response = &mut reply => match response {
                Ok(descriptor) => DispatchOutcome::Response(descriptor),
                // Worker dropped the reply channel; treat as an internal error
                Err(_) => DispatchOutcome::Response(ResponseDescriptor::internal_error(
                    "request processing was aborted",
                )),
            },
            read = stream.read_buf(buffer) => {
                if read? == 0 {
                    DispatchOutcome::PeerClosed
                } else {
                    DispatchOutcome::Violation
                }
            }
        };

        match outcome {
            DispatchOutcome::Response(descriptor) => Ok(ConnectionState::Writing {
                writer: ResponseWriter::new(descriptor),
                close: !keep_alive,
            }),
            DispatchOutcome::Violation => {
                debug!("Pipelining violation: request bytes arrived while dispatched");
                Ok(reject("second request before prior response completed"))
            }
            DispatchOutcome::PeerClosed => {
                debug!("Peer closed while request was dispatched");
                Ok(ConnectionState::Closed)
            }
        }
    }
}

/// A 400 response followed by connection close.
fn reject(reason: impl Into<Bytes>) -> ConnectionState {
    ConnectionState::Writing {
        writer: ResponseWriter::new(ResponseDescriptor::bad_request(reason)),
        close: true,
    }
}
