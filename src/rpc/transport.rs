//! Newline-delimited JSON over a pair of byte streams
//!
//! Used by the client channel (child stdout/stdin) and by the server host
//! (own stdin/stdout). Tests drive it over `tokio::io::duplex`.

use crate::rpc::protocol::{JsonRpcRequest, JsonRpcResponse};
use crate::types::ChannelError;
use bytes::{Bytes, BytesMut};
use futures::{SinkExt, StreamExt};
use serde::Serialize;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{
    AnyDelimiterCodec, AnyDelimiterCodecError, Decoder, FramedRead, FramedWrite, LinesCodec,
};
use tracing::debug;

/// Longest line accepted from a peer.
pub const MAX_LINE_LENGTH: usize = 8 * 1024 * 1024;

/// One input line, or why it could not be used.
#[derive(Debug, PartialEq, Eq)]
enum Frame {
    Line(String),
    Unusable(String),
}

/// Splits on `\n` and decodes UTF-8 itself.
///
/// Oversized or non-UTF-8 lines come out as `Frame::Unusable` instead of a
/// codec error, so the stream keeps going with the next line. Only I/O
/// failures end it.
struct LineDecoder {
    inner: AnyDelimiterCodec,
}

impl LineDecoder {
    fn new() -> Self {
        Self {
            inner: AnyDelimiterCodec::new_with_max_length(
                b"\n".to_vec(),
                b"\n".to_vec(),
                MAX_LINE_LENGTH,
            ),
        }
    }

    fn frame(chunk: Result<Option<Bytes>, AnyDelimiterCodecError>) -> io::Result<Option<Frame>> {
        match chunk {
            Ok(Some(chunk)) => Ok(Some(match String::from_utf8(chunk.to_vec()) {
                Ok(mut line) => {
                    if line.ends_with('\r') {
                        line.pop();
                    }
                    Frame::Line(line)
                }
                Err(e) => Frame::Unusable(format!("Line is not valid UTF-8: {}", e)),
            })),
            Ok(None) => Ok(None),
            Err(AnyDelimiterCodecError::MaxChunkLengthExceeded) => Ok(Some(Frame::Unusable(
                format!("Line exceeds {} bytes", MAX_LINE_LENGTH),
            ))),
            Err(AnyDelimiterCodecError::Io(e)) => Err(e),
        }
    }
}

impl Decoder for LineDecoder {
    type Item = Frame;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> io::Result<Option<Frame>> {
        Self::frame(self.inner.decode(src))
    }

    fn decode_eof(&mut self, src: &mut BytesMut) -> io::Result<Option<Frame>> {
        Self::frame(self.inner.decode_eof(src))
    }
}

pub struct LineTransport<R, W> {
    reader: FramedRead<R, LineDecoder>,
    writer: FramedWrite<W, LinesCodec>,
}

impl<R, W> LineTransport<R, W>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    pub fn new(reader: R, writer: W) -> Self {
        Self {
            reader: FramedRead::new(reader, LineDecoder::new()),
            writer: FramedWrite::new(writer, LinesCodec::new()),
        }
    }

    /// Serialize `message` as one line, write it and flush.
    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> Result<(), ChannelError> {
        let line = serde_json::to_string(message)
            .map_err(|e| ChannelError::Protocol(format!("Failed to serialize message: {}", e)))?;

        self.writer
            .send(line)
            .await
            .map_err(|e| ChannelError::Transport(format!("Failed to write message: {}", e)))
    }

    /// Read the next line; `None` once the peer closed its output.
    ///
    /// A line that is too long or not UTF-8 is a protocol error and is
    /// consumed, so the following call reads the line after it. Cancel safe.
    pub async fn read_line(&mut self) -> Result<Option<String>, ChannelError> {
        match self.reader.next().await {
            Some(Ok(Frame::Line(line))) => Ok(Some(line)),
            Some(Ok(Frame::Unusable(reason))) => Err(ChannelError::Protocol(reason)),
            Some(Err(e)) => Err(ChannelError::Transport(format!("Failed to read line: {}", e))),
            None => Ok(None),
        }
    }

    /// One write followed by exactly one read.
    ///
    /// The response id must match the request id; a mismatch is reported as a
    /// protocol error rather than skipped.
    pub async fn round_trip(
        &mut self,
        request: &JsonRpcRequest,
    ) -> Result<JsonRpcResponse, ChannelError> {
        self.write_message(request).await?;
        debug!("Sent request {:?}: {}", request.id, request.method);

        let line = self.read_line().await?.ok_or_else(|| {
            ChannelError::Protocol("Server closed its output before responding".to_string())
        })?;

        if line.trim().is_empty() {
            return Err(ChannelError::Protocol(
                "Received an empty line instead of a response".to_string(),
            ));
        }

        let response: JsonRpcResponse = serde_json::from_str(&line)
            .map_err(|e| ChannelError::Protocol(format!("Invalid JSON response: {}", e)))?;

        if response.id != request.id {
            return Err(ChannelError::Protocol(format!(
                "Response id {:?} does not match request id {:?}",
                response.id, request.id
            )));
        }

        debug!("Received response {:?}", response.id);
        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};
    use tokio::io::{duplex, AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

    /// Client-side transport plus the peer's ends of the two pipes.
    fn pair() -> (
        LineTransport<DuplexStream, DuplexStream>,
        BufReader<DuplexStream>,
        DuplexStream,
    ) {
        let (client_out, peer_in) = duplex(64 * 1024);
        let (peer_out, client_in) = duplex(64 * 1024);
        (
            LineTransport::new(client_in, client_out),
            BufReader::new(peer_in),
            peer_out,
        )
    }

    /// Fake peer that answers every request by echoing its id.
    async fn echo_peer(mut reader: BufReader<DuplexStream>, mut writer: DuplexStream) {
        let mut line = String::new();
        while reader.read_line(&mut line).await.unwrap_or(0) > 0 {
            let request: Value = serde_json::from_str(line.trim()).unwrap();
            let response = json!({
                "jsonrpc": "2.0",
                "id": request["id"],
                "result": {"method": request["method"]}
            });
            let mut out = serde_json::to_string(&response).unwrap();
            out.push('\n');
            writer.write_all(out.as_bytes()).await.unwrap();
            line.clear();
        }
    }

    #[tokio::test]
    async fn test_response_id_matches_request_id() {
        let (mut transport, reader, writer) = pair();
        tokio::spawn(echo_peer(reader, writer));

        for id in [1, 2, 17, 9000] {
            let request = JsonRpcRequest::new(id, "tools/list", Map::new());
            let response = transport.round_trip(&request).await.unwrap();
            assert_eq!(response.id, Some(id));
            assert_eq!(response.result.unwrap()["method"], "tools/list");
        }
    }

    #[tokio::test]
    async fn test_request_is_written_as_single_line() {
        let (mut transport, mut reader, _writer) = pair();
        let mut params = Map::new();
        params.insert("text".to_string(), json!("a\nb"));

        transport
            .write_message(&JsonRpcRequest::new(5, "tools/call", params))
            .await
            .unwrap();

        let mut line = String::new();
        reader.read_line(&mut line).await.unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        let parsed: JsonRpcRequest = serde_json::from_str(line.trim()).unwrap();
        assert_eq!(parsed.params["text"], "a\nb");
    }

    #[tokio::test]
    async fn test_invalid_json_is_protocol_error() {
        let (mut transport, _reader, mut writer) = pair();
        writer.write_all(b"this is not json\n").await.unwrap();

        let err = transport
            .round_trip(&JsonRpcRequest::new(1, "tools/list", Map::new()))
            .await
            .unwrap_err();
        assert!(err.is_protocol(), "unexpected error: {}", err);
    }

    #[tokio::test]
    async fn test_empty_line_is_protocol_error() {
        let (mut transport, _reader, mut writer) = pair();
        writer.write_all(b"\n").await.unwrap();

        let err = transport
            .round_trip(&JsonRpcRequest::new(1, "tools/list", Map::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_closed_output_is_protocol_error() {
        let (mut transport, reader, writer) = pair();
        drop(writer);
        // Keep the peer's read side alive so the write succeeds.
        let _reader = reader;

        let err = transport
            .round_trip(&JsonRpcRequest::new(1, "tools/list", Map::new()))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Protocol(_)));
    }

    #[tokio::test]
    async fn test_mismatched_id_is_rejected() {
        let (mut transport, _reader, mut writer) = pair();
        writer
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":99,\"result\":[]}\n")
            .await
            .unwrap();

        let err = transport
            .round_trip(&JsonRpcRequest::new(1, "tools/list", Map::new()))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("does not match"));
    }

    #[tokio::test]
    async fn test_write_to_closed_peer_is_transport_error() {
        let (client_out, peer_in) = duplex(64);
        let (_peer_out, client_in) = duplex(64);
        drop(peer_in);
        let mut transport = LineTransport::new(client_in, client_out);

        let err = transport
            .write_message(&JsonRpcRequest::new(1, "ping", Map::new()))
            .await
            .unwrap_err();
        assert!(err.is_transport());
    }

    #[tokio::test]
    async fn test_invalid_utf8_line_is_skipped_as_protocol_error() {
        let (mut transport, _reader, mut writer) = pair();
        writer.write_all(b"\xff\xfe garbage\n").await.unwrap();
        writer.write_all(b"{\"after\":true}\r\n").await.unwrap();

        let err = transport.read_line().await.unwrap_err();
        assert!(err.is_protocol(), "unexpected error: {}", err);
        assert!(err.to_string().contains("UTF-8"));

        let line = transport.read_line().await.unwrap().unwrap();
        assert_eq!(line, "{\"after\":true}");

        drop(writer);
        assert_eq!(transport.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_oversized_line_is_skipped_as_protocol_error() {
        let (client_out, _peer_in) = duplex(64 * 1024);
        let (mut peer_out, client_in) = duplex(64 * 1024);
        let mut transport = LineTransport::new(client_in, client_out);

        let writer = tokio::spawn(async move {
            let chunk = vec![b'x'; 1024 * 1024];
            for _ in 0..(MAX_LINE_LENGTH / chunk.len() + 1) {
                peer_out.write_all(&chunk).await.unwrap();
            }
            peer_out.write_all(b"\nnext\n").await.unwrap();
        });

        let err = transport.read_line().await.unwrap_err();
        assert!(err.is_protocol(), "unexpected error: {}", err);
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("next"));
        writer.await.unwrap();
    }
}
