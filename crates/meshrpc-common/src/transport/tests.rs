//! Tests for the transport layer
//!
//! These tests cover frame encoding/decoding, partial reads, size limits and
//! framed TCP round trips.

#[cfg(test)]
mod tests {
    use crate::protocol::{InvocationMode, Request, Response, RpcError};
    use crate::transport::*;
    use bytes::{BufMut, BytesMut};
    use serde_json::json;
    use std::sync::Arc;

    fn encoded_request(codec: &FrameCodec, request: &Request) -> BytesMut {
        let mut buf = BytesMut::new();
        codec.encode_request(request, &mut buf).unwrap();
        buf
    }

    fn sample_request() -> Request {
        Request::new("demo.Echo", "echo", vec![json!("hello"), json!({"n": 42})])
            .with_parameter_types(vec!["String".into(), "Map".into()])
            .with_attachment("group", "blue")
            .with_mode(InvocationMode::Async)
    }

    #[test]
    fn test_header_layout() {
        let codec = FrameCodec::json();
        let request = sample_request();
        let buf = encoded_request(&codec, &request);

        assert_eq!(&buf[0..2], &MAGIC.to_be_bytes());
        assert_eq!(buf[2], MessageType::Request as u8);
        assert_eq!(&buf[3..11], &request.request_id.to_be_bytes());
        let length = u32::from_be_bytes([buf[11], buf[12], buf[13], buf[14]]) as usize;
        assert_eq!(buf.len(), HEADER_LENGTH + length);
    }

    #[test]
    fn test_request_round_trip() {
        let codec = FrameCodec::json();
        let request = sample_request();
        let mut buf = encoded_request(&codec, &request);

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Request(request)));
        assert!(buf.is_empty());
    }

    #[test]
    fn test_response_round_trip() {
        let codec = FrameCodec::json();
        let response = Response::error(77, RpcError::Business("no such user".into())).with_process_time(12);
        let mut buf = BytesMut::new();
        codec.encode_response(&response, &mut buf).unwrap();

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Response(response)));
    }

    #[test]
    fn test_round_trip_at_minimum_and_maximum_size() {
        let minimal = Request::new("", "", vec![]);
        let codec = FrameCodec::json();
        let mut buf = encoded_request(&codec, &minimal);
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Request(minimal)));

        let large = Request::new("demo.Echo", "echo", vec![json!("x".repeat(64 * 1024))]);
        let payload_len = encoded_request(&codec, &large).len() - HEADER_LENGTH;

        let exact = FrameCodec::new(Arc::new(JsonSerializer), payload_len);
        let mut buf = encoded_request(&exact, &large);
        assert_eq!(exact.decode(&mut buf).unwrap(), Some(Frame::Request(large.clone())));

        let tight = FrameCodec::new(Arc::new(JsonSerializer), payload_len - 1);
        let mut out = BytesMut::new();
        assert!(tight.encode_request(&large, &mut out).is_err());
        assert!(out.is_empty());
    }

    #[test]
    fn test_partial_frames_are_not_consumed() {
        let codec = FrameCodec::json();
        let request = sample_request();
        let full = encoded_request(&codec, &request);

        // every split point, including inside the header
        for split in 0..full.len() {
            let mut buf = BytesMut::from(&full[..split]);
            assert_eq!(codec.decode(&mut buf).unwrap(), None);
            assert_eq!(buf.len(), split, "decode consumed bytes at split {}", split);

            buf.extend_from_slice(&full[split..]);
            assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Request(request.clone())));
        }
    }

    #[test]
    fn test_back_to_back_frames() {
        let codec = FrameCodec::json();
        let first = Request::new("svc", "a", vec![]);
        let second = Request::new("svc", "b", vec![]);
        let mut buf = encoded_request(&codec, &first);
        buf.extend_from_slice(&encoded_request(&codec, &second));

        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Request(first)));
        assert_eq!(codec.decode(&mut buf).unwrap(), Some(Frame::Request(second)));
        assert_eq!(codec.decode(&mut buf).unwrap(), None);
    }

    #[test]
    fn test_oversized_request_yields_reply_and_error() {
        let request = Request::new("demo.Echo", "echo", vec![json!("x".repeat(256))]);
        let mut buf = encoded_request(&FrameCodec::json(), &request);

        let strict = FrameCodec::new(Arc::new(JsonSerializer), 16);
        let err = strict.decode(&mut buf).unwrap_err();
        assert!(matches!(err.error, RpcError::Framework(_)));
        let reply = err.reply.expect("request frames get an error reply");
        assert_eq!(reply.request_id, request.request_id);
        assert!(!reply.is_success());
    }

    #[test]
    fn test_oversized_response_yields_error_only() {
        let response = Response::success(5, json!("y".repeat(256)));
        let mut buf = BytesMut::new();
        FrameCodec::json().encode_response(&response, &mut buf).unwrap();

        let strict = FrameCodec::new(Arc::new(JsonSerializer), 16);
        let err = strict.decode(&mut buf).unwrap_err();
        assert!(err.reply.is_none());
    }

    #[test]
    fn test_bad_magic() {
        let mut buf = BytesMut::new();
        buf.put_u16(0xbeef);
        buf.put_u8(0);
        buf.put_u64(1);
        buf.put_u32(0);

        let err = FrameCodec::json().decode(&mut buf).unwrap_err();
        assert!(err.reply.is_none());
        assert!(err.to_string().contains("magic"));
    }

    #[test]
    fn test_unknown_message_type() {
        let mut buf = BytesMut::new();
        buf.put_u16(MAGIC);
        buf.put_u8(9);
        buf.put_u64(1);
        buf.put_u32(0);

        assert!(FrameCodec::json().decode(&mut buf).is_err());
    }

    #[test]
    fn test_undecodable_request_payload_is_rejected_with_id() {
        let mut buf = BytesMut::new();
        buf.put_u16(MAGIC);
        buf.put_u8(MessageType::Request as u8);
        buf.put_u64(31);
        buf.put_u32(3);
        buf.put_slice(b"{{{");

        match FrameCodec::json().decode(&mut buf).unwrap() {
            Some(Frame::Rejected(reply)) => {
                assert_eq!(reply.request_id, 31);
                assert!(matches!(reply.error, Some(RpcError::Serialization(_))));
            }
            other => panic!("unexpected frame: {:?}", other),
        }
        assert!(buf.is_empty());
    }

    #[test]
    fn test_undecodable_response_payload_becomes_error_response() {
        let mut buf = BytesMut::new();
        buf.put_u16(MAGIC);
        buf.put_u8(MessageType::Response as u8);
        buf.put_u64(32);
        buf.put_u32(2);
        buf.put_slice(b"[]");

        match FrameCodec::json().decode(&mut buf).unwrap() {
            Some(Frame::Response(response)) => {
                assert_eq!(response.request_id, 32);
                assert!(!response.is_success());
            }
            other => panic!("unexpected frame: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_framed_tcp_round_trip() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let (mut reader, writer) = framed(stream, FrameCodec::json());
            while let Ok(Some(Frame::Request(request))) = reader.next_frame().await {
                let reply = Response::success(request.request_id, json!(request.method_name));
                writer.write_response(&reply).await.unwrap();
            }
        });

        let stream = connect(&addr, std::time::Duration::from_secs(1)).await.unwrap();
        let (mut reader, writer) = framed(stream, FrameCodec::json());
        let request = Request::new("svc", "ping", vec![]);
        writer.write_request(&request).await.unwrap();

        match reader.next_frame().await.unwrap() {
            Some(Frame::Response(response)) => {
                assert_eq!(response.request_id, request.request_id);
                assert_eq!(response.into_result(), Ok(json!("ping")));
            }
            other => panic!("unexpected frame: {:?}", other),
        }

        writer.shutdown().await;
        server.await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_refused() {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap().to_string();
        drop(listener);

        let result = connect(&addr, std::time::Duration::from_millis(500)).await;
        assert!(matches!(result, Err(RpcError::Connection(_))));
    }
}
