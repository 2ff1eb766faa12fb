//! Tests for the protocol module
//!
//! These tests cover request construction, id generation, routing keys and
//! how errors travel inside responses.

#[cfg(test)]
mod tests {
    use super::super::*;
    use serde_json::json;
    use std::collections::HashSet;

    #[test]
    fn test_request_creation() {
        let req = Request::new("demo.Echo", "echo", vec![json!("hi")]);
        assert_eq!(req.interface_name, "demo.Echo");
        assert_eq!(req.method_name, "echo");
        assert_eq!(req.arguments, vec![json!("hi")]);
        assert_eq!(req.mode, InvocationMode::Sync);
        assert!(req.attachments.is_empty());
    }

    #[test]
    fn test_request_ids_start_positive_and_grow() {
        let first = Request::new("svc", "m", vec![]).request_id;
        let second = Request::new("svc", "m", vec![]).request_id;
        assert!(first >= 1);
        assert!(second > first);
    }

    #[test]
    fn test_request_id_uniqueness_under_stress() {
        use std::sync::{Arc, Mutex};
        use std::thread;

        let ids = Arc::new(Mutex::new(HashSet::new()));
        let mut handles = vec![];

        for _ in 0..8 {
            let ids_clone = Arc::clone(&ids);
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    let id = next_request_id();
                    assert!(ids_clone.lock().unwrap().insert(id), "Duplicate ID detected: {}", id);
                }
            }));
        }

        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ids.lock().unwrap().len(), 8_000);
    }

    #[test]
    fn test_service_key_defaults() {
        let req = Request::new("demo.Echo", "echo", vec![]);
        assert_eq!(req.service_key(), "default/demo.Echo/1.0.0");

        let req = req.with_attachment("group", "blue").with_attachment("version", "2.1.0");
        assert_eq!(req.service_key(), "blue/demo.Echo/2.1.0");
    }

    #[test]
    fn test_response_success() {
        let resp = Response::success(123, json!({"result": "ok"}));
        assert!(resp.is_success());
        assert_eq!(resp.request_id, 123);
        assert_eq!(resp.into_result(), Ok(json!({"result": "ok"})));
    }

    #[test]
    fn test_response_error_keeps_variant() {
        let resp = Response::error(456, RpcError::Timeout(100)).with_process_time(3);
        assert!(!resp.is_success());
        assert_eq!(resp.process_time_ms, 3);
        assert_eq!(resp.into_result(), Err(RpcError::Timeout(100)));
    }

    #[test]
    fn test_error_survives_serialization() {
        let resp = Response::error(9, RpcError::Business("boom".into()));
        let value = serde_json::to_value(&resp).unwrap();
        assert_eq!(value["error"], json!({"kind": "Business", "message": "boom"}));

        let back: Response = serde_json::from_value(value).unwrap();
        assert_eq!(back.error, Some(RpcError::Business("boom".into())));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(RpcError::Business("x".into()).kind(), ErrorKind::Business);
        assert_eq!(RpcError::Timeout(1).kind(), ErrorKind::Transport);
        assert_eq!(RpcError::Connection("x".into()).kind(), ErrorKind::Transport);
        assert_eq!(RpcError::ServiceUnavailable("x".into()).kind(), ErrorKind::Framework);
        assert_eq!(RpcError::Serialization("x".into()).kind(), ErrorKind::Framework);
        assert!(!RpcError::Framework("x".into()).is_business());
    }

    #[test]
    fn test_io_error_maps_to_connection() {
        let err: RpcError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "pipe").into();
        assert!(matches!(err, RpcError::Connection(_)));
    }
}
