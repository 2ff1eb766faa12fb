use crate::protocol::error::Result;
use crate::protocol::{Request, Response};

/// Byte-level message serializer, selected by the `serialization` URL parameter.
///
/// The frame codec tells the serializer which shape to expect from the frame's
/// message type, so implementations never have to sniff the payload.
pub trait Serializer: Send + Sync + 'static {
    /// Name under which the serializer is registered.
    fn name(&self) -> &'static str;

    fn serialize_request(&self, request: &Request) -> Result<Vec<u8>>;

    fn serialize_response(&self, response: &Response) -> Result<Vec<u8>>;

    fn deserialize_request(&self, data: &[u8]) -> Result<Request>;

    fn deserialize_response(&self, data: &[u8]) -> Result<Response>;
}

/// JSON serializer, the default.
///
/// # Example
///
/// ```
/// use meshrpc_common::transport::{JsonSerializer, Serializer};
/// use meshrpc_common::protocol::Request;
/// use serde_json::json;
///
/// let request = Request::new("demo.Echo", "echo", vec![json!(42)]);
/// let bytes = JsonSerializer.serialize_request(&request).unwrap();
/// assert_eq!(JsonSerializer.deserialize_request(&bytes).unwrap(), request);
/// ```
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonSerializer;

impl Serializer for JsonSerializer {
    fn name(&self) -> &'static str {
        "json"
    }

    fn serialize_request(&self, request: &Request) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(request)?)
    }

    fn serialize_response(&self, response: &Response) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(response)?)
    }

    fn deserialize_request(&self, data: &[u8]) -> Result<Request> {
        Ok(serde_json::from_slice(data)?)
    }

    fn deserialize_response(&self, data: &[u8]) -> Result<Response> {
        Ok(serde_json::from_slice(data)?)
    }
}
