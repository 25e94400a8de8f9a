//! Request and response messages of the mock call service.
//!
//! These are the `mock.proto` messages; services and tests name them from
//! here rather than from the generated module.

pub use crate::pb::{SimpleRequest, SimpleResponse, StreamRequest, StreamResponse};

#[cfg(test)]
mod tests {
    use prost::Message;

    use super::*;

    #[test]
    fn simple_request_wire_layout() {
        let req = SimpleRequest {
            message: "hi".into(),
            value: 42,
        };
        assert_eq!(req.encode_to_vec(), vec![0x0a, 0x02, b'h', b'i', 0x10, 42]);
    }

    #[test]
    fn missing_fields_decode_as_defaults() {
        let req = StreamRequest::decode(&[][..]).unwrap();
        assert_eq!(req, StreamRequest::default());
        let req = SimpleRequest::decode(&[0x0a, 0x02, b'h', b'i'][..]).unwrap();
        assert_eq!(req.message, "hi");
        assert_eq!(req.value, 0);
    }

    #[test]
    fn stream_response_field_numbers() {
        let resp = StreamResponse {
            id: "a".into(),
            data: "b".into(),
            timestamp: 10,
            sequence: 2,
        };
        assert_eq!(
            resp.encode_to_vec(),
            vec![0x0a, 0x01, b'a', 0x12, 0x01, b'b', 0x18, 10, 0x20, 2]
        );
    }
}
