//! Binary codec for keymap RPC frames.
//!
//! Wire format:
//! ```text
//! [version:1][kind:1][op:1][reserved:1][request_id:4][payload_len:4][payload:N]
//! ```
//! Total header size: 12 bytes.  All multi-byte integers are big-endian.
//!
//! Payload conventions:
//! - repeated fields: `[count:4]` followed by `count` elements, pulled from
//!   their [`crate::protocol::Repeated`] generator while encoding;
//! - optional strings: `[present:1]` then, if present, `[len:2][utf8:len]`;
//! - booleans: one byte, any non-zero value is `true`.

use thiserror::Error;

use crate::domain::layout::KeyPhysicalAttrs;
use crate::protocol::messages::{
    BindingMessage, DecodedFrame, DecodedKeymap, DecodedKeymapResponse, DecodedLayer,
    DecodedPhysicalLayout, DecodedPhysicalLayouts, DecodedResponseBody, FrameHeader, FrameKind,
    KeymapRequest, KeymapResponse, KeymapView, MetaError, Notification, PhysicalLayoutsView,
    RequestOp, ResponseBody, RpcRequest, RpcResponse, SetActivePhysicalLayoutError,
    SetLayerBindingRequest, SetLayerBindingResponse, HEADER_SIZE, MAX_PAYLOAD_LEN, META_OP,
    PROTOCOL_VERSION, UNSAVED_CHANGES_STATUS_CHANGED_OP,
};

/// Errors that can occur during frame encoding or decoding.
#[derive(Debug, Error, PartialEq)]
pub enum ProtocolError {
    /// The byte slice is shorter than the minimum required length.
    #[error("insufficient data: need at least {needed} bytes, got {available}")]
    InsufficientData { needed: usize, available: usize },

    /// The frame kind byte in the header is not a recognized value.
    #[error("unknown frame kind: 0x{0:02X}")]
    UnknownFrameKind(u8),

    /// The frame is valid but not of a kind the caller accepts here.
    #[error("unexpected frame kind: {0:?}")]
    UnexpectedFrameKind(FrameKind),

    /// The protocol version in the header is not supported.
    #[error("unsupported protocol version: {0}")]
    UnsupportedVersion(u8),

    /// The op byte does not name a known operation.
    #[error("unknown operation: 0x{0:02X}")]
    UnknownOperation(u8),

    /// The payload could not be parsed (field value out of range, UTF-8 error, etc.).
    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    /// The encoded payload length field does not match the actual data available.
    #[error("payload length mismatch: header says {declared}, available is {available}")]
    PayloadLengthMismatch { declared: usize, available: usize },

    /// The header announces a payload above [`MAX_PAYLOAD_LEN`].
    #[error("payload too large: {0} bytes")]
    PayloadTooLarge(usize),
}

// ── Public API ────────────────────────────────────────────────────────────────

/// Encodes a request frame.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the payload does not fit in a frame.
pub fn encode_request(request: &RpcRequest) -> Result<Vec<u8>, ProtocolError> {
    let mut payload = Vec::new();
    match &request.request {
        KeymapRequest::SetLayerBinding(m) => {
            payload.extend_from_slice(&m.layer.to_be_bytes());
            payload.extend_from_slice(&m.key_position.to_be_bytes());
            encode_binding(&mut payload, &m.binding);
        }
        KeymapRequest::SetActivePhysicalLayout(index) => {
            payload.extend_from_slice(&index.to_be_bytes());
        }
        KeymapRequest::GetKeymap
        | KeymapRequest::CheckUnsavedChanges
        | KeymapRequest::SaveChanges
        | KeymapRequest::DiscardChanges
        | KeymapRequest::GetPhysicalLayouts => {} // empty payload
    }
    frame(
        FrameKind::Request,
        request.request.op() as u8,
        request.request_id,
        payload,
    )
}

/// Encodes a response frame, pulling every repeated field on demand.
///
/// # Errors
///
/// Returns [`ProtocolError`] if a field or the payload does not fit in a frame.
pub fn encode_response(response: &RpcResponse<'_>) -> Result<Vec<u8>, ProtocolError> {
    let mut payload = Vec::new();
    let op = match &response.body {
        ResponseBody::Meta(error) => {
            payload.push(*error as u8);
            META_OP
        }
        ResponseBody::Keymap(body) => {
            encode_keymap_response(&mut payload, body)?;
            body.op() as u8
        }
    };
    frame(FrameKind::Response, op, response.request_id, payload)
}

/// Encodes a notification frame.  Notifications carry request id 0.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the payload does not fit in a frame.
pub fn encode_notification(notification: &Notification) -> Result<Vec<u8>, ProtocolError> {
    match notification {
        Notification::UnsavedChangesStatusChanged(dirty) => frame(
            FrameKind::Notification,
            UNSAVED_CHANGES_STATUS_CHANGED_OP,
            0,
            vec![u8::from(*dirty)],
        ),
    }
}

/// Decodes the 12-byte header at the start of `bytes`.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the header is short, of an unknown version or
/// kind, or announces an oversized payload.
pub fn decode_header(bytes: &[u8]) -> Result<FrameHeader, ProtocolError> {
    if bytes.len() < HEADER_SIZE {
        return Err(ProtocolError::InsufficientData {
            needed: HEADER_SIZE,
            available: bytes.len(),
        });
    }

    let version = bytes[0];
    if version != PROTOCOL_VERSION {
        return Err(ProtocolError::UnsupportedVersion(version));
    }

    let kind =
        FrameKind::try_from(bytes[1]).map_err(|_| ProtocolError::UnknownFrameKind(bytes[1]))?;
    let op = bytes[2];
    // bytes[3] is reserved – ignored on decode
    let request_id = u32::from_be_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
    let payload_len = u32::from_be_bytes([bytes[8], bytes[9], bytes[10], bytes[11]]) as usize;

    if payload_len > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge(payload_len));
    }

    Ok(FrameHeader {
        kind,
        op,
        request_id,
        payload_len,
    })
}

/// Decodes a request payload whose header was already read.
///
/// # Errors
///
/// Returns [`ProtocolError::UnknownOperation`] for an unknown op, so the
/// caller can still answer with the header's request id.
pub fn decode_request(header: &FrameHeader, payload: &[u8]) -> Result<RpcRequest, ProtocolError> {
    if header.kind != FrameKind::Request {
        return Err(ProtocolError::UnexpectedFrameKind(header.kind));
    }
    let op =
        RequestOp::try_from(header.op).map_err(|_| ProtocolError::UnknownOperation(header.op))?;
    let mut r = Reader::new(payload);

    let request = match op {
        RequestOp::GetKeymap => KeymapRequest::GetKeymap,
        RequestOp::SetLayerBinding => {
            let layer = r.u32("SetLayerBinding.layer")?;
            let key_position = r.u32("SetLayerBinding.key_position")?;
            let binding = decode_binding(&mut r)?;
            KeymapRequest::SetLayerBinding(SetLayerBindingRequest {
                layer,
                key_position,
                binding,
            })
        }
        RequestOp::CheckUnsavedChanges => KeymapRequest::CheckUnsavedChanges,
        RequestOp::SaveChanges => KeymapRequest::SaveChanges,
        RequestOp::DiscardChanges => KeymapRequest::DiscardChanges,
        RequestOp::GetPhysicalLayouts => KeymapRequest::GetPhysicalLayouts,
        RequestOp::SetActivePhysicalLayout => {
            KeymapRequest::SetActivePhysicalLayout(r.u32("SetActivePhysicalLayout.index")?)
        }
    };

    Ok(RpcRequest {
        request_id: header.request_id,
        request,
    })
}

/// Decodes one request frame from the beginning of `bytes`, returning it and
/// the number of bytes consumed.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed.
pub fn decode_request_frame(bytes: &[u8]) -> Result<(RpcRequest, usize), ProtocolError> {
    let (header, payload) = split_frame(bytes)?;
    let request = decode_request(&header, payload)?;
    Ok((request, HEADER_SIZE + header.payload_len))
}

/// Decodes one server→client frame (response or notification) from the
/// beginning of `bytes`, returning it and the number of bytes consumed.
///
/// # Errors
///
/// Returns [`ProtocolError`] if the bytes are malformed.
pub fn decode_frame(bytes: &[u8]) -> Result<(DecodedFrame, usize), ProtocolError> {
    let (header, payload) = split_frame(bytes)?;
    let mut r = Reader::new(payload);

    let decoded = match header.kind {
        FrameKind::Request => return Err(ProtocolError::UnexpectedFrameKind(FrameKind::Request)),
        FrameKind::Notification => {
            if header.op != UNSAVED_CHANGES_STATUS_CHANGED_OP {
                return Err(ProtocolError::UnknownOperation(header.op));
            }
            DecodedFrame::Notification(Notification::UnsavedChangesStatusChanged(
                r.bool("UnsavedChangesStatusChanged")?,
            ))
        }
        FrameKind::Response => {
            let body = if header.op == META_OP {
                let code = r.u8("MetaError")?;
                DecodedResponseBody::Meta(MetaError::try_from(code).map_err(|_| {
                    ProtocolError::MalformedPayload(format!("unknown meta error: {code}"))
                })?)
            } else {
                let op = RequestOp::try_from(header.op)
                    .map_err(|_| ProtocolError::UnknownOperation(header.op))?;
                DecodedResponseBody::Keymap(decode_keymap_response(op, &mut r)?)
            };
            DecodedFrame::Response {
                request_id: header.request_id,
                body,
            }
        }
    };
    Ok((decoded, HEADER_SIZE + header.payload_len))
}

// ── Framing ───────────────────────────────────────────────────────────────────

fn frame(
    kind: FrameKind,
    op: u8,
    request_id: u32,
    payload: Vec<u8>,
) -> Result<Vec<u8>, ProtocolError> {
    if payload.len() > MAX_PAYLOAD_LEN {
        return Err(ProtocolError::PayloadTooLarge(payload.len()));
    }
    let payload_len = payload.len() as u32;

    let mut buf = Vec::with_capacity(HEADER_SIZE + payload.len());
    buf.push(PROTOCOL_VERSION);
    buf.push(kind as u8);
    buf.push(op);
    buf.push(0x00); // reserved
    buf.extend_from_slice(&request_id.to_be_bytes());
    buf.extend_from_slice(&payload_len.to_be_bytes());
    buf.extend_from_slice(&payload);
    Ok(buf)
}

fn split_frame(bytes: &[u8]) -> Result<(FrameHeader, &[u8]), ProtocolError> {
    let header = decode_header(bytes)?;
    let total_needed = HEADER_SIZE + header.payload_len;
    if bytes.len() < total_needed {
        return Err(ProtocolError::PayloadLengthMismatch {
            declared: header.payload_len,
            available: bytes.len() - HEADER_SIZE,
        });
    }
    Ok((header, &bytes[HEADER_SIZE..total_needed]))
}

// ── Response encoding ─────────────────────────────────────────────────────────

fn encode_keymap_response(
    buf: &mut Vec<u8>,
    body: &KeymapResponse<'_>,
) -> Result<(), ProtocolError> {
    match body {
        KeymapResponse::GetKeymap(keymap) => encode_keymap(buf, keymap)?,
        KeymapResponse::SetLayerBinding(code) => buf.push(*code as u8),
        KeymapResponse::CheckUnsavedChanges(flag)
        | KeymapResponse::SaveChanges(flag)
        | KeymapResponse::DiscardChanges(flag) => buf.push(u8::from(*flag)),
        KeymapResponse::GetPhysicalLayouts(layouts) => encode_physical_layouts(buf, layouts)?,
        KeymapResponse::SetActivePhysicalLayout(Ok(keymap)) => {
            buf.push(0x00);
            encode_keymap(buf, keymap)?;
        }
        KeymapResponse::SetActivePhysicalLayout(Err(code)) => {
            buf.push(0x01);
            buf.push(*code as u8);
        }
    }
    Ok(())
}

fn encode_keymap(buf: &mut Vec<u8>, keymap: &KeymapView<'_>) -> Result<(), ProtocolError> {
    write_count(buf, keymap.layers.len())?;
    for layer in keymap.layers.iter() {
        buf.extend_from_slice(&layer.id.to_be_bytes());
        write_optional_string(buf, layer.name)?;
        write_count(buf, layer.bindings.len())?;
        for binding in layer.bindings.iter() {
            encode_binding(buf, &binding);
        }
    }
    Ok(())
}

fn encode_physical_layouts(
    buf: &mut Vec<u8>,
    layouts: &PhysicalLayoutsView<'_>,
) -> Result<(), ProtocolError> {
    buf.extend_from_slice(&layouts.active_layout_index.to_be_bytes());
    write_count(buf, layouts.layouts.len())?;
    for layout in layouts.layouts.iter() {
        write_optional_string(buf, layout.name)?;
        write_count(buf, layout.keys.len())?;
        for key in layout.keys.iter() {
            encode_key(buf, &key);
        }
    }
    Ok(())
}

fn encode_binding(buf: &mut Vec<u8>, m: &BindingMessage) {
    buf.extend_from_slice(&m.behavior_id.to_be_bytes());
    buf.extend_from_slice(&m.param1.to_be_bytes());
    buf.extend_from_slice(&m.param2.to_be_bytes());
}

fn encode_key(buf: &mut Vec<u8>, k: &KeyPhysicalAttrs) {
    for value in [k.width, k.height, k.x, k.y, k.r, k.rx, k.ry] {
        buf.extend_from_slice(&value.to_be_bytes());
    }
}

// ── Response decoding ─────────────────────────────────────────────────────────

fn decode_keymap_response(
    op: RequestOp,
    r: &mut Reader<'_>,
) -> Result<DecodedKeymapResponse, ProtocolError> {
    Ok(match op {
        RequestOp::GetKeymap => DecodedKeymapResponse::GetKeymap(decode_keymap(r)?),
        RequestOp::SetLayerBinding => {
            let code = r.u8("SetLayerBindingResponse")?;
            DecodedKeymapResponse::SetLayerBinding(
                SetLayerBindingResponse::try_from(code).map_err(|_| {
                    ProtocolError::MalformedPayload(format!("unknown set binding result: {code}"))
                })?,
            )
        }
        RequestOp::CheckUnsavedChanges => {
            DecodedKeymapResponse::CheckUnsavedChanges(r.bool("CheckUnsavedChanges")?)
        }
        RequestOp::SaveChanges => DecodedKeymapResponse::SaveChanges(r.bool("SaveChanges")?),
        RequestOp::DiscardChanges => {
            DecodedKeymapResponse::DiscardChanges(r.bool("DiscardChanges")?)
        }
        RequestOp::GetPhysicalLayouts => {
            DecodedKeymapResponse::GetPhysicalLayouts(decode_physical_layouts(r)?)
        }
        RequestOp::SetActivePhysicalLayout => {
            let result = match r.u8("SetActivePhysicalLayout.result")? {
                0x00 => Ok(decode_keymap(r)?),
                0x01 => {
                    let code = r.u8("SetActivePhysicalLayout.error")?;
                    Err(SetActivePhysicalLayoutError::try_from(code).map_err(|_| {
                        ProtocolError::MalformedPayload(format!("unknown layout error: {code}"))
                    })?)
                }
                other => {
                    return Err(ProtocolError::MalformedPayload(format!(
                        "unknown result tag: {other}"
                    )))
                }
            };
            DecodedKeymapResponse::SetActivePhysicalLayout(result)
        }
    })
}

fn decode_keymap(r: &mut Reader<'_>) -> Result<DecodedKeymap, ProtocolError> {
    let layer_count = r.count("Keymap.layers")?;
    let mut layers = Vec::with_capacity(layer_count.min(r.remaining()));
    for _ in 0..layer_count {
        let id = r.u32("Layer.id")?;
        let name = r.optional_string("Layer.name")?;
        let binding_count = r.count("Layer.bindings")?;
        let mut bindings = Vec::with_capacity(binding_count.min(r.remaining()));
        for _ in 0..binding_count {
            bindings.push(decode_binding(r)?);
        }
        layers.push(DecodedLayer { id, name, bindings });
    }
    Ok(DecodedKeymap { layers })
}

fn decode_physical_layouts(r: &mut Reader<'_>) -> Result<DecodedPhysicalLayouts, ProtocolError> {
    let active_layout_index = r.u32("PhysicalLayouts.active_layout_index")?;
    let layout_count = r.count("PhysicalLayouts.layouts")?;
    let mut layouts = Vec::with_capacity(layout_count.min(r.remaining()));
    for _ in 0..layout_count {
        let name = r.optional_string("PhysicalLayout.name")?;
        let key_count = r.count("PhysicalLayout.keys")?;
        let mut keys = Vec::with_capacity(key_count.min(r.remaining()));
        for _ in 0..key_count {
            keys.push(KeyPhysicalAttrs {
                width: r.i32("Key.width")?,
                height: r.i32("Key.height")?,
                x: r.i32("Key.x")?,
                y: r.i32("Key.y")?,
                r: r.i32("Key.r")?,
                rx: r.i32("Key.rx")?,
                ry: r.i32("Key.ry")?,
            });
        }
        layouts.push(DecodedPhysicalLayout { name, keys });
    }
    Ok(DecodedPhysicalLayouts {
        active_layout_index,
        layouts,
    })
}

fn decode_binding(r: &mut Reader<'_>) -> Result<BindingMessage, ProtocolError> {
    Ok(BindingMessage {
        behavior_id: r.u16("Binding.behavior_id")?,
        param1: r.u32("Binding.param1")?,
        param2: r.u32("Binding.param2")?,
    })
}

// ── Utility helpers ───────────────────────────────────────────────────────────

fn write_count(buf: &mut Vec<u8>, len: usize) -> Result<(), ProtocolError> {
    let len = u32::try_from(len)
        .map_err(|_| ProtocolError::MalformedPayload(format!("repeated field too long: {len}")))?;
    buf.extend_from_slice(&len.to_be_bytes());
    Ok(())
}

/// Writes a presence byte and, if present, a 2-byte length prefix followed by
/// the UTF-8 string bytes.
fn write_optional_string(buf: &mut Vec<u8>, s: Option<&str>) -> Result<(), ProtocolError> {
    let Some(s) = s else {
        buf.push(0x00);
        return Ok(());
    };
    let len = u16::try_from(s.len())
        .map_err(|_| ProtocolError::MalformedPayload(format!("string too long: {}", s.len())))?;
    buf.push(0x01);
    buf.extend_from_slice(&len.to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
    Ok(())
}

/// Forward-only cursor over a payload.
struct Reader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.buf.len() - self.pos
    }

    fn take(&mut self, n: usize, context: &str) -> Result<&'a [u8], ProtocolError> {
        if self.remaining() < n {
            return Err(ProtocolError::MalformedPayload(format!(
                "{context}: need {n} bytes at offset {}, got {}",
                self.pos,
                self.remaining()
            )));
        }
        let bytes = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    fn u8(&mut self, context: &str) -> Result<u8, ProtocolError> {
        Ok(self.take(1, context)?[0])
    }

    fn bool(&mut self, context: &str) -> Result<bool, ProtocolError> {
        Ok(self.u8(context)? != 0)
    }

    fn u16(&mut self, context: &str) -> Result<u16, ProtocolError> {
        let b = self.take(2, context)?;
        Ok(u16::from_be_bytes([b[0], b[1]]))
    }

    fn u32(&mut self, context: &str) -> Result<u32, ProtocolError> {
        let b = self.take(4, context)?;
        Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn i32(&mut self, context: &str) -> Result<i32, ProtocolError> {
        let b = self.take(4, context)?;
        Ok(i32::from_be_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn count(&mut self, context: &str) -> Result<usize, ProtocolError> {
        Ok(self.u32(context)? as usize)
    }

    fn optional_string(&mut self, context: &str) -> Result<Option<String>, ProtocolError> {
        if !self.bool(context)? {
            return Ok(None);
        }
        let len = self.u16(context)? as usize;
        let bytes = self.take(len, context)?;
        let s = std::str::from_utf8(bytes)
            .map_err(|e| ProtocolError::MalformedPayload(format!("{context}: invalid UTF-8: {e}")))?;
        Ok(Some(s.to_string()))
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::lazy::Repeated;
    use crate::protocol::messages::{LayerView, PhysicalLayoutView, NO_BEHAVIOR_ID};

    fn binding(behavior_id: u16, param1: u32) -> BindingMessage {
        BindingMessage {
            behavior_id,
            param1,
            param2: 0,
        }
    }

    fn decode_response_body(bytes: &[u8]) -> (u32, DecodedResponseBody) {
        let (frame, consumed) = decode_frame(bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        match frame {
            DecodedFrame::Response { request_id, body } => (request_id, body),
            other => panic!("expected a response, got {other:?}"),
        }
    }

    // ── Requests ──────────────────────────────────────────────────────────────

    #[test]
    fn test_set_layer_binding_request_round_trip() {
        let request = RpcRequest {
            request_id: 17,
            request: KeymapRequest::SetLayerBinding(SetLayerBindingRequest {
                layer: 2,
                key_position: 41,
                binding: binding(3, 0x0007_0004),
            }),
        };

        let bytes = encode_request(&request).unwrap();
        let (decoded, consumed) = decode_request_frame(&bytes).unwrap();

        assert_eq!(decoded, request);
        assert_eq!(consumed, bytes.len());
        assert_eq!(bytes.len(), HEADER_SIZE + 4 + 4 + 10);
    }

    #[test]
    fn test_empty_payload_requests_round_trip() {
        for request in [
            KeymapRequest::GetKeymap,
            KeymapRequest::CheckUnsavedChanges,
            KeymapRequest::SaveChanges,
            KeymapRequest::DiscardChanges,
            KeymapRequest::GetPhysicalLayouts,
            KeymapRequest::SetActivePhysicalLayout(1),
        ] {
            let rpc = RpcRequest {
                request_id: 5,
                request,
            };
            let bytes = encode_request(&rpc).unwrap();
            assert_eq!(decode_request_frame(&bytes).unwrap().0, rpc);
        }
    }

    #[test]
    fn test_unknown_request_op_keeps_request_id_available() {
        // Arrange: valid header with op 0x7F
        let mut bytes = encode_request(&RpcRequest {
            request_id: 9,
            request: KeymapRequest::GetKeymap,
        })
        .unwrap();
        bytes[2] = 0x7F;

        // Act
        let header = decode_header(&bytes).unwrap();
        let result = decode_request(&header, &bytes[HEADER_SIZE..]);

        // Assert
        assert_eq!(header.request_id, 9);
        assert_eq!(result, Err(ProtocolError::UnknownOperation(0x7F)));
    }

    #[test]
    fn test_truncated_request_payload_is_malformed() {
        let bytes = encode_request(&RpcRequest {
            request_id: 1,
            request: KeymapRequest::SetActivePhysicalLayout(3),
        })
        .unwrap();
        let header = decode_header(&bytes).unwrap();

        let result = decode_request(&header, &bytes[HEADER_SIZE..HEADER_SIZE + 2]);

        assert!(matches!(result, Err(ProtocolError::MalformedPayload(_))));
    }

    // ── Responses ─────────────────────────────────────────────────────────────

    #[test]
    fn test_keymap_response_is_pulled_from_generators() {
        // Arrange: two layers of three bindings generated from their indices
        let names = ["Base", "Nav"];
        let view = KeymapView {
            layers: Repeated::new(2, |l| LayerView {
                id: l as u32,
                name: (l == 0).then_some(names[l]),
                bindings: Repeated::new(3, move |b| {
                    if b == 2 {
                        binding(NO_BEHAVIOR_ID, 0)
                    } else {
                        binding(1, (l * 10 + b) as u32)
                    }
                }),
            }),
        };
        let response = RpcResponse::keymap(4, KeymapResponse::GetKeymap(view));

        // Act
        let bytes = encode_response(&response).unwrap();
        let (request_id, body) = decode_response_body(&bytes);

        // Assert
        assert_eq!(request_id, 4);
        let DecodedResponseBody::Keymap(DecodedKeymapResponse::GetKeymap(keymap)) = body else {
            panic!("expected a keymap");
        };
        assert_eq!(keymap.layers.len(), 2);
        assert_eq!(keymap.layers[0].name.as_deref(), Some("Base"));
        assert_eq!(keymap.layers[1].name, None);
        assert_eq!(keymap.layers[1].id, 1);
        assert_eq!(
            keymap.layers[1].bindings,
            vec![binding(1, 10), binding(1, 11), binding(NO_BEHAVIOR_ID, 0)]
        );
    }

    #[test]
    fn test_physical_layouts_response_round_trip() {
        let keys = [KeyPhysicalAttrs {
            width: 100,
            height: 100,
            x: 0,
            y: 0,
            r: -1500,
            rx: 50,
            ry: 50,
        }];
        let key_slice: &[KeyPhysicalAttrs] = &keys;
        let view = PhysicalLayoutsView {
            active_layout_index: 1,
            layouts: Repeated::new(2, move |i| PhysicalLayoutView {
                name: (i == 1).then_some("ISO"),
                keys: Repeated::from_slice(key_slice),
            }),
        };

        let bytes =
            encode_response(&RpcResponse::keymap(8, KeymapResponse::GetPhysicalLayouts(view)))
                .unwrap();
        let (_, body) = decode_response_body(&bytes);

        let DecodedResponseBody::Keymap(DecodedKeymapResponse::GetPhysicalLayouts(layouts)) = body
        else {
            panic!("expected physical layouts");
        };
        assert_eq!(layouts.active_layout_index, 1);
        assert_eq!(layouts.layouts[0].name, None);
        assert_eq!(layouts.layouts[1].name.as_deref(), Some("ISO"));
        assert_eq!(layouts.layouts[1].keys, keys.to_vec());
    }

    #[test]
    fn test_set_active_physical_layout_error_round_trip() {
        let response = RpcResponse::keymap(
            2,
            KeymapResponse::SetActivePhysicalLayout(Err(SetActivePhysicalLayoutError::Generic)),
        );

        let (_, body) = decode_response_body(&encode_response(&response).unwrap());

        assert_eq!(
            body,
            DecodedResponseBody::Keymap(DecodedKeymapResponse::SetActivePhysicalLayout(Err(
                SetActivePhysicalLayoutError::Generic
            )))
        );
    }

    #[test]
    fn test_meta_error_uses_meta_op() {
        let bytes = encode_response(&RpcResponse::meta(6, MetaError::RpcNotFound)).unwrap();

        assert_eq!(bytes[2], META_OP);
        let (request_id, body) = decode_response_body(&bytes);
        assert_eq!(request_id, 6);
        assert_eq!(body, DecodedResponseBody::Meta(MetaError::RpcNotFound));
    }

    #[test]
    fn test_set_layer_binding_result_codes() {
        for code in [
            SetLayerBindingResponse::Success,
            SetLayerBindingResponse::InvalidLocation,
            SetLayerBindingResponse::InvalidBehavior,
            SetLayerBindingResponse::InvalidParameters,
        ] {
            let bytes =
                encode_response(&RpcResponse::keymap(1, KeymapResponse::SetLayerBinding(code)))
                    .unwrap();
            let (_, body) = decode_response_body(&bytes);
            assert_eq!(
                body,
                DecodedResponseBody::Keymap(DecodedKeymapResponse::SetLayerBinding(code))
            );
        }
    }

    // ── Notifications ─────────────────────────────────────────────────────────

    #[test]
    fn test_notification_round_trip() {
        let bytes = encode_notification(&Notification::UnsavedChangesStatusChanged(true)).unwrap();

        let (frame, _) = decode_frame(&bytes).unwrap();

        assert_eq!(bytes[1], FrameKind::Notification as u8);
        assert_eq!(
            frame,
            DecodedFrame::Notification(Notification::UnsavedChangesStatusChanged(true))
        );
    }

    // ── Header ────────────────────────────────────────────────────────────────

    #[test]
    fn test_header_layout() {
        let bytes = encode_request(&RpcRequest {
            request_id: 0x0102_0304,
            request: KeymapRequest::GetKeymap,
        })
        .unwrap();

        assert_eq!(bytes.len(), HEADER_SIZE);
        assert_eq!(bytes[0], PROTOCOL_VERSION);
        assert_eq!(bytes[1], FrameKind::Request as u8);
        assert_eq!(bytes[2], RequestOp::GetKeymap as u8);
        assert_eq!(bytes[3], 0x00);
        assert_eq!(&bytes[4..8], &[0x01, 0x02, 0x03, 0x04]);
        assert_eq!(&bytes[8..12], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_decode_empty_bytes_returns_insufficient_data() {
        assert_eq!(
            decode_header(&[]),
            Err(ProtocolError::InsufficientData {
                needed: HEADER_SIZE,
                available: 0
            })
        );
    }

    #[test]
    fn test_decode_wrong_version_returns_error() {
        let mut bytes = encode_notification(&Notification::UnsavedChangesStatusChanged(false)).unwrap();
        bytes[0] = 0x09;
        assert_eq!(decode_frame(&bytes), Err(ProtocolError::UnsupportedVersion(0x09)));
    }

    #[test]
    fn test_decode_unknown_frame_kind_returns_error() {
        let mut bytes = encode_notification(&Notification::UnsavedChangesStatusChanged(false)).unwrap();
        bytes[1] = 0x44;
        assert_eq!(decode_header(&bytes), Err(ProtocolError::UnknownFrameKind(0x44)));
    }

    #[test]
    fn test_oversized_payload_is_rejected_from_header() {
        let mut bytes = encode_request(&RpcRequest {
            request_id: 1,
            request: KeymapRequest::GetKeymap,
        })
        .unwrap();
        bytes[8..12].copy_from_slice(&u32::MAX.to_be_bytes());

        assert_eq!(
            decode_header(&bytes),
            Err(ProtocolError::PayloadTooLarge(u32::MAX as usize))
        );
    }

    #[test]
    fn test_payload_shorter_than_declared_returns_mismatch() {
        let bytes = encode_request(&RpcRequest {
            request_id: 1,
            request: KeymapRequest::SetActivePhysicalLayout(0),
        })
        .unwrap();

        let result = decode_request_frame(&bytes[..bytes.len() - 1]);

        assert_eq!(
            result,
            Err(ProtocolError::PayloadLengthMismatch {
                declared: 4,
                available: 3
            })
        );
    }

    #[test]
    fn test_request_frame_is_rejected_by_client_decoder() {
        let bytes = encode_request(&RpcRequest {
            request_id: 1,
            request: KeymapRequest::GetKeymap,
        })
        .unwrap();
        assert_eq!(
            decode_frame(&bytes),
            Err(ProtocolError::UnexpectedFrameKind(FrameKind::Request))
        );
    }
}
