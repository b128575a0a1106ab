//! Keymap RPC message types.
//!
//! Requests and notifications are plain owned values.  Responses that carry
//! whole keymaps or layout lists are *views*: their repeated fields are
//! [`Repeated`] generators borrowing the service state, so nothing is copied
//! until the encoder pulls it.  The `Decoded*` types are the owned mirror a
//! client gets back from [`crate::protocol::codec::decode_frame`].

use serde::{Deserialize, Serialize};

use crate::domain::layout::KeyPhysicalAttrs;
use crate::protocol::lazy::Repeated;

// ── Protocol constants ────────────────────────────────────────────────────────

/// Current protocol version byte.
pub const PROTOCOL_VERSION: u8 = 0x01;

/// Total size of the frame header in bytes.
pub const HEADER_SIZE: usize = 12;

/// Largest payload a peer may announce in a frame header.
pub const MAX_PAYLOAD_LEN: usize = 64 * 1024;

/// Behavior id sent for bindings whose behavior has no local id.
pub const NO_BEHAVIOR_ID: u16 = u16::MAX;

/// Header `op` byte of a response carrying a [`MetaError`].
pub const META_OP: u8 = 0x00;

// ── Frame header ──────────────────────────────────────────────────────────────

/// What a frame carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum FrameKind {
    Request = 0x01,
    Response = 0x02,
    Notification = 0x03,
}

impl TryFrom<u8> for FrameKind {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(FrameKind::Request),
            0x02 => Ok(FrameKind::Response),
            0x03 => Ok(FrameKind::Notification),
            _ => Err(()),
        }
    }
}

/// Decoded 12-byte frame header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub kind: FrameKind,
    pub op: u8,
    pub request_id: u32,
    pub payload_len: usize,
}

// ── Requests ──────────────────────────────────────────────────────────────────

/// Keymap subsystem operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum RequestOp {
    GetKeymap = 0x01,
    SetLayerBinding = 0x02,
    CheckUnsavedChanges = 0x03,
    SaveChanges = 0x04,
    DiscardChanges = 0x05,
    GetPhysicalLayouts = 0x06,
    SetActivePhysicalLayout = 0x07,
}

impl TryFrom<u8> for RequestOp {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x01 => Ok(RequestOp::GetKeymap),
            0x02 => Ok(RequestOp::SetLayerBinding),
            0x03 => Ok(RequestOp::CheckUnsavedChanges),
            0x04 => Ok(RequestOp::SaveChanges),
            0x05 => Ok(RequestOp::DiscardChanges),
            0x06 => Ok(RequestOp::GetPhysicalLayouts),
            0x07 => Ok(RequestOp::SetActivePhysicalLayout),
            _ => Err(()),
        }
    }
}

/// A binding as it travels on the wire.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct BindingMessage {
    pub behavior_id: u16,
    pub param1: u32,
    pub param2: u32,
}

/// Payload of `set_layer_binding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SetLayerBindingRequest {
    pub layer: u32,
    pub key_position: u32,
    pub binding: BindingMessage,
}

/// A keymap subsystem request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum KeymapRequest {
    GetKeymap,
    SetLayerBinding(SetLayerBindingRequest),
    CheckUnsavedChanges,
    SaveChanges,
    DiscardChanges,
    GetPhysicalLayouts,
    /// Index of the layout to activate.
    SetActivePhysicalLayout(u32),
}

impl KeymapRequest {
    pub fn op(&self) -> RequestOp {
        match self {
            KeymapRequest::GetKeymap => RequestOp::GetKeymap,
            KeymapRequest::SetLayerBinding(_) => RequestOp::SetLayerBinding,
            KeymapRequest::CheckUnsavedChanges => RequestOp::CheckUnsavedChanges,
            KeymapRequest::SaveChanges => RequestOp::SaveChanges,
            KeymapRequest::DiscardChanges => RequestOp::DiscardChanges,
            KeymapRequest::GetPhysicalLayouts => RequestOp::GetPhysicalLayouts,
            KeymapRequest::SetActivePhysicalLayout(_) => RequestOp::SetActivePhysicalLayout,
        }
    }
}

/// A request plus the id its response must echo.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcRequest {
    pub request_id: u32,
    pub request: KeymapRequest,
}

// ── Result codes ──────────────────────────────────────────────────────────────

/// Outcome of `set_layer_binding`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SetLayerBindingResponse {
    Success = 0x00,
    InvalidLocation = 0x01,
    InvalidBehavior = 0x02,
    InvalidParameters = 0x03,
}

impl TryFrom<u8> for SetLayerBindingResponse {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(SetLayerBindingResponse::Success),
            0x01 => Ok(SetLayerBindingResponse::InvalidLocation),
            0x02 => Ok(SetLayerBindingResponse::InvalidBehavior),
            0x03 => Ok(SetLayerBindingResponse::InvalidParameters),
            _ => Err(()),
        }
    }
}

/// Subsystem-independent failure of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum MetaError {
    Generic = 0x00,
    RpcNotFound = 0x01,
}

impl TryFrom<u8> for MetaError {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(MetaError::Generic),
            0x01 => Ok(MetaError::RpcNotFound),
            _ => Err(()),
        }
    }
}

/// Failure of `set_active_physical_layout`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum SetActivePhysicalLayoutError {
    Generic = 0x00,
}

impl TryFrom<u8> for SetActivePhysicalLayoutError {
    type Error = ();

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0x00 => Ok(SetActivePhysicalLayoutError::Generic),
            _ => Err(()),
        }
    }
}

// ── Notifications ─────────────────────────────────────────────────────────────

/// Header `op` byte of `unsaved_changes_status_changed`.
pub const UNSAVED_CHANGES_STATUS_CHANGED_OP: u8 = 0x01;

/// Pushed to every connected client, independent of any request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Notification {
    UnsavedChangesStatusChanged(bool),
}

// ── Response views ────────────────────────────────────────────────────────────

/// One keymap layer, bindings generated on demand.
#[derive(Debug)]
pub struct LayerView<'a> {
    pub id: u32,
    pub name: Option<&'a str>,
    pub bindings: Repeated<'a, BindingMessage>,
}

/// The whole keymap, layers generated on demand.
#[derive(Debug)]
pub struct KeymapView<'a> {
    pub layers: Repeated<'a, LayerView<'a>>,
}

/// One physical layout, keys generated on demand.
#[derive(Debug)]
pub struct PhysicalLayoutView<'a> {
    pub name: Option<&'a str>,
    pub keys: Repeated<'a, KeyPhysicalAttrs>,
}

/// All physical layouts plus the active index.
#[derive(Debug)]
pub struct PhysicalLayoutsView<'a> {
    pub active_layout_index: u32,
    pub layouts: Repeated<'a, PhysicalLayoutView<'a>>,
}

/// Keymap subsystem response payloads.
#[derive(Debug)]
pub enum KeymapResponse<'a> {
    GetKeymap(KeymapView<'a>),
    SetLayerBinding(SetLayerBindingResponse),
    CheckUnsavedChanges(bool),
    SaveChanges(bool),
    DiscardChanges(bool),
    GetPhysicalLayouts(PhysicalLayoutsView<'a>),
    SetActivePhysicalLayout(Result<KeymapView<'a>, SetActivePhysicalLayoutError>),
}

impl KeymapResponse<'_> {
    pub fn op(&self) -> RequestOp {
        match self {
            KeymapResponse::GetKeymap(_) => RequestOp::GetKeymap,
            KeymapResponse::SetLayerBinding(_) => RequestOp::SetLayerBinding,
            KeymapResponse::CheckUnsavedChanges(_) => RequestOp::CheckUnsavedChanges,
            KeymapResponse::SaveChanges(_) => RequestOp::SaveChanges,
            KeymapResponse::DiscardChanges(_) => RequestOp::DiscardChanges,
            KeymapResponse::GetPhysicalLayouts(_) => RequestOp::GetPhysicalLayouts,
            KeymapResponse::SetActivePhysicalLayout(_) => RequestOp::SetActivePhysicalLayout,
        }
    }
}

/// Either a subsystem payload or a meta error.
#[derive(Debug)]
pub enum ResponseBody<'a> {
    Keymap(KeymapResponse<'a>),
    Meta(MetaError),
}

/// A response plus the id of the request it answers.
#[derive(Debug)]
pub struct RpcResponse<'a> {
    pub request_id: u32,
    pub body: ResponseBody<'a>,
}

impl<'a> RpcResponse<'a> {
    pub fn keymap(request_id: u32, response: KeymapResponse<'a>) -> Self {
        Self {
            request_id,
            body: ResponseBody::Keymap(response),
        }
    }

    pub fn meta(request_id: u32, error: MetaError) -> Self {
        Self {
            request_id,
            body: ResponseBody::Meta(error),
        }
    }
}

// ── Decoded (owned) responses ─────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedLayer {
    pub id: u32,
    pub name: Option<String>,
    pub bindings: Vec<BindingMessage>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedKeymap {
    pub layers: Vec<DecodedLayer>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPhysicalLayout {
    pub name: Option<String>,
    pub keys: Vec<KeyPhysicalAttrs>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedPhysicalLayouts {
    pub active_layout_index: u32,
    pub layouts: Vec<DecodedPhysicalLayout>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedKeymapResponse {
    GetKeymap(DecodedKeymap),
    SetLayerBinding(SetLayerBindingResponse),
    CheckUnsavedChanges(bool),
    SaveChanges(bool),
    DiscardChanges(bool),
    GetPhysicalLayouts(DecodedPhysicalLayouts),
    SetActivePhysicalLayout(Result<DecodedKeymap, SetActivePhysicalLayoutError>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedResponseBody {
    Keymap(DecodedKeymapResponse),
    Meta(MetaError),
}

/// Any frame a server can send to a client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedFrame {
    Response {
        request_id: u32,
        body: DecodedResponseBody,
    },
    Notification(Notification),
}
