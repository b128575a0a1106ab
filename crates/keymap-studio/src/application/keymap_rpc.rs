//! KeymapRpcService: the "keymap" RPC subsystem.
//!
//! Answers every keymap request a remote editor can send.  Read operations
//! return *views* whose repeated fields are generated on demand from the live
//! keymap and layout stores.  Mutating operations resolve the behavior id,
//! validate the binding, write through the [`KeymapStore`], maintain the
//! unsaved-changes flag, and push `unsaved_changes_status_changed`
//! notifications.
//!
//! # Architecture
//!
//! The service depends only on traits ([`KeymapStore`],
//! [`PhysicalLayoutStore`], [`NotificationSink`], [`LocalIds`]) and domain
//! types.  Infrastructure implementations are injected at construction time,
//! making the service fully unit-testable.
//!
//! Every operation runs to completion before the next one starts: callers
//! hold `&mut self`, so a mutation can never overlap another mutation or a
//! layout migration.

use std::sync::Arc;

use keymap_core::protocol::{
    BindingMessage, KeymapRequest, KeymapResponse, KeymapView, LayerView, MetaError,
    Notification, PhysicalLayoutView, PhysicalLayoutsView, Repeated, RpcRequest, RpcResponse,
    SetActivePhysicalLayoutError, SetLayerBindingRequest, SetLayerBindingResponse,
    NO_BEHAVIOR_ID,
};
use keymap_core::{
    BehaviorBinding, BehaviorRegistry, BindingError, BindingValidator, LocalId, LocalIds,
    PhysicalLayout, PositionMap, UsageLimits, ValidationLimits,
};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::application::migrate_layout::migrate_keymap;

// ── Collaborator traits ───────────────────────────────────────────────────────

/// Error type for keymap store operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeymapStoreError {
    /// The layer or key position does not exist.
    #[error("invalid location: layer {layer}, position {position}")]
    InvalidLocation { layer: usize, position: usize },

    /// The backing storage failed.
    #[error("keymap storage error: {0}")]
    Storage(String),
}

/// The live keymap: a fixed number of layers of bindings.
pub trait KeymapStore {
    /// Number of layers; fixed for the lifetime of the firmware.
    fn layer_count(&self) -> usize;

    /// Optional display name of `layer`.
    fn layer_name(&self, layer: usize) -> Option<&str>;

    /// Number of binding cells in `layer` (0 for an unknown layer).
    fn layer_len(&self, layer: usize) -> usize;

    /// Binding at `(layer, position)`, `None` when out of range.
    fn binding_at(&self, layer: usize, position: usize) -> Option<&BehaviorBinding>;

    /// Overwrites one cell.
    fn set_binding_at(
        &mut self,
        layer: usize,
        position: usize,
        binding: BehaviorBinding,
    ) -> Result<(), KeymapStoreError>;

    /// Replaces a whole layer, adopting the length of `bindings`.
    fn replace_layer(
        &mut self,
        layer: usize,
        bindings: Vec<BehaviorBinding>,
    ) -> Result<(), KeymapStoreError>;

    /// `true` when the keymap differs from what is persisted.
    fn check_unsaved_changes(&self) -> bool;

    /// Persists every changed layer.
    fn save_changes(&mut self) -> Result<(), KeymapStoreError>;

    /// Restores the persisted keymap.
    fn discard_changes(&mut self) -> Result<(), KeymapStoreError>;
}

/// Error type for physical layout store operations.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LayoutStoreError {
    /// The layout index does not exist.
    #[error("unknown physical layout index: {0}")]
    UnknownLayout(usize),

    /// No position map could be built between two layouts.
    #[error("no position map from layout {old} to layout {new}: {reason}")]
    PositionMap {
        old: usize,
        new: usize,
        reason: String,
    },

    /// The backing storage failed.
    #[error("layout storage error: {0}")]
    Storage(String),
}

/// The device's physical layouts and which one is selected.
pub trait PhysicalLayoutStore {
    /// Layouts in registration order.
    fn layouts(&self) -> &[PhysicalLayout];

    /// Index of the selected layout.
    fn selected(&self) -> usize;

    /// Selects another layout (not persisted until [`Self::save_selected`]).
    fn select(&mut self, index: usize) -> Result<(), LayoutStoreError>;

    /// New→old position map between two layouts.
    fn position_map(&self, old: usize, new: usize) -> Result<PositionMap, LayoutStoreError>;

    /// `true` when the selection differs from the persisted one.
    fn check_unsaved_selection(&self) -> bool;

    /// Persists the selection.
    fn save_selected(&mut self) -> Result<(), LayoutStoreError>;

    /// Restores the persisted selection.
    fn revert_selected(&mut self) -> Result<(), LayoutStoreError>;
}

/// Push channel for notifications.
///
/// Infrastructure implementations broadcast to connected clients; test
/// implementations record calls.
pub trait NotificationSink: Send + Sync {
    fn raise(&self, notification: Notification);
}

// ── Service ───────────────────────────────────────────────────────────────────

/// Stateful handler for the keymap RPC subsystem.
pub struct KeymapRpcService<K, L> {
    registry: Arc<BehaviorRegistry>,
    local_ids: Arc<dyn LocalIds>,
    usage_limits: UsageLimits,
    keymap: K,
    layouts: L,
    notifications: Arc<dyn NotificationSink>,
    /// Set by every successful mutation, cleared by save/discard.
    unsaved: bool,
}

impl<K: KeymapStore, L: PhysicalLayoutStore> KeymapRpcService<K, L> {
    /// Creates the service.  `local_ids` must already be fully initialised.
    pub fn new(
        registry: Arc<BehaviorRegistry>,
        local_ids: Arc<dyn LocalIds>,
        keymap: K,
        layouts: L,
        notifications: Arc<dyn NotificationSink>,
    ) -> Self {
        Self {
            registry,
            local_ids,
            usage_limits: UsageLimits::default(),
            keymap,
            layouts,
            notifications,
            unsaved: false,
        }
    }

    /// Overrides the HID usage ceilings selected by the build features.
    pub fn with_usage_limits(mut self, usage_limits: UsageLimits) -> Self {
        self.usage_limits = usage_limits;
        self
    }

    /// Current value of the unsaved-changes flag.
    pub fn unsaved_flag(&self) -> bool {
        self.unsaved
    }

    pub fn keymap(&self) -> &K {
        &self.keymap
    }

    pub fn layouts(&self) -> &L {
        &self.layouts
    }

    /// Dispatches one request and builds its response.
    pub fn handle(&mut self, rpc: RpcRequest) -> RpcResponse<'_> {
        let id = rpc.request_id;
        debug!(request_id = id, op = ?rpc.request.op(), "handling keymap request");

        match rpc.request {
            KeymapRequest::GetKeymap => {
                RpcResponse::keymap(id, KeymapResponse::GetKeymap(self.get_keymap()))
            }
            KeymapRequest::SetLayerBinding(req) => match self.set_layer_binding(&req) {
                Ok(result) => RpcResponse::keymap(id, KeymapResponse::SetLayerBinding(result)),
                Err(meta) => RpcResponse::meta(id, meta),
            },
            KeymapRequest::CheckUnsavedChanges => RpcResponse::keymap(
                id,
                KeymapResponse::CheckUnsavedChanges(self.check_unsaved_changes()),
            ),
            KeymapRequest::SaveChanges => match self.save_changes() {
                Ok(()) => RpcResponse::keymap(id, KeymapResponse::SaveChanges(true)),
                Err(meta) => RpcResponse::meta(id, meta),
            },
            KeymapRequest::DiscardChanges => match self.discard_changes() {
                Ok(()) => RpcResponse::keymap(id, KeymapResponse::DiscardChanges(true)),
                Err(meta) => RpcResponse::meta(id, meta),
            },
            KeymapRequest::GetPhysicalLayouts => RpcResponse::keymap(
                id,
                KeymapResponse::GetPhysicalLayouts(self.get_physical_layouts()),
            ),
            KeymapRequest::SetActivePhysicalLayout(index) => RpcResponse::keymap(
                id,
                KeymapResponse::SetActivePhysicalLayout(self.set_active_physical_layout(index)),
            ),
        }
    }

    /// The whole keymap, generated layer by layer and binding by binding.
    pub fn get_keymap(&self) -> KeymapView<'_> {
        let keymap = &self.keymap;
        let local_ids: &dyn LocalIds = self.local_ids.as_ref();

        KeymapView {
            layers: Repeated::new(keymap.layer_count(), move |layer| LayerView {
                id: layer as u32,
                name: keymap.layer_name(layer),
                bindings: Repeated::new(keymap.layer_len(layer), move |position| {
                    binding_message(local_ids, keymap.binding_at(layer, position))
                }),
            }),
        }
    }

    /// Resolves, validates and writes one binding.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Generic`] when the store fails for a reason other
    /// than an invalid location.
    pub fn set_layer_binding(
        &mut self,
        req: &SetLayerBindingRequest,
    ) -> Result<SetLayerBindingResponse, MetaError> {
        let id = LocalId(req.binding.behavior_id);
        let Some(name) = self.local_ids.find_name(id) else {
            debug!(%id, "no behavior with this local id");
            return Ok(SetLayerBindingResponse::InvalidBehavior);
        };

        let binding = BehaviorBinding::new(name, req.binding.param1, req.binding.param2);
        let limits = ValidationLimits::new(self.keymap.layer_count(), self.usage_limits);

        match BindingValidator::new(&self.registry, limits).validate(&binding) {
            Ok(()) => {}
            Err(BindingError::NotFound(name)) => {
                warn!(%id, name = %name, "local id resolved to an unregistered behavior");
                return Ok(SetLayerBindingResponse::InvalidBehavior);
            }
            Err(e) => {
                debug!(%id, error = %e, "binding rejected");
                return Ok(SetLayerBindingResponse::InvalidParameters);
            }
        }

        let layer = req.layer as usize;
        let position = req.key_position as usize;
        match self.keymap.set_binding_at(layer, position, binding) {
            Ok(()) => {
                self.mark_unsaved(true);
                Ok(SetLayerBindingResponse::Success)
            }
            Err(KeymapStoreError::InvalidLocation { .. }) => {
                Ok(SetLayerBindingResponse::InvalidLocation)
            }
            Err(e) => {
                error!(layer, position, error = %e, "setting the binding failed");
                Err(MetaError::Generic)
            }
        }
    }

    /// `true` when either the layout selection or the keymap is unsaved.
    pub fn check_unsaved_changes(&self) -> bool {
        let layout_changes = self.layouts.check_unsaved_selection();
        let keymap_changes = self.keymap.check_unsaved_changes();
        debug!(layout_changes, keymap_changes, "checked unsaved changes");
        layout_changes || keymap_changes
    }

    /// Persists the layout selection, then the keymap.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Generic`] if either step fails; the flag is left set.
    pub fn save_changes(&mut self) -> Result<(), MetaError> {
        self.layouts.save_selected().map_err(|e| {
            error!(error = %e, "failed to save the selected physical layout");
            MetaError::Generic
        })?;
        self.keymap.save_changes().map_err(|e| {
            error!(error = %e, "failed to save keymap changes");
            MetaError::Generic
        })?;

        info!("keymap changes saved");
        self.mark_unsaved(false);
        Ok(())
    }

    /// Reverts the layout selection, then the keymap.
    ///
    /// # Errors
    ///
    /// Returns [`MetaError::Generic`] if either step fails; the flag is left set.
    pub fn discard_changes(&mut self) -> Result<(), MetaError> {
        self.layouts.revert_selected().map_err(|e| {
            error!(error = %e, "failed to revert the selected physical layout");
            MetaError::Generic
        })?;
        self.keymap.discard_changes().map_err(|e| {
            error!(error = %e, "failed to discard keymap changes");
            MetaError::Generic
        })?;

        info!("keymap changes discarded");
        self.mark_unsaved(false);
        Ok(())
    }

    /// Every layout with its key geometry, plus the selected index.
    pub fn get_physical_layouts(&self) -> PhysicalLayoutsView<'_> {
        let layouts = self.layouts.layouts();

        PhysicalLayoutsView {
            active_layout_index: self.layouts.selected() as u32,
            layouts: Repeated::new(layouts.len(), move |i| PhysicalLayoutView {
                name: layouts[i].display_name.as_deref(),
                keys: Repeated::from_slice(&layouts[i].keys),
            }),
        }
    }

    /// Activates another layout and migrates every layer to it.
    ///
    /// Selecting the already active layout is a no-op that still returns the
    /// keymap.  A migration failure after a successful selection is logged;
    /// the new layout stays selected.
    ///
    /// # Errors
    ///
    /// Returns [`SetActivePhysicalLayoutError::Generic`] when the selection
    /// fails.  Nothing is changed in that case.
    pub fn set_active_physical_layout(
        &mut self,
        index: u32,
    ) -> Result<KeymapView<'_>, SetActivePhysicalLayoutError> {
        let old = self.layouts.selected();
        let new = index as usize;

        if old != new {
            if let Err(e) = self.layouts.select(new) {
                warn!(index, error = %e, "failed to select physical layout");
                return Err(SetActivePhysicalLayoutError::Generic);
            }

            match migrate_keymap(&mut self.keymap, &self.layouts, old) {
                Ok(summary) => info!(
                    old,
                    new,
                    layers = summary.layers,
                    copied = summary.copied,
                    cleared = summary.cleared,
                    "keymap migrated to new physical layout"
                ),
                Err(e) => error!(old, new, error = %e, "keymap migration failed"),
            }

            self.mark_unsaved(true);
        }

        Ok(self.get_keymap())
    }

    fn mark_unsaved(&mut self, unsaved: bool) {
        self.unsaved = unsaved;
        self.notifications
            .raise(Notification::UnsavedChangesStatusChanged(unsaved));
    }
}

/// Wire form of a stored binding; unresolvable behaviors use [`NO_BEHAVIOR_ID`].
fn binding_message(local_ids: &dyn LocalIds, binding: Option<&BehaviorBinding>) -> BindingMessage {
    let Some(binding) = binding else {
        return BindingMessage {
            behavior_id: NO_BEHAVIOR_ID,
            ..Default::default()
        };
    };

    BindingMessage {
        behavior_id: binding
            .behavior_name()
            .and_then(|name| local_ids.local_id(name))
            .map_or(NO_BEHAVIOR_ID, |id| id.0),
        param1: binding.param1,
        param2: binding.param2,
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
