//! Per-node lifecycle state tracked by the tile manager.

use strata_cache::Buffer;
use strata_worker::RequestId;

bitflags::bitflags! {
    /// Pending actions decided during a frame pass.
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
    pub struct TileFlags: u8 {
        /// The node is wanted but has no content and no request in flight.
        const PENDING_LOAD   = 0b0000_0001;
        /// The node is not needed and will be dropped in the apply phase.
        const PENDING_DELETE = 0b0000_0010;
        /// Kept only as a placeholder while descendants load.
        const HIDDEN         = 0b0000_0100;
    }
}

/// Where a node's content is. Loading and visible are mutually exclusive.
#[derive(Clone, Debug, Default)]
pub enum Residency {
    /// No content and no request.
    #[default]
    Idle,
    /// A pool request is in flight.
    Loading(RequestId),
    /// Content is attached to the renderer.
    Visible(Buffer),
}

/// Lifecycle record of one tracked node.
#[derive(Clone, Debug, Default)]
pub struct TileStatus {
    flags: TileFlags,
    residency: Residency,
    nonce: u64,
    evict: bool,
}

impl TileStatus {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn flags(&self) -> TileFlags {
        self.flags
    }

    #[must_use]
    pub fn residency(&self) -> &Residency {
        &self.residency
    }

    /// Nonce of the most recent fetch issued for this node.
    #[must_use]
    pub fn nonce(&self) -> u64 {
        self.nonce
    }

    /// Whether this frame's traversal skipped the node.
    #[must_use]
    pub fn is_evicted(&self) -> bool {
        self.evict
    }

    #[must_use]
    pub fn is_visible(&self) -> bool {
        matches!(self.residency, Residency::Visible(_))
    }

    #[must_use]
    pub fn is_loading(&self) -> bool {
        matches!(self.residency, Residency::Loading(_))
    }

    #[must_use]
    pub fn is_pending_load(&self) -> bool {
        self.flags.contains(TileFlags::PENDING_LOAD)
    }

    #[must_use]
    pub fn is_pending_delete(&self) -> bool {
        self.flags.contains(TileFlags::PENDING_DELETE)
    }

    #[must_use]
    pub fn is_hidden(&self) -> bool {
        self.flags.contains(TileFlags::HIDDEN)
    }

    /// Attached content, if visible.
    #[must_use]
    pub fn content(&self) -> Option<&Buffer> {
        match &self.residency {
            Residency::Visible(content) => Some(content),
            _ => None,
        }
    }

    /// In-flight request, if loading.
    #[must_use]
    pub fn request(&self) -> Option<RequestId> {
        match self.residency {
            Residency::Loading(id) => Some(id),
            _ => None,
        }
    }

    /// Start of frame: assume the node is no longer needed.
    pub(crate) fn mark(&mut self) {
        self.flags.insert(TileFlags::PENDING_DELETE);
        self.flags.remove(TileFlags::HIDDEN);
        self.evict = true;
    }

    /// The traversal yielded this node.
    pub(crate) fn visit(&mut self) {
        self.flags.remove(TileFlags::PENDING_DELETE);
        self.evict = false;
        match self.residency {
            Residency::Idle => self.flags.insert(TileFlags::PENDING_LOAD),
            Residency::Loading(_) | Residency::Visible(_) => self.flags.remove(TileFlags::PENDING_LOAD),
        }
    }

    /// A visible descendant replaces this node.
    pub(crate) fn supersede(&mut self) {
        self.flags.insert(TileFlags::PENDING_DELETE);
    }

    /// Keep the node drawn while a descendant is still loading.
    pub(crate) fn retain_as_placeholder(&mut self) {
        if self.flags.contains(TileFlags::PENDING_DELETE) {
            self.flags.remove(TileFlags::PENDING_DELETE);
            self.flags.insert(TileFlags::HIDDEN);
        }
    }

    /// A fetch was dispatched under `nonce`.
    pub(crate) fn start_loading(&mut self, nonce: u64, request: RequestId) {
        self.nonce = nonce;
        self.residency = Residency::Loading(request);
        self.flags.remove(TileFlags::PENDING_LOAD);
    }

    /// Content arrived without a fetch (cache hit).
    pub(crate) fn show(&mut self, nonce: u64, content: Buffer) {
        self.nonce = nonce;
        self.residency = Residency::Visible(content);
        self.flags.remove(TileFlags::PENDING_LOAD);
    }

    /// Apply a fetched payload. Returns `false` and leaves the status
    /// untouched unless the node is loading under exactly `nonce`.
    pub(crate) fn complete(&mut self, nonce: u64, content: Buffer) -> bool {
        if !self.accepts(nonce) {
            return false;
        }
        self.residency = Residency::Visible(content);
        true
    }

    /// The in-flight fetch ended without content; request it again.
    pub(crate) fn abandon_load(&mut self, nonce: u64) -> bool {
        if !self.accepts(nonce) {
            return false;
        }
        self.residency = Residency::Idle;
        self.flags.insert(TileFlags::PENDING_LOAD);
        true
    }

    /// Whether a completion issued under `nonce` is current.
    #[must_use]
    pub fn accepts(&self, nonce: u64) -> bool {
        self.is_loading() && self.nonce == nonce
    }

    /// Drop any pending load that can no longer be issued.
    pub(crate) fn settle(&mut self) {
        if !matches!(self.residency, Residency::Idle) {
            self.flags.remove(TileFlags::PENDING_LOAD);
        }
    }
}
