//! Renderer stand-in that only keeps residency accounting.

use rustc_hash::FxHashMap;
use strata_cache::Buffer;
use strata_lod::Renderer;
use strata_spatial::NodeKey;
use tracing::trace;

/// Tracks what a real renderer would hold on the GPU.
#[derive(Debug, Default)]
pub struct ResidencyRenderer {
    resident: FxHashMap<NodeKey, usize>,
    resident_bytes: usize,
    peak_bytes: usize,
    attaches: u64,
    detaches: u64,
}

impl ResidencyRenderer {
    pub fn resident_bytes(&self) -> usize {
        self.resident_bytes
    }

    pub fn peak_bytes(&self) -> usize {
        self.peak_bytes
    }

    pub fn attaches(&self) -> u64 {
        self.attaches
    }

    pub fn detaches(&self) -> u64 {
        self.detaches
    }
}

impl Renderer for ResidencyRenderer {
    fn attach(&mut self, key: NodeKey, content: &Buffer) {
        trace!(%key, bytes = content.len(), "attach");
        if let Some(previous) = self.resident.insert(key, content.len()) {
            self.resident_bytes -= previous;
        }
        self.resident_bytes += content.len();
        self.peak_bytes = self.peak_bytes.max(self.resident_bytes);
        self.attaches += 1;
    }

    fn detach(&mut self, key: NodeKey) {
        trace!(%key, "detach");
        if let Some(bytes) = self.resident.remove(&key) {
            self.resident_bytes -= bytes;
            self.detaches += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_byte_accounting() {
        let mut renderer = ResidencyRenderer::default();
        renderer.attach(NodeKey::ROOT, &Arc::from(vec![0u8; 100]));
        renderer.attach(NodeKey::from_raw(4), &Arc::from(vec![0u8; 50]));
        renderer.detach(NodeKey::ROOT);
        renderer.detach(NodeKey::ROOT);
        assert_eq!(renderer.resident_bytes(), 50);
        assert_eq!(renderer.peak_bytes(), 150);
        assert_eq!(renderer.attaches(), 2);
        assert_eq!(renderer.detaches(), 1);
    }
}
