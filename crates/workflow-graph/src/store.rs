//! Persistence of graph descriptors
//!
//! Stores turn a [`GraphDescriptor`] into an opaque blob and back. They are
//! meant for saving workflows and for clipboard transfer; structural copies
//! inside an editing session use [`WorkflowGraph::extract`] instead.
//!
//! [`WorkflowGraph::extract`]: crate::WorkflowGraph::extract

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::descriptor::GraphDescriptor;
use crate::error::{StoreError, StoreResult};

/// Encodes and decodes graph descriptors
pub trait GraphStore<T> {
    fn serialize(&self, descriptor: &GraphDescriptor<T>) -> StoreResult<Vec<u8>>;

    fn deserialize(&self, blob: &[u8]) -> StoreResult<GraphDescriptor<T>>;
}

/// Plain JSON encoding
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonStore;

impl<T: Serialize + DeserializeOwned> GraphStore<T> for JsonStore {
    fn serialize(&self, descriptor: &GraphDescriptor<T>) -> StoreResult<Vec<u8>> {
        Ok(serde_json::to_vec(descriptor)?)
    }

    fn deserialize(&self, blob: &[u8]) -> StoreResult<GraphDescriptor<T>> {
        let descriptor: GraphDescriptor<T> = serde_json::from_slice(blob)?;
        descriptor.validate()?;
        Ok(descriptor)
    }
}

/// JSON compressed with zstd
#[derive(Debug, Clone, Copy)]
pub struct CompressedJsonStore {
    level: i32,
}

impl CompressedJsonStore {
    /// Create a store with the given zstd compression level
    pub fn new(level: i32) -> Self {
        Self { level }
    }
}

impl Default for CompressedJsonStore {
    fn default() -> Self {
        Self::new(3)
    }
}

impl<T: Serialize + DeserializeOwned> GraphStore<T> for CompressedJsonStore {
    fn serialize(&self, descriptor: &GraphDescriptor<T>) -> StoreResult<Vec<u8>> {
        let json = serde_json::to_vec(descriptor)?;
        let compressed = zstd::encode_all(&json[..], self.level)
            .map_err(|e| StoreError::Compression(e.to_string()))?;
        log::trace!(
            "Stored {} nodes ({} bytes, {} compressed)",
            descriptor.nodes.len(),
            json.len(),
            compressed.len()
        );
        Ok(compressed)
    }

    fn deserialize(&self, blob: &[u8]) -> StoreResult<GraphDescriptor<T>> {
        let json =
            zstd::decode_all(blob).map_err(|e| StoreError::Compression(e.to_string()))?;
        let descriptor: GraphDescriptor<T> = serde_json::from_slice(&json)?;
        descriptor.validate()?;
        Ok(descriptor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::EdgeDescriptor;
    use crate::types::EdgeLabel;

    fn sample() -> GraphDescriptor<String> {
        GraphDescriptor {
            nodes: vec!["source".into(), "sink".into()],
            edges: vec![EdgeDescriptor {
                from: 0,
                to: 1,
                label: EdgeLabel::new(0),
            }],
        }
    }

    #[test]
    fn test_compressed_store() {
        let store = CompressedJsonStore::default();
        let blob = store.serialize(&sample()).unwrap();
        let restored: GraphDescriptor<String> = store.deserialize(&blob).unwrap();
        assert_eq!(restored, sample());
    }

    #[test]
    fn test_corrupt_blob() {
        let store = CompressedJsonStore::default();
        let result: StoreResult<GraphDescriptor<String>> = store.deserialize(b"not zstd");
        assert!(matches!(result, Err(StoreError::Compression(_))));
    }

    #[test]
    fn test_json_store_rejects_dangling_edge() {
        let blob = serde_json::to_vec(&serde_json::json!({
            "nodes": ["a"],
            "edges": [{"from": 0, "to": 1, "label": {"index": 0}}]
        }))
        .unwrap();
        let result: StoreResult<GraphDescriptor<String>> = JsonStore.deserialize(&blob);
        assert!(matches!(result, Err(StoreError::InvalidDescriptor(_))));
    }
}
