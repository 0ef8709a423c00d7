//! Mapping between items and opaque store records.
//!
//! Item states and reference records are CBOR-encoded. The version is not
//! part of the payload; it is owned by the store record and copied onto the
//! decoded state.

use crate::error::{CoreError, CoreResult};
use crate::item::{ItemId, ItemState, NodeId};
use crate::references::NodeReferences;
use crate::types::Version;
use serde::de::DeserializeOwned;
use serde::Serialize;
use strata_storage::{Record, RecordKey};

const NODE_TAG: u8 = b'n';
const PROPERTY_TAG: u8 = b'p';
const REFERENCES_TAG: u8 = b'r';

/// Returns the store key of an item.
#[must_use]
pub fn item_key(id: &ItemId) -> RecordKey {
    match id {
        ItemId::Node(node) => {
            let mut key = Vec::with_capacity(17);
            key.push(NODE_TAG);
            key.extend_from_slice(node.as_bytes());
            RecordKey::new(key)
        }
        ItemId::Property(prop) => {
            let name = prop.name().as_bytes();
            let mut key = Vec::with_capacity(17 + name.len());
            key.push(PROPERTY_TAG);
            key.extend_from_slice(prop.parent().as_bytes());
            key.extend_from_slice(name);
            RecordKey::new(key)
        }
    }
}

/// Returns the store key of a node's reference record.
#[must_use]
pub fn references_key(target: NodeId) -> RecordKey {
    let mut key = Vec::with_capacity(17);
    key.push(REFERENCES_TAG);
    key.extend_from_slice(target.as_bytes());
    RecordKey::new(key)
}

fn encode<T: Serialize>(value: &T) -> CoreResult<Vec<u8>> {
    let mut bytes = Vec::new();
    ciborium::into_writer(value, &mut bytes).map_err(|e| CoreError::codec(e.to_string()))?;
    Ok(bytes)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> CoreResult<T> {
    ciborium::from_reader(bytes).map_err(|e| CoreError::codec(e.to_string()))
}

/// Encodes an item state payload.
pub fn encode_item(state: &ItemState) -> CoreResult<Vec<u8>> {
    encode(state)
}

/// Decodes an item record, checking that it belongs to `id`.
pub fn decode_item(id: &ItemId, record: &Record) -> CoreResult<ItemState> {
    let mut state: ItemState = decode(&record.payload)?;
    if state.id() != *id {
        return Err(CoreError::codec(format!(
            "record for {id} decodes to {}",
            state.id()
        )));
    }
    state.set_version(Version::new(record.version));
    Ok(state)
}

/// Encodes a reference record payload.
pub fn encode_references(refs: &NodeReferences) -> CoreResult<Vec<u8>> {
    encode(refs)
}

/// Decodes a reference record.
pub fn decode_references(record: &Record) -> CoreResult<NodeReferences> {
    decode(&record.payload)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::item::{NodeState, PropertyId, PropertyState, Value};

    #[test]
    fn keys_are_namespaced() {
        let node = NodeId::new();
        let node_key = item_key(&ItemId::Node(node));
        let prop_key = item_key(&ItemId::Property(PropertyId::new(node, "a")));
        let refs_key = references_key(node);

        assert_eq!(node_key.as_bytes()[0], NODE_TAG);
        assert_eq!(prop_key.as_bytes()[0], PROPERTY_TAG);
        assert_eq!(refs_key.as_bytes()[0], REFERENCES_TAG);
        assert_ne!(node_key, refs_key);
        assert_eq!(&prop_key.as_bytes()[17..], b"a");
    }

    #[test]
    fn decoded_state_takes_record_version() {
        let id = PropertyId::new(NodeId::new(), "ref");
        let state: ItemState = PropertyState::new(id.clone(), Value::Reference(NodeId::new())).into();
        let record = Record {
            version: 7,
            payload: encode_item(&state).unwrap(),
        };

        let decoded = decode_item(&ItemId::Property(id), &record).unwrap();
        assert_eq!(decoded.version(), Version::new(7));
        assert_eq!(decoded.as_property(), state.as_property().map(|p| {
            let mut p = p.clone();
            p.set_version(Version::new(7));
            p
        }).as_ref());
    }

    #[test]
    fn decode_rejects_foreign_record() {
        let state: ItemState = NodeState::new(NodeId::new(), None, "nt:base").into();
        let record = Record {
            version: 1,
            payload: encode_item(&state).unwrap(),
        };
        let other = ItemId::Node(NodeId::new());
        assert!(matches!(
            decode_item(&other, &record),
            Err(CoreError::Codec { .. })
        ));
    }

    #[test]
    fn garbage_is_a_codec_error() {
        let record = Record {
            version: 1,
            payload: vec![0xff, 0x00, 0x13],
        };
        assert!(decode_references(&record).is_err());
    }
}
