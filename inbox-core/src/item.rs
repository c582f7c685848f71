//! Mergeable records.
//!
//! The tracker is generic over [`Record`]; [`Item`] is the schemaless JSON
//! record used for rows of the conversations feed.

use crate::ItemId;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A record with a stable identity that accepts shallow patches.
pub trait Record: Clone + Send + Sync + 'static {
    /// Partial update applied by [`Record::merge`].
    type Patch: Clone + Send + Sync + 'static;

    fn id(&self) -> &ItemId;

    /// Overlay `patch` onto `self`. Fields present in the patch replace the
    /// existing values; everything else is left untouched.
    fn merge(&mut self, patch: &Self::Patch);
}

/// Shallow patch for [`Item`].
pub type ItemPatch = Map<String, Value>;

/// Schemaless record: an id plus arbitrary top-level fields.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: ItemId,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Item {
    pub fn new(id: impl Into<ItemId>) -> Self {
        Self {
            id: id.into(),
            fields: Map::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }
}

impl Record for Item {
    type Patch = ItemPatch;

    fn id(&self) -> &ItemId {
        &self.id
    }

    fn merge(&mut self, patch: &Self::Patch) {
        for (key, value) in patch {
            // Identity is fixed; a patch can never move a record.
            if key == "id" {
                continue;
            }
            self.fields.insert(key.clone(), value.clone());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    fn patch(value: Value) -> ItemPatch {
        match value {
            Value::Object(map) => map,
            _ => Map::new(),
        }
    }

    #[test]
    fn test_merge_overrides_and_preserves() {
        let mut item = Item::new("conv-1")
            .with_field("status", "open")
            .with_field("unread", 3);
        item.merge(&patch(json!({ "status": "closed" })));

        assert_eq!(item.get("status"), Some(&json!("closed")));
        assert_eq!(item.get("unread"), Some(&json!(3)));
    }

    #[test]
    fn test_merge_is_shallow() {
        let mut item = Item::new("conv-1").with_field("meta", json!({ "a": 1, "b": 2 }));
        item.merge(&patch(json!({ "meta": { "a": 5 } })));
        assert_eq!(item.get("meta"), Some(&json!({ "a": 5 })));
    }

    #[test]
    fn test_merge_ignores_id_key() {
        let mut item = Item::new("conv-1");
        item.merge(&patch(json!({ "id": "conv-2", "pinned": true })));
        assert_eq!(item.id.as_str(), "conv-1");
        assert!(item.get("id").is_none());
        assert_eq!(item.get("pinned"), Some(&json!(true)));
    }

    #[test]
    fn test_item_round_trips_flattened() {
        let item = Item::new("conv-3").with_field("assignee", "maya");
        let value = serde_json::to_value(&item).expect("serialize");
        assert_eq!(value, json!({ "id": "conv-3", "assignee": "maya" }));
    }

    proptest! {
        #[test]
        fn merge_overlays_every_patch_field(
            base in prop::collection::btree_map("[a-h]", any::<i64>(), 0..6),
            over in prop::collection::btree_map("[a-h]", any::<i64>(), 0..6),
        ) {
            let mut item = Item::new("x");
            for (k, v) in &base {
                item.fields.insert(k.clone(), json!(v));
            }
            let p: ItemPatch = over.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            item.merge(&p);

            for (k, v) in &over {
                prop_assert_eq!(item.get(k), Some(&json!(v)));
            }
            for (k, v) in &base {
                if !over.contains_key(k) {
                    prop_assert_eq!(item.get(k), Some(&json!(v)));
                }
            }
        }
    }
}
