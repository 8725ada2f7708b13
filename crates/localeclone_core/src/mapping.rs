use std::collections::BTreeMap;

use anyhow::{Result, bail};
use serde::Serialize;

use crate::document::Document;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IdMappingEntry {
    pub old_id: String,
    /// Empty until the create call for `old_id` returns.
    pub new_id: String,
    /// Type and uid of the source document, for finding its copy by hand.
    pub label: String,
}

/// Source document id to created document id, one entry per fetched
/// document, in fetch order.
#[derive(Debug, Clone, Default)]
pub struct IdMapping {
    entries: Vec<IdMappingEntry>,
    positions: BTreeMap<String, usize>,
}

impl IdMapping {
    pub fn for_documents(documents: &[Document]) -> Result<Self> {
        let mut mapping = Self::default();
        for document in documents {
            if mapping.positions.contains_key(&document.id) {
                bail!(
                    "document id {} appears more than once in the fetched set",
                    document.id
                );
            }
            mapping
                .positions
                .insert(document.id.clone(), mapping.entries.len());
            mapping.entries.push(IdMappingEntry {
                old_id: document.id.clone(),
                new_id: String::new(),
                label: document.label(),
            });
        }
        Ok(mapping)
    }

    pub fn record_created(&mut self, old_id: &str, new_id: &str) -> Result<()> {
        let Some(&position) = self.positions.get(old_id) else {
            bail!("cannot record created document for unknown source id {old_id}");
        };
        self.entries[position].new_id = new_id.to_string();
        Ok(())
    }

    pub fn contains(&self, old_id: &str) -> bool {
        self.positions.contains_key(old_id)
    }

    /// Look up the created id for a source id. An id outside the fetched set,
    /// or one whose create never returned an id, is an error.
    pub fn resolve(&self, old_id: &str) -> Result<&str> {
        let Some(&position) = self.positions.get(old_id) else {
            bail!("the new id for the link {old_id} couldn't be found");
        };
        let entry = &self.entries[position];
        if entry.new_id.is_empty() {
            bail!(
                "document {old_id} ({}) has no created counterpart (empty id returned on create); look for its copy in the pending release",
                entry.label
            );
        }
        Ok(&entry.new_id)
    }

    pub fn entries(&self) -> &[IdMappingEntry] {
        &self.entries
    }

    pub fn created_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|entry| !entry.new_id.is_empty())
            .count()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::IdMapping;
    use crate::document::Document;

    fn document(id: &str) -> Document {
        serde_json::from_value(json!({
            "id": id,
            "uid": id.to_lowercase(),
            "type": "page",
            "lang": "en-us",
            "data": {},
        }))
        .expect("parse document")
    }

    #[test]
    fn one_entry_per_document_in_fetch_order() {
        let mapping =
            IdMapping::for_documents(&[document("A1"), document("B1"), document("C1")])
                .expect("mapping");
        assert_eq!(mapping.entries().len(), 3);
        let old_ids: Vec<&str> = mapping
            .entries()
            .iter()
            .map(|entry| entry.old_id.as_str())
            .collect();
        assert_eq!(old_ids, vec!["A1", "B1", "C1"]);
        assert!(mapping.entries().iter().all(|entry| entry.new_id.is_empty()));
        assert_eq!(mapping.created_count(), 0);
    }

    #[test]
    fn duplicate_source_ids_are_rejected() {
        let error = IdMapping::for_documents(&[document("A1"), document("A1")])
            .expect_err("duplicate must fail");
        assert!(error.to_string().contains("more than once"));
    }

    #[test]
    fn resolve_returns_recorded_id() {
        let mut mapping =
            IdMapping::for_documents(&[document("A1"), document("B1")]).expect("mapping");
        mapping.record_created("B1", "B2").expect("record");
        assert_eq!(mapping.resolve("B1").expect("resolve"), "B2");
        assert_eq!(mapping.created_count(), 1);
    }

    #[test]
    fn resolve_fails_for_unknown_and_uncreated_ids() {
        let mut mapping = IdMapping::for_documents(&[document("A1")]).expect("mapping");
        let unknown = mapping.resolve("Z9").expect_err("unknown id");
        assert!(unknown.to_string().contains("Z9"));

        let pending = mapping.resolve("A1").expect_err("pending id");
        assert!(pending.to_string().contains("no created counterpart"));

        mapping.record_created("A1", "").expect("record empty");
        let empty = mapping.resolve("A1").expect_err("empty id");
        assert!(empty.to_string().contains("type=page uid=a1"));
    }

    #[test]
    fn record_created_rejects_unknown_source() {
        let mut mapping = IdMapping::for_documents(&[document("A1")]).expect("mapping");
        assert!(mapping.record_created("Z9", "Z10").is_err());
    }
}
