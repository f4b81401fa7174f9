//! Human curation pass over generated suggestions.
//!
//! The store holds the suggestion list of exactly one document at a time;
//! loading a new list discards all prior review work. Items are addressed by
//! position (the order the backend returned them), and the curated view —
//! approved plus edited items — is what finalization submits.

use crate::api::types::{CurationStatus, SuggestionItem};

#[derive(Debug, Default)]
pub struct CurationStore {
    items: Vec<SuggestionItem>,
}

impl CurationStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the whole list. Incoming statuses are reset to pending; any
    /// in-flight review state belongs to the previous document and is gone.
    pub fn load(&mut self, mut items: Vec<SuggestionItem>) {
        for item in &mut items {
            item.status = CurationStatus::Pending;
        }
        tracing::debug!(count = items.len(), "suggestion list loaded");
        self.items = items;
    }

    pub fn items(&self) -> &[SuggestionItem] {
        &self.items
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Set a review status directly. Out-of-range indexes are a silent no-op,
    /// matching how a stale UI row behaves after a reload.
    pub fn set_status(&mut self, index: usize, status: CurationStatus) {
        if let Some(item) = self.items.get_mut(index) {
            item.status = status;
        }
    }

    /// Replace an item's generated content. Editing is an implicit approval:
    /// the item is forced to `edited` no matter what state it was in.
    pub fn set_content(&mut self, index: usize, content: impl Into<String>) {
        if let Some(item) = self.items.get_mut(index) {
            item.generated_content = content.into();
            item.status = CurationStatus::Edited;
        }
    }

    /// Uniformly approve everything, overriding rejected and edited states
    /// alike. Edited content itself is kept.
    pub fn approve_all(&mut self) {
        for item in &mut self.items {
            item.status = CurationStatus::Approved;
        }
    }

    pub fn reject_all(&mut self) {
        for item in &mut self.items {
            item.status = CurationStatus::Rejected;
        }
    }

    /// The curated view: approved and edited items, in original order.
    pub fn curated_items(&self) -> Vec<&SuggestionItem> {
        self.items
            .iter()
            .filter(|item| item.status.is_curated())
            .collect()
    }

    /// Owned copy of the curated view, the finalize payload.
    pub fn curated_payload(&self) -> Vec<SuggestionItem> {
        self.items
            .iter()
            .filter(|item| item.status.is_curated())
            .cloned()
            .collect()
    }

    /// Finalization needs at least one approved or edited item.
    pub fn can_finalize(&self) -> bool {
        self.items.iter().any(|item| item.status.is_curated())
    }

    pub fn count_with_status(&self, status: CurationStatus) -> usize {
        self.items.iter().filter(|item| item.status == status).count()
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::types::SuggestionType;

    fn suggestion(id: &str, content: &str) -> SuggestionItem {
        SuggestionItem {
            id: id.to_string(),
            kind: SuggestionType::Glossary,
            original_context: "…the mitochondria…".to_string(),
            generated_content: content.to_string(),
            confidence_score: Some(0.9),
            status: CurationStatus::Pending,
            source_units: None,
            source_previews: None,
        }
    }

    fn loaded_store(n: usize) -> CurationStore {
        let mut store = CurationStore::new();
        store.load(
            (0..n)
                .map(|i| suggestion(&format!("s-{i}"), &format!("definition {i}")))
                .collect(),
        );
        store
    }

    #[test]
    fn load_resets_incoming_statuses_to_pending() {
        let mut store = CurationStore::new();
        let mut item = suggestion("s-0", "text");
        item.status = CurationStatus::Approved;
        store.load(vec![item]);
        assert_eq!(store.count_with_status(CurationStatus::Pending), 1);
        assert!(!store.can_finalize());
    }

    #[test]
    fn approve_all_then_reject_all_flips_every_item() {
        let mut store = loaded_store(4);
        store.set_status(1, CurationStatus::Rejected);

        store.approve_all();
        assert_eq!(store.count_with_status(CurationStatus::Approved), 4);
        assert_eq!(store.curated_items().len(), 4);

        store.reject_all();
        assert_eq!(store.count_with_status(CurationStatus::Rejected), 4);
        assert!(store.curated_items().is_empty());
        assert!(!store.can_finalize());
    }

    #[test]
    fn editing_forces_edited_from_any_prior_state() {
        for prior in [
            CurationStatus::Pending,
            CurationStatus::Approved,
            CurationStatus::Rejected,
        ] {
            let mut store = loaded_store(1);
            store.set_status(0, prior);
            store.set_content(0, "better definition");
            let item = &store.items()[0];
            assert_eq!(item.status, CurationStatus::Edited);
            assert_eq!(item.generated_content, "better definition");
        }
    }

    #[test]
    fn approve_all_overrides_edited_status_but_keeps_content() {
        let mut store = loaded_store(3);
        store.set_content(0, "rewritten");
        store.approve_all();
        assert_eq!(store.items()[0].status, CurationStatus::Approved);
        assert_eq!(store.items()[0].generated_content, "rewritten");
        assert_eq!(store.count_with_status(CurationStatus::Approved), 3);
    }

    #[test]
    fn curated_view_is_approved_union_edited() {
        let mut store = loaded_store(4);
        store.set_status(0, CurationStatus::Approved);
        store.set_content(1, "tweaked");
        store.set_status(2, CurationStatus::Rejected);
        // index 3 stays pending

        let curated = store.curated_items();
        assert_eq!(curated.len(), 2);
        assert_eq!(curated[0].id, "s-0");
        assert_eq!(curated[1].id, "s-1");
        assert!(store.can_finalize());

        let payload = store.curated_payload();
        assert_eq!(payload.len(), 2);
        assert_eq!(payload[1].generated_content, "tweaked");
    }

    #[test]
    fn load_discards_previous_review_work() {
        let mut store = loaded_store(2);
        store.approve_all();
        store.load(vec![suggestion("n-0", "new doc suggestion")]);
        assert_eq!(store.len(), 1);
        assert_eq!(store.items()[0].id, "n-0");
        assert!(!store.can_finalize());
    }

    #[test]
    fn out_of_range_operations_are_silent_noops() {
        let mut store = loaded_store(1);
        store.set_status(7, CurationStatus::Approved);
        store.set_content(7, "ghost");
        assert_eq!(store.count_with_status(CurationStatus::Pending), 1);
    }
}
