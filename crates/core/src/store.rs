//! Entity Store: loads target records by a unique key and guards the
//! uniqueness of that key.

use std::collections::HashMap;

use crate::error::{SyncError, SyncResult};
use crate::repository::TargetRepository;
use crate::target::TargetRecord;

pub struct EntityStore<'a> {
    repo: &'a dyn TargetRepository,
    auto_delete_duplicates: bool,
}

impl<'a> EntityStore<'a> {
    pub fn new(repo: &'a dyn TargetRepository, auto_delete_duplicates: bool) -> Self {
        Self {
            repo,
            auto_delete_duplicates,
        }
    }

    /// Map each value of `field` found among `values` to the single record
    /// of `record_type` holding it.
    ///
    /// A value held by more than one record is a [`SyncError::DuplicateKey`]
    /// unless duplicate auto-deletion is on, in which case the record seen
    /// first (lowest ID) is kept and later ones are deleted.
    pub async fn preload(
        &self,
        record_type: &str,
        field: &str,
        values: &[String],
    ) -> SyncResult<HashMap<String, TargetRecord>> {
        let mut found: HashMap<String, TargetRecord> = HashMap::new();
        if values.is_empty() {
            return Ok(found);
        }

        let mut records = self.repo.find_by_field(record_type, field, values).await?;
        records.sort_by_key(|r| r.id);

        for record in records {
            let value = record.field_str(field).to_string();
            if let Some(kept) = found.get(&value) {
                if !self.auto_delete_duplicates {
                    return Err(SyncError::DuplicateKey {
                        field: field.to_string(),
                        value,
                        kept_id: kept.id,
                        conflicting_id: record.id,
                    });
                }
                tracing::warn!(
                    field,
                    value = %value,
                    kept_id = kept.id,
                    deleted_id = record.id,
                    "Deleting duplicate record"
                );
                self.repo.delete(record.id).await?;
                continue;
            }
            found.insert(value, record);
        }

        Ok(found)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryRepository;
    use assert_matches::assert_matches;

    fn linked(repo: &MemoryRepository, ext: &str) -> TargetRecord {
        let mut r = TargetRecord::new(0, "article", "t");
        r.set_field("ext", ext);
        repo.insert(r)
    }

    #[tokio::test]
    async fn preload_keys_by_value() {
        let repo = MemoryRepository::new();
        let a = linked(&repo, "a");
        let b = linked(&repo, "b");
        linked(&repo, "c");

        let store = EntityStore::new(&repo, false);
        let found = store
            .preload("article", "ext", &["a".into(), "b".into(), "z".into()])
            .await
            .unwrap();
        assert_eq!(found.len(), 2);
        assert_eq!(found["a"].id, a.id);
        assert_eq!(found["b"].id, b.id);
    }

    #[tokio::test]
    async fn duplicate_fails_without_auto_delete() {
        let repo = MemoryRepository::new();
        let first = linked(&repo, "dup");
        let second = linked(&repo, "dup");

        let store = EntityStore::new(&repo, false);
        let err = store.preload("article", "ext", &["dup".into()]).await.unwrap_err();
        assert_matches!(
            err,
            SyncError::DuplicateKey { ref field, ref value, kept_id, conflicting_id }
                if field == "ext" && value == "dup" && kept_id == first.id && conflicting_id == second.id
        );
        assert_eq!(repo.all().len(), 2);
    }

    #[tokio::test]
    async fn duplicate_is_deleted_with_auto_delete() {
        let repo = MemoryRepository::new();
        let first = linked(&repo, "dup");
        let second = linked(&repo, "dup");

        let store = EntityStore::new(&repo, true);
        let found = store.preload("article", "ext", &["dup".into()]).await.unwrap();
        assert_eq!(found["dup"].id, first.id);
        assert!(repo.get(second.id).is_none());
        assert!(repo.get(first.id).is_some());
    }
}
