//! Commit → touched-file "transactions" for market-basket analysis.

use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};

use pulse_core::{CommitId, FileChange};

/// The distinct files touched by one commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub commit_id: CommitId,
    pub files: BTreeSet<String>,
}

/// Transactions for a commit set plus per-file transaction frequency.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransactionSet {
    transactions: Vec<Transaction>,
    frequencies: BTreeMap<String, usize>,
    by_commit: HashMap<CommitId, usize>,
}

impl TransactionSet {
    /// Group file-change rows by commit.
    ///
    /// Transactions follow the order of `commit_ids`; duplicate ids and
    /// commits without any rows are skipped, and a file touched twice in one
    /// commit counts once.
    pub fn build(commit_ids: &[CommitId], changes: &[FileChange]) -> Self {
        let mut files_by_commit: HashMap<&str, BTreeSet<String>> = HashMap::new();
        for change in changes {
            files_by_commit
                .entry(change.commit_id.as_str())
                .or_default()
                .insert(change.path.clone());
        }

        let mut set = Self::default();
        let mut seen = HashSet::new();
        for id in commit_ids {
            if !seen.insert(id.as_str()) {
                continue;
            }
            let Some(files) = files_by_commit.remove(id.as_str()) else {
                continue;
            };
            for file in &files {
                *set.frequencies.entry(file.clone()).or_insert(0) += 1;
            }
            set.by_commit.insert(id.clone(), set.transactions.len());
            set.transactions.push(Transaction {
                commit_id: id.clone(),
                files,
            });
        }
        set
    }

    pub fn transactions(&self) -> &[Transaction] {
        &self.transactions
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Number of transactions containing `file`.
    pub fn frequency(&self, file: &str) -> usize {
        self.frequencies.get(file).copied().unwrap_or(0)
    }

    /// Distinct files across all transactions.
    pub fn unique_files(&self) -> usize {
        self.frequencies.len()
    }

    pub fn files_for(&self, commit_id: &str) -> Option<&BTreeSet<String>> {
        self.by_commit
            .get(commit_id)
            .map(|&idx| &self.transactions[idx].files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pulse_core::ChangeType;

    fn change(commit_id: &str, path: &str) -> FileChange {
        FileChange {
            commit_id: commit_id.to_string(),
            path: path.to_string(),
            lines_added: 1,
            lines_removed: 0,
            change_type: ChangeType::Modified,
        }
    }

    fn ids(list: &[&str]) -> Vec<CommitId> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn groups_and_deduplicates_per_commit() {
        let changes = vec![
            change("c1", "a.rs"),
            change("c1", "a.rs"),
            change("c1", "b.rs"),
            change("c2", "a.rs"),
        ];
        let set = TransactionSet::build(&ids(&["c1", "c2"]), &changes);

        assert_eq!(set.len(), 2);
        assert_eq!(set.files_for("c1").unwrap().len(), 2);
        assert_eq!(set.frequency("a.rs"), 2);
        assert_eq!(set.frequency("b.rs"), 1);
        assert_eq!(set.unique_files(), 2);
    }

    #[test]
    fn follows_requested_commit_order() {
        let changes = vec![change("c1", "a.rs"), change("c2", "b.rs")];
        let set = TransactionSet::build(&ids(&["c2", "c1", "c2"]), &changes);

        let order: Vec<&str> = set
            .transactions()
            .iter()
            .map(|t| t.commit_id.as_str())
            .collect();
        assert_eq!(order, vec!["c2", "c1"]);
    }

    #[test]
    fn no_rows_means_empty_not_error() {
        let set = TransactionSet::build(&ids(&["c1"]), &[]);
        assert!(set.is_empty());
        assert_eq!(set.unique_files(), 0);
        assert!(set.files_for("c1").is_none());
    }

    #[test]
    fn rows_for_unrequested_commits_ignored() {
        let changes = vec![change("other", "x.rs")];
        let set = TransactionSet::build(&ids(&["c1"]), &changes);
        assert!(set.is_empty());
        assert_eq!(set.frequency("x.rs"), 0);
    }
}
