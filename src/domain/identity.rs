//! Deterministic short-id assignment for authors.
//!
//! Ids are recomputed from scratch every run; there is no persisted identity
//! state. Stability across runs therefore depends only on author ordering and
//! name prefixes being stable, which the first-event ordering guarantees for
//! an append-only source.

use std::collections::{HashMap, HashSet};

use crate::domain::types::AuthorRecord;

const MAX_SHORT_ID_CHARS: usize = 10;
const FALLBACK_SHORT_ID: &str = "a";

/// One author with an assigned short id.
#[derive(Debug, Clone)]
pub struct AuthorIdentity {
    pub record: AuthorRecord,
    pub short_id: String,
}

/// The per-run author table: identities in first-event order plus a key index.
#[derive(Debug, Default)]
pub struct AuthorDirectory {
    authors: Vec<AuthorIdentity>,
    by_key: HashMap<String, usize>,
}

impl AuthorDirectory {
    /// Assign short ids to the full distinct-author list.
    ///
    /// Authors are processed in first-event order (ties broken by key), so
    /// the earliest author with a given name prefix always claims the
    /// unsuffixed id; later collisions take numeric suffixes from `2` up.
    pub fn assign(mut records: Vec<AuthorRecord>) -> Self {
        records.sort_by(|a, b| {
            a.first_post_id
                .cmp(&b.first_post_id)
                .then_with(|| a.key.cmp(&b.key))
        });

        let mut claimed: HashSet<String> = HashSet::with_capacity(records.len());
        let mut authors = Vec::with_capacity(records.len());
        let mut by_key = HashMap::with_capacity(records.len());

        for record in records {
            let prefix = short_id_prefix(&record.display_name);
            let short_id = if claimed.contains(&prefix) {
                let mut suffix = 2u64;
                loop {
                    let candidate = format!("{prefix}{suffix}");
                    if !claimed.contains(&candidate) {
                        break candidate;
                    }
                    suffix += 1;
                }
            } else {
                prefix
            };

            claimed.insert(short_id.clone());
            by_key.insert(record.key.clone(), authors.len());
            authors.push(AuthorIdentity { record, short_id });
        }

        Self { authors, by_key }
    }

    pub fn authors(&self) -> &[AuthorIdentity] {
        &self.authors
    }

    pub fn len(&self) -> usize {
        self.authors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.authors.is_empty()
    }

    pub fn index_of(&self, key: &str) -> Option<usize> {
        self.by_key.get(key).copied()
    }

    pub fn get(&self, index: usize) -> &AuthorIdentity {
        &self.authors[index]
    }
}

/// Lowercased alphabetic prefix of a display name, at most ten characters,
/// falling back to `"a"` for names with no alphabetic characters at all.
fn short_id_prefix(display_name: &str) -> String {
    let prefix: String = display_name
        .chars()
        .filter(|c| c.is_alphabetic())
        .flat_map(char::to_lowercase)
        .take(MAX_SHORT_ID_CHARS)
        .collect();
    if prefix.is_empty() {
        FALLBACK_SHORT_ID.to_string()
    } else {
        prefix
    }
}
