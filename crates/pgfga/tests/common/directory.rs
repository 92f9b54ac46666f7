//! A directory that answers searches from a fixed script.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use pgfga::ldap::{DirectoryEntry, DirectoryError, DirectorySearch};

/// Results keyed by base DN. Unknown bases return no entries.
#[derive(Debug, Clone, Default)]
pub struct ScriptedDirectory {
    results: HashMap<String, Vec<DirectoryEntry>>,
    searches: Arc<Mutex<Vec<(String, String)>>>,
}

impl ScriptedDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds an entry found under `base_dn`, with its `memberUid` values.
    pub fn entry(mut self, base_dn: &str, dn: &str, member_uids: &[&str]) -> Self {
        self.results
            .entry(base_dn.to_string())
            .or_default()
            .push(DirectoryEntry::new(dn).with_values("memberUid", member_uids));
        self
    }

    /// (base DN, filter) of every search made so far.
    pub fn searches(&self) -> Vec<(String, String)> {
        self.searches.lock().expect("search log poisoned").clone()
    }
}

#[async_trait]
impl DirectorySearch for ScriptedDirectory {
    async fn search(
        &mut self,
        base_dn: &str,
        filter: &str,
        _attributes: &[&str],
    ) -> Result<Vec<DirectoryEntry>, DirectoryError> {
        self.searches
            .lock()
            .expect("search log poisoned")
            .push((base_dn.to_string(), filter.to_string()));
        Ok(self.results.get(base_dn).cloned().unwrap_or_default())
    }
}
