use std::collections::{BTreeMap, HashMap};
use std::sync::RwLock;

use tracing::debug;

use plancast_core::error::{PlancastError, Result};
use plancast_core::traits::MemoryLookup;
use plancast_core::types::NO_HISTORY;

use crate::{normalize, SEED_DOMAINS};

/// In-process domain memory. Read-mostly; updates take a write lock.
#[derive(Debug, Default)]
pub struct MemoryBank {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryBank {
    /// An empty bank.
    pub fn new() -> Self {
        Self::default()
    }

    /// A bank preloaded with [`SEED_DOMAINS`].
    pub fn with_defaults() -> Self {
        let entries = SEED_DOMAINS
            .iter()
            .map(|(d, n)| (d.to_string(), n.to_string()))
            .collect();
        Self {
            entries: RwLock::new(entries),
        }
    }

    /// Seeds plus extra domains from configuration. Extras override seeds.
    pub fn with_domains(extra: &BTreeMap<String, String>) -> Self {
        let bank = Self::with_defaults();
        if let Ok(mut map) = bank.entries.write() {
            for (domain, narrative) in extra {
                map.insert(normalize(domain), narrative.clone());
            }
        }
        bank
    }
}

impl MemoryLookup for MemoryBank {
    fn query(&self, domain: &str) -> String {
        let Ok(map) = self.entries.read() else {
            return NO_HISTORY.to_string();
        };
        map.get(&normalize(domain))
            .cloned()
            .unwrap_or_else(|| NO_HISTORY.to_string())
    }

    fn upsert(&self, domain: &str, narrative: &str) -> Result<()> {
        let key = normalize(domain);
        if key.is_empty() {
            return Err(PlancastError::Config("domain must not be empty".into()));
        }
        let mut map = self
            .entries
            .write()
            .map_err(|e| PlancastError::Database(e.to_string()))?;
        map.insert(key.clone(), narrative.to_string());
        debug!(domain = %key, "Domain narrative updated");
        Ok(())
    }

    fn remove(&self, domain: &str) -> Result<bool> {
        let mut map = self
            .entries
            .write()
            .map_err(|e| PlancastError::Database(e.to_string()))?;
        Ok(map.remove(&normalize(domain)).is_some())
    }

    fn entries(&self) -> Vec<(String, String)> {
        let Ok(map) = self.entries.read() else {
            return Vec::new();
        };
        let mut all: Vec<_> = map.iter().map(|(d, n)| (d.clone(), n.clone())).collect();
        all.sort();
        all
    }
}
