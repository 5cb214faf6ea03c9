use serde_json::Value;
use std::collections::HashMap;
use tracing::warn;

use crate::client::{FetchError, OpenAlexClient};

/// Outcome of one registry lookup. `Absent` is a confirmed miss (the registry
/// answered 404); `Failed` is a transport error or exhausted retry budget.
/// Both are cached so known-bad ids are never re-queried within a run.
#[derive(Debug, Clone, PartialEq)]
pub enum Lookup {
    Found(Value),
    Absent,
    Failed(String),
}

impl Lookup {
    pub fn value(&self) -> Option<&Value> {
        match self {
            Lookup::Found(value) => Some(value),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RegistryEndpoints {
    pub ror_base: String,
    pub crossref_base: String,
    pub geonames_base: String,
    pub geonames_username: String,
}

/// One memo table per registry, owned by a single run.
#[derive(Default)]
pub struct RegistryCache {
    pub funders: HashMap<String, Lookup>,
    pub ror: HashMap<String, Lookup>,
    pub crossref: HashMap<String, Lookup>,
    pub geonames: HashMap<String, Lookup>,
}

impl RegistryCache {
    pub fn len(&self) -> usize {
        self.funders.len() + self.ror.len() + self.crossref.len() + self.geonames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Memoized GET against an auxiliary registry. The client's politeness delay
/// runs only on actual network calls, never on cache hits.
pub async fn resolve(
    client: &OpenAlexClient,
    cache: &mut HashMap<String, Lookup>,
    registry: &'static str,
    key: &str,
    url: String,
) -> Lookup {
    if let Some(hit) = cache.get(key) {
        return hit.clone();
    }

    let outcome = match client.get_json_url(&url).await {
        Ok(value) => Lookup::Found(value),
        Err(FetchError::Status { status: 404, .. }) => Lookup::Absent,
        Err(e) => {
            warn!(registry, key, error = %e, "lookup failed");
            Lookup::Failed(e.to_string())
        }
    };
    cache.insert(key.to_string(), outcome.clone());
    outcome
}
