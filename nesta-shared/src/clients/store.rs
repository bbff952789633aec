use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use async_trait::async_trait;
use serde_json::Value;

/// A stored item: attribute name -> JSON value.
pub type Item = serde_json::Map<String, Value>;

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    /// The table's provisioned write/read capacity was exceeded. Retryable;
    /// the ingestion queue treats this differently from other failures.
    #[error("throughput exceeded")]
    ThroughputExceeded,

    #[error("item not found")]
    NotFound,

    #[error("store call timed out")]
    Timeout,

    #[error("{0}")]
    Backend(String),
}

/// Primary key of an item: partition attribute plus optional sort attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct Key {
    pub partition: (String, Value),
    pub sort: Option<(String, Value)>,
}

impl Key {
    pub fn partition(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            partition: (name.into(), value.into()),
            sort: None,
        }
    }

    pub fn with_sort(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.sort = Some((name.into(), value.into()));
        self
    }

    fn matches(&self, item: &Item) -> bool {
        let (ref pname, ref pval) = self.partition;
        if item.get(pname.as_str()) != Some(pval) {
            return false;
        }
        match &self.sort {
            Some((sname, sval)) => item.get(sname.as_str()) == Some(sval),
            None => true,
        }
    }
}

/// A partition-scoped query: equality on the partition attribute, an optional
/// exclusive lower bound on the sort attribute, plus equality filters applied
/// after the key condition.
#[derive(Debug, Clone, Default)]
pub struct Query {
    pub partition: Option<(String, Value)>,
    pub sort_after: Option<(String, i64)>,
    pub filters: Vec<(String, Value)>,
    pub index: Option<String>,
    pub scan_forward: bool,
    pub limit: Option<usize>,
}

impl Query {
    pub fn on_partition(name: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            partition: Some((name.into(), value.into())),
            scan_forward: true,
            ..Default::default()
        }
    }

    pub fn sort_after(mut self, name: impl Into<String>, bound: i64) -> Self {
        self.sort_after = Some((name.into(), bound));
        self
    }

    pub fn filter_eq(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filters.push((name.into(), value.into()));
        self
    }

    pub fn on_index(mut self, index: impl Into<String>) -> Self {
        self.index = Some(index.into());
        self
    }

    pub fn descending(mut self) -> Self {
        self.scan_forward = false;
        self
    }

    pub fn limit(mut self, n: usize) -> Self {
        self.limit = Some(n);
        self
    }
}

/// Single-item document store, the only storage primitive the engine assumes.
/// No multi-item transactions; consistency across records is the caller's
/// problem (see the match-creation saga).
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn get(&self, table: &str, key: &Key) -> Result<Option<Item>, StoreError>;

    async fn put(&self, table: &str, item: Item) -> Result<(), StoreError>;

    /// SET-style update: overwrites the given attributes on the keyed item,
    /// creating the item if it does not exist.
    async fn update(&self, table: &str, key: &Key, attrs: Item) -> Result<(), StoreError>;

    async fn delete(&self, table: &str, key: &Key) -> Result<(), StoreError>;

    async fn query(&self, table: &str, query: Query) -> Result<Vec<Item>, StoreError>;
}

fn value_as_i64(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| value.as_f64().map(|f| f as i64))
}

/// In-memory `DocumentStore` used as the local development backend and by the
/// test suite. Supports injecting throttling and generic put failures so the
/// ingestion queue's retry paths can be exercised deterministically.
#[derive(Default)]
pub struct MemoryStore {
    tables: Mutex<HashMap<String, Vec<Item>>>,
    put_faults: Mutex<VecDeque<StoreError>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The next `n` puts fail with `ThroughputExceeded`.
    pub fn throttle_next_puts(&self, n: usize) {
        let mut faults = self.put_faults.lock().unwrap();
        for _ in 0..n {
            faults.push_back(StoreError::ThroughputExceeded);
        }
    }

    /// The next `n` puts fail with a generic backend error.
    pub fn fail_next_puts(&self, n: usize) {
        let mut faults = self.put_faults.lock().unwrap();
        for _ in 0..n {
            faults.push_back(StoreError::Backend("injected failure".into()));
        }
    }

    pub fn len(&self, table: &str) -> usize {
        self.tables
            .lock()
            .unwrap()
            .get(table)
            .map(|t| t.len())
            .unwrap_or(0)
    }

    pub fn is_empty(&self, table: &str) -> bool {
        self.len(table) == 0
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn get(&self, table: &str, key: &Key) -> Result<Option<Item>, StoreError> {
        let tables = self.tables.lock().unwrap();
        Ok(tables
            .get(table)
            .and_then(|items| items.iter().find(|it| key.matches(it)).cloned()))
    }

    async fn put(&self, table: &str, item: Item) -> Result<(), StoreError> {
        if let Some(err) = self.put_faults.lock().unwrap().pop_front() {
            return Err(err);
        }
        let mut tables = self.tables.lock().unwrap();
        tables.entry(table.to_string()).or_default().push(item);
        Ok(())
    }

    async fn update(&self, table: &str, key: &Key, attrs: Item) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        let items = tables.entry(table.to_string()).or_default();
        match items.iter_mut().find(|it| key.matches(it)) {
            Some(item) => {
                for (name, value) in attrs {
                    item.insert(name, value);
                }
            }
            None => {
                // Upsert, matching DynamoDB UpdateItem semantics
                let mut item = Item::new();
                let (pname, pval) = &key.partition;
                item.insert(pname.clone(), pval.clone());
                if let Some((sname, sval)) = &key.sort {
                    item.insert(sname.clone(), sval.clone());
                }
                for (name, value) in attrs {
                    item.insert(name, value);
                }
                items.push(item);
            }
        }
        Ok(())
    }

    async fn delete(&self, table: &str, key: &Key) -> Result<(), StoreError> {
        let mut tables = self.tables.lock().unwrap();
        if let Some(items) = tables.get_mut(table) {
            items.retain(|it| !key.matches(it));
        }
        Ok(())
    }

    async fn query(&self, table: &str, query: Query) -> Result<Vec<Item>, StoreError> {
        let tables = self.tables.lock().unwrap();
        let Some(items) = tables.get(table) else {
            return Ok(Vec::new());
        };

        let mut hits: Vec<Item> = items
            .iter()
            .filter(|it| match &query.partition {
                Some((name, value)) => it.get(name.as_str()) == Some(value),
                None => true,
            })
            .filter(|it| match &query.sort_after {
                Some((name, bound)) => it
                    .get(name.as_str())
                    .and_then(value_as_i64)
                    .map(|v| v > *bound)
                    .unwrap_or(false),
                None => true,
            })
            .filter(|it| {
                query
                    .filters
                    .iter()
                    .all(|(name, value)| it.get(name.as_str()) == Some(value))
            })
            .cloned()
            .collect();

        if let Some((name, _)) = &query.sort_after {
            hits.sort_by_key(|it| it.get(name.as_str()).and_then(value_as_i64).unwrap_or(0));
        } else if !query.scan_forward {
            // Descending scans without an explicit bound still sort on the
            // conventional sort attribute if present
            hits.sort_by_key(|it| it.get("timestamp").and_then(value_as_i64).unwrap_or(0));
        }
        if !query.scan_forward {
            hits.reverse();
        }
        if let Some(limit) = query.limit {
            hits.truncate(limit);
        }
        Ok(hits)
    }
}
