use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;

use super::{Datastore, DatastoreError, DatastoreResult, Predicate};

/// Datastore operation kinds, used to target injected failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListCollections,
    Count,
    Delete,
    Compact,
}

/// A call made against a [`MemoryDatastore`], in the order it was issued.
#[derive(Debug, Clone, PartialEq)]
pub enum DatastoreCall {
    ListCollections,
    Count {
        collection: String,
        predicate: Predicate,
    },
    Delete {
        collection: String,
        predicate: Predicate,
    },
    Compact,
}

impl DatastoreCall {
    pub fn operation(&self) -> Operation {
        match self {
            DatastoreCall::ListCollections => Operation::ListCollections,
            DatastoreCall::Count { .. } => Operation::Count,
            DatastoreCall::Delete { .. } => Operation::Delete,
            DatastoreCall::Compact => Operation::Compact,
        }
    }

    pub fn collection(&self) -> Option<&str> {
        match self {
            DatastoreCall::Count { collection, .. } | DatastoreCall::Delete { collection, .. } => {
                Some(collection)
            }
            DatastoreCall::ListCollections | DatastoreCall::Compact => None,
        }
    }
}

struct Failure {
    operation: Operation,
    /// Restrict the failure to one collection. `None` fails every call of the
    /// operation.
    collection: Option<String>,
}

impl Failure {
    fn applies_to(&self, call: &DatastoreCall) -> bool {
        self.operation == call.operation()
            && match &self.collection {
                Some(target) => call.collection() == Some(target.as_str()),
                None => true,
            }
    }
}

#[derive(Default)]
struct MemoryState {
    /// Collections in insertion order, which is the enumeration order.
    collections: Vec<(String, Vec<Value>)>,
    calls: Vec<DatastoreCall>,
    failures: Vec<Failure>,
}

impl MemoryState {
    fn collection(&self, name: &str) -> Option<&Vec<Value>> {
        self.collections
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, docs)| docs)
    }

    fn collection_mut(&mut self, name: &str) -> &mut Vec<Value> {
        let index = match self.collections.iter().position(|(n, _)| n == name) {
            Some(index) => index,
            None => {
                self.collections.push((name.to_string(), Vec::new()));
                self.collections.len() - 1
            }
        };
        &mut self.collections[index].1
    }

    /// Journal the call and fail it if a matching failure was injected.
    fn record(&mut self, call: DatastoreCall) -> DatastoreResult<()> {
        let failed = self.failures.iter().any(|f| f.applies_to(&call));
        let operation = call.operation();
        self.calls.push(call);
        if failed {
            return Err(DatastoreError::Query(format!(
                "injected {:?} failure",
                operation
            )));
        }
        Ok(())
    }
}

/// In-process document datastore.
///
/// Collections hold JSON documents and are enumerated in creation order.
/// Every call is journaled so callers can assert exactly which operations a
/// run issued, and failures can be injected per operation or per collection.
#[derive(Default)]
pub struct MemoryDatastore {
    state: Mutex<MemoryState>,
}

impl MemoryDatastore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a collection holding `docs`, appending to it if it already exists.
    pub fn with_collection(
        mut self,
        name: &str,
        docs: impl IntoIterator<Item = Value>,
    ) -> Self {
        self.state.get_mut().collection_mut(name).extend(docs);
        self
    }

    /// Make every `operation` call fail, optionally only for one collection.
    pub fn fail_on(mut self, operation: Operation, collection: Option<&str>) -> Self {
        self.state.get_mut().failures.push(Failure {
            operation,
            collection: collection.map(str::to_string),
        });
        self
    }

    /// Create an empty collection. Existing collections are left as they are.
    pub async fn create_collection(&self, name: &str) {
        self.state.lock().await.collection_mut(name);
    }

    /// Insert a document, creating the collection if needed.
    pub async fn insert(&self, collection: &str, doc: Value) {
        self.state.lock().await.collection_mut(collection).push(doc);
    }

    /// Number of documents currently stored in `collection`.
    pub async fn len(&self, collection: &str) -> usize {
        self.state
            .lock()
            .await
            .collection(collection)
            .map_or(0, Vec::len)
    }

    /// All calls issued so far.
    pub async fn calls(&self) -> Vec<DatastoreCall> {
        self.state.lock().await.calls.clone()
    }
}

#[async_trait]
impl Datastore for MemoryDatastore {
    async fn list_collections(&self) -> DatastoreResult<Vec<String>> {
        let mut state = self.state.lock().await;
        state.record(DatastoreCall::ListCollections)?;
        Ok(state
            .collections
            .iter()
            .map(|(name, _)| name.clone())
            .collect())
    }

    async fn count(&self, collection: &str, predicate: &Predicate) -> DatastoreResult<u64> {
        let mut state = self.state.lock().await;
        state.record(DatastoreCall::Count {
            collection: collection.to_string(),
            predicate: *predicate,
        })?;
        let matched = state
            .collection(collection)
            .map_or(0, |docs| docs.iter().filter(|d| predicate.matches(d)).count());
        Ok(matched as u64)
    }

    async fn delete(&self, collection: &str, predicate: &Predicate) -> DatastoreResult<u64> {
        let mut state = self.state.lock().await;
        state.record(DatastoreCall::Delete {
            collection: collection.to_string(),
            predicate: *predicate,
        })?;
        let Some(index) = state.collections.iter().position(|(n, _)| n == collection) else {
            return Ok(0);
        };
        let docs = &mut state.collections[index].1;
        let before = docs.len();
        docs.retain(|d| !predicate.matches(d));
        Ok((before - docs.len()) as u64)
    }

    async fn compact(&self) -> DatastoreResult<()> {
        self.state.lock().await.record(DatastoreCall::Compact)
    }
}
