//! In-memory remote used by engine and service tests.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::RemoteClient;
use crate::error::{Error, Result};
use crate::models::Table;
use crate::schema::{REMOTE_ID_FIELD, REMOTE_MODIFIED_FIELD};

type RemoteRecord = Map<String, Value>;

#[derive(Default)]
pub struct MockRemote {
    tables: Mutex<HashMap<&'static str, BTreeMap<String, RemoteRecord>>>,
    calls: Mutex<Vec<String>>,
    failing_functions: Mutex<HashSet<String>>,
    failing_ids: Mutex<HashSet<String>>,
    delay: Mutex<Option<Duration>>,
    unreachable: AtomicBool,
    probes: AtomicUsize,
    server_time: AtomicI64,
}

impl MockRemote {
    pub fn new() -> Self {
        Self {
            server_time: AtomicI64::new(1_000_000),
            ..Self::default()
        }
    }

    /// Store a record as-is (including any `_lastModified` it carries).
    pub fn seed(&self, table: Table, record: Value) {
        let record = record.as_object().cloned().expect("seed record must be an object");
        let id = record
            .get(REMOTE_ID_FIELD)
            .and_then(Value::as_str)
            .expect("seed record needs an _id")
            .to_string();
        self.tables
            .lock()
            .unwrap()
            .entry(table.as_str())
            .or_default()
            .insert(id, record);
    }

    pub fn get(&self, table: Table, id: &str) -> Option<RemoteRecord> {
        self.tables
            .lock()
            .unwrap()
            .get(table.as_str())
            .and_then(|records| records.get(id).cloned())
    }

    pub fn len(&self, table: Table) -> usize {
        self.tables
            .lock()
            .unwrap()
            .get(table.as_str())
            .map_or(0, BTreeMap::len)
    }

    pub fn fail_function(&self, function: &str) {
        self.failing_functions
            .lock()
            .unwrap()
            .insert(function.to_string());
    }

    pub fn clear_failures(&self) {
        self.failing_functions.lock().unwrap().clear();
        self.failing_ids.lock().unwrap().clear();
    }

    pub fn fail_record(&self, id: &str) {
        self.failing_ids.lock().unwrap().insert(id.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = Some(delay);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.unreachable.store(!reachable, Ordering::SeqCst);
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    fn apply(&self, table: &str, operation: &str, args: Value) -> Result<Value> {
        let args = args
            .as_object()
            .cloned()
            .ok_or_else(|| Error::Remote("arguments must be an object".to_string()))?;
        let id = args
            .get(REMOTE_ID_FIELD)
            .and_then(Value::as_str)
            .map(str::to_string);

        if let Some(id) = &id {
            if self.failing_ids.lock().unwrap().contains(id) {
                return Err(Error::Remote(format!("rejected {table}/{id}")));
            }
        }

        let mut tables = self.tables.lock().unwrap();
        let Some(records) = tables.get_mut(table) else {
            return Err(Error::Remote(format!("unknown table {table}")));
        };

        match (operation, id) {
            ("list", _) => Ok(Value::Array(
                records.values().cloned().map(Value::Object).collect(),
            )),
            ("create" | "update", Some(id)) => {
                let mut record = args;
                record.insert(
                    REMOTE_MODIFIED_FIELD.to_string(),
                    json!(self.server_time.fetch_add(1, Ordering::SeqCst)),
                );
                records.insert(id, record);
                Ok(json!({"success": true}))
            }
            ("delete", Some(id)) => {
                records.remove(&id);
                Ok(json!({"success": true}))
            }
            _ => Err(Error::Remote(format!("unsupported call {table}:{operation}"))),
        }
    }
}

#[async_trait]
impl RemoteClient for MockRemote {
    async fn call(&self, function: &str, args: Value) -> Result<Value> {
        self.calls.lock().unwrap().push(function.to_string());

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::Network("connection refused".to_string()));
        }
        if self.failing_functions.lock().unwrap().contains(function) {
            return Err(Error::Remote(format!("{function} failed")));
        }

        let (table, operation) = function
            .split_once(':')
            .ok_or_else(|| Error::Remote(format!("malformed function {function}")))?;
        {
            let mut tables = self.tables.lock().unwrap();
            for known in Table::SYNC_ORDER {
                tables.entry(known.as_str()).or_default();
            }
        }
        self.apply(table, operation, args)
    }

    async fn probe(&self) -> Result<()> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.unreachable.load(Ordering::SeqCst) {
            Err(Error::Network("connection refused".to_string()))
        } else {
            Ok(())
        }
    }
}
