//! Remote backend client.
//!
//! The remote exposes named functions: `<table>:list` returns every record of
//! a table, `<table>:create|update|delete` apply one mutation and answer
//! `{"success": true}`.

mod http;
#[cfg(test)]
pub(crate) mod mock;

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::models::{SyncAction, Table};

pub use http::HttpRemoteClient;

/// Collaborator that executes named remote functions.
#[async_trait]
pub trait RemoteClient: Send + Sync {
    /// Invoke `function` with `args` and return its result value.
    async fn call(&self, function: &str, args: Value) -> Result<Value>;

    /// Cheap reachability check.
    async fn probe(&self) -> Result<()> {
        self.call(&list_function(Table::Customers), Value::Object(Map::new()))
            .await
            .map(|_| ())
    }
}

pub fn list_function(table: Table) -> String {
    format!("{}:list", table.as_str())
}

/// Function name for a push action, e.g. `tickets:create`.
pub fn mutation_function(table: Table, action: SyncAction) -> Result<String> {
    let suffix = action
        .mutation()
        .ok_or_else(|| Error::InvalidInput(format!("{action} is not a remote mutation")))?;
    Ok(format!("{}:{suffix}", table.as_str()))
}

/// Whether `function` names a read-only query.
pub(crate) fn is_query(function: &str) -> bool {
    function.ends_with(":list")
}

/// Require a mutation response of the form `{"success": true}`.
pub fn ensure_success(function: &str, response: &Value) -> Result<()> {
    match response.get("success").and_then(Value::as_bool) {
        Some(true) => Ok(()),
        Some(false) => Err(Error::Remote(format!("{function} reported failure"))),
        None => Err(Error::Remote(format!(
            "{function} returned no success flag"
        ))),
    }
}

/// Split a list response into remote records.
pub fn into_records(function: &str, response: Value) -> Result<Vec<Map<String, Value>>> {
    let Value::Array(items) = response else {
        return Err(Error::Remote(format!("{function} did not return an array")));
    };

    items
        .into_iter()
        .map(|item| match item {
            Value::Object(record) => Ok(record),
            other => Err(Error::Remote(format!(
                "{function} returned a non-object entry: {other}"
            ))),
        })
        .collect()
}
