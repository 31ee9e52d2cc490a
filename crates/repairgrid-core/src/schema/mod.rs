//! Bidirectional mapping between local rows and remote records.
//!
//! Every entity is described by an [`EntitySchema`]: an allow-list of field
//! pairs (local column name, remote field name) plus an optional type
//! coercion. Translation is driven entirely by these descriptors, so adding an
//! entity or a column is a data change here and a migration in `db`.
//!
//! Fields not listed in a descriptor are dropped in both directions, which is
//! what keeps sync metadata (`sync_state`, `last_modified`, ...) off the
//! remote side.

mod descriptors;

pub use descriptors::{schema_for, Coercion, EntitySchema, FieldMapping};

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::models::{Fields, Record, SyncState, Table};
use crate::util::now_millis;

/// Remote primary key field
pub const REMOTE_ID_FIELD: &str = "_id";
/// Remote modification timestamp field (unix ms)
pub const REMOTE_MODIFIED_FIELD: &str = "_lastModified";

/// Largest timestamp a remote can send without losing precision
const MAX_REMOTE_TIMESTAMP: i64 = (1 << 53) - 1;

/// Translate a local row into the remote record shape.
pub fn to_remote(table: Table, record: &Record) -> Result<Map<String, Value>> {
    if record.id.trim().is_empty() {
        return Err(Error::Translation(format!("{table} record has an empty id")));
    }

    let schema = schema_for(table);
    let mut remote = Map::with_capacity(schema.fields.len() + 1);
    remote.insert(REMOTE_ID_FIELD.to_string(), Value::String(record.id.clone()));

    for mapping in schema.fields {
        match record.get(mapping.local) {
            Some(value) => {
                let value = mapping.coercion.to_remote(value).ok_or_else(|| {
                    Error::Translation(format!(
                        "{table}.{} has unexpected value {value}",
                        mapping.local
                    ))
                })?;
                remote.insert(mapping.remote.to_string(), value);
            }
            None if mapping.required => {
                return Err(Error::Translation(format!(
                    "{table} record {} is missing required field {}",
                    record.id, mapping.local
                )));
            }
            None => {}
        }
    }

    Ok(remote)
}

/// Translate a remote record into a local row, marked synced.
///
/// `last_modified` takes the remote modification timestamp when the record
/// carries one, and the current time otherwise.
pub fn to_local(table: Table, remote: &Map<String, Value>) -> Result<Record> {
    let id = remote
        .get(REMOTE_ID_FIELD)
        .and_then(Value::as_str)
        .filter(|id| !id.trim().is_empty())
        .ok_or_else(|| Error::Translation(format!("{table} remote record has no {REMOTE_ID_FIELD}")))?;

    let schema = schema_for(table);
    let mut fields = Fields::new();
    for mapping in schema.fields {
        let value = remote.get(mapping.remote).filter(|value| !value.is_null());
        let value = match value {
            Some(value) => mapping.coercion.to_local(value).ok_or_else(|| {
                Error::Translation(format!(
                    "{table}.{} has unexpected remote value {value}",
                    mapping.remote
                ))
            })?,
            None if mapping.required => {
                return Err(Error::Translation(format!(
                    "{table} remote record {id} is missing required field {}",
                    mapping.remote
                )));
            }
            None => Value::Null,
        };
        fields.insert(mapping.local.to_string(), value);
    }

    Ok(Record {
        id: id.to_string(),
        fields,
        sync_state: SyncState::Synced,
        last_modified: remote_timestamp(remote)?.unwrap_or_else(now_millis),
        remote_known: true,
        deleted: false,
    })
}

/// Modification timestamp of a remote record, if it carries one.
///
/// Fails on values outside `0..=2^53 - 1` milliseconds.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn remote_timestamp(remote: &Map<String, Value>) -> Result<Option<i64>> {
    let Some(value) = remote.get(REMOTE_MODIFIED_FIELD).filter(|value| !value.is_null()) else {
        return Ok(None);
    };
    let in_range = |millis: &f64| (0.0..=MAX_REMOTE_TIMESTAMP as f64).contains(millis);
    let millis = value
        .as_i64()
        .or_else(|| value.as_f64().filter(in_range).map(|millis| millis as i64));
    match millis {
        Some(millis) if (0..=MAX_REMOTE_TIMESTAMP).contains(&millis) => Ok(Some(millis)),
        _ => Err(Error::Translation(format!(
            "{REMOTE_MODIFIED_FIELD} is not a valid timestamp: {value}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn object(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    fn local(table: Table, id: &str, value: Value) -> Record {
        // Rows read back from the store carry every column, null included.
        let given = object(value);
        let fields = schema_for(table)
            .fields
            .iter()
            .map(|mapping| {
                let value = given.get(mapping.local).cloned().unwrap_or(Value::Null);
                (mapping.local.to_string(), value)
            })
            .collect();
        let mut record = Record::new(id, fields);
        record.last_modified = 1_234;
        record
    }

    fn ticket() -> Record {
        local(
            Table::Tickets,
            "t1",
            json!({
                "ticket_number": "T-0001",
                "customer_id": "c1",
                "technician_id": "tech1",
                "device_make": "Apple",
                "device_model": "iPhone 12",
                "serial_number": "SN1",
                "issue_description": "Cracked screen",
                "diagnostic_notes": "Digitizer broken",
                "repair_actions": "Replace screen",
                "status": "received",
                "priority": "high",
                "estimated_cost": 120.5,
                "final_cost": 130.0,
                "date_received": 100,
                "date_completed": 200,
                "date_picked_up": 300
            }),
        )
    }

    #[test]
    fn customers_map_by_identity() {
        let record = local(
            Table::Customers,
            "c1",
            json!({"name": "Jo", "phone": "555-0100", "email": "jo@example.com"}),
        );
        let remote = to_remote(Table::Customers, &record).unwrap();
        assert_eq!(
            Value::Object(remote),
            json!({"_id": "c1", "name": "Jo", "phone": "555-0100", "email": "jo@example.com"})
        );
    }

    #[test]
    fn technicians_coerce_active_flag() {
        let record = local(
            Table::Technicians,
            "tech1",
            json!({"name": "Sam", "email": "sam@example.com", "is_active": 1}),
        );
        let remote = to_remote(Table::Technicians, &record).unwrap();
        assert_eq!(remote.get("isActive"), Some(&json!(true)));
        assert!(!remote.contains_key("is_active"));

        let back = to_local(Table::Technicians, &remote).unwrap();
        assert_eq!(back.fields.get("is_active"), Some(&json!(1)));
    }

    #[test]
    fn tickets_rename_fields() {
        let remote = to_remote(Table::Tickets, &ticket()).unwrap();
        assert_eq!(remote.get("ticketNumber"), Some(&json!("T-0001")));
        assert_eq!(remote.get("customerId"), Some(&json!("c1")));
        assert_eq!(remote.get("datePickedUp"), Some(&json!(300)));
        assert_eq!(remote.get("status"), Some(&json!("received")));
        assert!(!remote.contains_key("ticket_number"));
    }

    #[test]
    fn sync_metadata_never_leaks() {
        let mut record = ticket();
        record.fields.insert("sync_state".into(), json!(0));
        record.fields.insert("last_modified".into(), json!(99));
        let remote = to_remote(Table::Tickets, &record).unwrap();
        assert!(!remote.contains_key("sync_state"));
        assert!(!remote.contains_key("last_modified"));
        assert!(!remote.contains_key("synced"));
    }

    #[test]
    fn unmapped_fields_are_dropped() {
        let remote = object(json!({
            "_id": "c9",
            "_creationTime": 1.5,
            "name": "Jo",
            "phone": "555",
            "loyaltyTier": "gold"
        }));
        let record = to_local(Table::Customers, &remote).unwrap();
        assert!(!record.fields.contains_key("loyaltyTier"));
        assert!(!record.fields.contains_key("_creationTime"));
    }

    #[test]
    fn round_trip_restores_every_entity() {
        let records = [
            (
                Table::Customers,
                local(
                    Table::Customers,
                    "c1",
                    json!({"name": "Jo", "phone": "555", "address": "1 Main St"}),
                ),
            ),
            (
                Table::Technicians,
                local(
                    Table::Technicians,
                    "tech1",
                    json!({"name": "Sam", "email": "s@example.com", "is_active": 0}),
                ),
            ),
            (Table::Tickets, ticket()),
            (
                Table::Parts,
                local(
                    Table::Parts,
                    "p1",
                    json!({
                        "ticket_id": "t1",
                        "name": "Screen",
                        "part_number": "SCR-12",
                        "cost": 89.99,
                        "quantity": 1,
                        "supplier": "Acme"
                    }),
                ),
            ),
        ];

        for (table, record) in records {
            let remote = to_remote(table, &record).unwrap();
            let back = to_local(table, &remote).unwrap();
            assert_eq!(back.id, record.id);
            assert_eq!(back.fields, record.fields, "{table} round trip");
        }
    }

    #[test]
    fn missing_required_field_fails() {
        let record = local(Table::Customers, "c1", json!({"phone": "555"}));
        let error = to_remote(Table::Customers, &record).unwrap_err();
        assert!(error.is_translation());

        let remote = object(json!({"_id": "p1", "name": "Screen", "cost": 1}));
        assert!(to_local(Table::Parts, &remote).unwrap_err().is_translation());
    }

    #[test]
    fn sparse_records_translate() {
        let ticket = local(Table::Tickets, "t1", json!({"status": "received"}));
        assert_eq!(
            Value::Object(to_remote(Table::Tickets, &ticket).unwrap()),
            json!({"_id": "t1", "status": "received"})
        );

        let remote = object(json!({"_id": "c9", "name": "Jo", "_lastModified": 500}));
        let record = to_local(Table::Customers, &remote).unwrap();
        assert_eq!(record.get_str("name"), Some("Jo"));
        assert_eq!(record.get("phone"), None);
        assert_eq!(record.last_modified, 500);
    }

    #[test]
    fn out_of_range_timestamps_are_rejected() {
        for bad in [json!(1e300), json!(-5), json!("500"), json!(u64::MAX)] {
            let remote = object(json!({"_id": "c9", "name": "Jo", "_lastModified": bad}));
            assert!(to_local(Table::Customers, &remote).unwrap_err().is_translation());
        }

        let fractional = object(json!({"_id": "c9", "name": "Jo", "_lastModified": 1_700_000_000_000.5}));
        assert_eq!(remote_timestamp(&fractional).unwrap(), Some(1_700_000_000_000));
    }

    #[test]
    fn to_local_requires_remote_id() {
        let remote = object(json!({"name": "Jo", "phone": "555"}));
        assert!(to_local(Table::Customers, &remote).is_err());
    }

    #[test]
    fn to_local_marks_synced_and_adopts_remote_timestamp() {
        let remote = object(json!({"_id": "c9", "name": "Jo", "phone": "555", "_lastModified": 500}));
        let record = to_local(Table::Customers, &remote).unwrap();
        assert_eq!(record.sync_state, SyncState::Synced);
        assert!(record.remote_known);
        assert_eq!(record.last_modified, 500);

        let undated = object(json!({"_id": "c9", "name": "Jo", "phone": "555"}));
        let before = now_millis();
        assert!(to_local(Table::Customers, &undated).unwrap().last_modified >= before);
    }
}
