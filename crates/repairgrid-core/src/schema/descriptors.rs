//! Per-entity field descriptors

use serde_json::Value;

use crate::models::Table;

/// Value conversion applied while crossing the local/remote boundary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Coercion {
    /// Value passes through unchanged
    Identity,
    /// Stored locally as `0`/`1`, sent remotely as a JSON boolean
    BoolAsInt,
}

impl Coercion {
    /// Convert a local value to its remote form, `None` if it doesn't fit.
    pub fn to_remote(self, value: &Value) -> Option<Value> {
        match self {
            Self::Identity => Some(value.clone()),
            Self::BoolAsInt => match value {
                Value::Bool(flag) => Some(Value::Bool(*flag)),
                Value::Number(number) => number.as_i64().map(|n| Value::Bool(n != 0)),
                _ => None,
            },
        }
    }

    /// Convert a remote value to its local form, `None` if it doesn't fit.
    pub fn to_local(self, value: &Value) -> Option<Value> {
        match self {
            Self::Identity => Some(value.clone()),
            Self::BoolAsInt => match value {
                Value::Bool(flag) => Some(Value::from(i64::from(*flag))),
                Value::Number(number) => number.as_i64().map(|n| Value::from(i64::from(n != 0))),
                _ => None,
            },
        }
    }
}

/// One allow-listed column and its remote counterpart
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FieldMapping {
    pub local: &'static str,
    pub remote: &'static str,
    pub coercion: Coercion,
    pub required: bool,
}

impl FieldMapping {
    const fn same(name: &'static str) -> Self {
        Self::renamed(name, name)
    }

    const fn renamed(local: &'static str, remote: &'static str) -> Self {
        Self {
            local,
            remote,
            coercion: Coercion::Identity,
            required: false,
        }
    }

    const fn required(mut self) -> Self {
        self.required = true;
        self
    }

    const fn coerced(mut self, coercion: Coercion) -> Self {
        self.coercion = coercion;
        self
    }
}

/// Field layout of one entity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EntitySchema {
    pub table: Table,
    pub fields: &'static [FieldMapping],
}

impl EntitySchema {
    /// Local column names, in declaration order.
    pub fn columns(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.fields.iter().map(|mapping| mapping.local)
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.fields.iter().any(|mapping| mapping.local == column)
    }
}

const CUSTOMERS: EntitySchema = EntitySchema {
    table: Table::Customers,
    fields: &[
        FieldMapping::same("name").required(),
        FieldMapping::same("email"),
        FieldMapping::same("phone"),
        FieldMapping::same("address"),
    ],
};

const TECHNICIANS: EntitySchema = EntitySchema {
    table: Table::Technicians,
    fields: &[
        FieldMapping::same("name").required(),
        FieldMapping::same("email"),
        FieldMapping::same("specialization"),
        FieldMapping::renamed("is_active", "isActive").coerced(Coercion::BoolAsInt),
    ],
};

const TICKETS: EntitySchema = EntitySchema {
    table: Table::Tickets,
    fields: &[
        FieldMapping::renamed("ticket_number", "ticketNumber"),
        FieldMapping::renamed("customer_id", "customerId"),
        FieldMapping::renamed("technician_id", "technicianId"),
        FieldMapping::renamed("device_make", "deviceMake"),
        FieldMapping::renamed("device_model", "deviceModel"),
        FieldMapping::renamed("serial_number", "serialNumber"),
        FieldMapping::renamed("issue_description", "issueDescription"),
        FieldMapping::renamed("diagnostic_notes", "diagnosticNotes"),
        FieldMapping::renamed("repair_actions", "repairActions"),
        FieldMapping::same("status").required(),
        FieldMapping::same("priority"),
        FieldMapping::renamed("estimated_cost", "estimatedCost"),
        FieldMapping::renamed("final_cost", "finalCost"),
        FieldMapping::renamed("date_received", "dateReceived"),
        FieldMapping::renamed("date_completed", "dateCompleted"),
        FieldMapping::renamed("date_picked_up", "datePickedUp"),
    ],
};

const PARTS: EntitySchema = EntitySchema {
    table: Table::Parts,
    fields: &[
        FieldMapping::renamed("ticket_id", "ticketId").required(),
        FieldMapping::same("name").required(),
        FieldMapping::renamed("part_number", "partNumber"),
        FieldMapping::same("cost"),
        FieldMapping::same("quantity"),
        FieldMapping::same("supplier"),
    ],
};

/// Descriptor for a table.
pub const fn schema_for(table: Table) -> &'static EntitySchema {
    match table {
        Table::Customers => &CUSTOMERS,
        Table::Technicians => &TECHNICIANS,
        Table::Tickets => &TICKETS,
        Table::Parts => &PARTS,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn descriptors_match_their_table() {
        for table in Table::SYNC_ORDER {
            assert_eq!(schema_for(table).table, table);
        }
    }

    #[test]
    fn rename_counts() {
        let renames = |table| {
            schema_for(table)
                .fields
                .iter()
                .filter(|mapping| mapping.local != mapping.remote)
                .count()
        };
        assert_eq!(renames(Table::Customers), 0);
        assert_eq!(renames(Table::Technicians), 1);
        assert_eq!(renames(Table::Tickets), 14);
        assert_eq!(renames(Table::Parts), 2);
    }

    #[test]
    fn bool_as_int_coercion() {
        assert_eq!(Coercion::BoolAsInt.to_remote(&json!(1)), Some(json!(true)));
        assert_eq!(Coercion::BoolAsInt.to_remote(&json!(0)), Some(json!(false)));
        assert_eq!(Coercion::BoolAsInt.to_local(&json!(true)), Some(json!(1)));
        assert_eq!(Coercion::BoolAsInt.to_remote(&json!("yes")), None);
    }
}
