//! Entity tables and their dependency order

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// A synchronized entity table.
///
/// Tables form a dependency DAG: tickets reference customers and technicians,
/// parts reference tickets. Parents always sync before dependents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    Customers,
    Technicians,
    Tickets,
    Parts,
}

impl Table {
    /// Every table in push/pull order (parents first).
    pub const SYNC_ORDER: [Self; 4] = [
        Self::Customers,
        Self::Technicians,
        Self::Tickets,
        Self::Parts,
    ];

    /// Table name as used locally and in remote function names.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Customers => "customers",
            Self::Technicians => "technicians",
            Self::Tickets => "tickets",
            Self::Parts => "parts",
        }
    }

    /// Tables this one holds foreign keys into.
    pub const fn parents(self) -> &'static [Self] {
        match self {
            Self::Customers | Self::Technicians => &[],
            Self::Tickets => &[Self::Customers, Self::Technicians],
            Self::Parts => &[Self::Tickets],
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Table {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::SYNC_ORDER
            .into_iter()
            .find(|table| table.as_str() == s)
            .ok_or_else(|| Error::InvalidInput(format!("Unknown table: {s}")))
    }
}
