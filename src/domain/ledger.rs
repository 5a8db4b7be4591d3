use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LocationKind {
    Merchant,
    Warehouse,
}

impl LocationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LocationKind::Merchant => "merchant",
            LocationKind::Warehouse => "warehouse",
        }
    }
}

/// A place that holds stock: one merchant or one warehouse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LedgerLocation {
    pub kind: LocationKind,
    pub id: i64,
}

impl LedgerLocation {
    pub fn merchant(id: i64) -> Self {
        Self {
            kind: LocationKind::Merchant,
            id,
        }
    }

    pub fn warehouse(id: i64) -> Self {
        Self {
            kind: LocationKind::Warehouse,
            id,
        }
    }
}

impl fmt::Display for LedgerLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind.as_str(), self.id)
    }
}

impl FromStr for LedgerLocation {
    type Err = String;

    /// Parses `merchant:3` or `warehouse:7`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, id) = s
            .split_once(':')
            .ok_or_else(|| format!("expected <merchant|warehouse>:<id>, got {:?}", s))?;
        let id: i64 = id
            .parse()
            .map_err(|_| format!("invalid location id in {:?}", s))?;

        match kind {
            "merchant" => Ok(LedgerLocation::merchant(id)),
            "warehouse" => Ok(LedgerLocation::warehouse(id)),
            other => Err(format!("unknown location kind {:?}", other)),
        }
    }
}

/// Stock count of one product at one location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockLevel {
    pub location_id: i64,
    pub product_id: i64,
    pub stock: i64,
}

/// Merchant or warehouse profile. Warehouses have no keeper.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    pub id: i64,
    pub name: String,
    pub address: String,
    pub phone: String,
    #[serde(default)]
    pub keeper_id: Option<i64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReductionOutcome {
    Applied,
    Duplicate,
}
