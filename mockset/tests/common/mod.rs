//! Shared records and setup for the mockset integration tests.

#![allow(dead_code)]

use mockset::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Record)]
pub struct Person {
    pub id: i32,
    pub name: String,
    pub age: i32,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Record)]
pub struct Order {
    #[serde(rename = "OrderId")]
    pub order_id: i64,
    pub person_id: i32,
    pub total: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Record)]
#[record(name = "Line")]
pub struct OrderLine {
    #[key]
    pub order_id: i64,
    #[key]
    pub line_no: i32,
    pub sku: String,
}

/// No `id`, no `<Name>Id`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Record)]
pub struct AuditEntry {
    pub message: String,
}

/// Field names follow a container rename rule.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Record)]
#[serde(rename_all = "camelCase")]
pub struct Invoice {
    pub invoice_id: i32,
    pub amount: f64,
}

pub fn person(id: i32, name: &str, age: i32) -> Person {
    Person {
        id,
        name: name.to_string(),
        age,
    }
}

pub fn people() -> RecordSet<Person> {
    RecordSet::builder()
        .with_records([
            person(1, "Ada", 36),
            person(2, "Grace", 85),
            person(3, "Alan", 41),
            person(4, "Barbara", 36),
        ])
        .build()
}

/// Installs a test subscriber honouring `RUST_LOG`. Safe to call from every test.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}
