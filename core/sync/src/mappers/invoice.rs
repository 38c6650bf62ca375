//! Invoice field translation.
//!
//! Invoices live in the upstream's shared `transaction` table; the base
//! condition keeps other transaction types out of every query.

use serde_json::{json, Map, Value};

use ledgerbridge_common::Result;

use crate::mapper::{ensure_object, field_number, field_text, set_number, set_text, EntityMapper};

/// Maps remote invoices onto the local `invoices` table.
pub struct InvoiceMapper;

const QUERY_FIELDS: &[&str] = &[
    "id",
    "tranid",
    "entity",
    "trandate",
    "duedate",
    "foreigntotal",
    "status",
    "memo",
    "lastmodifieddate",
];

/// Normalize upstream status text ("Paid In Full", "Voided", "Open", ...)
/// into the local enum.
fn invoice_status(text: &str) -> &'static str {
    let lowered = text.to_lowercase();
    if lowered.contains("paid") {
        "paid"
    } else if lowered.contains("void") {
        "voided"
    } else {
        "open"
    }
}

impl EntityMapper for InvoiceMapper {
    fn remote_type(&self) -> &'static str {
        "invoice"
    }

    fn local_table(&self) -> &'static str {
        "invoices"
    }

    fn query_fields(&self) -> &'static [&'static str] {
        QUERY_FIELDS
    }

    fn query_table(&self) -> &'static str {
        "transaction"
    }

    fn base_condition(&self) -> Option<&'static str> {
        Some("type = 'CustInvc'")
    }

    fn to_local(&self, remote: &Value) -> Result<Value> {
        ensure_object(remote, "invoice query row")?;
        let mut local = Map::new();
        set_text(&mut local, "number", field_text(remote, "tranid"));
        set_text(&mut local, "customer_remote_id", field_text(remote, "entity"));
        set_text(&mut local, "issued_on", field_text(remote, "trandate"));
        set_text(&mut local, "due_on", field_text(remote, "duedate"));
        set_number(&mut local, "total", field_number(remote, "foreigntotal"));
        set_text(&mut local, "memo", field_text(remote, "memo"));
        if let Some(status) = field_text(remote, "status") {
            local.insert(
                "status".to_string(),
                Value::String(invoice_status(&status).to_string()),
            );
        }
        Ok(Value::Object(local))
    }

    fn to_remote(&self, local: &Value) -> Result<Value> {
        ensure_object(local, "invoice record")?;
        let mut remote = Map::new();
        if let Some(customer) = field_text(local, "customer_remote_id") {
            remote.insert("entity".to_string(), json!({ "id": customer }));
        }
        set_text(&mut remote, "tranDate", field_text(local, "issued_on"));
        set_text(&mut remote, "dueDate", field_text(local, "due_on"));
        set_text(&mut remote, "memo", field_text(local, "memo"));
        Ok(Value::Object(remote))
    }
}
