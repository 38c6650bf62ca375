//! Customer field translation.

use serde_json::{Map, Value};

use ledgerbridge_common::Result;

use crate::mapper::{ensure_object, field_text, set_text, EntityMapper};

use super::status_from_inactive_flag;

/// Maps remote customers onto the local `customers` table.
pub struct CustomerMapper;

const QUERY_FIELDS: &[&str] = &[
    "id",
    "entityid",
    "companyname",
    "email",
    "phone",
    "isinactive",
    "lastmodifieddate",
];

impl EntityMapper for CustomerMapper {
    fn remote_type(&self) -> &'static str {
        "customer"
    }

    fn local_table(&self) -> &'static str {
        "customers"
    }

    fn query_fields(&self) -> &'static [&'static str] {
        QUERY_FIELDS
    }

    fn to_local(&self, remote: &Value) -> Result<Value> {
        ensure_object(remote, "customer query row")?;
        let mut local = Map::new();
        set_text(&mut local, "name", field_text(remote, "entityid"));
        set_text(&mut local, "company_name", field_text(remote, "companyname"));
        set_text(&mut local, "email", field_text(remote, "email"));
        set_text(&mut local, "phone", field_text(remote, "phone"));
        local.insert(
            "status".to_string(),
            Value::String(status_from_inactive_flag(remote).to_string()),
        );
        Ok(Value::Object(local))
    }

    fn to_remote(&self, local: &Value) -> Result<Value> {
        ensure_object(local, "customer record")?;
        let mut remote = Map::new();
        set_text(&mut remote, "companyName", field_text(local, "company_name"));
        set_text(&mut remote, "email", field_text(local, "email"));
        set_text(&mut remote, "phone", field_text(local, "phone"));
        if let Some(status) = field_text(local, "status") {
            remote.insert("isInactive".to_string(), Value::Bool(status == "inactive"));
        }
        Ok(Value::Object(remote))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_local_maps_query_columns() {
        let row = json!({
            "id": "901",
            "entityid": "CUST-901",
            "companyname": "Acme Industrial",
            "email": "ap@acme.example",
            "phone": "555-0100",
            "isinactive": "F",
            "lastmodifieddate": "2024-06-01 10:00:00",
        });

        let local = CustomerMapper.to_local(&row).unwrap();
        assert_eq!(local["name"], "CUST-901");
        assert_eq!(local["company_name"], "Acme Industrial");
        assert_eq!(local["email"], "ap@acme.example");
        assert_eq!(local["status"], "active");
    }

    #[test]
    fn test_to_local_flags_inactive() {
        let row = json!({"id": "1", "isinactive": "T"});
        let local = CustomerMapper.to_local(&row).unwrap();
        assert_eq!(local["status"], "inactive");
        assert!(local.get("email").is_none());
    }

    #[test]
    fn test_to_remote_uses_camel_case() {
        let record = json!({
            "company_name": "Acme Industrial",
            "email": "ap@acme.example",
            "phone": "555-0100",
            "status": "inactive",
        });

        let body = CustomerMapper.to_remote(&record).unwrap();
        assert_eq!(body["companyName"], "Acme Industrial");
        assert_eq!(body["email"], "ap@acme.example");
        assert_eq!(body["isInactive"], true);
    }

    #[test]
    fn test_to_remote_rejects_non_objects() {
        assert!(CustomerMapper.to_remote(&json!("just a string")).is_err());
    }
}
