//! Vendor field translation.

use serde_json::{Map, Value};

use ledgerbridge_common::Result;

use crate::mapper::{ensure_object, field_text, set_text, EntityMapper};

use super::status_from_inactive_flag;

/// Maps remote vendors onto the local `vendors` table.
pub struct VendorMapper;

const QUERY_FIELDS: &[&str] = &[
    "id",
    "entityid",
    "companyname",
    "email",
    "phone",
    "isinactive",
    "lastmodifieddate",
];

impl EntityMapper for VendorMapper {
    fn remote_type(&self) -> &'static str {
        "vendor"
    }

    fn local_table(&self) -> &'static str {
        "vendors"
    }

    fn query_fields(&self) -> &'static [&'static str] {
        QUERY_FIELDS
    }

    fn to_local(&self, remote: &Value) -> Result<Value> {
        ensure_object(remote, "vendor query row")?;
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
        ensure_object(local, "vendor record")?;
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
    fn test_round_trip_field_names() {
        let row = json!({
            "id": "77",
            "entityid": "VEND-77",
            "companyname": "Steel Supply Co",
            "email": "orders@steelsupply.example",
            "isinactive": "F",
        });

        let local = VendorMapper.to_local(&row).unwrap();
        assert_eq!(local["name"], "VEND-77");
        assert_eq!(local["company_name"], "Steel Supply Co");
        assert_eq!(local["status"], "active");

        let body = VendorMapper.to_remote(&local).unwrap();
        assert_eq!(body["companyName"], "Steel Supply Co");
        assert_eq!(body["isInactive"], false);
    }

    #[test]
    fn test_queries_vendor_table_directly() {
        assert_eq!(VendorMapper.query_table(), "vendor");
        assert!(VendorMapper.base_condition().is_none());
        let sql = VendorMapper.build_select_query(None, None, None);
        assert!(sql.starts_with("SELECT id, entityid"));
        assert!(sql.ends_with("FROM vendor"));
    }
}
