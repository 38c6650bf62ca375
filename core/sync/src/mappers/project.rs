//! Project field translation.
//!
//! Projects live in the upstream's `job` record type.

use serde_json::{Map, Value};

use ledgerbridge_common::Result;

use crate::mapper::{ensure_object, field_text, set_text, EntityMapper};

/// Maps remote jobs onto the local `projects` table.
pub struct ProjectMapper;

const QUERY_FIELDS: &[&str] = &[
    "id",
    "entityid",
    "companyname",
    "startdate",
    "enddate",
    "entitystatus",
    "lastmodifieddate",
];

/// Normalize the job status reference into a local enum value.
fn project_status(text: &str) -> &'static str {
    let lowered = text.to_lowercase();
    if lowered.contains("clos") || lowered.contains("complet") {
        "closed"
    } else if lowered.contains("progress") {
        "in_progress"
    } else {
        "pending"
    }
}

impl EntityMapper for ProjectMapper {
    fn remote_type(&self) -> &'static str {
        "job"
    }

    fn local_table(&self) -> &'static str {
        "projects"
    }

    fn query_fields(&self) -> &'static [&'static str] {
        QUERY_FIELDS
    }

    fn to_local(&self, remote: &Value) -> Result<Value> {
        ensure_object(remote, "job query row")?;
        let mut local = Map::new();
        set_text(&mut local, "name", field_text(remote, "entityid"));
        set_text(&mut local, "title", field_text(remote, "companyname"));
        set_text(&mut local, "start_date", field_text(remote, "startdate"));
        set_text(&mut local, "end_date", field_text(remote, "enddate"));
        if let Some(status) = field_text(remote, "entitystatus") {
            local.insert(
                "status".to_string(),
                Value::String(project_status(&status).to_string()),
            );
        }
        Ok(Value::Object(local))
    }

    fn to_remote(&self, local: &Value) -> Result<Value> {
        ensure_object(local, "project record")?;
        let mut remote = Map::new();
        set_text(&mut remote, "entityId", field_text(local, "name"));
        set_text(&mut remote, "companyName", field_text(local, "title"));
        set_text(&mut remote, "startDate", field_text(local, "start_date"));
        set_text(&mut remote, "endDate", field_text(local, "end_date"));
        Ok(Value::Object(remote))
    }
}
