//! Field translation contract between local tables and remote records.

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Utc};
use serde_json::{Map, Value};

use ledgerbridge_common::{Error, Result};

/// Remote timestamp column used for delta queries unless a mapper overrides it.
pub const DEFAULT_LAST_MODIFIED_FIELD: &str = "lastmodifieddate";

/// Per-entity translation and query construction.
///
/// Concrete mappers supply the field-level translation and the minimal
/// column list; query construction is shared through the default methods.
/// Query rows arrive with lowercase column names while REST record bodies
/// use camelCase, so `to_local` consumes the former and `to_remote`
/// produces the latter.
pub trait EntityMapper: Send + Sync {
    /// Remote record type, e.g. `customer`.
    fn remote_type(&self) -> &'static str;

    /// Local table the entity lives in.
    fn local_table(&self) -> &'static str;

    /// Columns the queries select.
    fn query_fields(&self) -> &'static [&'static str];

    /// Translate one query row into partial local fields.
    fn to_local(&self, remote: &Value) -> Result<Value>;

    /// Translate a local record into a remote REST body.
    fn to_remote(&self, local: &Value) -> Result<Value>;

    /// Remote column holding the last modification time.
    fn last_modified_field(&self) -> &'static str {
        DEFAULT_LAST_MODIFIED_FIELD
    }

    /// Table the queries read from; differs from [`Self::remote_type`] for
    /// entities stored in the shared transaction table.
    fn query_table(&self) -> &'static str {
        self.remote_type()
    }

    /// Predicate merged into every WHERE clause, e.g. a transaction type.
    fn base_condition(&self) -> Option<&'static str> {
        None
    }

    /// SELECT over [`Self::query_fields`] with optional condition and paging.
    fn build_select_query(
        &self,
        condition: Option<&str>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> String {
        let mut sql = format!(
            "SELECT {} FROM {}",
            self.query_fields().join(", "),
            self.query_table()
        );

        let mut conditions: Vec<&str> = Vec::new();
        if let Some(base) = self.base_condition() {
            conditions.push(base);
        }
        if let Some(extra) = condition {
            conditions.push(extra);
        }
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }

        if let Some(limit) = limit {
            sql.push_str(&format!(
                " OFFSET {} ROWS FETCH NEXT {} ROWS ONLY",
                offset.unwrap_or(0),
                limit
            ));
        }
        sql
    }

    /// SELECT restricted to rows modified after `since`.
    fn build_delta_query(&self, since: DateTime<Utc>) -> String {
        let condition = format!(
            "{} > TO_TIMESTAMP('{}', 'YYYY-MM-DD HH24:MI:SS')",
            self.last_modified_field(),
            since.format("%Y-%m-%d %H:%M:%S")
        );
        self.build_select_query(Some(&condition), None, None)
    }

    /// Remote record id from a query row.
    fn remote_id(&self, remote: &Value) -> Option<String> {
        field_text(remote, "id")
    }

    /// Remote last-modified timestamp from a query row.
    fn remote_modified(&self, remote: &Value) -> Option<DateTime<Utc>> {
        field_text(remote, self.last_modified_field())
            .and_then(|text| parse_remote_timestamp(&text))
    }
}

/// Extract a field as text.
///
/// Unwraps `{id, refName}` reference objects to their display name and
/// renders numbers and booleans in their literal form.
pub fn field_text(value: &Value, key: &str) -> Option<String> {
    match value.get(key)? {
        Value::String(text) => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Object(map) => {
            let inner = map.get("refName").or_else(|| map.get("id"))?;
            match inner {
                Value::String(text) => Some(text.clone()),
                Value::Number(number) => Some(number.to_string()),
                _ => None,
            }
        }
        _ => None,
    }
}

/// Extract a field as a number, accepting numeric strings.
pub fn field_number(value: &Value, key: &str) -> Option<f64> {
    match value.get(key)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Parse the timestamp formats the query API is known to emit.
pub fn parse_remote_timestamp(text: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, "%Y-%m-%d %H:%M:%S") {
        return Some(Utc.from_utc_datetime(&naive));
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%Y-%m-%d") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    if let Ok(date) = NaiveDate::parse_from_str(text, "%m/%d/%Y") {
        return Some(Utc.from_utc_datetime(&date.and_hms_opt(0, 0, 0)?));
    }
    None
}

/// Insert `value` under `key` when present.
pub(crate) fn set_text(map: &mut Map<String, Value>, key: &str, value: Option<String>) {
    if let Some(value) = value {
        map.insert(key.to_string(), Value::String(value));
    }
}

/// Insert a numeric `value` under `key` when present.
pub(crate) fn set_number(map: &mut Map<String, Value>, key: &str, value: Option<f64>) {
    if let Some(value) = value {
        if let Some(number) = serde_json::Number::from_f64(value) {
            map.insert(key.to_string(), Value::Number(number));
        }
    }
}

/// Reject payloads that are not JSON objects before field extraction.
pub(crate) fn ensure_object(value: &Value, what: &str) -> Result<()> {
    if value.is_object() {
        Ok(())
    } else {
        Err(Error::Mapping(format!("{} is not a JSON object", what)))
    }
}
