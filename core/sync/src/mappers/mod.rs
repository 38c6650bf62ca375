//! Concrete entity mappers.

mod customer;
mod invoice;
mod project;
mod vendor;
mod vendor_bill;

pub use customer::CustomerMapper;
pub use invoice::InvoiceMapper;
pub use project::ProjectMapper;
pub use vendor::VendorMapper;
pub use vendor_bill::VendorBillMapper;

use serde_json::Value;

use crate::mapper::{field_text, EntityMapper};

/// One mapper per supported entity.
pub fn all() -> Vec<Box<dyn EntityMapper>> {
    vec![
        Box::new(CustomerMapper),
        Box::new(VendorMapper),
        Box::new(ProjectMapper),
        Box::new(InvoiceMapper),
        Box::new(VendorBillMapper),
    ]
}

/// Look up a mapper by remote type or local table name.
pub fn by_name(name: &str) -> Option<Box<dyn EntityMapper>> {
    let normalized = name.trim().to_lowercase().replace('-', "_");
    let mapper: Box<dyn EntityMapper> = match normalized.as_str() {
        "customer" | "customers" => Box::new(CustomerMapper),
        "vendor" | "vendors" => Box::new(VendorMapper),
        "project" | "projects" | "job" => Box::new(ProjectMapper),
        "invoice" | "invoices" => Box::new(InvoiceMapper),
        "vendor_bill" | "vendor_bills" | "vendorbill" => Box::new(VendorBillMapper),
        _ => return None,
    };
    Some(mapper)
}

/// Local status derived from the upstream's "T"/"F" inactive flag.
pub(crate) fn status_from_inactive_flag(remote: &Value) -> &'static str {
    let inactive = field_text(remote, "isinactive")
        .map(|flag| flag.eq_ignore_ascii_case("t") || flag.eq_ignore_ascii_case("true"))
        .unwrap_or(false);
    if inactive {
        "inactive"
    } else {
        "active"
    }
}
