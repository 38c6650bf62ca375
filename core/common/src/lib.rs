//! Common utilities and types shared across LedgerBridge modules.
//!
//! This module provides the error taxonomy and foundational types that are
//! used throughout the codebase, ensuring consistency and type safety.

pub mod error;
pub mod types;

pub use error::{ClassifiedError, Error, ErrorCategory, Result};
pub use types::AccountId;
