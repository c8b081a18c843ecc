//! Utility functions for formatting and input validation.

pub mod format;
pub mod validate;

// Re-export commonly used functions at module level
pub use format::{format_credit, format_date, format_optional, truncate_string};
pub use validate::{is_valid_email, is_valid_phone};
