//! Redaction policy and redacting serialization.

pub mod policy;
pub mod redact;

pub use policy::{
    classify_form_control, is_secret_field, looks_masked, mask_value, CompiledPolicy,
    FormControl, Redaction, BLOCKED_TEXT, REDACTED_TEXT, TEXT_BEARING_ATTRIBUTES,
};
pub use redact::{RedactionReport, Redactor, BLOCKED_ATTRIBUTE};
