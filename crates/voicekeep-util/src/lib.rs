pub mod redact;
pub mod validation;
