//! Field-policy validation
//!
//! [`policy`] holds the checks themselves; [`extractor`] runs them on
//! request bodies before handlers see them.

pub mod extractor;
pub mod policy;

pub use extractor::{AcceptedProps, PolicyEntity, QueryBody, RequiredProps};
pub use policy::{check_allowed, check_required, enforce_required, restrict_to_allowed};
