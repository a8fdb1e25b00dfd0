//! Dynamic sub-form submissions and their conversion to child specs.

pub mod data;
pub mod extract;
pub mod lookup;
pub mod rules;

pub use data::{FormData, FormValue, field_key};
pub use extract::{DependentField, SpecExtractor};
pub use lookup::{ForeignLookup, StaticLookup, StoreLookup};
pub use rules::{FieldRule, FieldSpec};
