pub mod error;
pub mod types;
pub mod value;

pub use error::{CuraError, Result, ValidationErrors, NON_FIELD_ERRORS};
pub use types::{FieldDef, FieldMap, ForeignKey, RecordId, Schema, StoredRecord};
pub use value::{DataType, Value};
