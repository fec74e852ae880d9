mod convert;
mod document;
mod encoding;
mod macros;
mod oid;
mod value;

pub use document::Document;
pub use oid::{ObjectId, ObjectIdGenerator, ParseObjectIdError};
pub use value::{Value, ValueType};

pub use chrono::{DateTime, Utc};
