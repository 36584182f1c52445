//! Value/type system and collection algebra (spec C1-C4).

pub mod datetime;
pub mod json;
pub mod quantity;
pub mod types;
pub mod value;

pub use datetime::{DatePrecision, DateTimePrecision, PartialDate, PartialDateTime, PartialTime, TimePrecision};
pub use json::JsonObject;
pub use quantity::Quantity;
pub use value::{Collection, FhirPathValue};
