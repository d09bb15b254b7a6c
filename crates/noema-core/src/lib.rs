//! noema-core — value types, coercion, errors, and engine configuration

pub mod config;
pub mod convert;
pub mod error;
pub mod similarity;
pub mod value;

pub use config::EngineConfig;
pub use convert::coerce;
pub use error::{Error, Result};
pub use similarity::cosine;
pub use value::{TypedValue, ValueType};
