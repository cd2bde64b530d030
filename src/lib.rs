mod backward;
mod dot;
pub mod error;
mod ops;
mod value;

pub use error::ValueError;
pub use value::Value;

#[cfg(feature = "macro")]
pub use scalargrad_macro::scalargrad;
