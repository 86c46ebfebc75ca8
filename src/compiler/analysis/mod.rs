mod result_type;
mod sanitize;

pub use result_type::{Callee, Primitives, TypeQuery, should_load};
pub use sanitize::sanitize;
