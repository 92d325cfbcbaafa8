pub mod logging;
pub mod sanitize;

pub use sanitize::sanitize_query;
