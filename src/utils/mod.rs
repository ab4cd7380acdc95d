pub mod constants;
pub mod errors;

pub use errors::pretty_error;
