pub mod probe;
pub mod source;
