pub mod catalog;
pub mod receipt;
