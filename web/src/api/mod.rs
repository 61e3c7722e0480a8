pub mod handler;
pub mod result;
