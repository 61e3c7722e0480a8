use crate::err::scaling_error::ReError;

pub mod scaling_error;

pub type CResult<T> = Result<T, ReError>;
