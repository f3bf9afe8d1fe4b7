//! Configuration access port trait.
//!
//! Typed getters return `Ok(None)` for an absent key and an error for a value
//! that is present but unparseable, so bad input is never silently replaced
//! by a default.

use crate::domain::error::StriderError;

pub trait ConfigPort {
    fn get_string(&self, section: &str, key: &str) -> Option<String>;
    fn get_int(&self, section: &str, key: &str) -> Result<Option<i64>, StriderError>;
    fn get_double(&self, section: &str, key: &str) -> Result<Option<f64>, StriderError>;
    fn get_bool(&self, section: &str, key: &str) -> Result<Option<bool>, StriderError>;
}
