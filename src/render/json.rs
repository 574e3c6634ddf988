use serde::Serialize;

use crate::error::RefMedError;

pub fn to_pretty<T: Serialize>(value: &T) -> Result<String, RefMedError> {
    Ok(serde_json::to_string_pretty(value)?)
}
