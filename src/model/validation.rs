//! Validation helpers for create payloads.

use time::{Date, macros::format_description};
use validator::ValidationError;

/// Validates that a text field holds something other than whitespace.
pub fn validate_not_blank(value: &str) -> Result<(), ValidationError> {
    if value.trim().is_empty() {
        let mut err = ValidationError::new("blank");
        err.message = Some("value must not be blank".into());
        return Err(err);
    }
    Ok(())
}

/// Validates that a birth date is a real calendar date written as `YYYY-MM-DD`.
///
/// # Examples
///
/// ```ignore
/// validate_birthdate("1990-05-15") // Ok
/// validate_birthdate("1990-02-30") // Err - not a calendar date
/// validate_birthdate("15/05/1990") // Err - wrong layout
/// ```
pub fn validate_birthdate(value: &str) -> Result<(), ValidationError> {
    let format = format_description!("[year]-[month]-[day]");
    if Date::parse(value, &format).is_err() {
        let mut err = ValidationError::new("birthdate_format");
        err.message = Some(format!("birthdate must be YYYY-MM-DD (got `{value}`)").into());
        return Err(err);
    }
    Ok(())
}
