pub mod directory;
pub mod passwords;
pub mod registry;
pub mod sessions;

use serde_json::{Map, Value};

use lapor_shared::errors::{AppError, AppResult, ErrorCode};

/// Collects field-level validation messages so a request reports every
/// offending field at once.
#[derive(Debug, Default)]
pub(crate) struct FieldErrors(Map<String, Value>);

impl FieldErrors {
    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        let entry = self
            .0
            .entry(field.to_string())
            .or_insert_with(|| Value::Array(Vec::new()));
        if let Value::Array(messages) = entry {
            messages.push(Value::String(message.into()));
        }
    }

    pub fn into_result(self) -> AppResult<()> {
        if self.0.is_empty() {
            return Ok(());
        }
        Err(AppError::with_details(
            ErrorCode::ValidationError,
            "the given data was invalid",
            Value::Object(self.0),
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_is_ok() {
        assert!(FieldErrors::default().into_result().is_ok());
    }

    #[test]
    fn messages_group_by_field() {
        let mut errors = FieldErrors::default();
        errors.add("nik", "the nik is required");
        errors.add("nik", "the nik must be 16 characters");
        errors.add("no_telp", "the no_telp is required");

        let err = errors.into_result().unwrap_err();
        match err {
            AppError::Known { code, details: Some(details), .. } => {
                assert_eq!(code, ErrorCode::ValidationError);
                assert_eq!(details["nik"].as_array().unwrap().len(), 2);
                assert_eq!(details["no_telp"][0], "the no_telp is required");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
