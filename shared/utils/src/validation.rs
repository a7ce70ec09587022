use crate::error::{BeaconError, BeaconResult, FieldError};
use std::collections::HashMap;
use validator::{Validate, ValidationErrors};

/// Validates a model and, on failure, returns a [`BeaconError::Validation`]
/// carrying a joined message. Use [`field_errors`] when the caller needs the
/// per-field report callers surface to webhook senders as validation errors.
pub fn validate_model<T: Validate>(model: &T) -> BeaconResult<()> {
    match model.validate() {
        Ok(()) => Ok(()),
        Err(errors) => {
            let message = format_validation_errors(&errors);
            Err(BeaconError::validation("model", message))
        }
    }
}

pub fn field_errors(errors: &ValidationErrors) -> Vec<FieldError> {
    let mut out = Vec::new();
    for (field, field_errors) in errors.field_errors() {
        for error in field_errors {
            let message = match &error.code {
                std::borrow::Cow::Borrowed("email") => "invalid email format".to_string(),
                std::borrow::Cow::Borrowed("length") => format!("length validation failed for '{}'", field),
                std::borrow::Cow::Borrowed("range") => format!("value out of range for '{}'", field),
                std::borrow::Cow::Borrowed("required") => format!("field '{}' is required", field),
                other => format!("validation failed for '{}': {}", field, other),
            };
            out.push(FieldError { field: field.to_string(), message });
        }
    }
    out
}

pub fn format_validation_errors(errors: &ValidationErrors) -> String {
    field_errors(errors)
        .into_iter()
        .map(|e| format!("{}: {}", e.field, e.message))
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn validate_uuid(uuid_str: &str) -> BeaconResult<uuid::Uuid> {
    uuid::Uuid::parse_str(uuid_str).map_err(|_| BeaconError::validation("uuid", "invalid UUID format"))
}

pub fn validate_date_range(
    start_date: chrono::DateTime<chrono::Utc>,
    end_date: chrono::DateTime<chrono::Utc>,
) -> BeaconResult<()> {
    if start_date >= end_date {
        return Err(BeaconError::validation("date_range", "start date must be before end date"));
    }
    Ok(())
}

pub fn validate_required_fields<T>(data: &HashMap<String, T>, required_fields: &[&str]) -> BeaconResult<()> {
    let missing: Vec<&str> = required_fields
        .iter()
        .filter(|field| !data.contains_key(**field))
        .copied()
        .collect();

    if !missing.is_empty() {
        return Err(BeaconError::validation(
            "required_fields",
            format!("missing required fields: {}", missing.join(", ")),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_uuid_rejects_garbage() {
        assert!(validate_uuid("not-a-uuid").is_err());
        assert!(validate_uuid(&uuid::Uuid::new_v4().to_string()).is_ok());
    }

    #[test]
    fn validate_date_range_rejects_inverted() {
        let a = chrono::Utc::now();
        let b = a + chrono::Duration::minutes(1);
        assert!(validate_date_range(a, b).is_ok());
        assert!(validate_date_range(b, a).is_err());
    }

    #[test]
    fn required_fields_reports_missing() {
        let mut data = HashMap::new();
        data.insert("title".to_string(), "boom".to_string());
        assert!(validate_required_fields(&data, &["title"]).is_ok());
        assert!(validate_required_fields(&data, &["title", "severity"]).is_err());
    }
}
