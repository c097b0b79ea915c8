//! Validation Utilities

use validator::ValidationErrors;

use super::error::ClientError;

/// Convert validation errors on an outbound request to ClientError
pub fn validation_error(errors: ValidationErrors) -> ClientError {
    ClientError::Validation(validation_message(&errors))
}

/// First failing rule, as `field: message`
pub fn validation_message(errors: &ValidationErrors) -> String {
    let mut messages: Vec<String> = errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                let message = e
                    .message
                    .clone()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| e.code.to_string());
                format!("{}: {}", field, message)
            })
        })
        .collect();

    // Nested sections report through `errors()`, not `field_errors()`
    if messages.is_empty() {
        messages = errors
            .errors()
            .keys()
            .map(|section| format!("{}: invalid", section))
            .collect();
    }

    messages.sort();
    messages
        .into_iter()
        .next()
        .unwrap_or_else(|| "Validation failed".into())
}
