//! Store-error to validation-report translation
//!
//! The hosting application calls [`translate`] from its error handler. Only
//! uniqueness and field-validation failures are recognized; anything else is
//! handed back so the caller can forward it down its handler chain.

use crate::error::EntityError;
use serde::Serialize;
use std::collections::BTreeMap;

/// HTTP status carried by every report
pub const VALIDATION_STATUS: u16 = 422;

/// Error entry for one attribute
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttributeError {
    pub message: String,
    pub code: String,
}

/// Field-keyed report returned to API clients
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub status: u16,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub attributes: BTreeMap<String, AttributeError>,
}

impl ValidationReport {
    fn new(attributes: BTreeMap<String, AttributeError>) -> Self {
        Self {
            status: VALIDATION_STATUS,
            message: "Invalid data".to_string(),
            kind: "VALIDATION".to_string(),
            attributes,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// Rewrite a constraint or validation failure into a [`ValidationReport`].
///
/// Returns the error unchanged when it is neither. When a field has several
/// violations the last one wins.
pub fn translate(err: EntityError) -> Result<ValidationReport, EntityError> {
    match err {
        EntityError::UniqueConstraint { violations, .. } => {
            let attributes = violations
                .into_iter()
                .map(|v| {
                    let message = format!("{} is already in use", v.field);
                    (
                        v.field,
                        AttributeError {
                            message,
                            code: "unique".to_string(),
                        },
                    )
                })
                .collect();
            Ok(ValidationReport::new(attributes))
        }
        EntityError::Validation { violations, .. } => {
            let attributes = violations
                .into_iter()
                .map(|v| {
                    (
                        v.field,
                        AttributeError {
                            message: v.message,
                            code: v.code,
                        },
                    )
                })
                .collect();
            Ok(ValidationReport::new(attributes))
        }
        other => Err(other),
    }
}

#[cfg(test)]
#[path = "translate_test.rs"]
mod tests;
