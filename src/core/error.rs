use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum CalcError {
    #[error("invalid {field}: {message}")]
    InvalidInput {
        field: &'static str,
        message: String,
    },
    #[error("no solution within {limit} steps: {reason}")]
    NonConvergent { reason: String, limit: u32 },
}

impl CalcError {
    pub fn invalid(field: &'static str, message: impl Into<String>) -> Self {
        Self::InvalidInput {
            field,
            message: message.into(),
        }
    }

    pub fn non_convergent(reason: impl Into<String>, limit: u32) -> Self {
        Self::NonConvergent {
            reason: reason.into(),
            limit,
        }
    }
}

pub type CalcResult<T> = Result<T, CalcError>;

pub(crate) fn ensure_finite(field: &'static str, value: f64) -> CalcResult<f64> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(CalcError::invalid(field, "must be a finite number"))
    }
}

pub(crate) fn ensure_non_negative(field: &'static str, value: f64) -> CalcResult<f64> {
    let value = ensure_finite(field, value)?;
    if value < 0.0 {
        return Err(CalcError::invalid(field, "must be >= 0"));
    }
    Ok(value)
}

pub(crate) fn ensure_positive(field: &'static str, value: f64) -> CalcResult<f64> {
    let value = ensure_finite(field, value)?;
    if value <= 0.0 {
        return Err(CalcError::invalid(field, "must be > 0"));
    }
    Ok(value)
}
