//! Host-side evaluation result shape and the mapping from engine details.

use serde::{Deserialize, Serialize};

use crate::engine::{EvaluationDetails, EvaluationErrorCode};
use crate::Str;

/// Why an evaluation returned its value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Reason {
    /// No targeting matched; the flag's configured default was served.
    Default,
    /// A targeting rule or percentage option matched for this user.
    TargetingMatch,
    /// The evaluation failed; `error_code` carries the classification.
    Error,
}

/// Host-side error classification.
///
/// The mapper produces only [`FlagNotFound`](ErrorCode::FlagNotFound),
/// [`ParseError`](ErrorCode::ParseError),
/// [`TypeMismatch`](ErrorCode::TypeMismatch) and
/// [`General`](ErrorCode::General); the remaining codes belong to the
/// provider contract and are listed for completeness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// The provider has not finished initializing.
    ProviderNotReady,
    /// The requested flag does not exist.
    FlagNotFound,
    /// Configuration or flag data could not be parsed.
    ParseError,
    /// The flag value does not match the requested type.
    TypeMismatch,
    /// The context is missing a required targeting key.
    TargetingKeyMissing,
    /// The evaluation context is invalid.
    InvalidContext,
    /// An error not covered by the other codes.
    General,
}

/// Evaluation result as returned to the host runtime.
///
/// `error_code` is present exactly when `reason` is [`Reason::Error`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderEvaluation<T> {
    pub value: T,
    /// Identifier of the variation that produced the value.
    pub variant: Option<Str>,
    pub reason: Reason,
    pub error_code: Option<ErrorCode>,
    pub error_message: Option<String>,
}

impl<T> ProviderEvaluation<T> {
    /// Replace the value, keeping variant, reason and error fields.
    pub fn with_value<U>(self, value: U) -> ProviderEvaluation<U> {
        ProviderEvaluation {
            value,
            variant: self.variant,
            reason: self.reason,
            error_code: self.error_code,
            error_message: self.error_message,
        }
    }
}

impl<T> From<EvaluationDetails<T>> for ProviderEvaluation<T> {
    fn from(details: EvaluationDetails<T>) -> Self {
        let reason = derive_reason(&details);
        ProviderEvaluation {
            value: details.value,
            variant: details.variation_id,
            reason,
            error_code: map_error_code(details.error_code),
            error_message: details.error_message,
        }
    }
}

/// Reason precedence: an error always wins over matched-rule flags.
fn derive_reason<T>(details: &EvaluationDetails<T>) -> Reason {
    if details.error_code != EvaluationErrorCode::None {
        return Reason::Error;
    }
    if details.matched_targeting_rule || details.matched_percentage_option {
        return Reason::TargetingMatch;
    }
    Reason::Default
}

/// Fixed engine-to-host error translation. The match is exhaustive, so a new
/// engine code fails to compile here instead of being misclassified.
fn map_error_code(code: EvaluationErrorCode) -> Option<ErrorCode> {
    match code {
        EvaluationErrorCode::None => None,
        EvaluationErrorCode::UnexpectedError => Some(ErrorCode::General),
        EvaluationErrorCode::InvalidConfigModel => Some(ErrorCode::ParseError),
        EvaluationErrorCode::ConfigJsonNotAvailable => Some(ErrorCode::ParseError),
        EvaluationErrorCode::SettingValueTypeMismatch => Some(ErrorCode::TypeMismatch),
        EvaluationErrorCode::SettingKeyMissing => Some(ErrorCode::FlagNotFound),
    }
}
