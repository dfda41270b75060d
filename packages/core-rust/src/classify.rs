//! Execution error triage.
//!
//! Every raw error the engine returns falls into exactly one class:
//!
//! 1. **Business**: the message embeds an encoded [`BusinessError`]. The
//!    message is replaced by that encoding. Not a failure of the gateway.
//! 2. **Masked panic**: the message carries the engine's panic marker. The
//!    client sees only [`MASKED_PANIC_MESSAGE`]; the detail goes to the log.
//! 3. **Internal**: anything else. Logged verbatim.
//!
//! Classes 2 and 3 turn the response into an internal failure.

use crate::business::BusinessError;
use crate::execution::GraphqlError;

/// Marker the engine puts in messages of errors raised by resolver panics.
pub const PANIC_MARKER: &str = "graphql: panic occurred: ";

/// Message clients see in place of a panic.
pub const MASKED_PANIC_MESSAGE: &str = "masked panic";

/// Class assigned to one raw error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClassifiedError {
    /// Expected failure. `message` is the exact encoded object.
    Business { code: u64, message: String },
    /// Resolver panic. `detail` is the full original message, absent when
    /// it was the bare marker.
    MaskedPanic { detail: Option<String> },
    /// Any other execution error, verbatim.
    Internal { message: String },
}

impl ClassifiedError {
    /// Classifies a raw error message.
    #[must_use]
    pub fn classify(message: &str) -> Self {
        if let Some(encoded) = BusinessError::extract(message) {
            return Self::Business {
                code: business_code(encoded),
                message: encoded.to_string(),
            };
        }

        if message.contains(PANIC_MARKER) {
            let detail = (message != PANIC_MARKER).then(|| message.to_string());
            return Self::MaskedPanic { detail };
        }

        Self::Internal {
            message: message.to_string(),
        }
    }

    /// Whether this class forces an internal-failure response.
    #[must_use]
    pub fn is_internal_failure(&self) -> bool {
        !matches!(self, Self::Business { .. })
    }

    /// Message the client receives for this error.
    #[must_use]
    pub fn client_message(&self) -> &str {
        match self {
            Self::Business { message, .. } | Self::Internal { message } => message,
            Self::MaskedPanic { .. } => MASKED_PANIC_MESSAGE,
        }
    }

    /// Message recorded in the error log, if any.
    #[must_use]
    pub fn log_message(&self) -> Option<&str> {
        match self {
            Self::Business { .. } => None,
            Self::MaskedPanic { detail } => detail.as_deref(),
            Self::Internal { message } => Some(message),
        }
    }
}

/// Parses the digits of an encoded business error, saturating on overflow.
fn business_code(encoded: &str) -> u64 {
    encoded
        .trim_start_matches("{\"code\":")
        .bytes()
        .take_while(u8::is_ascii_digit)
        .fold(0u64, |acc, d| {
            acc.saturating_mul(10).saturating_add(u64::from(d - b'0'))
        })
}

/// Result of classifying every error of one execution.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ErrorTriage {
    classes: Vec<ClassifiedError>,
}

impl ErrorTriage {
    /// Classifies `errors` in order and rewrites their messages to what the
    /// client should see.
    pub fn run(errors: &mut [GraphqlError]) -> Self {
        let classes = errors
            .iter_mut()
            .map(|error| {
                let class = ClassifiedError::classify(&error.message);
                if !matches!(class, ClassifiedError::Internal { .. }) {
                    error.message = class.client_message().to_string();
                }
                class
            })
            .collect();
        Self { classes }
    }

    #[must_use]
    pub fn classes(&self) -> &[ClassifiedError] {
        &self.classes
    }

    /// True when any error was a masked panic or internal error.
    #[must_use]
    pub fn internal_failure(&self) -> bool {
        self.classes.iter().any(ClassifiedError::is_internal_failure)
    }

    /// Messages to log, joined with `", "`; `None` when there is nothing to log.
    #[must_use]
    pub fn log_line(&self) -> Option<String> {
        let messages: Vec<&str> = self
            .classes
            .iter()
            .filter_map(ClassifiedError::log_message)
            .collect();
        (!messages.is_empty()).then(|| messages.join(", "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triage(messages: &[&str]) -> (ErrorTriage, Vec<GraphqlError>) {
        let mut errors: Vec<GraphqlError> = messages.iter().map(|m| GraphqlError::new(*m)).collect();
        let triage = ErrorTriage::run(&mut errors);
        (triage, errors)
    }

    #[test]
    fn business_error_is_extracted_and_not_a_failure() {
        let (triage, errors) = triage(&[r#"resolver: {"code":42,"msg":"x"} trailing"#]);
        assert_eq!(errors[0].message, r#"{"code":42,"msg":"x"}"#);
        assert_eq!(
            triage.classes(),
            [ClassifiedError::Business {
                code: 42,
                message: r#"{"code":42,"msg":"x"}"#.to_string(),
            }]
        );
        assert!(!triage.internal_failure());
        assert_eq!(triage.log_line(), None);
    }

    #[test]
    fn business_pattern_wins_over_panic_marker() {
        let (triage, errors) = triage(&[r#"graphql: panic occurred: {"code":1,"msg":"m"}"#]);
        assert_eq!(errors[0].message, r#"{"code":1,"msg":"m"}"#);
        assert!(!triage.internal_failure());
    }

    #[test]
    fn bare_panic_marker_is_masked_without_log() {
        let (triage, errors) = triage(&[PANIC_MARKER]);
        assert_eq!(errors[0].message, MASKED_PANIC_MESSAGE);
        assert_eq!(triage.classes(), [ClassifiedError::MaskedPanic { detail: None }]);
        assert!(triage.internal_failure());
        assert_eq!(triage.log_line(), None);
    }

    #[test]
    fn panic_with_detail_is_masked_and_logged() {
        let message = "graphql: panic occurred: index out of range";
        let (triage, errors) = triage(&[message]);
        assert_eq!(errors[0].message, MASKED_PANIC_MESSAGE);
        assert!(triage.internal_failure());
        assert_eq!(triage.log_line().as_deref(), Some(message));
    }

    #[test]
    fn other_errors_are_internal_and_logged_verbatim() {
        let (triage, errors) = triage(&["Cannot query field \"nope\" on type \"Query\"."]);
        assert_eq!(errors[0].message, "Cannot query field \"nope\" on type \"Query\".");
        assert!(triage.internal_failure());
        assert_eq!(
            triage.log_line().as_deref(),
            Some("Cannot query field \"nope\" on type \"Query\".")
        );
    }

    #[test]
    fn mixed_errors_keep_order_and_join_log_messages() {
        let (triage, errors) = triage(&[
            "db timeout",
            r#"{"code":3,"msg":"denied"}"#,
            PANIC_MARKER,
            "graphql: panic occurred: nil map",
        ]);
        let visible: Vec<&str> = errors.iter().map(|e| e.message.as_str()).collect();
        assert_eq!(
            visible,
            vec![
                "db timeout",
                r#"{"code":3,"msg":"denied"}"#,
                MASKED_PANIC_MESSAGE,
                MASKED_PANIC_MESSAGE,
            ]
        );
        assert!(triage.internal_failure());
        assert_eq!(
            triage.log_line().as_deref(),
            Some("db timeout, graphql: panic occurred: nil map")
        );
    }

    #[test]
    fn no_errors_means_no_failure() {
        let (triage, _) = triage(&[]);
        assert!(triage.classes().is_empty());
        assert!(!triage.internal_failure());
        assert_eq!(triage.log_line(), None);
    }

    #[test]
    fn oversized_business_code_saturates() {
        let class = ClassifiedError::classify(r#"{"code":99999999999999999999999,"msg":"big"}"#);
        assert!(matches!(class, ClassifiedError::Business { code: u64::MAX, .. }));
    }
}
