//! Translation of classified failures into user-presentable messages.
//!
//! Messages are short and stable per [`ErrorCategory`]; provider internals
//! never leak into them. The raw error is logged alongside the translation.

use crate::classify::{ClassifiedError, ErrorCategory};

/// Short, stable hint for a category.
pub fn category_message(category: ErrorCategory) -> &'static str {
    match category {
        ErrorCategory::RateLimited => "Too many requests. Please wait a moment and try again.",
        ErrorCategory::Overloaded => "The AI service is busy right now. Please try again shortly.",
        ErrorCategory::Timeout => "The request took too long to complete. Please try again.",
        ErrorCategory::Network => {
            "Could not reach the AI service. Check your connection and try again."
        }
        ErrorCategory::AuthFailure => {
            "The AI service rejected the configured credentials. Please check the API key."
        }
        ErrorCategory::ValidationFailure => {
            "The AI service rejected the request. Please review the input and try again."
        }
        ErrorCategory::Unknown => "Something went wrong while generating. Please try again.",
    }
}

/// Translate `error` into a message for the end user.
///
/// `context` names the operation (e.g. `"Resume generation"`) and prefixes
/// the message when non-empty.
pub fn translate(error: &ClassifiedError, context: &str) -> String {
    let hint = category_message(error.category);
    let message = if context.is_empty() {
        hint.to_string()
    } else {
        format!("{} failed. {}", context, hint)
    };

    tracing::error!(
        context,
        category = error.category.as_str(),
        retryable = error.is_retryable,
        status = ?error.cause.status(),
        raw_error = %error.message,
        user_message = %message,
        "translated provider failure"
    );

    message
}
