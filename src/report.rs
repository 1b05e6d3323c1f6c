//! Human-readable rendering of error chains.

use std::error::Error;

/// Renders `err` followed by each distinct cause, joined by `: `.
///
/// A cause whose text already appears in the preceding message is skipped,
/// so wrappers that embed their source are not repeated.
#[must_use]
pub fn render_error_chain(err: &dyn Error) -> String {
    let mut rendered = err.to_string();
    let mut previous = rendered.clone();
    let mut source = err.source();
    while let Some(cause) = source {
        let message = cause.to_string();
        if !message.is_empty() && !previous.contains(&message) {
            rendered.push_str(": ");
            rendered.push_str(&message);
        }
        previous = message;
        source = cause.source();
    }
    rendered
}
