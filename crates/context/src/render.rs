//! Rendering a selected context as plain text for prompt injection.

use crate::orchestrator::TruncationResult;

/// Longest excerpt rendered per message, in characters.
pub const INJECTION_EXCERPT_CHARS: usize = 200;

/// Render non-system messages as `- Role: content` lines.
///
/// Content longer than [`INJECTION_EXCERPT_CHARS`] is cut and suffixed with
/// `...`. System messages are skipped since the caller injects instructions
/// separately.
pub fn format_for_injection(result: &TruncationResult) -> String {
    let mut out = String::new();
    for message in result.messages.iter().filter(|m| !m.is_system()) {
        out.push_str("- ");
        out.push_str(message.role.label());
        out.push_str(": ");
        if message.content.chars().count() > INJECTION_EXCERPT_CHARS {
            out.extend(message.content.chars().take(INJECTION_EXCERPT_CHARS));
            out.push_str("...");
        } else {
            out.push_str(&message.content);
        }
        out.push('\n');
    }
    out
}
