//! Placeholder substitution for node instructions.
//!
//! Only a fixed set of placeholders is recognized:
//!
//! | Placeholder        | Replaced with                                   |
//! |--------------------|-------------------------------------------------|
//! | `{{input}}`        | the run's input                                 |
//! | `{{context}}`      | the last generated output, or empty             |
//! | `{{user_profile}}` | the profile as `key: value` lines, or empty     |
//!
//! Anything else between braces is left as written. Substitution is a single
//! left-to-right pass, so placeholder text inside a substituted value is
//! never expanded again.

use crate::{ExecutionContext, UserProfile};

pub const INPUT_PLACEHOLDER: &str = "{{input}}";
pub const CONTEXT_PLACEHOLDER: &str = "{{context}}";
pub const USER_PROFILE_PLACEHOLDER: &str = "{{user_profile}}";

pub fn render_instruction(template: &str, ctx: &ExecutionContext) -> String {
    let profile = format_user_profile(ctx.user_profile());
    let context = ctx.last_output.as_deref().unwrap_or("");
    let replacements = [
        (INPUT_PLACEHOLDER, ctx.input.as_str()),
        (CONTEXT_PLACEHOLDER, context),
        (USER_PROFILE_PLACEHOLDER, profile.as_str()),
    ];

    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(at) = rest.find("{{") {
        out.push_str(&rest[..at]);
        let tail = &rest[at..];
        match replacements
            .iter()
            .find(|(placeholder, _)| tail.starts_with(placeholder))
        {
            Some((placeholder, value)) => {
                out.push_str(value);
                rest = &tail[placeholder.len()..];
            }
            None => {
                out.push_str("{{");
                rest = &tail[2..];
            }
        }
    }
    out.push_str(rest);
    out
}

/// One `key: value` line per entry, in key order.
pub fn format_user_profile(profile: &UserProfile) -> String {
    profile
        .iter()
        .map(|(key, value)| format!("{}: {}", key, value))
        .collect::<Vec<_>>()
        .join("\n")
}
