//! System instruction template
//!
//! The template is a Markdown file with `{{ key }}` placeholders filled from
//! the bot's own profile (`getMe`).

// lazy_regex! statics use once_cell internally
#![allow(clippy::non_std_lazy_statics)]

use lazy_regex::lazy_regex;
use serde::Serialize;
use serde_json::Value;
use std::path::Path;
use teloxide::types::Me;

/// Match placeholders: {{ key }}
static RE_PLACEHOLDER: lazy_regex::Lazy<regex::Regex> = lazy_regex!(r"\{\{\s*(\w+)\s*\}\}");

/// Bot account fields available to the template.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct BotProfile {
    pub id: u64,
    pub is_bot: bool,
    pub first_name: String,
    pub last_name: Option<String>,
    pub username: Option<String>,
    pub language_code: Option<String>,
    pub is_premium: bool,
    pub added_to_attachment_menu: bool,
    pub can_join_groups: bool,
    pub can_read_all_group_messages: bool,
    pub supports_inline_queries: bool,
}

impl From<&Me> for BotProfile {
    fn from(me: &Me) -> Self {
        Self {
            id: me.user.id.0,
            is_bot: me.user.is_bot,
            first_name: me.user.first_name.clone(),
            last_name: me.user.last_name.clone(),
            username: me.user.username.clone(),
            language_code: me.user.language_code.clone(),
            is_premium: me.user.is_premium,
            added_to_attachment_menu: me.user.added_to_attachment_menu,
            can_join_groups: me.can_join_groups,
            can_read_all_group_messages: me.can_read_all_group_messages,
            supports_inline_queries: me.supports_inline_queries,
        }
    }
}

/// Replace every `{{ key }}` with the matching profile field.
///
/// Unknown keys and empty fields render as an empty string.
#[must_use]
pub fn render_template(template: &str, profile: &BotProfile) -> String {
    let fields = serde_json::to_value(profile).unwrap_or_default();
    RE_PLACEHOLDER
        .replace_all(template, |caps: &regex::Captures| {
            match fields.get(&caps[1]) {
                None | Some(Value::Null) => String::new(),
                Some(Value::String(s)) => s.clone(),
                Some(other) => other.to_string(),
            }
        })
        .into_owned()
}

/// Read the template at `path` and render it for `profile`.
///
/// # Errors
///
/// Returns the I/O error if the file cannot be read.
pub fn load_system_instruction(path: &Path, profile: &BotProfile) -> std::io::Result<String> {
    let template = std::fs::read_to_string(path)?;
    Ok(render_template(&template, profile))
}
