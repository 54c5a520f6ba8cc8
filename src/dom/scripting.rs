//! Attribute predicates for script-bearing markup.

use std::sync::OnceLock;

use regex::Regex;

/// Attributes that navigate or submit to a URL.
pub const URL_ATTRIBUTES: &[&str] = &["href", "src", "xlink:href", "formaction", "action"];

fn script_url_pattern() -> Option<&'static Regex> {
    static PATTERN: OnceLock<Option<Regex>> = OnceLock::new();
    PATTERN
        .get_or_init(|| Regex::new(r"(?i)^\s*javascript:").ok())
        .as_ref()
}

/// `onclick`, `onload` and friends.
pub fn is_event_handler_attr(name: &str) -> bool {
    name.len() > 2 && name.get(..2).is_some_and(|p| p.eq_ignore_ascii_case("on"))
}

/// A URL-valued attribute whose value is a `javascript:` URL.
pub fn is_script_url_attr(name: &str, value: &str) -> bool {
    let is_url_attr = URL_ATTRIBUTES.iter().any(|a| a.eq_ignore_ascii_case(name));
    if !is_url_attr {
        return false;
    }
    match script_url_pattern() {
        Some(pattern) => pattern.is_match(value),
        None => value.trim_start().to_ascii_lowercase().starts_with("javascript:"),
    }
}

/// Whether an attribute would execute script when scripts are disabled.
pub fn is_script_attr(name: &str, value: &str) -> bool {
    is_event_handler_attr(name) || is_script_url_attr(name, value)
}
