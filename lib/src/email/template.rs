//! Flat token substitution for message templates.
//!
//! Recognized tokens are `{{name}}`, `{{email}}` and `{{imageLink}}`. Matching
//! is exact and case-sensitive, anything else is left as written.

use crate::entry::Recipient;
use crate::Result;

pub const NAME_TOKEN: &str = "{{name}}";
pub const EMAIL_TOKEN: &str = "{{email}}";
pub const IMAGE_LINK_TOKEN: &str = "{{imageLink}}";

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Template {
    pub subject: String,
    pub html_content: String,
}

impl Template {
    pub fn new(subject: impl Into<String>, html_content: impl Into<String>) -> Self {
        Self {
            subject: subject.into(),
            html_content: html_content.into(),
        }
    }

    /// Parses a template file with `subject` and `htmlContent` keys.
    pub fn from_toml(input: &str) -> Result<Self> {
        Ok(toml::from_str(input)?)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
pub struct Rendered {
    pub subject: String,
    pub body: String,
}

/// Renders the template for a single recipient.
pub fn render(template: &Template, recipient: &Recipient) -> Rendered {
    let values = [
        (NAME_TOKEN, display_name(recipient)),
        (EMAIL_TOKEN, recipient.email.as_str()),
        (IMAGE_LINK_TOKEN, recipient.image_link.as_str()),
    ];
    Rendered {
        subject: substitute(&template.subject, &values),
        body: substitute(&template.html_content, &values),
    }
}

// Single pass, so substituted values are never scanned for tokens again.
fn substitute(text: &str, values: &[(&str, &str)]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let tail = &rest[start..];
        match values.iter().find(|(token, _)| tail.starts_with(token)) {
            Some((token, value)) => {
                out.push_str(value);
                rest = &tail[token.len()..];
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

/// Recipient name, or the local part of their address if no name was given.
pub fn display_name(recipient: &Recipient) -> &str {
    match recipient.name.as_deref() {
        Some(name) if !name.trim().is_empty() => name,
        _ => recipient
            .email
            .split_once('@')
            .map_or(recipient.email.as_str(), |(local, _)| local),
    }
}
