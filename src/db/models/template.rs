use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::notification::{Channel, NotificationType};

#[derive(Debug, Clone, FromRow)]
pub struct NotificationTemplateRow {
    pub id: String,
    pub notification_type: String,
    pub channel: String,
    pub is_active: bool,
    pub title: Option<String>,
    pub message: String,
    pub html_content: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

/// A rendering template bound to a (type, channel) pair. `{{name}}`-style
/// placeholders are substituted by `cache::render` against caller-provided
/// variables (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotificationTemplate {
    pub id: String,
    pub notification_type: NotificationType,
    pub channel: Channel,
    pub is_active: bool,
    pub title: Option<String>,
    pub message: String,
    pub html_content: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TryFrom<NotificationTemplateRow> for NotificationTemplate {
    type Error = crate::error::AppError;

    fn try_from(row: NotificationTemplateRow) -> Result<Self, Self::Error> {
        use std::str::FromStr;

        let notification_type = NotificationType::from_str(&row.notification_type).map_err(|_| {
            crate::error::AppError::Internal(anyhow::anyhow!(
                "unknown notification_type in store: {}",
                row.notification_type
            ))
        })?;
        let channel = Channel::from_str(&row.channel).map_err(|_| {
            crate::error::AppError::Internal(anyhow::anyhow!("unknown channel in store: {}", row.channel))
        })?;

        Ok(NotificationTemplate {
            id: row.id,
            notification_type,
            channel,
            is_active: row.is_active,
            title: row.title,
            message: row.message,
            html_content: row.html_content,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

/// Rendered `(title, message, htmlContent?)` (§4.1). `title` falls back to
/// an empty string when the template has none set.
pub struct RenderedTemplate {
    pub title: String,
    pub message: String,
    pub html_content: Option<String>,
}

impl NotificationTemplate {
    /// Substitute `{{key}}` tokens against `vars`. Unknown placeholders are
    /// left verbatim rather than erroring, matching the lenient behaviour
    /// the renderer relies on for partial variable sets. Rendering never
    /// fails (§4.1): a template with no title substitutes to an empty one.
    pub fn render(&self, vars: &std::collections::HashMap<String, String>) -> RenderedTemplate {
        RenderedTemplate {
            title: self.title.as_deref().map(|t| substitute(t, vars)).unwrap_or_default(),
            message: substitute(&self.message, vars),
            html_content: self.html_content.as_deref().map(|h| substitute(h, vars)),
        }
    }
}

fn substitute(template: &str, vars: &std::collections::HashMap<String, String>) -> String {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(start) = rest.find("{{") {
        out.push_str(&rest[..start]);
        let after = &rest[start + 2..];
        match after.find("}}") {
            Some(end) => {
                let key = after[..end].trim();
                match vars.get(key) {
                    Some(value) => out.push_str(value),
                    None => {
                        out.push_str("{{");
                        out.push_str(key);
                        out.push_str("}}");
                    }
                }
                rest = &after[end + 2..];
            }
            None => {
                out.push_str("{{");
                rest = after;
            }
        }
    }
    out.push_str(rest);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn substitutes_known_tokens_and_leaves_unknown_ones() {
        let mut vars = std::collections::HashMap::new();
        vars.insert("name".to_string(), "Ada".to_string());
        let rendered = substitute("Hi {{name}}, your code is {{otp}}", &vars);
        assert_eq!(rendered, "Hi Ada, your code is {{otp}}");
    }
}
