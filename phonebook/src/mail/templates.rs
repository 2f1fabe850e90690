//! HTML email templates rendered with Handlebars.

use handlebars::Handlebars;
use std::collections::HashMap;

use super::MailError;

/// Templates known to the auth flows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EmailTemplate {
    ResetPassword,
    SetPassword,
}

impl EmailTemplate {
    pub fn name(self) -> &'static str {
        match self {
            EmailTemplate::ResetPassword => "reset-password-email.html",
            EmailTemplate::SetPassword => "set-password-email.html",
        }
    }

    pub fn subject(self) -> &'static str {
        match self {
            EmailTemplate::ResetPassword => "Reset your password",
            EmailTemplate::SetPassword => "Set your password",
        }
    }
}

/// Renders a named template against a variable mapping.
pub trait TemplateRenderer: Send + Sync {
    fn render(
        &self,
        template: EmailTemplate,
        vars: &HashMap<&str, String>,
    ) -> Result<String, MailError>;
}

/// Handlebars renderer over the templates compiled into the binary.
///
/// Runs in strict mode, so a placeholder without a value is an error.
/// Values are HTML-escaped, leaving `=` intact so links stay readable.
pub struct EmbeddedTemplates {
    registry: Handlebars<'static>,
}

impl EmbeddedTemplates {
    pub fn new() -> Result<Self, MailError> {
        let mut registry = Handlebars::new();
        registry.set_strict_mode(true);
        registry.register_escape_fn(escape_html);

        for template in [EmailTemplate::ResetPassword, EmailTemplate::SetPassword] {
            registry
                .register_template_string(template.name(), Self::source(template))
                .map_err(|e| MailError::Template(format!("{}: {}", template.name(), e)))?;
        }

        Ok(Self { registry })
    }

    fn source(template: EmailTemplate) -> &'static str {
        match template {
            EmailTemplate::ResetPassword => {
                include_str!("../../templates/reset-password-email.html")
            }
            EmailTemplate::SetPassword => include_str!("../../templates/set-password-email.html"),
        }
    }
}

impl TemplateRenderer for EmbeddedTemplates {
    fn render(
        &self,
        template: EmailTemplate,
        vars: &HashMap<&str, String>,
    ) -> Result<String, MailError> {
        self.registry
            .render(template.name(), vars)
            .map_err(|e| MailError::Template(format!("{}: {}", template.name(), e)))
    }
}

fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}
