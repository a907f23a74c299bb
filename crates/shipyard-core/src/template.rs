//! Strict `{placeholder}` rendering for path and message templates.

use crate::error::ConfigError;

/// Placeholders a template may reference.
pub const KNOWN_PLACEHOLDERS: &[&str] = &["environment", "project", "tag"];

/// Names of the placeholders used in `template`, in order of appearance.
pub fn placeholders(template: &str) -> std::result::Result<Vec<String>, ConfigError> {
    let mut found = Vec::new();
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            ConfigError::Invalid(format!("unterminated placeholder in template '{template}'"))
        })?;
        found.push(after[..close].to_string());
        rest = &after[close + 1..];
    }
    Ok(found)
}

/// Check that `template` only uses placeholders from `allowed`.
pub fn validate(template: &str, allowed: &[&str]) -> std::result::Result<(), ConfigError> {
    for name in placeholders(template)? {
        if !allowed.contains(&name.as_str()) {
            return Err(ConfigError::UnknownPlaceholder {
                template: template.to_string(),
                placeholder: name,
            });
        }
    }
    Ok(())
}

/// Render `template`, substituting each `{name}` with its value in `vars`.
pub fn render(template: &str, vars: &[(&str, &str)]) -> std::result::Result<String, ConfigError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find('{') {
        out.push_str(&rest[..open]);
        let after = &rest[open + 1..];
        let close = after.find('}').ok_or_else(|| {
            ConfigError::Invalid(format!("unterminated placeholder in template '{template}'"))
        })?;
        let name = &after[..close];
        let value = vars
            .iter()
            .find(|(key, _)| *key == name)
            .map(|(_, value)| *value)
            .ok_or_else(|| ConfigError::UnknownPlaceholder {
                template: template.to_string(),
                placeholder: name.to_string(),
            })?;
        out.push_str(value);
        rest = &after[close + 1..];
    }
    out.push_str(rest);
    Ok(out)
}
