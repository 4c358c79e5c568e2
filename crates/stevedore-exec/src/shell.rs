//! Shell quoting and command templates

use crate::error::ExecError;

/// Quote a value for safe interpolation into an `sh -c` command line
#[must_use]
pub fn quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value.chars().all(|c| {
            c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '/' | ':' | '=' | '@' | '+' | ',')
        });
    if safe {
        value.to_string()
    } else {
        format!("'{}'", value.replace('\'', r"'\''"))
    }
}

/// Substitute `{key}` placeholders in a command template
///
/// Values are shell-quoted. A placeholder without a matching variable is an
/// error rather than being left in the command line.
///
/// # Errors
/// Returns [`ExecError::InvalidCommand`] for unknown or unterminated
/// placeholders.
pub fn render_template(template: &str, vars: &[(&str, &str)]) -> Result<String, ExecError> {
    let mut out = String::with_capacity(template.len());
    let mut rest = template;

    while let Some(start) = rest.find('{') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let end = after.find('}').ok_or_else(|| {
            ExecError::InvalidCommand(format!("unterminated placeholder in `{template}`"))
        })?;
        let key = &after[..end];
        let value = vars
            .iter()
            .find(|(k, _)| *k == key)
            .map(|(_, v)| *v)
            .ok_or_else(|| ExecError::InvalidCommand(format!("unknown placeholder `{{{key}}}`")))?;
        out.push_str(&quote(value));
        rest = &after[end + 1..];
    }
    out.push_str(rest);

    Ok(out)
}
