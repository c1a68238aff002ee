//! Prompt templating
//!
//! `{name}` placeholders are replaced from a value map; `{{` and `}}` yield
//! literal braces.

use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
    #[error("No value for placeholder '{0}'")]
    MissingField(String),

    #[error("Unbalanced brace at byte {0}")]
    UnbalancedBrace(usize),
}

/// Substitute `values` into `template`
pub fn render_template(
    template: &str,
    values: &BTreeMap<String, String>,
) -> Result<String, TemplateError> {
    let mut output = String::with_capacity(template.len());
    let mut chars = template.char_indices().peekable();

    while let Some((pos, c)) = chars.next() {
        match c {
            '{' => {
                if matches!(chars.peek(), Some((_, '{'))) {
                    chars.next();
                    output.push('{');
                    continue;
                }

                let mut name = String::new();
                let mut closed = false;
                for (_, c) in chars.by_ref() {
                    match c {
                        '}' => {
                            closed = true;
                            break;
                        }
                        '{' => return Err(TemplateError::UnbalancedBrace(pos)),
                        _ => name.push(c),
                    }
                }
                if !closed {
                    return Err(TemplateError::UnbalancedBrace(pos));
                }

                let name = name.trim();
                match values.get(name) {
                    Some(value) => output.push_str(value),
                    None => return Err(TemplateError::MissingField(name.to_string())),
                }
            }
            '}' => {
                if matches!(chars.peek(), Some((_, '}'))) {
                    chars.next();
                    output.push('}');
                } else {
                    return Err(TemplateError::UnbalancedBrace(pos));
                }
            }
            _ => output.push(c),
        }
    }

    Ok(output)
}
