//! Helpers for pulling structured data out of free-form model answers.
//!
//! Models are asked to answer inside a fenced ```yaml block. Anything outside
//! the fence is ignored; everything inside is validated field by field.

use serde_yaml::{Mapping, Value};

use crate::error::ParseError;

/// The body of the first ```yaml (or ```yml) fence, else the first fence of
/// any kind, else the whole text.
pub fn extract_yaml_block(response: &str) -> &str {
    for tag in ["```yaml", "```yml"] {
        if let Some(body) = fenced_after(response, tag) {
            return body;
        }
    }
    fenced_after(response, "```").unwrap_or(response).trim()
}

fn fenced_after<'a>(text: &'a str, opening: &str) -> Option<&'a str> {
    let start = text.find(opening)?;
    let after_tag = &text[start + opening.len()..];
    // The opening line may carry more info string text; the body starts on the next line.
    let body_start = after_tag.find('\n').map(|i| i + 1).unwrap_or(after_tag.len());
    let body = &after_tag[body_start..];
    let end = body.find("```").unwrap_or(body.len());
    Some(body[..end].trim())
}

pub fn parse_yaml(response: &str) -> Result<Value, ParseError> {
    let block = extract_yaml_block(response);
    if block.is_empty() {
        return Err(ParseError::Empty);
    }
    serde_yaml::from_str(block).map_err(|e| ParseError::InvalidYaml(e.to_string()))
}

/// A reference to an indexed item, as models tend to write it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IndexRef {
    Index(usize),
    Name(String),
}

impl IndexRef {
    /// Accepts `3`, `"3"`, `"3 # path/or/name"` or a plain name.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_u64().map(|n| IndexRef::Index(n as usize)),
            Value::String(s) => {
                let head = s.split('#').next().unwrap_or_default().trim();
                if let Ok(index) = head.parse::<usize>() {
                    return Some(IndexRef::Index(index));
                }
                let name = s.trim();
                if name.is_empty() {
                    None
                } else {
                    Some(IndexRef::Name(name.to_string()))
                }
            }
            _ => None,
        }
    }
}

/// A non-empty string field of a YAML mapping.
pub fn required_text(map: &Mapping, key: &str) -> Result<String, ParseError> {
    match map.get(key) {
        Some(Value::String(s)) if !s.trim().is_empty() => Ok(s.trim().to_string()),
        Some(Value::String(_)) => Err(ParseError::Schema(format!("field `{key}` is empty"))),
        Some(_) => Err(ParseError::Schema(format!("field `{key}` is not a string"))),
        None => Err(ParseError::Schema(format!("missing field `{key}`"))),
    }
}
