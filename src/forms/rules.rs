use crate::core::Value;
use crate::expression::pattern::cached_regex;

pub const REQUIRED_MESSAGE: &str = "This field is required.";
pub const INTEGER_MESSAGE: &str = "Enter a whole number.";
pub const EMAIL_MESSAGE: &str = "Enter a valid email address.";

const EMAIL_PATTERN: &str = r"^[^@\s]+@[^@\s]+\.[^@\s]+$";

/// How one submitted string becomes a field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldRule {
    /// Trimmed; empty reads as `Null`
    Text,
    Integer,
    /// `on`, `true` or `1`
    Checkbox,
    /// Prefixed with the configured scheme unless it already starts with `http`
    Url,
    Email,
    /// Raw id of a record of this kind
    Reference(String),
}

#[derive(Debug, Clone)]
pub struct FieldSpec {
    pub name: String,
    pub rule: FieldRule,
    pub required: bool,
}

impl FieldSpec {
    pub fn new(name: impl Into<String>, rule: FieldRule) -> Self {
        Self {
            name: name.into(),
            rule,
            required: false,
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

impl FieldRule {
    /// Converts a raw value; `Err` carries the validation message.
    /// References come back as the trimmed raw text for the caller to resolve.
    pub fn parse(&self, raw: Option<&str>, url_prefix: &str) -> Result<Value, &'static str> {
        let raw = raw.map(str::trim).unwrap_or("");

        match self {
            FieldRule::Checkbox => Ok(Value::Boolean(is_checked(raw))),
            _ if raw.is_empty() => Ok(Value::Null),
            FieldRule::Text | FieldRule::Reference(_) => Ok(Value::Text(raw.to_string())),
            FieldRule::Integer => raw
                .parse::<i64>()
                .map(Value::Integer)
                .map_err(|_| INTEGER_MESSAGE),
            FieldRule::Url => Ok(Value::Text(normalize_url(raw, url_prefix))),
            FieldRule::Email => {
                if is_valid_email(raw) {
                    Ok(Value::Text(raw.to_string()))
                } else {
                    Err(EMAIL_MESSAGE)
                }
            }
        }
    }
}

pub fn is_checked(raw: &str) -> bool {
    matches!(raw.trim().to_ascii_lowercase().as_str(), "on" | "true" | "1")
}

pub fn normalize_url(raw: &str, prefix: &str) -> String {
    if raw.starts_with("http") {
        raw.to_string()
    } else {
        format!("{}{}", prefix, raw)
    }
}

pub fn is_valid_email(raw: &str) -> bool {
    cached_regex(EMAIL_PATTERN)
        .map(|re| re.is_match(raw))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_rules() {
        let prefix = "http://";
        assert_eq!(FieldRule::Text.parse(Some("  Main St "), prefix), Ok(Value::from("Main St")));
        assert_eq!(FieldRule::Text.parse(Some("   "), prefix), Ok(Value::Null));
        assert_eq!(FieldRule::Integer.parse(Some("12"), prefix), Ok(Value::Integer(12)));
        assert_eq!(FieldRule::Integer.parse(Some("twelve"), prefix), Err(INTEGER_MESSAGE));
        assert_eq!(FieldRule::Checkbox.parse(Some("ON"), prefix), Ok(Value::Boolean(true)));
        assert_eq!(FieldRule::Checkbox.parse(None, prefix), Ok(Value::Boolean(false)));
        assert_eq!(
            FieldRule::Url.parse(Some("nagios.local/x"), prefix),
            Ok(Value::from("http://nagios.local/x"))
        );
        assert_eq!(
            FieldRule::Url.parse(Some("https://a.b"), prefix),
            Ok(Value::from("https://a.b"))
        );
        assert_eq!(FieldRule::Email.parse(Some("a@b"), prefix), Err(EMAIL_MESSAGE));
        assert!(FieldRule::Email.parse(Some("ada@example.com"), prefix).is_ok());
    }
}
