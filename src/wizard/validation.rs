//! Field-level validation for wizard step outputs
//!
//! Rules collect errors per field instead of failing fast so a step can
//! surface every problem at once.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

/// Maximum length accepted for names and identifiers
pub const MAX_NAME_LENGTH: usize = 128;

/// Maximum length accepted for free-text descriptions
pub const MAX_DESCRIPTION_LENGTH: usize = 1024;

static IDENTIFIER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-zA-Z_][0-9a-zA-Z_$]*$").expect("identifier regex is valid"));

static NAME_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[0-9a-zA-Z_][-0-9a-zA-Z_\s.]*$").expect("name regex is valid"));

/// Secret and connector references may carry an `account.` or `org.` scope prefix
static SCOPED_REF_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(account\.|org\.)?[a-zA-Z_][0-9a-zA-Z_$]*$").expect("scoped ref regex is valid")
});

static SCP_GIT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[a-zA-Z0-9_.-]+@[a-zA-Z0-9.-]+:[^\s]+$").expect("scp git regex is valid")
});

/// Words the backend refuses as entity identifiers
const RESERVED_IDENTIFIERS: &[&str] = &["or", "and", "eq", "ne", "lt", "gt", "le", "ge", "null", "true", "false"];

/// Field errors produced by a failed step validation
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    fields: BTreeMap<String, Vec<String>>,
}

impl ValidationErrors {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record an error message against a field
    pub fn add(&mut self, field: impl Into<String>, message: impl Into<String>) {
        self.fields
            .entry(field.into())
            .or_default()
            .push(message.into());
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn len(&self) -> usize {
        self.fields.values().map(Vec::len).sum()
    }

    /// Messages recorded for a field, if any
    pub fn field(&self, field: &str) -> Option<&[String]> {
        self.fields.get(field).map(Vec::as_slice)
    }

    pub fn has_field(&self, field: &str) -> bool {
        self.fields.contains_key(field)
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, &[String])> {
        self.fields
            .iter()
            .map(|(field, messages)| (field.as_str(), messages.as_slice()))
    }

    /// Fold another set of errors into this one
    pub fn extend(&mut self, other: ValidationErrors) {
        for (field, messages) in other.fields {
            self.fields.entry(field).or_default().extend(messages);
        }
    }

    /// `Ok(())` when no errors were recorded
    pub fn into_result(self) -> Result<(), ValidationErrors> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self)
        }
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, messages) in &self.fields {
            for message in messages {
                if !first {
                    write!(f, "; ")?;
                }
                write!(f, "{}: {}", field, message)?;
                first = false;
            }
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

/// Builder that applies rules to fields and accumulates their errors
#[derive(Debug, Default)]
pub struct Validator {
    errors: ValidationErrors,
}

impl Validator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Field must be present and not blank
    pub fn required(&mut self, field: &str, label: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.errors.add(field, format!("{} is required", label));
        }
        self
    }

    /// Optional variant of [`Validator::required`]
    pub fn required_opt(&mut self, field: &str, label: &str, value: Option<&str>) -> &mut Self {
        self.required(field, label, value.unwrap_or_default())
    }

    pub fn max_len(&mut self, field: &str, label: &str, value: &str, max: usize) -> &mut Self {
        if value.chars().count() > max {
            self.errors
                .add(field, format!("{} must be at most {} characters", label, max));
        }
        self
    }

    /// Display names: letters, digits, dashes, dots and spaces
    pub fn name(&mut self, field: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.errors.add(field, "Name is required");
            return self;
        }
        if !NAME_RE.is_match(value) {
            self.errors.add(
                field,
                "Name can only contain alphanumerics, _, -, . and spaces",
            );
        }
        self.max_len(field, "Name", value, MAX_NAME_LENGTH)
    }

    /// Entity identifiers: `[a-zA-Z_][0-9a-zA-Z_$]*`, not a reserved word
    pub fn identifier(&mut self, field: &str, value: &str) -> &mut Self {
        if value.is_empty() {
            self.errors.add(field, "Identifier is required");
            return self;
        }
        if value.starts_with(|c: char| c.is_ascii_digit()) {
            self.errors.add(field, "Identifier cannot start with a number");
        } else if !IDENTIFIER_RE.is_match(value) {
            self.errors
                .add(field, "Identifier can only contain alphanumerics, _ and $");
        }
        if RESERVED_IDENTIFIERS.contains(&value.to_lowercase().as_str()) {
            self.errors
                .add(field, format!("Identifier cannot be the keyword '{}'", value));
        }
        self.max_len(field, "Identifier", value, MAX_NAME_LENGTH)
    }

    /// References to secrets or connectors, optionally scope-prefixed
    pub fn scoped_ref(&mut self, field: &str, label: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.errors.add(field, format!("{} is required", label));
        } else if !SCOPED_REF_RE.is_match(value) {
            self.errors
                .add(field, format!("{} is not a valid reference", label));
        }
        self
    }

    /// Absolute http(s) URL
    pub fn http_url(&mut self, field: &str, label: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.errors.add(field, format!("{} is required", label));
            return self;
        }
        match reqwest::Url::parse(value) {
            Ok(url) if matches!(url.scheme(), "http" | "https") && url.host().is_some() => {}
            _ => self.errors.add(field, format!("{} is not a valid URL", label)),
        }
        self
    }

    /// Git remotes accept http(s), ssh:// and scp-style `git@host:path`
    pub fn git_url(&mut self, field: &str, label: &str, value: &str) -> &mut Self {
        if value.trim().is_empty() {
            self.errors.add(field, format!("{} is required", label));
            return self;
        }
        let valid = match reqwest::Url::parse(value) {
            Ok(url) => matches!(url.scheme(), "http" | "https" | "ssh") && url.host().is_some(),
            Err(_) => SCP_GIT_RE.is_match(value),
        };
        if !valid {
            self.errors
                .add(field, format!("{} is not a valid Git URL", label));
        }
        self
    }

    /// At least one non-blank entry
    pub fn non_empty_list(&mut self, field: &str, message: &str, values: &[String]) -> &mut Self {
        if values.iter().all(|v| v.trim().is_empty()) {
            self.errors.add(field, message);
        }
        self
    }

    /// Record an arbitrary error when `condition` holds
    pub fn check(&mut self, condition: bool, field: &str, message: impl Into<String>) -> &mut Self {
        if condition {
            self.errors.add(field, message);
        }
        self
    }

    pub fn finish(&mut self) -> Result<(), ValidationErrors> {
        std::mem::take(&mut self.errors).into_result()
    }
}
