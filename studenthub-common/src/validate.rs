//! Request validation.
//!
//! Every request body that carries user input implements [`Validate`]. A
//! failed validation reports every offending field at once, keyed by the
//! field name used on the wire.

use regex::Regex;
use serde::Serialize;
use std::{
    collections::BTreeMap,
    fmt::{Display, Formatter},
    sync::LazyLock,
};
use thiserror::Error;

static EMAIL_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z0-9.!#$%&'*+/=?^_`{|}~-]+@[a-zA-Z0-9-]+(?:\.[a-zA-Z0-9-]+)*$")
        .expect("email regex is valid")
});
static PHONE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\+\d+$").expect("phone regex is valid"));
static NAME_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[a-zA-Z_ ]+([\s-][a-zA-Z_ ]+)*$").expect("name regex is valid")
});
static PASSWORD_SPECIAL_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[@$!%*?&]").expect("password regex is valid"));

pub const PASSWORD_MIN_LEN: usize = 8;

#[derive(Clone, Eq, PartialEq, Debug, Default, Serialize, Error)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<&'static str, Vec<String>>);

impl FieldErrors {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn single(field: &'static str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &'static str, message: impl Into<String>) {
        self.0.entry(field).or_default().push(message.into());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    #[must_use]
    pub fn get(&self, field: &str) -> Option<&[String]> {
        self.0.get(field).map(Vec::as_slice)
    }

    pub fn into_result(self) -> Result<(), Self> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl Display for FieldErrors {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        let fields = self.0.keys().copied().collect::<Vec<_>>().join(", ");
        write!(f, "Request failed validation for fields: {fields}")
    }
}

pub trait Validate {
    fn validate(&self) -> Result<(), FieldErrors>;
}

pub fn check_length(errors: &mut FieldErrors, field: &'static str, value: &str, min: usize, max: usize) {
    let len = value.chars().count();
    if len < min || len > max {
        errors.add(
            field,
            format!("Length must be between {min} and {max} characters."),
        );
    }
}

pub fn check_name(errors: &mut FieldErrors, field: &'static str, value: &str) {
    check_length(errors, field, value, 1, 50);
    if !NAME_REGEX.is_match(value) {
        errors.add(
            field,
            "Field should consist only of letters, spaces or dashes.",
        );
    }
}

pub fn check_email(errors: &mut FieldErrors, field: &'static str, value: &str) {
    check_length(errors, field, value, 3, 150);
    if !EMAIL_REGEX.is_match(value) {
        errors.add(field, "Entered email is invalid.");
    }
}

pub fn check_phone(errors: &mut FieldErrors, field: &'static str, value: &str) {
    if !PHONE_REGEX.is_match(value) {
        errors.add(field, "Entered phone number is invalid.");
    }
}

pub fn check_password(errors: &mut FieldErrors, field: &'static str, value: &str) {
    if value.chars().count() < PASSWORD_MIN_LEN {
        errors.add(
            field,
            format!("Password should have a minimum length of {PASSWORD_MIN_LEN} characters."),
        );
    }
    if !value.chars().any(|c| c.is_ascii_uppercase()) {
        errors.add(field, "Password should contain at least one uppercase letter.");
    }
    if !value.chars().any(|c| c.is_ascii_lowercase()) {
        errors.add(field, "Password should contain at least one lowercase letter.");
    }
    if !value.chars().any(|c| c.is_ascii_digit()) {
        errors.add(field, "Password should contain at least one digit.");
    }
    if !PASSWORD_SPECIAL_REGEX.is_match(value) {
        errors.add(
            field,
            "Password should contain at least one special character from the set [@ $ ! % * ? &].",
        );
    }
}

#[cfg(test)]
mod tests {
    use crate::validate::{FieldErrors, check_email, check_name, check_password, check_phone};

    #[test]
    fn emails() {
        let mut errors = FieldErrors::new();
        check_email(&mut errors, "email", "jane.doe@uni.example.org");
        assert!(errors.is_empty());

        for invalid in ["jane", "jane@", "@uni.org", "jane doe@uni.org"] {
            let mut errors = FieldErrors::new();
            check_email(&mut errors, "email", invalid);
            assert!(errors.get("email").is_some(), "{invalid} should be rejected");
        }
    }

    #[test]
    fn phones() {
        let mut errors = FieldErrors::new();
        check_phone(&mut errors, "phone", "+380501234567");
        assert!(errors.is_empty());

        check_phone(&mut errors, "phone", "0501234567");
        check_phone(&mut errors, "phone", "+38 050");
        assert_eq!(errors.get("phone").unwrap().len(), 2);
    }

    #[test]
    fn names() {
        let mut errors = FieldErrors::new();
        check_name(&mut errors, "name", "Mary Jane");
        check_name(&mut errors, "name", "Smith-Jones");
        assert!(errors.is_empty());

        check_name(&mut errors, "name", "R2D2");
        assert!(errors.get("name").is_some());
    }

    #[test]
    fn password_reports_every_missing_class() {
        let mut errors = FieldErrors::new();
        check_password(&mut errors, "password", "abc");
        assert_eq!(errors.get("password").unwrap().len(), 4);

        let mut errors = FieldErrors::new();
        check_password(&mut errors, "password", "Str0ng!Pass");
        assert!(errors.is_empty());
    }

    #[test]
    fn into_result_and_display() {
        assert!(FieldErrors::new().into_result().is_ok());

        let mut errors = FieldErrors::new();
        errors.add("text", "too long");
        errors.add("heading", "missing");
        let err = errors.into_result().unwrap_err();
        assert_eq!(
            err.to_string(),
            "Request failed validation for fields: heading, text"
        );
        assert_eq!(
            serde_json::to_value(&err).unwrap(),
            serde_json::json!({"heading": ["missing"], "text": ["too long"]})
        );
    }
}
