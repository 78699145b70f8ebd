use std::collections::BTreeMap;

use axum::{
    extract::{rejection::JsonRejection, FromRequest, Request},
    Json,
};
use serde::de::DeserializeOwned;
use validator::{Validate, ValidationErrors};

use crate::services::ServiceError;

/// Per-field error messages, ordered by field name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldErrors(BTreeMap<String, Vec<String>>);

impl FieldErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn single(field: &str, message: impl Into<String>) -> Self {
        let mut errors = Self::new();
        errors.add(field, message);
        errors
    }

    pub fn add(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_default()
            .push(message.into());
    }

    pub fn extend(&mut self, other: FieldErrors) {
        for (field, messages) in other.0 {
            self.0.entry(field).or_default().extend(messages);
        }
    }

    /// Fold derive-level errors in, preferring the message over the code.
    pub fn merge_validator(&mut self, errors: &ValidationErrors) {
        for (field, field_errors) in errors.field_errors() {
            for err in field_errors.iter() {
                let message = err
                    .message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| err.code.to_string());
                self.add(&field.to_string(), message);
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn get(&self, field: &str) -> Option<&Vec<String>> {
        self.0.get(field)
    }

    pub fn into_map(self) -> BTreeMap<String, Vec<String>> {
        self.0
    }

    /// `Ok(())` when empty, otherwise a validation error.
    pub fn into_result(self) -> Result<(), ServiceError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(ServiceError::Validation(self))
        }
    }
}

impl std::fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut first = true;
        for (field, messages) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            first = false;
            write!(f, "{}: {}", field, messages.join(", "))?;
        }
        Ok(())
    }
}

/// Ordered validation over one input: derive-level rules first, then each
/// `check` in turn. Every failure is collected before reporting.
pub struct ValidationPipeline<'a, T> {
    input: &'a T,
    errors: FieldErrors,
}

impl<'a, T: Validate> ValidationPipeline<'a, T> {
    pub fn of(input: &'a T) -> Self {
        let mut errors = FieldErrors::new();
        if let Err(e) = input.validate() {
            errors.merge_validator(&e);
        }
        Self { input, errors }
    }

    pub fn check<F>(mut self, rule: F) -> Self
    where
        F: FnOnce(&T, &mut FieldErrors),
    {
        rule(self.input, &mut self.errors);
        self
    }

    pub fn finish(self) -> Result<&'a T, ServiceError> {
        self.errors.into_result()?;
        Ok(self.input)
    }
}

/// JSON body extractor whose rejections render as `validation_error`.
pub struct JsonBody<T>(pub T);

#[axum::async_trait]
impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned + 'static,
    S: Send + Sync,
{
    type Rejection = ServiceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e: JsonRejection| {
                ServiceError::Validation(FieldErrors::single("body", e.body_text()))
            })?;

        Ok(JsonBody(value))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, Validate)]
    struct Signup {
        #[validate(email(message = "Enter a valid email address."))]
        email: String,
        #[validate(length(min = 1, message = "This field may not be blank."))]
        first_name: String,
        password: String,
        password_confirm: String,
    }

    #[test]
    fn test_pipeline_collects_all_failures() {
        let input = Signup {
            email: "not-an-email".to_string(),
            first_name: String::new(),
            password: "a".to_string(),
            password_confirm: "b".to_string(),
        };

        let err = ValidationPipeline::of(&input)
            .check(|i, errs| {
                if i.password != i.password_confirm {
                    errs.add("password_confirm", "Passwords do not match.");
                }
            })
            .finish()
            .unwrap_err();

        match err {
            ServiceError::Validation(fields) => {
                assert_eq!(
                    fields.get("email").unwrap(),
                    &vec!["Enter a valid email address.".to_string()]
                );
                assert!(fields.contains("first_name"));
                assert!(fields.contains("password_confirm"));
                assert!(!fields.contains("password"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_pipeline_passes_valid_input() {
        let input = Signup {
            email: "jane@example.com".to_string(),
            first_name: "Jane".to_string(),
            password: "same".to_string(),
            password_confirm: "same".to_string(),
        };

        let out = ValidationPipeline::of(&input).check(|_, _| {}).finish().unwrap();
        assert_eq!(out.first_name, "Jane");
    }

    #[test]
    fn test_field_errors_extend_and_display() {
        let mut a = FieldErrors::single("password", "Too short.");
        a.extend(FieldErrors::single("password", "Too common."));
        a.add("email", "Required.");

        assert_eq!(a.get("password").unwrap().len(), 2);
        assert_eq!(
            a.to_string(),
            "email: Required.; password: Too short., Too common."
        );
    }
}
