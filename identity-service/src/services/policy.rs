//! Password policy validation.
//!
//! Every rule runs and every violation is reported, so a client can show
//! all problems with a candidate password at once.

use crate::utils::FieldErrors;

/// Passwords rejected outright (compared case-insensitively).
const COMMON_PASSWORDS: &[&str] = &[
    "123456", "password", "12345678", "qwerty", "123456789", "12345", "1234", "111111",
    "1234567", "dragon", "123123", "baseball", "abc123", "football", "monkey", "letmein",
    "696969", "shadow", "master", "666666", "qwertyuiop", "123321", "mustang", "1234567890",
    "michael", "654321", "superman", "1qaz2wsx", "7777777", "121212", "000000", "qazwsx",
    "123qwe", "killer", "trustno1", "jordan", "jennifer", "zxcvbnm", "asdfgh", "hunter",
    "buster", "soccer", "harley", "batman", "andrew", "tigger", "sunshine", "iloveyou",
    "2000", "charlie", "robert", "thomas", "hockey", "ranger", "daniel", "starwars",
    "klaster", "112233", "george", "computer", "michelle", "jessica", "pepper", "1111",
    "zxcvbn", "555555", "11111111", "131313", "freedom", "777777", "pass", "maggie",
    "159753", "aaaaaa", "ginger", "princess", "joshua", "cheese", "amanda", "summer",
    "love", "ashley", "nicole", "chelsea", "biteme", "matthew", "access", "yankees",
    "987654321", "dallas", "austin", "thunder", "taylor", "matrix", "password1",
    "password123", "welcome", "welcome1", "admin", "admin123", "changeme", "passw0rd",
    "qwerty123", "iloveyou1", "letmein1", "secret", "healthcare", "doctor123",
];

/// Attributes of the account a password must not resemble.
#[derive(Debug, Clone, Default)]
pub struct PasswordContext<'a> {
    pub email: &'a str,
    pub first_name: &'a str,
    pub last_name: &'a str,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PolicyError {
    TooShort { min_length: usize },
    EntirelyNumeric,
    TooCommon,
    TooSimilar { attribute: &'static str },
}

impl std::fmt::Display for PolicyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PolicyError::TooShort { min_length } => write!(
                f,
                "This password is too short. It must contain at least {} characters.",
                min_length
            ),
            PolicyError::EntirelyNumeric => write!(f, "This password is entirely numeric."),
            PolicyError::TooCommon => write!(f, "This password is too common."),
            PolicyError::TooSimilar { attribute } => {
                write!(f, "The password is too similar to the {}.", attribute)
            }
        }
    }
}

impl std::error::Error for PolicyError {}

#[derive(Debug, Clone)]
pub struct PolicyService {
    min_length: usize,
}

impl PolicyService {
    pub fn new(min_length: usize) -> Self {
        Self { min_length }
    }

    /// All violations of `password`, in rule order.
    pub fn check_password(&self, password: &str, ctx: &PasswordContext<'_>) -> Vec<PolicyError> {
        let mut violations = Vec::new();

        if password.chars().count() < self.min_length {
            violations.push(PolicyError::TooShort {
                min_length: self.min_length,
            });
        }

        if !password.is_empty() && password.chars().all(|c| c.is_ascii_digit()) {
            violations.push(PolicyError::EntirelyNumeric);
        }

        let lowered = password.to_lowercase();
        if COMMON_PASSWORDS.iter().any(|p| *p == lowered) {
            violations.push(PolicyError::TooCommon);
        }

        let local_part = ctx.email.split('@').next().unwrap_or_default();
        let attributes = [
            ("email address", local_part),
            ("first name", ctx.first_name),
            ("last name", ctx.last_name),
        ];
        for (attribute, value) in attributes {
            let value = value.trim().to_lowercase();
            if value.chars().count() >= 3 && lowered.contains(&value) {
                violations.push(PolicyError::TooSimilar { attribute });
            }
        }

        violations
    }

    /// Run the policy and report violations under `field`.
    pub fn validate_into(
        &self,
        field: &str,
        password: &str,
        ctx: &PasswordContext<'_>,
        errors: &mut FieldErrors,
    ) {
        for violation in self.check_password(password, ctx) {
            errors.add(field, violation.to_string());
        }
    }
}

impl Default for PolicyService {
    fn default() -> Self {
        Self::new(8)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ctx() -> PasswordContext<'static> {
        PasswordContext {
            email: "jane.doe@example.com",
            first_name: "Jane",
            last_name: "Doe",
        }
    }

    #[test]
    fn test_strong_password_passes() {
        let policy = PolicyService::default();
        assert!(policy.check_password("Tr0ub4dor&3-horse", &ctx()).is_empty());
    }

    #[test]
    fn test_short_numeric_password_reports_every_rule() {
        let policy = PolicyService::default();
        let violations = policy.check_password("123456", &ctx());
        assert!(violations.contains(&PolicyError::TooShort { min_length: 8 }));
        assert!(violations.contains(&PolicyError::EntirelyNumeric));
        assert!(violations.contains(&PolicyError::TooCommon));
    }

    #[test]
    fn test_common_list_is_case_insensitive() {
        let policy = PolicyService::default();
        assert_eq!(
            policy.check_password("PassWord123", &ctx()),
            vec![PolicyError::TooCommon]
        );
    }

    #[test]
    fn test_password_similar_to_user_attributes() {
        let policy = PolicyService::default();
        let violations = policy.check_password("xxJANE.DOExx-2024", &ctx());
        assert!(violations.contains(&PolicyError::TooSimilar {
            attribute: "email address"
        }));
        assert!(violations.contains(&PolicyError::TooSimilar {
            attribute: "first name"
        }));
        assert!(violations.contains(&PolicyError::TooSimilar {
            attribute: "last name"
        }));
    }

    #[test]
    fn test_short_attributes_are_ignored() {
        let policy = PolicyService::default();
        let ctx = PasswordContext {
            email: "al@example.com",
            first_name: "Al",
            last_name: "Li",
        };
        assert!(policy.check_password("al-li-rocks-hard", &ctx).is_empty());
    }

    #[test]
    fn test_violations_land_on_the_named_field() {
        let policy = PolicyService::new(12);
        let mut errors = FieldErrors::new();
        policy.validate_into("new_password", "short-one", &ctx(), &mut errors);
        assert_eq!(errors.get("new_password").unwrap().len(), 1);
    }
}
