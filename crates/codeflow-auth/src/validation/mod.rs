//! Result-accumulating validation pipeline.
//!
//! A [`Validator`] collects structured [`ValidationFailure`]s instead of
//! stopping at the first one, so a caller can report every problem with a
//! request at once. Field checks are chained through typed sub-validators:
//!
//! - [`Validator::string`] - presence, blank, length, pattern and URI checks
//! - [`Validator::object`] - presence of an arbitrary value
//! - [`Validator::integer`] - range checks
//! - [`Validator::enumerable`] - item count and per-item checks
//!
//! Within one chain, the first failure stops the remaining checks for that
//! field. Checks other than `required`/`not_blank` are skipped for absent
//! values, which is how optional fields are expressed.
//!
//! The authorization code flow rules live in [`rules`] as additional
//! `Validator` methods.
//!
//! # Example
//!
//! ```
//! use codeflow_auth::validation::{FailureCode, Target, Validator};
//!
//! let mut validator = Validator::new();
//! validator
//!     .string(Some(""), Target::new("Request", "client_id"))
//!     .not_blank()
//!     .done();
//!
//! let errors = validator.finish().unwrap_err();
//! assert!(errors.contains(FailureCode::Blank, "client_id"));
//! ```

pub mod rules;

use std::fmt;

use regex::Regex;
use serde::Serialize;
use url::Url;

// =============================================================================
// Failure Types
// =============================================================================

/// Machine-readable reason for a validation failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    /// A required value was absent.
    Required,
    /// A string value was empty or whitespace only.
    Blank,
    /// A string value was shorter than allowed.
    MinLength,
    /// A string value was longer than allowed.
    MaxLength,
    /// A string value did not match the required pattern.
    PatternMismatch,
    /// A numeric value was outside the allowed range.
    OutOfRange,
    /// A collection had fewer items than allowed.
    TooFewItems,
    /// A collection had more items than allowed.
    TooManyItems,
    /// A value was not a well-formed absolute URI.
    InvalidUri,
    /// A redirect URI does not belong to a trusted domain.
    UntrustedDomain,
    /// The client identifier does not resolve to a registered client.
    UnknownClient,
    /// A requested scope is not supported by the issuer.
    UnsupportedScope,
    /// A sealed token is structurally invalid.
    MalformedState,
    /// A sealed token was rejected by the sealer.
    TamperedState,
    /// A sealed token is older than its allowed lifetime.
    ExpiredState,
    /// The principal is not authenticated.
    Unauthenticated,
}

impl FailureCode {
    /// Returns the string representation of the failure code.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Required => "required",
            Self::Blank => "blank",
            Self::MinLength => "min_length",
            Self::MaxLength => "max_length",
            Self::PatternMismatch => "pattern_mismatch",
            Self::OutOfRange => "out_of_range",
            Self::TooFewItems => "too_few_items",
            Self::TooManyItems => "too_many_items",
            Self::InvalidUri => "invalid_uri",
            Self::UntrustedDomain => "untrusted_domain",
            Self::UnknownClient => "unknown_client",
            Self::UnsupportedScope => "unsupported_scope",
            Self::MalformedState => "malformed_state",
            Self::TamperedState => "tampered_state",
            Self::ExpiredState => "expired_state",
            Self::Unauthenticated => "unauthenticated",
        }
    }

    /// Returns `true` for failures raised while opening a sealed state or code.
    #[must_use]
    pub fn is_state_failure(&self) -> bool {
        matches!(
            self,
            Self::MalformedState | Self::TamperedState | Self::ExpiredState
        )
    }
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// The declaring type and field a rule is applied to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Target {
    /// Name of the type declaring the field.
    pub type_name: &'static str,
    /// Name of the field.
    pub field: &'static str,
}

impl Target {
    /// Creates a new validation target.
    #[must_use]
    pub const fn new(type_name: &'static str, field: &'static str) -> Self {
        Self { type_name, field }
    }
}

/// A single structured validation failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationFailure {
    /// Why the rule failed.
    pub code: FailureCode,
    /// Type declaring the offending field.
    pub type_name: &'static str,
    /// The offending field.
    pub field: &'static str,
    /// Optional offending item, e.g. the unsupported scope name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}: {}", self.type_name, self.field, self.code)?;
        if let Some(ref detail) = self.detail {
            write!(f, " ({detail})")?;
        }
        Ok(())
    }
}

/// All failures accumulated by a [`Validator`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors(Vec<ValidationFailure>);

impl ValidationErrors {
    /// Creates a failure list holding a single failure.
    #[must_use]
    pub fn single(target: Target, code: FailureCode) -> Self {
        Self(vec![ValidationFailure {
            code,
            type_name: target.type_name,
            field: target.field,
            detail: None,
        }])
    }

    /// Returns the number of failures.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns `true` if there are no failures.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Iterates over the failures in the order they were recorded.
    pub fn iter(&self) -> impl Iterator<Item = &ValidationFailure> {
        self.0.iter()
    }

    /// Returns `true` if a failure with the given code was recorded for `field`.
    #[must_use]
    pub fn contains(&self, code: FailureCode, field: &str) -> bool {
        self.0.iter().any(|f| f.code == code && f.field == field)
    }

    /// Returns `true` if any failure carries the given code.
    #[must_use]
    pub fn has_code(&self, code: FailureCode) -> bool {
        self.0.iter().any(|f| f.code == code)
    }

    /// Returns `true` if any failure concerns a sealed state or code.
    #[must_use]
    pub fn has_state_failure(&self) -> bool {
        self.0.iter().any(|f| f.code.is_state_failure())
    }

    /// Describes the failures for an error response sent to the client.
    ///
    /// State failures collapse into a single `invalid state` message. Other
    /// failures are reported as `field: code`, without the declaring type or
    /// any detail.
    #[must_use]
    pub fn public_description(&self) -> String {
        if self.has_state_failure() {
            return "invalid state".to_string();
        }

        let mut parts: Vec<String> = Vec::with_capacity(self.0.len());
        for failure in &self.0 {
            let part = format!("{}: {}", failure.field, failure.code);
            if !parts.contains(&part) {
                parts.push(part);
            }
        }
        parts.join("; ")
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, failure) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{failure}")?;
        }
        Ok(())
    }
}

impl std::error::Error for ValidationErrors {}

// =============================================================================
// Validator
// =============================================================================

/// Accumulates validation failures across many rules.
#[derive(Debug, Default)]
pub struct Validator {
    failures: Vec<ValidationFailure>,
}

impl Validator {
    /// Creates an empty validator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a failure for `target`.
    pub fn fail(&mut self, target: Target, code: FailureCode) -> &mut Self {
        self.push(target, code, None)
    }

    /// Records a failure for `target` naming the offending item.
    pub fn fail_with(
        &mut self,
        target: Target,
        code: FailureCode,
        detail: impl Into<String>,
    ) -> &mut Self {
        self.push(target, code, Some(detail.into()))
    }

    fn push(&mut self, target: Target, code: FailureCode, detail: Option<String>) -> &mut Self {
        self.failures.push(ValidationFailure {
            code,
            type_name: target.type_name,
            field: target.field,
            detail,
        });
        self
    }

    /// Starts a chain of string checks.
    pub fn string<'v, 's>(&'v mut self, value: Option<&'s str>, target: Target) -> StringRules<'v, 's> {
        StringRules {
            validator: self,
            value,
            target,
            stopped: false,
        }
    }

    /// Checks that a value is present.
    pub fn object<T: ?Sized>(&mut self, value: Option<&T>, target: Target) -> &mut Self {
        if value.is_none() {
            self.fail(target, FailureCode::Required);
        }
        self
    }

    /// Starts a chain of integer checks.
    pub fn integer(&mut self, value: Option<i64>, target: Target) -> IntegerRules<'_> {
        IntegerRules {
            validator: self,
            value,
            target,
            stopped: false,
        }
    }

    /// Starts a chain of collection checks.
    pub fn enumerable<'v, 's, T>(
        &'v mut self,
        values: Option<&'s [T]>,
        target: Target,
    ) -> EnumerableRules<'v, 's, T> {
        EnumerableRules {
            validator: self,
            values,
            target,
            stopped: false,
        }
    }

    /// Returns `true` if no failures have been recorded.
    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.failures.is_empty()
    }

    /// Returns the failures recorded so far.
    #[must_use]
    pub fn failures(&self) -> &[ValidationFailure] {
        &self.failures
    }

    /// Finishes validation.
    ///
    /// # Errors
    ///
    /// Returns every accumulated failure if any rule failed.
    pub fn finish(self) -> Result<(), ValidationErrors> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(ValidationErrors(self.failures))
        }
    }
}

// =============================================================================
// String Rules
// =============================================================================

/// Chained checks over an optional string value.
pub struct StringRules<'v, 's> {
    validator: &'v mut Validator,
    value: Option<&'s str>,
    target: Target,
    stopped: bool,
}

impl<'v, 's> StringRules<'v, 's> {
    fn reject(mut self, code: FailureCode) -> Self {
        self.validator.fail(self.target, code);
        self.stopped = true;
        self
    }

    fn check(self, passes: impl FnOnce(&str) -> bool, code: FailureCode) -> Self {
        let failed = match self.value {
            Some(value) if !self.stopped => !passes(value),
            _ => false,
        };
        if failed { self.reject(code) } else { self }
    }

    /// The value must be present.
    #[must_use]
    pub fn required(self) -> Self {
        if !self.stopped && self.value.is_none() {
            return self.reject(FailureCode::Required);
        }
        self
    }

    /// The value must be present and contain a non-whitespace character.
    #[must_use]
    pub fn not_blank(self) -> Self {
        let this = self.required();
        this.check(|v| !v.trim().is_empty(), FailureCode::Blank)
    }

    /// The value must have at least `min` characters.
    #[must_use]
    pub fn min_length(self, min: usize) -> Self {
        self.check(|v| v.chars().count() >= min, FailureCode::MinLength)
    }

    /// The value must have at most `max` characters.
    #[must_use]
    pub fn max_length(self, max: usize) -> Self {
        self.check(|v| v.chars().count() <= max, FailureCode::MaxLength)
    }

    /// The value must match `pattern`.
    #[must_use]
    pub fn matches(self, pattern: &Regex) -> Self {
        self.check(|v| pattern.is_match(v), FailureCode::PatternMismatch)
    }

    /// The value must be a well-formed absolute URI with a hierarchical part.
    #[must_use]
    pub fn absolute_uri(self) -> Self {
        self.check(
            |v| Url::parse(v).is_ok_and(|url| !url.cannot_be_a_base()),
            FailureCode::InvalidUri,
        )
    }

    /// The value must satisfy `predicate`, otherwise `code` is recorded.
    #[must_use]
    pub fn must(self, predicate: impl FnOnce(&str) -> bool, code: FailureCode) -> Self {
        self.check(predicate, code)
    }

    /// Ends the chain, returning the value if every check passed.
    ///
    /// Absent optional values yield `None` as well.
    #[must_use]
    pub fn valid_value(self) -> Option<&'s str> {
        if self.stopped { None } else { self.value }
    }

    /// Ends the chain.
    pub fn done(self) -> &'v mut Validator {
        self.validator
    }
}

// =============================================================================
// Integer Rules
// =============================================================================

/// Chained checks over an optional integer value.
pub struct IntegerRules<'v> {
    validator: &'v mut Validator,
    value: Option<i64>,
    target: Target,
    stopped: bool,
}

impl<'v> IntegerRules<'v> {
    /// The value must be present.
    #[must_use]
    pub fn required(mut self) -> Self {
        if !self.stopped && self.value.is_none() {
            self.validator.fail(self.target, FailureCode::Required);
            self.stopped = true;
        }
        self
    }

    /// The value must lie within `min..=max`, otherwise `code` is recorded.
    #[must_use]
    pub fn between(mut self, min: i64, max: i64, code: FailureCode) -> Self {
        if let Some(value) = self.value {
            if !self.stopped && !(min..=max).contains(&value) {
                self.validator.fail(self.target, code);
                self.stopped = true;
            }
        }
        self
    }

    /// Ends the chain.
    pub fn done(self) -> &'v mut Validator {
        self.validator
    }
}

// =============================================================================
// Enumerable Rules
// =============================================================================

/// Chained checks over an optional slice.
pub struct EnumerableRules<'v, 's, T> {
    validator: &'v mut Validator,
    values: Option<&'s [T]>,
    target: Target,
    stopped: bool,
}

impl<'v, 's, T> EnumerableRules<'v, 's, T> {
    fn reject(&mut self, code: FailureCode) {
        self.validator.fail(self.target, code);
        self.stopped = true;
    }

    /// The collection must be present.
    #[must_use]
    pub fn required(mut self) -> Self {
        if !self.stopped && self.values.is_none() {
            self.reject(FailureCode::Required);
        }
        self
    }

    /// The collection must hold at least `min` items.
    #[must_use]
    pub fn min_count(mut self, min: usize) -> Self {
        if let Some(values) = self.values {
            if !self.stopped && values.len() < min {
                self.reject(FailureCode::TooFewItems);
            }
        }
        self
    }

    /// The collection must hold at most `max` items.
    #[must_use]
    pub fn max_count(mut self, max: usize) -> Self {
        if let Some(values) = self.values {
            if !self.stopped && values.len() > max {
                self.reject(FailureCode::TooManyItems);
            }
        }
        self
    }

    /// Every item must satisfy `predicate`.
    ///
    /// Each offending item is recorded separately with the item as detail.
    #[must_use]
    pub fn each(mut self, mut predicate: impl FnMut(&T) -> bool, code: FailureCode) -> Self
    where
        T: fmt::Display,
    {
        let Some(values) = self.values else {
            return self;
        };
        if self.stopped {
            return self;
        }
        for item in values {
            if !predicate(item) {
                self.validator.fail_with(self.target, code, item.to_string());
                self.stopped = true;
            }
        }
        self
    }

    /// Ends the chain.
    pub fn done(self) -> &'v mut Validator {
        self.validator
    }
}
