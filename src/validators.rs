use crate::error::{FieldFailure, ValidationError};
use crate::metadata::InputSpec;
use regex::Regex;
use std::sync::LazyLock;

static SLUG: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-z0-9]+(?:-[a-z0-9]+)*$").expect("valid slug regex"));
static EMAIL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("valid email regex"));
static URL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^https?://[^\s/]+\S*$").expect("valid url regex"));

/// Checks applied to a positional input after `pre_run`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validator {
    Required,
    Numeric,
    Slug,
    Email,
    Url,
}

impl Validator {
    /// Returns the failure message for `value`, or `None` when it passes.
    ///
    /// Only [`Validator::Required`] looks at missing values; every other
    /// validator accepts an absent optional input.
    pub fn check(&self, value: Option<&str>) -> Option<String> {
        let value = match (self, value) {
            (Validator::Required, None) => return Some("must not be empty".to_string()),
            (Validator::Required, Some(v)) if v.trim().is_empty() => {
                return Some("must not be empty".to_string());
            }
            (_, None) => return None,
            (_, Some(v)) => v,
        };

        match self {
            Validator::Required => None,
            Validator::Numeric => value
                .parse::<f64>()
                .is_err()
                .then(|| format!("`{value}` is not a number")),
            Validator::Slug => (!SLUG.is_match(value)).then(|| {
                format!("`{value}` must contain only lowercase letters, digits and dashes")
            }),
            Validator::Email => (!EMAIL.is_match(value))
                .then(|| format!("`{value}` is not a valid email address")),
            Validator::Url => (!URL.is_match(value))
                .then(|| format!("`{value}` is not a valid http(s) URL")),
        }
    }
}

/// Runs every declared validator against the positional `inputs`,
/// collecting all failures instead of stopping at the first.
pub fn validate_inputs(specs: &[InputSpec], inputs: &[String]) -> Result<(), ValidationError> {
    let failures: Vec<FieldFailure> = specs
        .iter()
        .enumerate()
        .flat_map(|(i, spec)| {
            let value = inputs.get(i).map(String::as_str);
            spec.validators.iter().filter_map(move |v| {
                v.check(value).map(|message| FieldFailure {
                    input: spec.name.clone(),
                    message,
                })
            })
        })
        .collect();

    if failures.is_empty() {
        Ok(())
    } else {
        Err(ValidationError { failures })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_required_rejects_missing_and_blank() {
        assert!(Validator::Required.check(None).is_some());
        assert!(Validator::Required.check(Some("  ")).is_some());
        assert!(Validator::Required.check(Some("app")).is_none());
    }

    #[test]
    fn test_optional_validators_skip_missing_values() {
        assert!(Validator::Numeric.check(None).is_none());
        assert!(Validator::Email.check(None).is_none());
    }

    #[test]
    fn test_pattern_validators() {
        assert!(Validator::Numeric.check(Some("8100")).is_none());
        assert!(Validator::Numeric.check(Some("eighty")).is_some());
        assert!(Validator::Slug.check(Some("my-app-2")).is_none());
        assert!(Validator::Slug.check(Some("My App")).is_some());
        assert!(Validator::Email.check(Some("dev@example.com")).is_none());
        assert!(Validator::Email.check(Some("dev@")).is_some());
        assert!(Validator::Url.check(Some("https://example.com/x")).is_none());
        assert!(Validator::Url.check(Some("ftp://example.com")).is_some());
    }

    #[test]
    fn test_validate_inputs_reports_field_names() {
        let specs = vec![
            InputSpec::new("name", "App name").required(),
            InputSpec::new("port", "Port").validator(Validator::Numeric),
        ];
        let err = validate_inputs(&specs, &["".to_string(), "abc".to_string()]).unwrap_err();

        let fields: Vec<&str> = err.failures.iter().map(|f| f.input.as_str()).collect();
        assert_eq!(fields, vec!["name", "port"]);
    }
}
