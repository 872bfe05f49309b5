//! Declarative form validation.
//!
//! A [`Schema`] lists the fields a collection accepts and the constraints on
//! each. Validating raw form input yields either a [`NormalizedRecord`]
//! (strings NFC-normalized and trimmed, empty optionals as `null`, integers
//! parsed) or [`FieldErrors`] keyed by field name.

use std::collections::BTreeMap;
use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use unicode_normalization::UnicodeNormalization;

use crate::time::parse_date;

pub mod schemas;

static HEX_COLOR_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#[0-9A-Fa-f]{6}$").expect("hex color validation pattern to compile")
});

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email validation pattern to compile")
});

static URL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^https?://[^\s/$.?#][^\s]*$").expect("url validation pattern to compile")
});

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Integer,
    /// `YYYY-MM-DD`, stored as text.
    Date,
}

pub enum Rule {
    MaxLength(usize),
    Pattern {
        regex: &'static Lazy<Regex>,
        message: &'static str,
    },
    OneOf(&'static [&'static str]),
    Email,
    Url,
    HexColor,
    /// Inclusive bounds for integer fields.
    Range(i64, i64),
}

/// Record-level rule evaluated once every field passed.
pub type CrossCheck = fn(&NormalizedRecord) -> Option<(&'static str, String)>;

pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
    pub rules: Vec<Rule>,
}

impl FieldSpec {
    pub fn text(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Text)
    }

    pub fn integer(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Integer)
    }

    pub fn date(name: &'static str, label: &'static str) -> Self {
        Self::new(name, label, FieldKind::Date)
    }

    fn new(name: &'static str, label: &'static str, kind: FieldKind) -> Self {
        FieldSpec {
            name,
            label,
            kind,
            required: false,
            rules: Vec::new(),
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn rule(mut self, rule: Rule) -> Self {
        self.rules.push(rule);
        self
    }

    pub fn max_len(self, max: usize) -> Self {
        self.rule(Rule::MaxLength(max))
    }

    fn check(&self, raw: Option<&Value>) -> Result<Value, String> {
        let Some(cleaned) = clean_input(raw).map_err(|msg| format!("{} {msg}", self.label))?
        else {
            if self.required {
                return Err(format!("{} is required.", self.label));
            }
            return Ok(Value::Null);
        };

        let value = match self.kind {
            FieldKind::Text => Value::String(cleaned),
            FieldKind::Integer => cleaned
                .parse::<i64>()
                .map(Value::from)
                .map_err(|_| format!("{} must be a whole number.", self.label))?,
            FieldKind::Date => {
                if parse_date(&cleaned).is_none() {
                    return Err(format!("{} must be a date in YYYY-MM-DD format.", self.label));
                }
                Value::String(cleaned)
            }
        };

        for rule in &self.rules {
            self.apply_rule(rule, &value)?;
        }
        Ok(value)
    }

    fn apply_rule(&self, rule: &Rule, value: &Value) -> Result<(), String> {
        let label = self.label;
        match (rule, value) {
            (Rule::MaxLength(max), Value::String(s)) => {
                if s.chars().count() > *max {
                    return Err(format!("{label} must be at most {max} characters."));
                }
            }
            (Rule::Pattern { regex, message }, Value::String(s)) => {
                if !regex.is_match(s) {
                    return Err((*message).to_string());
                }
            }
            (Rule::OneOf(options), Value::String(s)) => {
                if !options.contains(&s.as_str()) {
                    return Err(format!("{label} must be one of: {}.", options.join(", ")));
                }
            }
            (Rule::Email, Value::String(s)) => {
                if !EMAIL_PATTERN.is_match(s) {
                    return Err(format!("{label} must be a valid email address."));
                }
            }
            (Rule::Url, Value::String(s)) => {
                if !URL_PATTERN.is_match(s) {
                    return Err(format!("{label} must be a web address starting with http:// or https://."));
                }
            }
            (Rule::HexColor, Value::String(s)) => {
                if !HEX_COLOR_PATTERN.is_match(s) {
                    return Err(format!("{label} must be # followed by six hex digits, like #1A2B3C."));
                }
            }
            (Rule::Range(min, max), Value::Number(n)) => {
                let within = n.as_i64().map(|v| (*min..=*max).contains(&v)).unwrap_or(false);
                if !within {
                    return Err(format!("{label} must be between {min} and {max}."));
                }
            }
            _ => {}
        }
        Ok(())
    }
}

/// Trims and normalizes a raw form value. `Ok(None)` means "left blank".
fn clean_input(raw: Option<&Value>) -> Result<Option<String>, &'static str> {
    match raw {
        None | Some(Value::Null) => Ok(None),
        Some(Value::String(s)) => {
            let normalized: String = s.nfc().collect();
            let trimmed = normalized.trim();
            if trimmed.is_empty() {
                Ok(None)
            } else {
                Ok(Some(trimmed.to_string()))
            }
        }
        Some(Value::Number(n)) => Ok(Some(n.to_string())),
        Some(_) => Err("has an unsupported value."),
    }
}

pub struct Schema {
    pub fields: Vec<FieldSpec>,
    pub checks: Vec<CrossCheck>,
}

impl Schema {
    pub fn new(fields: Vec<FieldSpec>) -> Self {
        Schema {
            fields,
            checks: Vec::new(),
        }
    }

    pub fn with_check(mut self, check: CrossCheck) -> Self {
        self.checks.push(check);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Validates a full form. Every declared field ends up in the output; unknown keys are dropped.
    pub fn validate(&self, raw: &Map<String, Value>) -> Result<NormalizedRecord, FieldErrors> {
        let record = self.check_fields(raw, false)?;
        self.cross_check(&record)?;
        Ok(record)
    }

    /// Validates only the fields present in `raw`. Cross-field checks see the
    /// patch alone; use [`validate_patch`](Self::validate_patch) when the
    /// stored row is at hand.
    pub fn validate_partial(
        &self,
        raw: &Map<String, Value>,
    ) -> Result<NormalizedRecord, FieldErrors> {
        let patch = self.check_fields(raw, true)?;
        self.cross_check(&patch)?;
        Ok(patch)
    }

    /// Validates a patch against `current`, the stored row it applies to.
    /// Field rules cover the keys present in `raw`; cross-field checks run
    /// on `current` overlaid with the patch. Returns the patch only.
    pub fn validate_patch(
        &self,
        raw: &Map<String, Value>,
        current: &Map<String, Value>,
    ) -> Result<NormalizedRecord, FieldErrors> {
        let patch = self.check_fields(raw, true)?;
        let mut merged: Map<String, Value> = self
            .fields
            .iter()
            .filter_map(|spec| {
                current
                    .get(spec.name)
                    .map(|value| (spec.name.to_string(), value.clone()))
            })
            .collect();
        for (field, value) in patch.iter() {
            merged.insert(field.clone(), value.clone());
        }
        self.cross_check(&NormalizedRecord(merged))?;
        Ok(patch)
    }

    fn check_fields(
        &self,
        raw: &Map<String, Value>,
        partial: bool,
    ) -> Result<NormalizedRecord, FieldErrors> {
        let mut out = Map::new();
        let mut errors = FieldErrors::default();

        for spec in &self.fields {
            if partial && !raw.contains_key(spec.name) {
                continue;
            }
            match spec.check(raw.get(spec.name)) {
                Ok(value) => {
                    out.insert(spec.name.to_string(), value);
                }
                Err(message) => errors.insert(spec.name, message),
            }
        }

        if errors.is_empty() {
            Ok(NormalizedRecord(out))
        } else {
            Err(errors)
        }
    }

    fn cross_check(&self, record: &NormalizedRecord) -> Result<(), FieldErrors> {
        let mut errors = FieldErrors::default();
        for check in &self.checks {
            if let Some((field, message)) = check(record) {
                errors.insert(field, message);
            }
        }
        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

/// Validated, normalized field values ready to be written to a store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NormalizedRecord(Map<String, Value>);

impl NormalizedRecord {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    pub fn into_map(self) -> Map<String, Value> {
        self.0
    }
}

impl From<Map<String, Value>> for NormalizedRecord {
    fn from(map: Map<String, Value>) -> Self {
        NormalizedRecord(map)
    }
}

/// Field name -> human readable message. One message per field; the first failure wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FieldErrors(BTreeMap<String, String>);

impl FieldErrors {
    pub fn insert(&mut self, field: &str, message: impl Into<String>) {
        self.0
            .entry(field.to_string())
            .or_insert_with(|| message.into());
    }

    pub fn get(&self, field: &str) -> Option<&str> {
        self.0.get(field).map(String::as_str)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl fmt::Display for FieldErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (field, message) in &self.0 {
            if !first {
                f.write_str("; ")?;
            }
            write!(f, "{field}: {message}")?;
            first = false;
        }
        Ok(())
    }
}

impl std::error::Error for FieldErrors {}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn form(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("form fixture must be an object"),
        }
    }

    fn sample_schema() -> Schema {
        Schema::new(vec![
            FieldSpec::text("name", "Name").required().max_len(5),
            FieldSpec::text("nickname", "Nickname"),
            FieldSpec::integer("rooms", "Rooms").rule(Rule::Range(1, 50)),
            FieldSpec::text("color", "Color").rule(Rule::HexColor),
        ])
    }

    #[test]
    fn trims_strings_and_nulls_blank_optionals() {
        let record = sample_schema()
            .validate(&form(json!({
                "name": "  Den ",
                "nickname": "   ",
                "rooms": " 4 ",
                "extra": "dropped"
            })))
            .expect("valid form");
        assert_eq!(record.get_str("name"), Some("Den"));
        assert_eq!(record.get("nickname"), Some(&Value::Null));
        assert_eq!(record.get("rooms"), Some(&json!(4)));
        assert_eq!(record.get("color"), Some(&Value::Null));
        assert!(record.get("extra").is_none());
    }

    #[test]
    fn collects_one_message_per_field() {
        let errors = sample_schema()
            .validate(&form(json!({
                "name": "",
                "rooms": "many",
                "color": "FFFFFF"
            })))
            .expect_err("invalid form");
        assert_eq!(errors.len(), 3);
        assert_eq!(errors.get("name"), Some("Name is required."));
        assert_eq!(errors.get("rooms"), Some("Rooms must be a whole number."));
        assert!(errors.contains("color"));
    }

    #[test]
    fn max_length_counts_characters_not_bytes() {
        let schema = sample_schema();
        assert!(schema.validate(&form(json!({ "name": "Ålänn" }))).is_ok());
        let errors = schema
            .validate(&form(json!({ "name": "Ålännd" })))
            .expect_err("too long");
        assert_eq!(errors.get("name"), Some("Name must be at most 5 characters."));
    }

    #[test]
    fn nfc_normalizes_decomposed_input() {
        let record = sample_schema()
            .validate(&form(json!({ "name": "Cafe\u{301}" })))
            .expect("valid");
        assert_eq!(record.get_str("name"), Some("Caf\u{e9}"));
    }

    #[test]
    fn range_rejects_out_of_bounds_numbers() {
        let errors = sample_schema()
            .validate(&form(json!({ "name": "Den", "rooms": 0 })))
            .expect_err("out of range");
        assert_eq!(errors.get("rooms"), Some("Rooms must be between 1 and 50."));
    }

    #[test]
    fn partial_validation_only_touches_present_fields() {
        let schema = sample_schema();
        let record = schema
            .validate_partial(&form(json!({ "nickname": " Nook " })))
            .expect("partial ok");
        assert_eq!(record.len(), 1);
        assert_eq!(record.get_str("nickname"), Some("Nook"));

        let errors = schema
            .validate_partial(&form(json!({ "name": "  " })))
            .expect_err("required field cleared");
        assert_eq!(errors.get("name"), Some("Name is required."));
    }

    fn max_not_below_min(record: &NormalizedRecord) -> Option<(&'static str, String)> {
        let min = record.get("min").and_then(Value::as_i64)?;
        let max = record.get("max").and_then(Value::as_i64)?;
        (max < min).then(|| ("max", "Max must not be below min.".to_string()))
    }

    #[test]
    fn patch_cross_checks_see_the_stored_row() {
        let schema = Schema::new(vec![
            FieldSpec::integer("min", "Min"),
            FieldSpec::integer("max", "Max"),
        ])
        .with_check(max_not_below_min);
        let current = form(json!({ "id": "r1", "min": 10, "max": 20 }));

        // Alone, the patch has nothing to compare against.
        assert!(schema.validate_partial(&form(json!({ "max": "5" }))).is_ok());

        let errors = schema
            .validate_patch(&form(json!({ "max": "5" })), &current)
            .expect_err("max below stored min");
        assert_eq!(errors.get("max"), Some("Max must not be below min."));

        let patch = schema
            .validate_patch(&form(json!({ "max": "15" })), &current)
            .expect("within range");
        assert_eq!(patch.len(), 1);
        assert_eq!(patch.get("max"), Some(&json!(15)));
    }

    #[test]
    fn rejects_structured_values() {
        let errors = sample_schema()
            .validate(&form(json!({ "name": ["a"] })))
            .expect_err("array rejected");
        assert_eq!(errors.get("name"), Some("Name has an unsupported value."));
    }

    #[test]
    fn hex_color_requires_hash_and_six_digits() {
        let schema = sample_schema();
        for ok in ["#FFFFFF", "#1a2b3c"] {
            assert!(
                schema.validate(&form(json!({ "name": "A", "color": ok }))).is_ok(),
                "{ok} should pass"
            );
        }
        for bad in ["FFFFFF", "#FFF", "#GGGGGG", "#FFFFFFF"] {
            assert!(
                schema.validate(&form(json!({ "name": "A", "color": bad }))).is_err(),
                "{bad} should fail"
            );
        }
    }

    #[test]
    fn display_lists_fields_in_order() {
        let mut errors = FieldErrors::default();
        errors.insert("b", "second");
        errors.insert("a", "first");
        errors.insert("a", "ignored");
        assert_eq!(errors.to_string(), "a: first; b: second");
    }
}
