use once_cell::sync::Lazy;
use regex::Regex;

use super::{FieldSpec, NormalizedRecord, Rule, Schema};
use crate::time::parse_date;

pub const VENDOR_CATEGORIES: &[&str] = &[
    "plumbing",
    "electrical",
    "hvac",
    "roofing",
    "landscaping",
    "painting",
    "cleaning",
    "general",
    "other",
];

pub const PAINT_FINISHES: &[&str] = &["flat", "matte", "eggshell", "satin", "semi-gloss", "gloss"];

const NAME_MAX: usize = 100;
const NOTES_MAX: usize = 2000;

static PHONE_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[+0-9 ().-]{7,20}$").expect("phone validation pattern to compile")
});

static HOME: Lazy<Schema> = Lazy::new(|| {
    Schema::new(vec![
        FieldSpec::text("name", "Name").required().max_len(NAME_MAX),
        FieldSpec::text("address", "Address").max_len(200),
        FieldSpec::text("city", "City").max_len(NAME_MAX),
        FieldSpec::text("region", "State or region").max_len(NAME_MAX),
        FieldSpec::text("postal_code", "Postal code").max_len(20),
        FieldSpec::integer("year_built", "Year built").rule(Rule::Range(1600, 2100)),
        FieldSpec::integer("square_feet", "Square feet").rule(Rule::Range(1, 1_000_000)),
        FieldSpec::text("notes", "Notes").max_len(NOTES_MAX),
    ])
});

static VENDOR: Lazy<Schema> = Lazy::new(|| {
    Schema::new(vec![
        FieldSpec::text("name", "Name").required().max_len(NAME_MAX),
        FieldSpec::text("category", "Category").rule(Rule::OneOf(VENDOR_CATEGORIES)),
        FieldSpec::text("contact_name", "Contact name").max_len(NAME_MAX),
        FieldSpec::text("phone", "Phone").rule(Rule::Pattern {
            regex: &PHONE_PATTERN,
            message: "Phone numbers may contain digits, spaces, +, (, ), . and -.",
        }),
        FieldSpec::text("email", "Email").rule(Rule::Email),
        FieldSpec::text("website", "Website").rule(Rule::Url),
        FieldSpec::text("notes", "Notes").max_len(NOTES_MAX),
    ])
});

static PAINT: Lazy<Schema> = Lazy::new(|| {
    Schema::new(vec![
        FieldSpec::text("room", "Room").required().max_len(NAME_MAX),
        FieldSpec::text("brand", "Brand").max_len(NAME_MAX),
        FieldSpec::text("color_name", "Color name")
            .required()
            .max_len(NAME_MAX),
        FieldSpec::text("hex", "Hex color").required().rule(Rule::HexColor),
        FieldSpec::text("finish", "Finish").rule(Rule::OneOf(PAINT_FINISHES)),
        FieldSpec::text("notes", "Notes").max_len(NOTES_MAX),
    ])
});

static APPLIANCE: Lazy<Schema> = Lazy::new(|| {
    Schema::new(vec![
        FieldSpec::text("name", "Name").required().max_len(NAME_MAX),
        FieldSpec::text("brand", "Brand").max_len(NAME_MAX),
        FieldSpec::text("model_number", "Model number").max_len(NAME_MAX),
        FieldSpec::text("serial_number", "Serial number").max_len(NAME_MAX),
        FieldSpec::date("purchased_on", "Purchase date"),
        FieldSpec::date("warranty_expires_on", "Warranty expiry"),
        FieldSpec::text("notes", "Notes").max_len(NOTES_MAX),
    ])
    .with_check(warranty_after_purchase)
});

fn warranty_after_purchase(record: &NormalizedRecord) -> Option<(&'static str, String)> {
    let purchased = record.get_str("purchased_on").and_then(parse_date)?;
    let expires = record.get_str("warranty_expires_on").and_then(parse_date)?;
    (expires < purchased).then(|| {
        (
            "warranty_expires_on",
            "Warranty expiry cannot be before the purchase date.".to_string(),
        )
    })
}

pub fn home() -> &'static Schema {
    &HOME
}

pub fn vendor() -> &'static Schema {
    &VENDOR
}

pub fn paint() -> &'static Schema {
    &PAINT
}

pub fn appliance() -> &'static Schema {
    &APPLIANCE
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map, Value};

    fn form(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("form fixture must be an object"),
        }
    }

    #[test]
    fn paint_accepts_full_hex_only() {
        let base = json!({ "room": "Hall", "color_name": "Chalk" });
        let with_hex = |hex: &str| {
            let mut raw = form(base.clone());
            raw.insert("hex".into(), Value::from(hex));
            paint().validate(&raw)
        };
        assert!(with_hex("#FFFFFF").is_ok());
        assert!(with_hex("FFFFFF").expect_err("missing #").contains("hex"));
        assert!(with_hex("#FFF").expect_err("short").contains("hex"));
    }

    #[test]
    fn paint_finish_is_enumerated() {
        let errors = paint()
            .validate(&form(json!({
                "room": "Hall",
                "color_name": "Chalk",
                "hex": "#EEEEEE",
                "finish": "shiny"
            })))
            .expect_err("unknown finish");
        assert!(errors
            .get("finish")
            .expect("finish error")
            .starts_with("Finish must be one of"));
    }

    #[test]
    fn vendor_contact_formats() {
        let ok = vendor()
            .validate(&form(json!({
                "name": " Ace Plumbing ",
                "category": "plumbing",
                "phone": "+1 (555) 010-2000",
                "email": "ace@example.com",
                "website": "https://ace.example.com",
                "notes": ""
            })))
            .expect("valid vendor");
        assert_eq!(ok.get_str("name"), Some("Ace Plumbing"));
        assert_eq!(ok.get("notes"), Some(&Value::Null));
        assert_eq!(ok.get("contact_name"), Some(&Value::Null));

        let errors = vendor()
            .validate(&form(json!({
                "name": "Ace",
                "phone": "call me",
                "email": "ace-at-example",
                "website": "ftp://ace.example.com"
            })))
            .expect_err("bad contact details");
        assert!(errors.contains("phone"));
        assert!(errors.contains("email"));
        assert!(errors.contains("website"));
    }

    #[test]
    fn home_numeric_fields_parse_and_bound() {
        let record = home()
            .validate(&form(json!({ "name": "Cabin", "year_built": "1948", "square_feet": 900 })))
            .expect("valid home");
        assert_eq!(record.get("year_built"), Some(&json!(1948)));
        assert_eq!(record.get("square_feet"), Some(&json!(900)));

        let errors = home()
            .validate(&form(json!({ "name": "Cabin", "year_built": "1200" })))
            .expect_err("too old");
        assert_eq!(errors.get("year_built"), Some("Year built must be between 1600 and 2100."));
    }

    #[test]
    fn appliance_warranty_cannot_precede_purchase() {
        let errors = appliance()
            .validate(&form(json!({
                "name": "Furnace",
                "purchased_on": "2022-05-01",
                "warranty_expires_on": "2021-05-01"
            })))
            .expect_err("warranty before purchase");
        assert_eq!(
            errors.get("warranty_expires_on"),
            Some("Warranty expiry cannot be before the purchase date.")
        );

        let errors = appliance()
            .validate(&form(json!({ "name": "Furnace", "purchased_on": "May 2022" })))
            .expect_err("bad date");
        assert!(errors.contains("purchased_on"));

        assert!(appliance()
            .validate(&form(json!({ "name": "Furnace", "warranty_expires_on": "2030-01-01" })))
            .is_ok());
    }
}
