//! Evaluation context and its mapping onto the engine's user model.

use std::collections::HashMap;

use crate::user::{EngineUser, UserValue};
use crate::{Str, Value};

/// Attribute name promoted to [`EngineUser::email`]. Matching is exact and
/// case-sensitive: `"email"` stays a plain custom attribute.
const ATTR_EMAIL: &str = "Email";
/// Attribute name promoted to [`EngineUser::country`].
const ATTR_COUNTRY: &str = "Country";

/// Ambient data for flag evaluation: a targeting key plus free-form
/// attributes.
///
/// Contexts are immutable once constructed; attach attributes at construction
/// time with [`EvaluationContext::with_attribute`].
///
/// ```
/// # use flagbridge::EvaluationContext;
/// let context = EvaluationContext::new("user-1")
///     .with_attribute("Email", "jane@example.com")
///     .with_attribute("plan", "premium");
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct EvaluationContext {
    targeting_key: Str,
    attributes: HashMap<String, Value>,
}

impl EvaluationContext {
    /// Create a context for the given targeting key. An empty key is allowed.
    pub fn new(targeting_key: impl Into<Str>) -> EvaluationContext {
        EvaluationContext {
            targeting_key: targeting_key.into(),
            attributes: HashMap::new(),
        }
    }

    /// Attach an attribute, replacing any previous value under `name`.
    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }

    pub fn targeting_key(&self) -> &str {
        &self.targeting_key
    }

    pub fn attribute(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }

    pub fn attributes(&self) -> &HashMap<String, Value> {
        &self.attributes
    }

    /// Map this context onto the engine's user model. Total; malformed or
    /// empty contexts map without failure.
    ///
    /// `Email` and `Country` are promoted to the named fields when their
    /// value is a string. Every other attribute lands in `custom`, except
    /// null-valued entries which are dropped. Dates are coerced to epoch
    /// seconds before storage.
    pub fn to_engine_user(&self) -> EngineUser {
        let custom = self
            .attributes
            .iter()
            .filter(|(name, _)| name.as_str() != ATTR_EMAIL && name.as_str() != ATTR_COUNTRY)
            .filter_map(|(name, value)| custom_value(value).map(|value| (name.clone(), value)))
            .collect();

        EngineUser {
            identifier: self.targeting_key.clone(),
            email: self.string_attribute(ATTR_EMAIL),
            country: self.string_attribute(ATTR_COUNTRY),
            custom,
        }
    }

    fn string_attribute(&self, name: &str) -> Option<String> {
        self.attributes
            .get(name)
            .and_then(Value::as_str)
            .map(str::to_owned)
    }
}

/// Coerce an attribute value for storage in [`EngineUser::custom`]. Returns
/// `None` for nulls, which are dropped rather than stored.
fn custom_value(value: &Value) -> Option<UserValue> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(UserValue::Bool(*b)),
        Value::Int(i) => Some(UserValue::Int(*i)),
        Value::Float(f) => Some(UserValue::Float(*f)),
        Value::String(s) => Some(UserValue::String(s.clone())),
        // Seconds since epoch, truncating sub-second precision.
        Value::Date(date) => Some(UserValue::Int(date.timestamp())),
        Value::List(items) => Some(UserValue::List(
            items.iter().filter_map(custom_value).collect(),
        )),
        // The custom map holds primitives and lists only; structures are
        // carried as their JSON text.
        Value::Struct(_) => Some(UserValue::String(value.to_json_string())),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{DateTime, TimeZone, Utc};

    use super::EvaluationContext;
    use crate::user::UserValue;
    use crate::Value;

    #[test]
    fn email_and_country_land_in_named_fields_never_in_custom() {
        let user = EvaluationContext::new("user-1")
            .with_attribute("Email", "jane@example.com")
            .with_attribute("Country", "NL")
            .with_attribute("plan", "premium")
            .to_engine_user();

        assert_eq!(&*user.identifier, "user-1");
        assert_eq!(user.email.as_deref(), Some("jane@example.com"));
        assert_eq!(user.country.as_deref(), Some("NL"));
        assert!(!user.custom.contains_key("Email"));
        assert!(!user.custom.contains_key("Country"));
        assert_eq!(
            user.custom.get("plan"),
            Some(&UserValue::String("premium".to_owned()))
        );
    }

    #[test]
    fn attribute_name_matching_is_case_sensitive() {
        let user = EvaluationContext::new("user-1")
            .with_attribute("email", "jane@example.com")
            .to_engine_user();

        assert_eq!(user.email, None);
        assert_eq!(
            user.custom.get("email"),
            Some(&UserValue::String("jane@example.com".to_owned()))
        );
    }

    #[test]
    fn non_string_email_leaves_the_field_absent() {
        let user = EvaluationContext::new("user-1")
            .with_attribute("Email", 42i64)
            .to_engine_user();

        assert_eq!(user.email, None);
        assert!(!user.custom.contains_key("Email"));
    }

    #[test]
    fn dates_are_coerced_to_epoch_seconds() {
        let date: DateTime<Utc> = DateTime::parse_from_rfc3339("2025-05-30T10:15:30.00Z")
            .unwrap()
            .with_timezone(&Utc);

        let user = EvaluationContext::new("user-1")
            .with_attribute("signed_up", Value::Date(date))
            .to_engine_user();

        assert_eq!(user.custom.get("signed_up"), Some(&UserValue::Int(1748600130)));
    }

    #[test]
    fn sub_second_precision_is_floored_not_rounded() {
        let date = Utc.with_ymd_and_hms(2025, 5, 30, 10, 15, 30).unwrap()
            + chrono::Duration::milliseconds(999);

        let user = EvaluationContext::new("user-1")
            .with_attribute("signed_up", Value::Date(date))
            .to_engine_user();

        assert_eq!(user.custom.get("signed_up"), Some(&UserValue::Int(1748600130)));
    }

    #[test]
    fn null_valued_attributes_are_dropped() {
        let user = EvaluationContext::new("user-1")
            .with_attribute("missing", Value::Null)
            .with_attribute("present", true)
            .to_engine_user();

        assert!(!user.custom.contains_key("missing"));
        assert_eq!(user.custom.get("present"), Some(&UserValue::Bool(true)));
    }

    #[test]
    fn empty_context_maps_without_failure() {
        let user = EvaluationContext::new("").to_engine_user();

        assert_eq!(&*user.identifier, "");
        assert_eq!(user.email, None);
        assert_eq!(user.country, None);
        assert!(user.custom.is_empty());
    }

    #[test]
    fn lists_convert_element_wise_with_date_coercion() {
        let date: DateTime<Utc> = DateTime::parse_from_rfc3339("2025-05-30T10:15:30Z")
            .unwrap()
            .with_timezone(&Utc);

        let user = EvaluationContext::new("user-1")
            .with_attribute(
                "mixed",
                Value::List(vec![
                    Value::String("a".to_owned()),
                    Value::Date(date),
                    Value::Null,
                ]),
            )
            .to_engine_user();

        assert_eq!(
            user.custom.get("mixed"),
            Some(&UserValue::List(vec![
                UserValue::String("a".to_owned()),
                UserValue::Int(1748600130),
            ]))
        );
    }

    #[test]
    fn structures_are_carried_as_json_text() {
        let user = EvaluationContext::new("user-1")
            .with_attribute(
                "nested",
                Value::Struct([("k".to_owned(), Value::Int(1))].into_iter().collect()),
            )
            .to_engine_user();

        assert_eq!(
            user.custom.get("nested"),
            Some(&UserValue::String("{\"k\":1}".to_owned()))
        );
    }
}
