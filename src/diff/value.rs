use derive_more::From;
use serde_json::{Number, Value};
use time::format_description::BorrowedFormatItem;
use time::format_description::well_known::Rfc3339;
use time::macros::format_description;
use time::{OffsetDateTime, UtcOffset};

/// Metadata type hint the repository uses for date properties.
pub(crate) const DATE_TYPE_HINT: &str = "Date";

const ISO_MILLIS: &[BorrowedFormatItem<'_>] =
    format_description!("[year]-[month]-[day]T[hour]:[minute]:[second].[subsecond digits:3]Z");

// e.g. "Tue Apr 05 2016 13:12:02 GMT+0200"
const REPOSITORY_DATE: &[BorrowedFormatItem<'_>] = format_description!(
    "[weekday repr:short] [month repr:short] [day] [year] [hour]:[minute]:[second] GMT[offset_hour sign:mandatory][offset_minute]"
);

/// A single property value as stored on a repository node.
#[derive(Debug, Clone, PartialEq, From)]
pub enum PropertyValue {
    String(String),
    Long(i64),
    Double(f64),
    Boolean(bool),
    Date(OffsetDateTime),
    Binary(Vec<u8>),
    Array(Vec<PropertyValue>),
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::String(value.to_string())
    }
}

impl From<i32> for PropertyValue {
    fn from(value: i32) -> Self {
        PropertyValue::Long(value.into())
    }
}

impl PropertyValue {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            PropertyValue::String(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_long(&self) -> Option<i64> {
        match self {
            PropertyValue::Long(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Boolean(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<OffsetDateTime> {
        match self {
            PropertyValue::Date(value) => Some(*value),
            _ => None,
        }
    }

    /// The JSON payload used for this value on a diff line, or `None` when the
    /// value has to travel as an attachment.
    ///
    /// Dates inside arrays are sent as ISO strings. Binaries inside arrays have
    /// no inline form and are refused by the batch before this is reached.
    pub fn inline_json(&self) -> Option<Value> {
        match self {
            PropertyValue::String(value) => Some(Value::String(value.clone())),
            PropertyValue::Long(value) => Some(Value::from(*value)),
            PropertyValue::Double(value) => {
                Some(Number::from_f64(*value).map_or(Value::Null, Value::Number))
            }
            PropertyValue::Boolean(value) => Some(Value::Bool(*value)),
            PropertyValue::Date(_) | PropertyValue::Binary(_) => None,
            PropertyValue::Array(values) => Some(Value::Array(
                values
                    .iter()
                    .filter_map(|value| match value {
                        PropertyValue::Date(date) => format_iso(*date).ok().map(Value::String),
                        other => other.inline_json(),
                    })
                    .collect(),
            )),
        }
    }

    /// Whether an array holds a binary at any depth.
    pub fn has_nested_binary(&self) -> bool {
        match self {
            PropertyValue::Array(values) => values.iter().any(|value| {
                matches!(value, PropertyValue::Binary(_)) || value.has_nested_binary()
            }),
            _ => false,
        }
    }

    /// Interprets a JSON property from a node representation.
    ///
    /// `type_hint` is the value of the parallel `:<name>` metadata key, if any.
    /// Nulls and objects are not property values and yield `None`.
    pub fn from_json(value: &Value, type_hint: Option<&str>) -> Option<Self> {
        match value {
            Value::Null | Value::Object(_) => None,
            Value::Bool(value) => Some(PropertyValue::Boolean(*value)),
            Value::Number(number) => number
                .as_i64()
                .map(PropertyValue::Long)
                .or_else(|| number.as_f64().map(PropertyValue::Double)),
            Value::String(text) if type_hint == Some(DATE_TYPE_HINT) => Some(
                parse_repository_date(text)
                    .map(PropertyValue::Date)
                    .unwrap_or_else(|| PropertyValue::String(text.clone())),
            ),
            Value::String(text) => Some(PropertyValue::String(text.clone())),
            Value::Array(values) => Some(PropertyValue::Array(
                values
                    .iter()
                    .filter_map(|value| PropertyValue::from_json(value, type_hint))
                    .collect(),
            )),
        }
    }
}

/// Formats a timestamp the way the diff endpoint expects date attachments.
pub(crate) fn format_iso(date: OffsetDateTime) -> Result<String, time::error::Format> {
    date.to_offset(UtcOffset::UTC).format(ISO_MILLIS)
}

fn parse_repository_date(text: &str) -> Option<OffsetDateTime> {
    OffsetDateTime::parse(text, REPOSITORY_DATE)
        .or_else(|_| OffsetDateTime::parse(text, &Rfc3339))
        .ok()
}
