use std::fmt;

use serde_json::{Map, Value};
use snafu::{ResultExt, Snafu, ensure};

use crate::diff::PropertyValue;
use crate::diff::value::format_iso;
use crate::node::PRIMARY_TYPE;
use crate::transport::{FormPart, MultipartForm};

/// Name of the form field carrying the diff text.
pub const DIFF_FIELD: &str = ":diff";

const DATE_CONTENT_TYPE: &str = "jcr-value/date";
const BINARY_CONTENT_TYPE: &str = "jcr-value/binary";

#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    CreateNode {
        path: String,
        primary_type: String,
    },
    MoveNode {
        path: String,
        destination: String,
    },
    RemoveNode {
        path: String,
    },
    SetProperty {
        path: String,
        name: String,
        value: PropertyValue,
    },
    RemoveProperty {
        path: String,
        name: String,
    },
}

impl Operation {
    fn sigil(&self) -> char {
        match self {
            Operation::CreateNode { .. } => '+',
            Operation::MoveNode { .. } => '>',
            Operation::RemoveNode { .. } | Operation::RemoveProperty { .. } => '-',
            Operation::SetProperty { .. } => '^',
        }
    }

    /// The path a diff line addresses. Property operations address `<path>/<name>`.
    pub fn target(&self) -> String {
        match self {
            Operation::CreateNode { path, .. }
            | Operation::MoveNode { path, .. }
            | Operation::RemoveNode { path } => path.clone(),
            Operation::SetProperty { path, name, .. } | Operation::RemoveProperty { path, name } => {
                format!("{path}/{name}")
            }
        }
    }

    fn inline_payload(&self) -> String {
        match self {
            Operation::CreateNode { primary_type, .. } => {
                let mut description = Map::new();
                description.insert(PRIMARY_TYPE.to_string(), Value::from(primary_type.as_str()));
                Value::Object(description).to_string()
            }
            Operation::MoveNode { destination, .. } => destination.clone(),
            Operation::RemoveNode { .. } | Operation::RemoveProperty { .. } => String::new(),
            Operation::SetProperty { value, .. } => value
                .inline_json()
                .map(|json| json.to_string())
                .unwrap_or_default(),
        }
    }

    fn attachment(&self) -> Result<Option<Attachment>, BatchError> {
        let Operation::SetProperty { value, .. } = self else {
            return Ok(None);
        };

        let key = self.target();
        let attachment = match value {
            PropertyValue::Date(date) => Attachment {
                data: format_iso(*date)
                    .context(DateFormatSnafu { key: key.clone() })?
                    .into_bytes(),
                content_type: DATE_CONTENT_TYPE,
                key,
            },
            PropertyValue::Binary(data) => Attachment {
                key,
                content_type: BINARY_CONTENT_TYPE,
                data: data.clone(),
            },
            _ => return Ok(None),
        };
        Ok(Some(attachment))
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}{} : {}",
            self.sigil(),
            self.target(),
            self.inline_payload()
        )
    }
}

/// A property value sent next to the diff text, matched to its line by `key`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attachment {
    pub key: String,
    pub content_type: &'static str,
    pub data: Vec<u8>,
}

/// An ordered list of mutations submitted to the repository as one request.
///
/// The repository applies operations in the order they were added, so a parent
/// has to be created before properties are set on it or its children.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationBatch {
    operations: Vec<Operation>,
}

impl MutationBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_node(
        &mut self,
        path: impl Into<String>,
        primary_type: impl Into<String>,
    ) -> Result<&mut Self, BatchError> {
        let path = path.into();
        let primary_type = primary_type.into();
        ensure!(!path.is_empty(), MissingPathSnafu);
        ensure!(!primary_type.is_empty(), MissingPrimaryTypeSnafu { path });
        single_line(&path)?;
        single_line(&primary_type)?;

        self.push(Operation::CreateNode { path, primary_type })
    }

    pub fn move_node(
        &mut self,
        path: impl Into<String>,
        destination: impl Into<String>,
    ) -> Result<&mut Self, BatchError> {
        let path = path.into();
        let destination = destination.into();
        ensure!(!path.is_empty(), MissingPathSnafu);
        ensure!(!destination.is_empty(), MissingDestinationSnafu { path });
        single_line(&path)?;
        single_line(&destination)?;

        self.push(Operation::MoveNode { path, destination })
    }

    pub fn remove_node(&mut self, path: impl Into<String>) -> Result<&mut Self, BatchError> {
        let path = path.into();
        ensure!(!path.is_empty(), MissingPathSnafu);
        single_line(&path)?;

        self.push(Operation::RemoveNode { path })
    }

    /// Sets a property. `None` is rejected: it has no wire representation and is
    /// distinct from an empty string.
    pub fn set_property(
        &mut self,
        path: impl Into<String>,
        name: impl Into<String>,
        value: impl Into<Option<PropertyValue>>,
    ) -> Result<&mut Self, BatchError> {
        let path = path.into();
        let name = name.into();
        ensure!(!path.is_empty(), MissingPathSnafu);
        ensure!(!name.is_empty(), MissingPropertyNameSnafu { path });
        single_line(&path)?;
        single_line(&name)?;
        let Some(value) = value.into() else {
            return MissingValueSnafu { path, name }.fail();
        };
        ensure!(!value.has_nested_binary(), BinaryInArraySnafu { path, name });

        self.push(Operation::SetProperty { path, name, value })
    }

    pub fn remove_property(
        &mut self,
        path: impl Into<String>,
        name: impl Into<String>,
    ) -> Result<&mut Self, BatchError> {
        let path = path.into();
        let name = name.into();
        ensure!(!path.is_empty(), MissingPathSnafu);
        ensure!(!name.is_empty(), MissingPropertyNameSnafu { path });
        single_line(&path)?;
        single_line(&name)?;

        self.push(Operation::RemoveProperty { path, name })
    }

    pub fn operations(&self) -> &[Operation] {
        &self.operations
    }

    pub fn len(&self) -> usize {
        self.operations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operations.is_empty()
    }

    /// The newline-joined diff text.
    pub fn diff_text(&self) -> String {
        self.operations
            .iter()
            .map(Operation::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// Returns the diff text and the attachments, both in insertion order.
    pub fn serialize(&self) -> Result<(String, Vec<Attachment>), BatchError> {
        let attachments = self
            .operations
            .iter()
            .map(Operation::attachment)
            .filter_map(Result::transpose)
            .collect::<Result<Vec<_>, _>>()?;

        Ok((self.diff_text(), attachments))
    }

    /// Builds the request form. The diff text is always the last field so the
    /// repository reads the structure before any attached values.
    pub fn into_form(self) -> Result<MultipartForm, BatchError> {
        let (text, attachments) = self.serialize()?;

        let mut form = MultipartForm::new();
        for attachment in attachments {
            form.push(FormPart::binary(
                attachment.key,
                attachment.content_type,
                attachment.data,
            ));
        }
        form.push(FormPart::text(DIFF_FIELD, text));
        Ok(form)
    }

    fn push(&mut self, operation: Operation) -> Result<&mut Self, BatchError> {
        self.operations.push(operation);
        Ok(self)
    }
}

/// Every operation occupies exactly one diff line.
fn single_line(value: &str) -> Result<(), BatchError> {
    ensure!(!value.contains(['\n', '\r']), LineBreakSnafu { value });
    Ok(())
}

#[derive(Debug, Snafu)]
pub enum BatchError {
    #[snafu(display("A node path is required"))]
    MissingPath,
    #[snafu(display("A primary type is required to create '{}'", path))]
    MissingPrimaryType { path: String },
    #[snafu(display("A destination path is required to move '{}'", path))]
    MissingDestination { path: String },
    #[snafu(display("A property name is required for node '{}'", path))]
    MissingPropertyName { path: String },
    #[snafu(display("Property '{}' of '{}' has no value", name, path))]
    MissingValue { path: String, name: String },
    #[snafu(display("Line breaks are not allowed in {:?}", value))]
    LineBreak { value: String },
    #[snafu(display("Array property '{}' of '{}' contains a binary value", name, path))]
    BinaryInArray { path: String, name: String },
    #[snafu(display("Failed to format the date value of '{}'", key))]
    DateFormat {
        key: String,
        source: time::error::Format,
    },
}
