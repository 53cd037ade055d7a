//! Field classification shared by the select and filter compilers.
//!
//! Every predicate is total: a field whose target can't be resolved is simply
//! classified as a scalar.

use std::fmt::{Display, Formatter};
use std::str::FromStr;

use crate::config::{FieldPolicy, FileFieldPolicy};
use crate::query::Operator;
use crate::types::{Field, Schema, Type};
use crate::{Error, ErrorKind, Result};

/// Value type of rich-text fields.
pub const DOCUMENT_TYPE: &str = "Collaboration~Documents/Document";
/// Attribute of a document holding the handle its content is fetched by.
pub const DOCUMENT_SECRET: &str = "Collaboration~Documents/secret";
/// Value type of file attachments.
pub const FILE_TYPE: &str = "fibery/file";

const BUTTON_TYPE: &str = "fibery/Button";
const VIEW_TYPE: &str = "fibery/view";
const COMMENT_TYPE: &str = "comments/comment";
const REFERENCES_FIELD: &str = "Collaboration~Documents/References";

const SEARCHABLE_TYPES: [&str; 9] = [
    "fibery/uuid",
    "fibery/decimal",
    "fibery/int",
    "fibery/bool",
    "fibery/date",
    "fibery/date-time",
    "fibery/email",
    "fibery/text",
    "fibery/url",
];

/// Field points at one titled entity.
pub fn is_single_reference(field: &Field, schema: &Schema) -> bool {
    schema.reference_target(field).is_some() && field.cardinality.is_to_one()
}

/// Field points at a collection of titled entities.
pub fn is_collection_reference(field: &Field, schema: &Schema) -> bool {
    schema.reference_target(field).is_some() && field.cardinality.is_to_many()
}

/// Field holds a rich-text document.
pub fn is_rich_text_document(field: &Field) -> bool {
    field.value_type == DOCUMENT_TYPE
}

/// Field holds file attachments.
pub fn is_file(field: &Field) -> bool {
    field.value_type == FILE_TYPE
}

/// Whether the field may be read, written or filtered at all.
pub fn is_supported(field: &Field, policy: &FieldPolicy) -> bool {
    if is_file(field) {
        return policy.file_fields == FileFieldPolicy::Supported;
    }

    field.value_type != BUTTON_TYPE
        && field.name != REFERENCES_FIELD
        && field.value_type != VIEW_TYPE
        && field.value_type != COMMENT_TYPE
}

/// Input control a field is edited and filtered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldKind {
    /// Single line text.
    Text,
    /// Rich-text document.
    TextArea,
    /// Any numeric type.
    Number,
    /// Checkbox.
    Boolean,
    /// Date or date time.
    Date,
    /// Date or date time range.
    DateRange,
    /// One referenced entity.
    Select,
    /// Collection of referenced entities.
    MultiSelect,
    /// File attachments.
    File,
}

impl FieldKind {
    /// Name the kind is tagged with in filter conditions.
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::TextArea => "text-area",
            FieldKind::Number => "number",
            FieldKind::Boolean => "boolean",
            FieldKind::Date => "date",
            FieldKind::DateRange => "date-range",
            FieldKind::Select => "select",
            FieldKind::MultiSelect => "multi-select",
            FieldKind::File => "file",
        }
    }

    /// Operators offered when filtering a field of this kind.
    pub fn operators(&self) -> &'static [Operator] {
        use Operator::*;

        match self {
            FieldKind::Text => &[
                Contains,
                DoesNotContain,
                Is,
                IsNot,
                StartsWith,
                EndsWith,
                IsEmpty,
                IsNotEmpty,
            ],
            FieldKind::Number => &[
                Is,
                IsNot,
                GreaterThan,
                LessThan,
                GreaterThanOrEqual,
                LessThanOrEqual,
                IsEmpty,
                IsNotEmpty,
            ],
            FieldKind::Boolean => &[Is],
            FieldKind::Date | FieldKind::DateRange => &[
                Is,
                IsBefore,
                IsAfter,
                IsOnOrBefore,
                IsOnOrAfter,
                IsEmpty,
                IsNotEmpty,
            ],
            FieldKind::Select => &[Is, IsNot, IsEmpty, IsNotEmpty],
            FieldKind::MultiSelect => &[Contains, DoesNotContain, IsEmpty, IsNotEmpty],
            FieldKind::File => &[IsEmpty, IsNotEmpty],
            FieldKind::TextArea => &[],
        }
    }
}

impl Display for FieldKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for FieldKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "text" => Ok(FieldKind::Text),
            "text-area" => Ok(FieldKind::TextArea),
            "number" => Ok(FieldKind::Number),
            "boolean" => Ok(FieldKind::Boolean),
            "date" => Ok(FieldKind::Date),
            "date-range" => Ok(FieldKind::DateRange),
            "select" => Ok(FieldKind::Select),
            "multi-select" => Ok(FieldKind::MultiSelect),
            "file" => Ok(FieldKind::File),
            other => Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Unknown field kind {other}"),
            )),
        }
    }
}

/// Control kind of a field, `None` when no control can edit it.
pub fn field_kind(field: &Field, schema: &Schema) -> Option<FieldKind> {
    match field.value_type.as_str() {
        "fibery/text" | "fibery/email" | "fibery/emoji" | "fibery/uuid" | "fibery/url" => {
            Some(FieldKind::Text)
        }
        "fibery/decimal" | "fibery/number" | "fibery/int" => Some(FieldKind::Number),
        "fibery/bool" => Some(FieldKind::Boolean),
        "fibery/date" | "fibery/date-time" => Some(FieldKind::Date),
        "fibery/date-range" | "fibery/date-time-range" => Some(FieldKind::DateRange),
        DOCUMENT_TYPE => Some(FieldKind::TextArea),
        FILE_TYPE => Some(FieldKind::File),
        _ if is_single_reference(field, schema) => Some(FieldKind::Select),
        _ if is_collection_reference(field, schema) => Some(FieldKind::MultiSelect),
        _ => None,
    }
}

/// Field can be set through create and update commands.
pub fn is_writable(field: &Field, schema: &Schema, policy: &FieldPolicy) -> bool {
    !field.is_read_only && is_supported(field, policy) && field_kind(field, schema).is_some()
}

/// Field can be used in a filter condition.
pub fn is_searchable(field: &Field, schema: &Schema, policy: &FieldPolicy) -> bool {
    (SEARCHABLE_TYPES.contains(&field.value_type.as_str())
        || is_single_reference(field, schema)
        || is_collection_reference(field, schema))
        && is_supported(field, policy)
}

/// Writable fields of a database, in display order.
pub fn writable_fields<'a>(ty: &'a Type, schema: &Schema, policy: &FieldPolicy) -> Vec<&'a Field> {
    ty.fields_in_display_order()
        .into_iter()
        .filter(|field| is_writable(field, schema, policy))
        .collect()
}

/// Searchable fields of a database, in display order.
pub fn searchable_fields<'a>(
    ty: &'a Type,
    schema: &Schema,
    policy: &FieldPolicy,
) -> Vec<&'a Field> {
    ty.fields_in_display_order()
        .into_iter()
        .filter(|field| is_searchable(field, schema, policy))
        .collect()
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;

    use super::*;
    use crate::types::parse_schema;

    fn workspace_schema() -> Schema {
        let path = format!(
            "{}/../testdata/schema/workspace.json",
            env!("CARGO_MANIFEST_DIR")
        );
        parse_schema(&fs::read(path).expect("read_file must succeed"))
            .expect("parse_schema must succeed")
    }

    fn names(fields: Vec<&Field>) -> Vec<&str> {
        fields.into_iter().map(|f| f.name.as_str()).collect()
    }

    #[test]
    fn test_reference_predicates() {
        let schema = workspace_schema();
        let task = schema.type_by_name("Tasks/Task").unwrap();
        let field = |name| task.field_by_name(name).unwrap();

        assert!(is_single_reference(field("workflow/state"), &schema));
        assert!(is_single_reference(field("Tasks/Project"), &schema));
        assert!(is_single_reference(field("fibery/created-by"), &schema));
        assert!(is_collection_reference(field("Tasks/Assignees"), &schema));
        assert!(!is_collection_reference(field("Tasks/Project"), &schema));

        // Primitive and untitled targets are never references.
        assert!(!is_single_reference(field("Tasks/Name"), &schema));
        assert!(!is_single_reference(field("Tasks/Description"), &schema));
        assert!(!is_collection_reference(field("comments/comments"), &schema));
        assert!(is_rich_text_document(field("Tasks/Description")));
    }

    #[test]
    fn test_supported_fields() {
        let schema = workspace_schema();
        let task = schema.type_by_name("Tasks/Task").unwrap();
        let default_policy = FieldPolicy::default();
        let file_policy = FieldPolicy {
            file_fields: FileFieldPolicy::Supported,
        };

        for name in [
            "Tasks/Start",
            "comments/comments",
            "Collaboration~Documents/References",
        ] {
            let field = task.field_by_name(name).unwrap();
            assert!(!is_supported(field, &default_policy), "{name}");
            assert!(!is_supported(field, &file_policy), "{name}");
        }

        let files = task.field_by_name("Tasks/Files").unwrap();
        assert!(!is_supported(files, &default_policy));
        assert!(is_supported(files, &file_policy));
    }

    #[test]
    fn test_field_kind() {
        let schema = workspace_schema();
        let task = schema.type_by_name("Tasks/Task").unwrap();
        let kind = |name| field_kind(task.field_by_name(name).unwrap(), &schema);

        assert_eq!(kind("Tasks/Name"), Some(FieldKind::Text));
        assert_eq!(kind("Tasks/Description"), Some(FieldKind::TextArea));
        assert_eq!(kind("Tasks/Estimate"), Some(FieldKind::Number));
        assert_eq!(kind("Tasks/Done"), Some(FieldKind::Boolean));
        assert_eq!(kind("Tasks/Due"), Some(FieldKind::Date));
        assert_eq!(kind("Tasks/Period"), Some(FieldKind::DateRange));
        assert_eq!(kind("workflow/state"), Some(FieldKind::Select));
        assert_eq!(kind("Tasks/Assignees"), Some(FieldKind::MultiSelect));
        assert_eq!(kind("Tasks/Files"), Some(FieldKind::File));
        assert_eq!(kind("comments/comments"), None);
    }

    #[test]
    fn test_field_kind_from_str() {
        assert_eq!("multi-select".parse::<FieldKind>().unwrap(), FieldKind::MultiSelect);
        assert_eq!(FieldKind::DateRange.to_string(), "date-range");
        assert_eq!(
            "checkbox".parse::<FieldKind>().unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert!(FieldKind::Boolean.operators().contains(&Operator::Is));
        assert!(!FieldKind::Boolean.operators().contains(&Operator::IsEmpty));
        assert_eq!("file".parse::<FieldKind>().unwrap(), FieldKind::File);
        assert_eq!(
            FieldKind::File.operators(),
            &[Operator::IsEmpty, Operator::IsNotEmpty]
        );
    }

    #[test]
    fn test_writable_fields() {
        let schema = workspace_schema();
        let task = schema.type_by_name("Tasks/Task").unwrap();

        assert_eq!(
            names(writable_fields(task, &schema, &FieldPolicy::default())),
            vec![
                "Tasks/Name",
                "Tasks/Description",
                "workflow/state",
                "Tasks/Project",
                "Tasks/Assignees",
                "Tasks/Done",
                "Tasks/Estimate",
                "Tasks/Due",
                "Tasks/Period",
            ]
        );
    }

    #[test]
    fn test_searchable_fields() {
        let schema = workspace_schema();
        let task = schema.type_by_name("Tasks/Task").unwrap();
        let searchable = names(searchable_fields(task, &schema, &FieldPolicy::default()));

        assert_eq!(searchable[0], "Tasks/Name");
        assert!(searchable.contains(&"fibery/id"));
        assert!(searchable.contains(&"fibery/creation-date"));
        assert!(searchable.contains(&"Tasks/Assignees"));
        assert!(!searchable.contains(&"Tasks/Description"));
        assert!(!searchable.contains(&"Tasks/Period"));
        assert!(!searchable.contains(&"Tasks/Files"));
    }
}
