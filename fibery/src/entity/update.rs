use chrono::FixedOffset;
use serde_json::{Map, Value};

use crate::classify::{
    is_collection_reference, is_rich_text_document, is_single_reference, is_writable,
};
use crate::config::FieldPolicy;
use crate::datetime::normalize_instant;
use crate::query::Command;
use crate::types::{Field, Schema, Type};
use crate::{Error, ErrorKind, Result};

/// A value to write into one field.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldValue {
    /// Field name.
    pub field: String,
    /// Value as entered. Dates are strings, date ranges `{start, end}`
    /// objects, collections arrays of ids.
    pub value: Value,
    /// Offset dates are entered in, the default offset when unset.
    pub timezone: Option<FixedOffset>,
}

impl FieldValue {
    /// Create a field value entered in the default offset.
    pub fn new(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self {
            field: field.into(),
            value: value.into(),
            timezone: None,
        }
    }

    /// Set the offset dates of this value are entered in.
    pub fn with_timezone(mut self, timezone: FixedOffset) -> Self {
        self.timezone = Some(timezone);
        self
    }
}

/// Entities to add to a collection field once the owning entity exists.
#[derive(Debug, Clone, PartialEq)]
pub struct CollectionItems {
    /// Collection field.
    pub field: String,
    /// Database the entities belong to.
    pub type_name: String,
    /// Name of the id field of that database.
    pub item_id_field: String,
    /// Ids of the added entities.
    pub ids: Vec<String>,
}

/// Content of a rich-text field, written through
/// [`FiberyClient::update_documents`](crate::catalog::FiberyClient::update_documents).
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentContent {
    /// Document field.
    pub field: String,
    /// Document content.
    pub content: String,
}

/// Everything an entity create or update writes.
///
/// Only `entity` goes into the create or update command itself: collection
/// items need the entity to exist and documents have their own api.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct EntityUpdate {
    /// Field values of the create or update command.
    pub entity: Map<String, Value>,
    /// Deferred collection items.
    pub collections: Vec<CollectionItems>,
    /// Deferred document contents.
    pub documents: Vec<DocumentContent>,
}

impl EntityUpdate {
    /// Commands adding the deferred collection items to `entity_id`.
    pub fn collection_commands(&self, ty: &Type, entity_id: &str) -> Vec<Command> {
        self.collections
            .iter()
            .filter(|items| !items.ids.is_empty())
            .map(|items| Command::AddCollectionItems {
                type_name: ty.name.clone(),
                id_field: ty.id_field().to_string(),
                entity_id: entity_id.to_string(),
                field: items.field.clone(),
                item_id_field: items.item_id_field.clone(),
                items: items.ids.clone(),
            })
            .collect()
    }
}

/// Translate entered field values into the payload of a create or update
/// of `ty`.
///
/// Dates without an explicit offset are read in `default_timezone` and
/// written as UTC instants.
pub fn build_entity_update(
    values: &[FieldValue],
    ty: &Type,
    schema: &Schema,
    policy: &FieldPolicy,
    default_timezone: FixedOffset,
) -> Result<EntityUpdate> {
    let mut update = EntityUpdate::default();

    for value in values {
        let field = ty.field_by_name(&value.field)?;
        if !is_writable(field, schema, policy) {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Field \"{}\" can't be written", field.name),
            )
            .with_context("database", ty.name.clone())
            .with_context("field", field.name.clone()));
        }

        let timezone = value.timezone.unwrap_or(default_timezone);
        write_value(&mut update, field, &value.value, schema, timezone)
            .map_err(|e| e.with_context("field", field.name.clone()))?;
    }

    log::debug!(
        "Built update of {} with {} values, {} collections and {} documents",
        ty.name,
        update.entity.len(),
        update.collections.len(),
        update.documents.len()
    );
    Ok(update)
}

fn write_value(
    update: &mut EntityUpdate,
    field: &Field,
    value: &Value,
    schema: &Schema,
    timezone: FixedOffset,
) -> Result<()> {
    let name = field.name.clone();

    match field.value_type.as_str() {
        "fibery/bool" => match value {
            Value::Bool(_) | Value::Null => {
                update.entity.insert(name, value.clone());
            }
            other => return Err(shape_error("a boolean", other)),
        },
        "fibery/date" | "fibery/date-time" => {
            update.entity.insert(name, instant(value, timezone)?);
        }
        "fibery/date-range" | "fibery/date-time-range" => {
            let range = match value {
                Value::Null => Value::Null,
                Value::Object(range) => {
                    let bound = |key: &str| -> Result<(String, Value)> {
                        let value = instant(range.get(key).unwrap_or(&Value::Null), timezone)?;
                        Ok((key.to_string(), value))
                    };
                    Value::Object([bound("start")?, bound("end")?].into_iter().collect())
                }
                other => return Err(shape_error("a {start, end} object", other)),
            };
            update.entity.insert(name, range);
        }
        _ if is_single_reference(field, schema) => {
            let id_field = target_id_field(field, schema);
            let reference = match value {
                Value::Null => Value::Null,
                Value::String(id) if id.is_empty() => Value::Null,
                Value::String(id) => {
                    Value::Object(Map::from_iter([(id_field, Value::String(id.clone()))]))
                }
                other => return Err(shape_error("an entity id", other)),
            };
            update.entity.insert(name, reference);
        }
        _ if is_collection_reference(field, schema) => {
            let ids = match value {
                Value::Null => vec![],
                Value::Array(items) => items
                    .iter()
                    .map(|item| {
                        item.as_str()
                            .map(str::to_string)
                            .ok_or_else(|| shape_error("an entity id", item))
                    })
                    .collect::<Result<Vec<_>>>()?,
                other => return Err(shape_error("a list of entity ids", other)),
            };
            update.collections.push(CollectionItems {
                field: name,
                type_name: field.value_type.clone(),
                item_id_field: target_id_field(field, schema),
                ids,
            });
        }
        _ if is_rich_text_document(field) => {
            let content = match value {
                Value::Null => String::new(),
                Value::String(content) => content.clone(),
                other => return Err(shape_error("a string", other)),
            };
            update.documents.push(DocumentContent {
                field: name,
                content,
            });
        }
        _ => {
            update.entity.insert(name, value.clone());
        }
    }

    Ok(())
}

fn instant(value: &Value, timezone: FixedOffset) -> Result<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::String(s) if s.is_empty() => Ok(Value::Null),
        Value::String(s) => Ok(Value::String(normalize_instant(s, timezone)?)),
        other => Err(shape_error("a date string", other)),
    }
}

fn target_id_field(field: &Field, schema: &Schema) -> String {
    schema
        .reference_target(field)
        .map(|target| target.id_field().to_string())
        .unwrap_or_else(|| crate::types::DEFAULT_ID_FIELD.to_string())
}

fn shape_error(expected: &str, actual: &Value) -> Error {
    Error::new(
        ErrorKind::InvalidInput,
        format!("Expected {expected}, got {actual}"),
    )
}
