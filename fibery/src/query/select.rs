//! Select compiler: turns an output mode into the nested select map of an
//! entity query.

use itertools::Itertools;
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

use crate::classify;
use crate::config::FieldPolicy;
use crate::types::{Field, Schema, Type};
use crate::Result;

/// Max number of related entities selected through a collection field.
pub const COLLECTION_SELECT_LIMIT: u64 = 200;
/// Pseudo field standing for the entity's display url.
pub const ENTITY_URL_FIELD: &str = "Fibery URL";

const CREATED_BY: &str = "fibery/created-by";
const CREATION_DATE: &str = "fibery/creation-date";
const MODIFICATION_DATE: &str = "fibery/modification-date";
const FILE_NAME: &str = "fibery/name";
const FILE_SECRET: &str = "fibery/secret";

/// Which fields of an entity a query returns.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// Title, ids and audit fields.
    #[default]
    Simplified,
    /// Every supported field.
    Raw,
    /// Exactly the named fields, [`ENTITY_URL_FIELD`] included.
    SelectedFields(Vec<String>),
}

/// Row limit of a query or sub query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Limit {
    /// At most this many rows.
    Count(u64),
    /// No limit at all.
    Unbounded,
}

impl Serialize for Limit {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self {
            Limit::Count(n) => serializer.serialize_u64(*n),
            Limit::Unbounded => serializer.serialize_str("q/no-limit"),
        }
    }
}

/// What one entry of a select map returns.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Selection {
    /// A field of the queried database, `"Tasks/Name"`.
    Field(String),
    /// A path through relations, `["Tasks/Project", "fibery/id"]`.
    Path(Vec<String>),
    /// Several paths under their own keys.
    Nested(SelectMap),
    /// A bounded query over a collection field.
    SubQuery(Box<SubQuery>),
}

impl Selection {
    fn path(segments: &[&str]) -> Self {
        Selection::Path(segments.iter().map(|s| s.to_string()).collect())
    }
}

/// Query over the entities of a collection field.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SubQuery {
    /// Collection the rows come from.
    #[serde(rename = "q/from")]
    pub from: Selection,
    /// Row limit.
    #[serde(rename = "q/limit")]
    pub limit: Limit,
    /// Select applied to each row.
    #[serde(rename = "q/select")]
    pub select: SelectMap,
}

/// Ordered map from output keys to selections.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct SelectMap(Vec<(String, Selection)>);

impl SelectMap {
    /// Create an empty select map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry, returns false if the key was selected already.
    pub fn insert(&mut self, key: impl Into<String>, selection: Selection) -> bool {
        let key = key.into();
        if self.get(&key).is_some() {
            return false;
        }
        self.0.push((key, selection));
        true
    }

    /// Selection stored under `key`.
    pub fn get(&self, key: &str) -> Option<&Selection> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    /// Keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Select map of `{name: title, value: id}` used to list entities as options.
    pub fn name_value(ty: &Type) -> Self {
        let mut select = SelectMap::new();
        if let Some(title) = ty.title_field() {
            select.insert("name", Selection::Field(title.to_string()));
        }
        select.insert("value", Selection::Field(ty.id_field().to_string()));
        select
    }
}

impl<K: Into<String>> FromIterator<(K, Selection)> for SelectMap {
    fn from_iter<T: IntoIterator<Item = (K, Selection)>>(iter: T) -> Self {
        let mut select = SelectMap::new();
        for (k, v) in iter {
            select.insert(k, v);
        }
        select
    }
}

impl Serialize for SelectMap {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (k, v) in &self.0 {
            map.serialize_entry(k, v)?;
        }
        map.end()
    }
}

/// Builds select maps for the databases of one schema.
pub struct SelectCompiler<'a> {
    schema: &'a Schema,
    policy: FieldPolicy,
}

impl<'a> SelectCompiler<'a> {
    /// Create a compiler over `schema`.
    pub fn new(schema: &'a Schema, policy: FieldPolicy) -> Self {
        Self { schema, policy }
    }

    /// Compile the select map of `ty` for `mode`.
    ///
    /// Unsupported fields are dropped silently. Naming a field `ty` doesn't
    /// have in [`OutputMode::SelectedFields`] is an error.
    pub fn compile(&self, ty: &Type, mode: &OutputMode) -> Result<SelectMap> {
        let fields: Vec<&Field> = match mode {
            OutputMode::Simplified => [
                ty.title_field(),
                Some(ty.id_field()),
                Some(ty.public_id_field()),
                Some(CREATED_BY),
                Some(CREATION_DATE),
                Some(MODIFICATION_DATE),
            ]
            .into_iter()
            .flatten()
            .filter_map(|name| ty.field(name))
            .collect(),
            OutputMode::Raw => ty.fields_in_display_order(),
            OutputMode::SelectedFields(names) => {
                let mut fields = Vec::with_capacity(names.len());
                for name in names {
                    if name == ENTITY_URL_FIELD {
                        // The url is built from the public id and the title.
                        fields.extend(
                            [Some(ty.public_id_field()), ty.title_field()]
                                .into_iter()
                                .flatten()
                                .filter_map(|name| ty.field(name)),
                        );
                    } else {
                        fields.push(ty.field_by_name(name)?);
                    }
                }
                fields
            }
        };

        Ok(fields
            .into_iter()
            .unique_by(|field| field.name.clone())
            .filter_map(|field| {
                self.select_field(field)
                    .map(|selection| (field.name.clone(), selection))
            })
            .collect())
    }

    /// Selection of a single field, `None` if the field is unsupported.
    pub fn select_field(&self, field: &Field) -> Option<Selection> {
        if !classify::is_supported(field, &self.policy) {
            log::debug!(
                "Skipping unsupported field {} of {}",
                field.name,
                field.holder_type
            );
            return None;
        }

        if classify::is_rich_text_document(field) {
            return Some(Selection::path(&[field.name.as_str(), classify::DOCUMENT_SECRET]));
        }

        if classify::is_file(field) {
            return Some(self.select_file(field));
        }

        let Some((target, title)) = self.target_of(field) else {
            return Some(Selection::Field(field.name.clone()));
        };

        if field.cardinality.is_to_one() {
            Some(Selection::Nested(SelectMap::from_iter([
                ("id", Selection::path(&[field.name.as_str(), target.id_field()])),
                ("name", Selection::path(&[field.name.as_str(), title])),
            ])))
        } else if field.cardinality.is_to_many() {
            Some(Selection::SubQuery(Box::new(SubQuery {
                from: Selection::Field(field.name.clone()),
                limit: Limit::Count(COLLECTION_SELECT_LIMIT),
                select: SelectMap::from_iter([
                    ("id", Selection::Field(target.id_field().to_string())),
                    ("name", Selection::Field(title.to_string())),
                ]),
            })))
        } else {
            Some(Selection::Field(field.name.clone()))
        }
    }

    fn select_file(&self, field: &Field) -> Selection {
        if classify::is_single_reference(field, self.schema) {
            Selection::Nested(SelectMap::from_iter([
                ("name", Selection::path(&[field.name.as_str(), FILE_NAME])),
                ("secret", Selection::path(&[field.name.as_str(), FILE_SECRET])),
            ]))
        } else {
            Selection::SubQuery(Box::new(SubQuery {
                from: Selection::path(&[field.name.as_str()]),
                limit: Limit::Unbounded,
                select: SelectMap::from_iter([
                    ("name", Selection::path(&[FILE_NAME])),
                    ("secret", Selection::path(&[FILE_SECRET])),
                ]),
            }))
        }
    }

    fn target_of(&self, field: &Field) -> Option<(&'a Type, &'a str)> {
        let target = self.schema.reference_target(field)?;
        Some((target, target.title_field()?))
    }
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;

    use serde_json::json;

    use super::*;
    use crate::config::FileFieldPolicy;
    use crate::types::parse_schema;
    use crate::ErrorKind;

    fn workspace_schema() -> Schema {
        let path = format!(
            "{}/../testdata/schema/workspace.json",
            env!("CARGO_MANIFEST_DIR")
        );
        parse_schema(&fs::read(path).expect("read_file must succeed"))
            .expect("parse_schema must succeed")
    }

    fn task_status_schema() -> Schema {
        let raw = json!({
            "fibery/version": 1,
            "fibery/types": [
                {
                    "fibery/id": "t-text",
                    "fibery/name": "fibery/text",
                    "fibery/meta": { "fibery/primitive?": true },
                    "fibery/fields": []
                },
                {
                    "fibery/id": "t-task",
                    "fibery/name": "Task",
                    "fibery/meta": { "fibery/domain?": true },
                    "fibery/fields": [
                        { "fibery/id": "f1", "fibery/name": "fibery/id", "fibery/type": "fibery/uuid",
                          "fibery/meta": { "fibery/id?": true } },
                        { "fibery/id": "f2", "fibery/name": "fibery/public-id", "fibery/type": "fibery/text",
                          "fibery/meta": { "fibery/public-id?": true } },
                        { "fibery/id": "f3", "fibery/name": "fibery/name", "fibery/type": "fibery/text",
                          "fibery/meta": { "ui/title?": true } },
                        { "fibery/id": "f4", "fibery/name": "status", "fibery/type": "Status",
                          "fibery/meta": {} }
                    ]
                },
                {
                    "fibery/id": "t-status",
                    "fibery/name": "Status",
                    "fibery/meta": { "fibery/enum?": true },
                    "fibery/fields": [
                        { "fibery/id": "f5", "fibery/name": "fibery/id", "fibery/type": "fibery/uuid",
                          "fibery/meta": { "fibery/id?": true } },
                        { "fibery/id": "f6", "fibery/name": "fibery/name", "fibery/type": "fibery/text",
                          "fibery/meta": { "ui/title?": true } }
                    ]
                }
            ]
        });
        parse_schema(raw.to_string().as_bytes()).unwrap()
    }

    #[test]
    fn test_simplified_selects_fixed_fields_only() {
        let schema = task_status_schema();
        let task = schema.type_by_name("Task").unwrap();

        let select = SelectCompiler::new(&schema, FieldPolicy::default())
            .compile(task, &OutputMode::Simplified)
            .unwrap();

        assert_eq!(
            select.keys().collect::<Vec<_>>(),
            vec!["fibery/name", "fibery/id", "fibery/public-id"]
        );
        assert_eq!(
            serde_json::to_value(&select).unwrap(),
            json!({
                "fibery/name": "fibery/name",
                "fibery/id": "fibery/id",
                "fibery/public-id": "fibery/public-id",
            })
        );
    }

    #[test]
    fn test_raw_selects_supported_fields_in_display_order() {
        let schema = workspace_schema();
        let task = schema.type_by_name("Tasks/Task").unwrap();
        let policy = FieldPolicy::default();

        let select = SelectCompiler::new(&schema, policy)
            .compile(task, &OutputMode::Raw)
            .unwrap();

        let expected = task
            .fields_in_display_order()
            .into_iter()
            .filter(|field| classify::is_supported(field, &policy))
            .map(|field| field.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(select.keys().collect::<Vec<_>>(), expected);
        assert_eq!(expected[0], "Tasks/Name");
        assert!(select.get("Tasks/Files").is_none());
        assert!(select.get("comments/comments").is_none());

        let value = serde_json::to_value(&select).unwrap();
        assert_eq!(
            value["Tasks/Description"],
            json!(["Tasks/Description", "Collaboration~Documents/secret"])
        );
        assert_eq!(
            value["workflow/state"],
            json!({
                "id": ["workflow/state", "fibery/id"],
                "name": ["workflow/state", "enum/name"],
            })
        );
        assert_eq!(
            value["Tasks/Assignees"],
            json!({
                "q/from": "Tasks/Assignees",
                "q/limit": 200,
                "q/select": { "id": "fibery/id", "name": "user/name" },
            })
        );
        assert_eq!(value["Tasks/Estimate"], json!("Tasks/Estimate"));
    }

    #[test]
    fn test_selected_fields_expand_url() {
        let schema = workspace_schema();
        let task = schema.type_by_name("Tasks/Task").unwrap();
        let mode = OutputMode::SelectedFields(vec![
            "Tasks/Estimate".to_string(),
            ENTITY_URL_FIELD.to_string(),
            "Tasks/Name".to_string(),
        ]);

        let select = SelectCompiler::new(&schema, FieldPolicy::default())
            .compile(task, &mode)
            .unwrap();

        assert_eq!(
            select.keys().collect::<Vec<_>>(),
            vec!["Tasks/Estimate", "fibery/public-id", "Tasks/Name"]
        );
    }

    #[test]
    fn test_selected_unknown_field() {
        let schema = workspace_schema();
        let task = schema.type_by_name("Tasks/Task").unwrap();
        let mode = OutputMode::SelectedFields(vec!["Tasks/Nope".to_string()]);

        let err = SelectCompiler::new(&schema, FieldPolicy::default())
            .compile(task, &mode)
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FieldNotFound);
    }

    #[test]
    fn test_supported_file_fields() {
        let schema = workspace_schema();
        let task = schema.type_by_name("Tasks/Task").unwrap();
        let policy = FieldPolicy {
            file_fields: FileFieldPolicy::Supported,
        };

        let selection = SelectCompiler::new(&schema, policy)
            .select_field(task.field_by_name("Tasks/Files").unwrap())
            .unwrap();

        assert_eq!(
            serde_json::to_value(&selection).unwrap(),
            json!({
                "q/from": ["Tasks/Files"],
                "q/limit": "q/no-limit",
                "q/select": { "name": ["fibery/name"], "secret": ["fibery/secret"] },
            })
        );
    }
}
