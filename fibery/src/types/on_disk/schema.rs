use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::types::in_memory;
use crate::types::in_memory::{Cardinality, Relation};
use crate::types::naming;
use crate::Error;
use crate::ErrorKind;
use crate::Result;

/// Parse a workspace schema from json bytes.
pub fn parse_schema(bs: &[u8]) -> Result<in_memory::Schema> {
    let v: RawSchema = serde_json::from_slice(bs)?;
    v.try_into()
}

/// Schema as returned by the `/api/schema` endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawSchema {
    #[serde(rename = "fibery/version", default)]
    version: i64,
    #[serde(rename = "fibery/types")]
    types: Vec<RawType>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawType {
    #[serde(rename = "fibery/id")]
    id: String,
    #[serde(rename = "fibery/name")]
    name: String,
    #[serde(rename = "fibery/deleted?", default)]
    deleted: bool,
    #[serde(rename = "fibery/meta", default)]
    meta: Option<RawTypeMeta>,
    #[serde(rename = "fibery/fields", default)]
    fields: Vec<RawField>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawTypeMeta {
    #[serde(rename = "fibery/domain?", default)]
    domain: bool,
    #[serde(rename = "fibery/primitive?", default)]
    primitive: bool,
    #[serde(rename = "fibery/enum?", default)]
    is_enum: bool,
    #[serde(rename = "app/mixins", default)]
    mixins: Option<HashMap<String, bool>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawField {
    #[serde(rename = "fibery/id")]
    id: String,
    #[serde(rename = "fibery/name")]
    name: String,
    #[serde(rename = "fibery/type")]
    value_type: String,
    #[serde(rename = "fibery/deleted?", default)]
    deleted: bool,
    #[serde(rename = "fibery/meta", default)]
    meta: Option<RawFieldMeta>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct RawFieldMeta {
    #[serde(rename = "fibery/collection?", default)]
    collection: bool,
    #[serde(rename = "fibery/readonly?", default)]
    readonly: bool,
    #[serde(rename = "fibery/id?", default)]
    id: bool,
    #[serde(rename = "fibery/public-id?", default)]
    public_id: bool,
    #[serde(rename = "ui/title?", default)]
    title: bool,
    #[serde(rename = "fibery/required?", default)]
    required: bool,
    #[serde(rename = "fibery/relation", default)]
    relation: Option<String>,
    #[serde(rename = "fibery/multi-relation", default)]
    multi_relation: Option<String>,
    #[serde(rename = "ui/object-editor-order", default)]
    object_editor_order: Option<f64>,
}

impl TryFrom<RawSchema> for in_memory::Schema {
    type Error = Error;

    fn try_from(v: RawSchema) -> Result<Self> {
        let mut types = Vec::with_capacity(v.types.len());
        for raw_type in v.types.into_iter().filter(|t| !t.deleted) {
            types.push(in_memory::Type::try_from(raw_type)?);
        }

        let mut type_lookup = HashMap::with_capacity(types.len());
        for (idx, ty) in types.iter().enumerate() {
            if type_lookup.insert(ty.name.clone(), idx).is_some() {
                return Err(Error::new(
                    ErrorKind::SchemaIntegrity,
                    format!("database {} is declared more than once", ty.name),
                )
                .with_context("database", ty.name.clone()));
            }
        }

        let mut schema = in_memory::Schema {
            version: v.version,
            types,
            type_lookup,
        };
        resolve_cardinalities(&mut schema)?;

        Ok(schema)
    }
}

impl TryFrom<RawType> for in_memory::Type {
    type Error = Error;

    fn try_from(v: RawType) -> Result<Self> {
        let meta = v.meta.unwrap_or_default();
        let has_rank = meta
            .mixins
            .as_ref()
            .is_some_and(|mixins| mixins.contains_key(in_memory::RANK_MIXIN));

        let mut id_field = None;
        let mut public_id_field = None;
        let mut title_field: Option<String> = None;
        let mut rank_field = None;

        let mut fields = Vec::with_capacity(v.fields.len());
        let mut field_lookup = HashMap::with_capacity(v.fields.len());

        for raw_field in v.fields.into_iter().filter(|f| !f.deleted) {
            let field = make_field(raw_field, &v.name);

            if field.is_id {
                id_field = Some(field.name.clone());
            } else if field.is_public_id {
                public_id_field = Some(field.name.clone());
            } else if field.is_title {
                if let Some(existing) = &title_field {
                    return Err(Error::new(
                        ErrorKind::SchemaIntegrity,
                        format!(
                            "database {} has two title fields: {existing} and {}",
                            v.name, field.name
                        ),
                    )
                    .with_context("database", v.name.clone()));
                }
                title_field = Some(field.name.clone());
            } else if has_rank && field.name == in_memory::RANK_FIELD {
                rank_field = Some(field.name.clone());
            }

            if field_lookup.insert(field.name.clone(), fields.len()).is_some() {
                return Err(Error::new(
                    ErrorKind::SchemaIntegrity,
                    format!("field {} is declared more than once", field.name),
                )
                .with_context("database", v.name.clone())
                .with_context("field", field.name.clone()));
            }
            fields.push(field);
        }

        Ok(in_memory::Type {
            title: naming::title_for(&v.name),
            id: v.id,
            name: v.name,
            is_domain: meta.domain,
            is_primitive: meta.primitive,
            is_enum: meta.is_enum,
            fields,
            field_lookup,
            id_field: id_field.unwrap_or_else(|| in_memory::DEFAULT_ID_FIELD.to_string()),
            public_id_field: public_id_field
                .unwrap_or_else(|| in_memory::DEFAULT_PUBLIC_ID_FIELD.to_string()),
            title_field,
            rank_field,
        })
    }
}

fn make_field(v: RawField, holder_type: &str) -> in_memory::Field {
    let meta = v.meta.unwrap_or_default();

    let relation = match (meta.relation, meta.multi_relation) {
        (Some(id), _) => Relation::Single(id),
        (None, Some(id)) => Relation::Multi(id),
        (None, None) => Relation::None,
    };

    in_memory::Field {
        id: v.id,
        title: naming::field_title(&v.name, holder_type),
        name: v.name,
        value_type: v.value_type,
        holder_type: holder_type.to_string(),
        display_order: meta.object_editor_order.unwrap_or_default(),
        is_collection: meta.collection,
        is_read_only: meta.readonly,
        is_id: meta.id,
        is_public_id: meta.public_id,
        is_title: meta.title,
        is_required: meta.required,
        relation,
        cardinality: Cardinality::Unresolved,
    }
}

/// Resolve every field's cardinality by pairing it with the field on the
/// target database that carries the same relation id.
fn resolve_cardinalities(schema: &mut in_memory::Schema) -> Result<()> {
    let mut resolved = Vec::with_capacity(schema.types.len());
    for ty in &schema.types {
        let mut cardinalities = Vec::with_capacity(ty.fields.len());
        for field in &ty.fields {
            cardinalities.push(resolve_cardinality(schema, field)?);
        }
        resolved.push(cardinalities);
    }

    for (ty, cardinalities) in schema.types.iter_mut().zip(resolved) {
        for (field, cardinality) in ty.fields.iter_mut().zip(cardinalities) {
            field.cardinality = cardinality;
        }
    }

    Ok(())
}

fn resolve_cardinality(
    schema: &in_memory::Schema,
    field: &in_memory::Field,
) -> Result<Cardinality> {
    let Some(target) = schema.reference_target(field) else {
        return Ok(Cardinality::Unresolved);
    };

    let Some(relation_id) = field.relation.id() else {
        // Enum and one-way references only know their own side.
        return Ok(Cardinality::from_collection_flags(field.is_collection, true));
    };

    let is_self_relation = target.name == field.holder_type;
    let counterparts: Vec<&in_memory::Field> = target
        .fields
        .iter()
        .filter(|f| f.relation.id() == Some(relation_id))
        .filter(|f| !(is_self_relation && f.name == field.name))
        .collect();

    let counterpart = match counterparts.as_slice() {
        [counterpart] => *counterpart,
        [] => {
            return Err(Error::new(
                ErrorKind::SchemaIntegrity,
                format!(
                    "relation {relation_id} of field {} has no counterpart in database {}",
                    field.name, target.name
                ),
            )
            .with_context("database", field.holder_type.clone())
            .with_context("field", field.name.clone())
            .with_context("relation", relation_id))
        }
        many => {
            return Err(Error::new(
                ErrorKind::SchemaIntegrity,
                format!(
                    "relation {relation_id} of field {} has {} counterparts in database {}",
                    field.name,
                    many.len(),
                    target.name
                ),
            )
            .with_context("database", field.holder_type.clone())
            .with_context("field", field.name.clone())
            .with_context("relation", relation_id));
        }
    };

    Ok(Cardinality::from_collection_flags(
        field.is_collection,
        counterpart.is_collection,
    ))
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;

    use super::*;
    use crate::ErrorKind;

    fn read_workspace_schema() -> Vec<u8> {
        let path = format!(
            "{}/../testdata/schema/workspace.json",
            env!("CARGO_MANIFEST_DIR")
        );

        fs::read(path).expect("read_file must succeed")
    }

    fn raw_field(name: &str, value_type: &str, meta: serde_json::Value) -> serde_json::Value {
        serde_json::json!({
            "fibery/id": format!("id-{name}"),
            "fibery/name": name,
            "fibery/type": value_type,
            "fibery/meta": meta,
        })
    }

    fn raw_type(name: &str, fields: Vec<serde_json::Value>) -> serde_json::Value {
        serde_json::json!({
            "fibery/id": format!("id-{name}"),
            "fibery/name": name,
            "fibery/meta": { "fibery/domain?": true },
            "fibery/fields": fields,
        })
    }

    fn text_type() -> serde_json::Value {
        serde_json::json!({
            "fibery/id": "id-text",
            "fibery/name": "fibery/text",
            "fibery/meta": { "fibery/primitive?": true },
            "fibery/fields": [],
        })
    }

    fn build(types: Vec<serde_json::Value>) -> Result<in_memory::Schema> {
        let raw = serde_json::json!({ "fibery/version": 7, "fibery/types": types });
        parse_schema(raw.to_string().as_bytes())
    }

    fn title(name: &str) -> serde_json::Value {
        raw_field(name, "fibery/text", serde_json::json!({ "ui/title?": true }))
    }

    #[test]
    fn test_parse_workspace_schema() {
        let schema = parse_schema(&read_workspace_schema()).expect("parse_schema must succeed");

        assert_eq!(schema.version, 42);
        assert!(schema.get_type("Tasks/Archived").is_none());

        let task = schema.type_by_name("Tasks/Task").unwrap();
        assert_eq!(task.id_field(), "fibery/id");
        assert_eq!(task.public_id_field(), "fibery/public-id");
        assert_eq!(task.title_field(), Some("Tasks/Name"));
        assert_eq!(task.rank_field(), Some("fibery/rank"));
        assert!(task.field("Tasks/Removed").is_none());

        let status = task.field_by_name("workflow/state").unwrap();
        assert_eq!(status.cardinality, Cardinality::ManyToOne);
        assert_eq!(status.title, "State");

        let assignees = task.field_by_name("Tasks/Assignees").unwrap();
        assert_eq!(assignees.cardinality, Cardinality::ManyToMany);

        let project = task.field_by_name("Tasks/Project").unwrap();
        assert_eq!(project.cardinality, Cardinality::ManyToOne);
        let tasks = schema
            .type_by_name("Tasks/Project")
            .unwrap()
            .field_by_name("Tasks/Tasks")
            .unwrap();
        assert_eq!(tasks.cardinality, Cardinality::OneToMany);

        let name = task.field_by_name("Tasks/Name").unwrap();
        assert_eq!(name.cardinality, Cardinality::Unresolved);
    }

    #[test]
    fn test_build_is_deterministic() {
        let bs = read_workspace_schema();
        let left = parse_schema(&bs).unwrap();
        let right = parse_schema(&bs).unwrap();
        assert_eq!(left, right);
    }

    #[test]
    fn test_missing_counterpart_is_integrity_error() {
        let err = build(vec![
            text_type(),
            raw_type(
                "Tasks/Task",
                vec![
                    title("Tasks/Name"),
                    raw_field(
                        "Tasks/Project",
                        "Tasks/Project",
                        serde_json::json!({ "fibery/relation": "r-project" }),
                    ),
                ],
            ),
            raw_type("Tasks/Project", vec![title("Tasks/Name")]),
        ])
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SchemaIntegrity);
        assert_eq!(err.context_value("field"), Some("Tasks/Project"));
        assert_eq!(err.context_value("relation"), Some("r-project"));
    }

    #[test]
    fn test_ambiguous_counterpart_is_integrity_error() {
        let err = build(vec![
            text_type(),
            raw_type(
                "Tasks/Task",
                vec![
                    title("Tasks/Name"),
                    raw_field(
                        "Tasks/Project",
                        "Tasks/Project",
                        serde_json::json!({ "fibery/relation": "r-project" }),
                    ),
                ],
            ),
            raw_type(
                "Tasks/Project",
                vec![
                    title("Tasks/Name"),
                    raw_field(
                        "Tasks/Tasks",
                        "Tasks/Task",
                        serde_json::json!({ "fibery/relation": "r-project", "fibery/collection?": true }),
                    ),
                    raw_field(
                        "Tasks/Other Tasks",
                        "Tasks/Task",
                        serde_json::json!({ "fibery/relation": "r-project", "fibery/collection?": true }),
                    ),
                ],
            ),
        ])
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SchemaIntegrity);
    }

    #[test]
    fn test_self_relation() {
        let schema = build(vec![
            text_type(),
            raw_type(
                "Tasks/Task",
                vec![
                    title("Tasks/Name"),
                    raw_field(
                        "Tasks/Parent",
                        "Tasks/Task",
                        serde_json::json!({ "fibery/relation": "r-parent" }),
                    ),
                    raw_field(
                        "Tasks/Subtasks",
                        "Tasks/Task",
                        serde_json::json!({ "fibery/relation": "r-parent", "fibery/collection?": true }),
                    ),
                ],
            ),
        ])
        .unwrap();

        let task = schema.type_by_name("Tasks/Task").unwrap();
        assert_eq!(
            task.field_by_name("Tasks/Parent").unwrap().cardinality,
            Cardinality::ManyToOne
        );
        assert_eq!(
            task.field_by_name("Tasks/Subtasks").unwrap().cardinality,
            Cardinality::OneToMany
        );
    }

    #[test]
    fn test_lone_self_relation_is_integrity_error() {
        let err = build(vec![
            text_type(),
            raw_type(
                "Tasks/Task",
                vec![
                    title("Tasks/Name"),
                    raw_field(
                        "Tasks/Parent",
                        "Tasks/Task",
                        serde_json::json!({ "fibery/relation": "r-orphan" }),
                    ),
                ],
            ),
        ])
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SchemaIntegrity);
        assert_eq!(err.context_value("field"), Some("Tasks/Parent"));
        assert_eq!(err.context_value("relation"), Some("r-orphan"));

        let err = build(vec![
            text_type(),
            raw_type(
                "Tasks/Task",
                vec![
                    title("Tasks/Name"),
                    raw_field(
                        "Tasks/Related",
                        "Tasks/Task",
                        serde_json::json!({ "fibery/multi-relation": "r-related", "fibery/collection?": true }),
                    ),
                ],
            ),
        ])
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::SchemaIntegrity);
    }

    #[test]
    fn test_reference_to_untitled_type_is_unresolved() {
        let schema = build(vec![
            text_type(),
            raw_type(
                "Tasks/Task",
                vec![
                    title("Tasks/Name"),
                    raw_field(
                        "Tasks/Blob",
                        "Tasks/Blob",
                        serde_json::json!({ "fibery/relation": "r-blob" }),
                    ),
                ],
            ),
            raw_type("Tasks/Blob", vec![]),
        ])
        .unwrap();

        let blob = schema
            .type_by_name("Tasks/Task")
            .unwrap()
            .field_by_name("Tasks/Blob")
            .unwrap();
        assert_eq!(blob.cardinality, Cardinality::Unresolved);
    }

    #[test]
    fn test_title_leads_display_order() {
        let schema = build(vec![
            text_type(),
            raw_type(
                "Tasks/Task",
                vec![
                    raw_field(
                        "Tasks/Notes",
                        "fibery/text",
                        serde_json::json!({ "ui/object-editor-order": 1 }),
                    ),
                    raw_field(
                        "Tasks/Name",
                        "fibery/text",
                        serde_json::json!({ "ui/title?": true, "ui/object-editor-order": 3 }),
                    ),
                    raw_field(
                        "Tasks/Pinned",
                        "fibery/text",
                        serde_json::json!({ "ui/object-editor-order": -5 }),
                    ),
                ],
            ),
        ])
        .unwrap();

        let names: Vec<&str> = schema
            .type_by_name("Tasks/Task")
            .unwrap()
            .fields_in_display_order()
            .into_iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(names, vec!["Tasks/Name", "Tasks/Pinned", "Tasks/Notes"]);
    }

    #[test]
    fn test_two_title_fields_is_integrity_error() {
        let err = build(vec![
            text_type(),
            raw_type("Tasks/Task", vec![title("Tasks/Name"), title("Tasks/Other")]),
        ])
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::SchemaIntegrity);
    }

    #[test]
    fn test_unknown_names() {
        let schema = build(vec![text_type(), raw_type("Tasks/Task", vec![title("Tasks/Name")])])
            .unwrap();

        let err = schema.type_by_name("Tasks/Nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TypeNotFound);
        assert_eq!(err.context_value("database"), Some("Tasks/Nope"));

        let err = schema
            .type_by_name("Tasks/Task")
            .unwrap()
            .field_by_name("Tasks/Nope")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::FieldNotFound);
        assert_eq!(err.context_value("field"), Some("Tasks/Nope"));
    }
}
