//! in_memory module provides the definition of the workspace schema model.

use std::collections::HashMap;
use std::sync::Arc;

use enum_display::EnumDisplay;
use itertools::Itertools;

use crate::Error;
use crate::ErrorKind;
use crate::Result;

/// Id field used when no field of a database carries the id flag.
pub const DEFAULT_ID_FIELD: &str = "fibery/id";
/// Public id field used when no field of a database carries the public id flag.
pub const DEFAULT_PUBLIC_ID_FIELD: &str = "fibery/public-id";
/// Rank field, only honored on databases with the rank mixin installed.
pub const RANK_FIELD: &str = "fibery/rank";
pub(crate) const RANK_MIXIN: &str = "fibery/rank-mixin";

/// Reference to a [`Schema`].
pub type SchemaRef = Arc<Schema>;

/// Link between the two fields forming one logical relationship.
///
/// Both sides of a relationship share the same opaque id, e.g. `Task.assignee`
/// and `User.assigned-tasks`. Enum and one-way references carry no link.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Relation {
    /// No relation id, the field is a scalar, an enum or a one-way reference.
    None,
    /// Linked through `fibery/relation`.
    Single(String),
    /// Linked through `fibery/multi-relation`.
    Multi(String),
}

impl Relation {
    /// Return the relation id shared with the counterpart field.
    pub fn id(&self) -> Option<&str> {
        match self {
            Relation::None => None,
            Relation::Single(id) | Relation::Multi(id) => Some(id),
        }
    }
}

/// Shape of the relationship between a field and its target database.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, EnumDisplay)]
pub enum Cardinality {
    /// The field doesn't point at a titled, non-primitive database.
    Unresolved,
    /// One holder entity, one target entity.
    OneToOne,
    /// Many holder entities share one target entity.
    ManyToOne,
    /// One holder entity owns many target entities.
    OneToMany,
    /// Many holder entities, many target entities.
    ManyToMany,
}

impl Cardinality {
    /// Combine the collection flags of a field and its counterpart.
    pub fn from_collection_flags(is_collection: bool, counterpart_is_collection: bool) -> Self {
        match (is_collection, counterpart_is_collection) {
            (false, false) => Cardinality::OneToOne,
            (false, true) => Cardinality::ManyToOne,
            (true, false) => Cardinality::OneToMany,
            (true, true) => Cardinality::ManyToMany,
        }
    }

    /// Whether the field holds at most one target entity.
    pub fn is_to_one(&self) -> bool {
        matches!(self, Cardinality::OneToOne | Cardinality::ManyToOne)
    }

    /// Whether the field holds a collection of target entities.
    pub fn is_to_many(&self) -> bool {
        matches!(self, Cardinality::OneToMany | Cardinality::ManyToMany)
    }
}

/// A Field is one attribute or relation on a database.
#[derive(Debug, PartialEq, Clone)]
pub struct Field {
    /// Backend-stable id.
    pub id: String,
    /// Namespaced backend key, e.g. `Tasks/Due Date`.
    pub name: String,
    /// Human readable label.
    pub title: String,
    /// Name of the database this field's values belong to.
    pub value_type: String,
    /// Name of the database owning this field.
    pub holder_type: String,
    /// Position in the entity editor.
    pub display_order: f64,
    /// Holds a collection of values.
    pub is_collection: bool,
    /// Can't be written through the api.
    pub is_read_only: bool,
    /// This is the id field of its database.
    pub is_id: bool,
    /// This is the public id field of its database.
    pub is_public_id: bool,
    /// This is the title field of its database.
    pub is_title: bool,
    /// A value must be provided.
    pub is_required: bool,
    /// Link to the counterpart field.
    pub relation: Relation,
    /// Resolved while building the schema.
    pub cardinality: Cardinality,
}

/// A Type is one database of the workspace.
#[derive(Debug, PartialEq, Clone)]
pub struct Type {
    /// Backend-stable id.
    pub id: String,
    /// Namespaced name, e.g. `Tasks/Task`.
    pub name: String,
    /// Human readable label.
    pub title: String,
    /// User facing database, as opposed to platform internals.
    pub is_domain: bool,
    /// Scalar type such as `fibery/text`.
    pub is_primitive: bool,
    /// Single or multi select options.
    pub is_enum: bool,
    pub(crate) fields: Vec<Field>,
    pub(crate) field_lookup: HashMap<String, usize>,
    pub(crate) id_field: String,
    pub(crate) public_id_field: String,
    pub(crate) title_field: Option<String>,
    pub(crate) rank_field: Option<String>,
}

impl Type {
    /// Return all fields in backend order.
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Look up a field by name.
    pub fn field_by_name(&self, name: &str) -> Result<&Field> {
        self.field(name).ok_or_else(|| {
            Error::new(
                ErrorKind::FieldNotFound,
                format!("Field \"{name}\" not found in the database \"{}\"", self.name),
            )
            .with_context("database", self.name.clone())
            .with_context("field", name)
        })
    }

    /// Look up a field by name, absence is not an error.
    pub fn field(&self, name: &str) -> Option<&Field> {
        self.field_lookup.get(name).map(|idx| &self.fields[*idx])
    }

    /// Name of the id field.
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Name of the public id field.
    pub fn public_id_field(&self) -> &str {
        &self.public_id_field
    }

    /// Name of the title field, primitive databases have none.
    pub fn title_field(&self) -> Option<&str> {
        self.title_field.as_deref()
    }

    /// Name of the rank field, if the database is ranked.
    pub fn rank_field(&self) -> Option<&str> {
        self.rank_field.as_deref()
    }

    /// Whether fields pointing at this database take part in relation
    /// classification.
    pub fn is_reference_target(&self) -> bool {
        !self.is_primitive && self.title_field.is_some()
    }

    /// Fields ordered the way the entity editor shows them: the title
    /// first, then by display order.
    pub fn fields_in_display_order(&self) -> Vec<&Field> {
        self.fields
            .iter()
            .sorted_by(|a, b| {
                b.is_title
                    .cmp(&a.is_title)
                    .then(a.display_order.total_cmp(&b.display_order))
            })
            .collect()
    }
}

/// The full type system of one workspace at one point in time.
#[derive(Debug, PartialEq, Clone)]
pub struct Schema {
    /// Schema version reported by the backend.
    pub version: i64,
    pub(crate) types: Vec<Type>,
    pub(crate) type_lookup: HashMap<String, usize>,
}

impl Schema {
    /// Return all databases, including primitive and platform ones.
    pub fn types(&self) -> &[Type] {
        &self.types
    }

    /// Look up a database by name.
    pub fn type_by_name(&self, name: &str) -> Result<&Type> {
        self.get_type(name).ok_or_else(|| {
            Error::new(
                ErrorKind::TypeNotFound,
                format!("Database \"{name}\" not found in the schema"),
            )
            .with_context("database", name)
        })
    }

    /// Look up a database by name, absence is not an error.
    pub fn get_type(&self, name: &str) -> Option<&Type> {
        self.type_lookup.get(name).map(|idx| &self.types[*idx])
    }

    /// User facing databases.
    pub fn domain_types(&self) -> impl Iterator<Item = &Type> {
        self.types.iter().filter(|ty| ty.is_domain)
    }

    /// Database a field points at, when it can take part in relation
    /// classification.
    pub fn reference_target(&self, field: &Field) -> Option<&Type> {
        self.get_type(&field.value_type)
            .filter(|target| target.is_reference_target())
    }
}
