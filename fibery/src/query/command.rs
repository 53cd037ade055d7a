//! Envelopes of the `/api/commands` endpoint.

use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::query::{CompiledFilter, Expr, Limit, SelectMap};
use crate::types::{Field, Schema, Type};
use crate::{Error, ErrorKind, Result};

/// Number of entities listed per page when searching by title.
pub const SEARCH_PAGE_SIZE: u64 = 50;
/// Number of entities offered when picking the value of a relation.
pub const REFERENCE_OPTIONS_LIMIT: u64 = 200;

const ENTITY_ID_PARAM: &str = "$entityId";
const SEARCH_PARAM: &str = "$filter";

/// Direction of an order-by clause.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum SortOrder {
    /// Ascending.
    #[serde(rename = "q/asc")]
    Asc,
    /// Descending.
    #[serde(rename = "q/desc")]
    Desc,
}

/// How an entity is addressed by the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityLookup {
    /// By its uuid.
    Uuid(String),
    /// By its public id, the number shown in the entity url.
    PublicId(String),
}

/// An entity query, sent with `fibery.entity/query`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Query {
    #[serde(rename = "q/from")]
    from: String,
    #[serde(rename = "q/select")]
    select: SelectMap,
    #[serde(rename = "q/where", skip_serializing_if = "Option::is_none")]
    predicate: Option<Expr>,
    #[serde(rename = "q/order-by", skip_serializing_if = "Vec::is_empty")]
    order_by: Vec<(Expr, SortOrder)>,
    #[serde(rename = "q/limit", skip_serializing_if = "Option::is_none")]
    limit: Option<Limit>,
    #[serde(rename = "q/offset", skip_serializing_if = "Option::is_none")]
    offset: Option<u64>,
    #[serde(skip)]
    params: Map<String, Value>,
}

impl Query {
    /// Query `select` over all entities of the database `from`.
    pub fn new(from: impl Into<String>, select: SelectMap) -> Self {
        Self {
            from: from.into(),
            select,
            predicate: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
            params: Map::new(),
        }
    }

    /// Restrict the query to entities matching `filter`.
    pub fn with_filter(mut self, filter: CompiledFilter) -> Self {
        self.predicate = filter.predicate;
        self.params.extend(filter.params);
        self
    }

    /// Append an order-by clause.
    pub fn order_by(mut self, expr: Expr, order: SortOrder) -> Self {
        self.order_by.push((expr, order));
        self
    }

    /// Set the row limit.
    pub fn limit(mut self, limit: Limit) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Skip the first `offset` rows.
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// Bind a parameter, `name` must carry its `$` prefix.
    pub fn param(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.params.insert(name.into(), value.into());
        self
    }

    /// Database the query reads.
    pub fn database(&self) -> &str {
        &self.from
    }

    /// `q/where` predicate.
    pub fn predicate(&self) -> Option<&Expr> {
        self.predicate.as_ref()
    }

    /// Parameter values sent next to the query.
    pub fn params(&self) -> &Map<String, Value> {
        &self.params
    }

    /// Query a single entity of `ty`.
    pub fn entity(ty: &Type, select: SelectMap, lookup: EntityLookup) -> Self {
        let (field, id) = match lookup {
            EntityLookup::Uuid(id) => (ty.id_field(), id),
            EntityLookup::PublicId(id) => (ty.public_id_field(), id),
        };

        Query::new(ty.name.clone(), select)
            .limit(Limit::Count(1))
            .offset(0)
            .with_filter(CompiledFilter {
                predicate: Some(Expr::call(
                    "=",
                    vec![Expr::field(field), Expr::param(ENTITY_ID_PARAM)],
                )),
                params: Map::from_iter([(ENTITY_ID_PARAM.to_string(), Value::String(id))]),
            })
    }

    /// List the entities a relation field can point at, as name and value pairs.
    pub fn reference_options(schema: &Schema, field: &Field) -> Result<Self> {
        let target = schema.reference_target(field).ok_or_else(|| {
            Error::new(
                ErrorKind::InvalidInput,
                format!("Field {} doesn't reference a titled database", field.name),
            )
            .with_context("database", field.holder_type.clone())
            .with_context("field", field.name.clone())
        })?;

        let mut query = Query::new(target.name.clone(), SelectMap::name_value(target))
            .limit(Limit::Count(REFERENCE_OPTIONS_LIMIT));
        if let Some(order) = listing_order(target) {
            query = query.order_by(order, SortOrder::Asc);
        }
        Ok(query)
    }

    /// One page of the entities of `ty` whose title contains `text`.
    pub fn search(ty: &Type, text: Option<&str>, offset: u64) -> Self {
        let mut query = Query::new(ty.name.clone(), SelectMap::name_value(ty))
            .limit(Limit::Count(SEARCH_PAGE_SIZE))
            .offset(offset);
        if let Some(order) = listing_order(ty) {
            query = query.order_by(order, SortOrder::Asc);
        }

        match (text.filter(|t| !t.is_empty()), ty.title_field()) {
            (Some(text), Some(title)) => query.with_filter(CompiledFilter {
                predicate: Some(Expr::call(
                    "q/contains",
                    vec![Expr::field(title), Expr::param(SEARCH_PARAM)],
                )),
                params: Map::from_iter([(SEARCH_PARAM.to_string(), Value::from(text))]),
            }),
            _ => query,
        }
    }
}

/// Offset of the page after a search page that returned `returned` rows.
pub fn next_page_offset(offset: u64, returned: usize) -> Option<u64> {
    (returned as u64 == SEARCH_PAGE_SIZE).then_some(offset + SEARCH_PAGE_SIZE)
}

fn listing_order(ty: &Type) -> Option<Expr> {
    ty.rank_field().or(ty.title_field()).map(Expr::field)
}

/// A command of the `/api/commands` endpoint.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    /// `fibery.entity/query`
    Query(Query),
    /// `fibery.entity/create`
    Create {
        /// Database name.
        type_name: String,
        /// Field values, the id included.
        entity: Map<String, Value>,
    },
    /// `fibery.entity/update`
    Update {
        /// Database name.
        type_name: String,
        /// Field values, the id included.
        entity: Map<String, Value>,
    },
    /// `fibery.entity/delete`
    Delete {
        /// Database name.
        type_name: String,
        /// Name of the id field.
        id_field: String,
        /// Id of the deleted entity.
        id: String,
    },
    /// `fibery.entity/add-collection-items`
    AddCollectionItems {
        /// Database name.
        type_name: String,
        /// Name of the id field.
        id_field: String,
        /// Id of the entity owning the collection.
        entity_id: String,
        /// Collection field.
        field: String,
        /// Name of the id field of the collection's database.
        item_id_field: String,
        /// Ids of the added entities.
        items: Vec<String>,
    },
    /// `fibery.command/batch`
    Batch(Vec<Command>),
}

impl Command {
    /// Command name as the api knows it.
    pub fn name(&self) -> &'static str {
        match self {
            Command::Query(_) => "fibery.entity/query",
            Command::Create { .. } => "fibery.entity/create",
            Command::Update { .. } => "fibery.entity/update",
            Command::Delete { .. } => "fibery.entity/delete",
            Command::AddCollectionItems { .. } => "fibery.entity/add-collection-items",
            Command::Batch(_) => "fibery.command/batch",
        }
    }

    /// Create an entity of `ty`, returns the command and the new entity's id.
    ///
    /// A fresh uuid is assigned unless `entity` carries an id already.
    pub fn create(ty: &Type, mut entity: Map<String, Value>) -> (Self, String) {
        let id = match entity.get(ty.id_field()).and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                entity.insert(ty.id_field().to_string(), Value::String(id.clone()));
                id
            }
        };

        let command = Command::Create {
            type_name: ty.name.clone(),
            entity,
        };
        (command, id)
    }

    /// Create an entity and read it back with `select` in one round trip.
    pub fn create_and_fetch(
        ty: &Type,
        entity: Map<String, Value>,
        select: SelectMap,
    ) -> (Self, String) {
        let (create, id) = Command::create(ty, entity);
        let fetch = Query::entity(ty, select, EntityLookup::Uuid(id.clone()));
        (Command::Batch(vec![create, Command::Query(fetch)]), id)
    }

    /// Update the entity `id` of `ty`.
    pub fn update(ty: &Type, id: impl Into<String>, mut entity: Map<String, Value>) -> Self {
        entity.insert(ty.id_field().to_string(), Value::String(id.into()));
        Command::Update {
            type_name: ty.name.clone(),
            entity,
        }
    }

    /// Delete the entity `id` of `ty`.
    pub fn delete(ty: &Type, id: impl Into<String>) -> Self {
        Command::Delete {
            type_name: ty.name.clone(),
            id_field: ty.id_field().to_string(),
            id: id.into(),
        }
    }
}

struct IdRef<'a>(&'a str, &'a str);

impl Serialize for IdRef<'_> {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(self.0, self.1)?;
        map.end()
    }
}

#[derive(Serialize)]
struct QueryArgs<'a> {
    query: &'a Query,
    params: &'a Map<String, Value>,
}

#[derive(Serialize)]
struct EntityArgs<'a> {
    #[serde(rename = "type")]
    type_name: &'a str,
    entity: &'a Map<String, Value>,
}

#[derive(Serialize)]
struct DeleteArgs<'a> {
    #[serde(rename = "type")]
    type_name: &'a str,
    entity: IdRef<'a>,
}

#[derive(Serialize)]
struct CollectionArgs<'a> {
    #[serde(rename = "type")]
    type_name: &'a str,
    entity: IdRef<'a>,
    field: &'a str,
    items: Vec<IdRef<'a>>,
}

#[derive(Serialize)]
struct BatchArgs<'a> {
    commands: &'a [Command],
}

impl Serialize for Command {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(2))?;
        map.serialize_entry("command", self.name())?;

        match self {
            Command::Query(query) => map.serialize_entry(
                "args",
                &QueryArgs {
                    query,
                    params: &query.params,
                },
            )?,
            Command::Create { type_name, entity } | Command::Update { type_name, entity } => map
                .serialize_entry(
                    "args",
                    &EntityArgs {
                        type_name,
                        entity,
                    },
                )?,
            Command::Delete {
                type_name,
                id_field,
                id,
            } => map.serialize_entry(
                "args",
                &DeleteArgs {
                    type_name,
                    entity: IdRef(id_field, id),
                },
            )?,
            Command::AddCollectionItems {
                type_name,
                id_field,
                entity_id,
                field,
                item_id_field,
                items,
            } => map.serialize_entry(
                "args",
                &CollectionArgs {
                    type_name,
                    entity: IdRef(id_field, entity_id),
                    field,
                    items: items.iter().map(|id| IdRef(item_id_field, id)).collect(),
                },
            )?,
            Command::Batch(commands) => map.serialize_entry("args", &BatchArgs { commands })?,
        }

        map.end()
    }
}
