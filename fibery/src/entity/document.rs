use std::collections::HashMap;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::EntityUpdate;
use crate::classify::is_rich_text_document;
use crate::types::Type;
use crate::{Error, ErrorKind, Result};

/// Format document contents are read and written in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentFormat {
    /// Markdown.
    #[default]
    Markdown,
    /// Html.
    Html,
    /// The editor's json tree.
    Json,
}

impl DocumentFormat {
    /// Value of the `format` query parameter.
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentFormat::Markdown => "md",
            DocumentFormat::Html => "html",
            DocumentFormat::Json => "json",
        }
    }
}

impl Display for DocumentFormat {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for DocumentFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "md" => Ok(DocumentFormat::Markdown),
            "html" => Ok(DocumentFormat::Html),
            "json" => Ok(DocumentFormat::Json),
            other => Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Unknown document format {other}"),
            )),
        }
    }
}

/// A rich-text document addressed by its secret.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    /// Handle selected through `Collaboration~Documents/secret`.
    pub secret: String,
    /// Content in the requested format.
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub(crate) struct SecretRef<'a> {
    pub(crate) secret: &'a str,
}

/// Body of a `documents/commands` request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "command", content = "args")]
pub(crate) enum DocumentCommand<'a> {
    #[serde(rename = "get-documents")]
    GetDocuments(Vec<SecretRef<'a>>),
    #[serde(rename = "create-or-update-documents")]
    CreateOrUpdateDocuments(&'a [Document]),
}

impl EntityUpdate {
    /// Pair the deferred document contents with the secrets of `entity`,
    /// as fetched after its create or update.
    ///
    /// Documents whose secret wasn't selected are skipped.
    pub fn document_writes(&self, entity: &Map<String, Value>) -> Vec<Document> {
        self.documents
            .iter()
            .filter_map(|doc| {
                let secret = entity.get(&doc.field)?.as_str()?;
                if secret.is_empty() {
                    return None;
                }
                Some(Document {
                    secret: secret.to_string(),
                    content: doc.content.clone(),
                })
            })
            .collect()
    }
}

/// Secrets of every rich-text field of `entities`, in entity order.
pub fn document_secrets(entities: &[Map<String, Value>], ty: &Type) -> Vec<String> {
    let fields: Vec<&str> = ty
        .fields()
        .iter()
        .filter(|f| is_rich_text_document(f))
        .map(|f| f.name.as_str())
        .collect();

    entities
        .iter()
        .flat_map(|entity| {
            fields
                .iter()
                .filter_map(|field| entity.get(*field)?.as_str())
                .filter(|secret| !secret.is_empty())
                .map(str::to_string)
        })
        .collect()
}

/// Replace document secrets in `entities` by the contents in `documents`.
///
/// Secrets without a returned document are left as they are.
pub fn fill_documents(entities: &mut [Map<String, Value>], ty: &Type, documents: Vec<Document>) {
    let mut contents: HashMap<String, String> = documents
        .into_iter()
        .map(|doc| (doc.secret, doc.content))
        .collect();

    for field in ty.fields().iter().filter(|f| is_rich_text_document(f)) {
        for entity in entities.iter_mut() {
            let Some(slot) = entity.get_mut(&field.name) else {
                continue;
            };
            let Some(content) = slot.as_str().and_then(|secret| contents.remove(secret)) else {
                continue;
            };
            *slot = Value::String(content);
        }
    }
}
