//! Http implementation of the schema source and command execution.
//!

use std::collections::HashMap;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, ETAG, IF_NONE_MATCH};
use reqwest::{Client, ClientBuilder, Request, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use url::Url;

use self::_models::CommandResponse;
use super::{FetchOutcome, SchemaSource};
use crate::config::FiberyClientConfig;
use crate::entity::{Document, DocumentCommand, DocumentFormat, SecretRef};
use crate::query::Command;
use crate::types::RawSchema;
use crate::{Error, ErrorKind, Result};

const PATH_API: &str = "api";
const USER_AGENT: &str = concat!("fibery-rs/", env!("CARGO_PKG_VERSION"));

/// Client of the Fibery http api, one instance serves every configured
/// workspace.
pub struct FiberyClient {
    config: FiberyClientConfig,
    rest_client: Client,
}

#[async_trait]
impl SchemaSource for FiberyClient {
    async fn fetch_raw_schema(&self, workspace: &str, etag: Option<&str>) -> Result<FetchOutcome> {
        let mut builder = self
            .rest_client
            .get(self.endpoint(workspace)?.schema()?)
            .header(AUTHORIZATION, self.authorization(workspace)?);
        if let Some(etag) = etag {
            builder = builder.header(IF_NONE_MATCH, etag);
        }
        let request = builder.build()?;

        log::debug!("Executing request: {} {}", request.method(), request.url());
        let resp = self.rest_client.execute(request).await?;

        match resp.status() {
            StatusCode::NOT_MODIFIED => Ok(FetchOutcome::NotModified),
            StatusCode::OK => {
                let etag = resp
                    .headers()
                    .get(ETAG)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string);
                let schema = resp.json::<RawSchema>().await?;
                Ok(FetchOutcome::Modified { schema, etag })
            }
            other => Err(status_error(workspace, other, resp.text().await?)),
        }
    }
}

impl FiberyClient {
    /// Creates fibery client.
    pub fn new(config: FiberyClientConfig) -> Result<Self> {
        log::info!("Creating fibery client with config: {config:?}");
        let rest_client = ClientBuilder::new()
            .user_agent(USER_AGENT)
            .timeout(config.request_timeout)
            .build()?;

        Ok(Self {
            config,
            rest_client,
        })
    }

    /// Creates fibery client from `fibery.*` properties.
    pub fn from_props(props: &HashMap<String, String>) -> Result<Self> {
        Self::new(FiberyClientConfig::try_from(props)?)
    }

    /// Base url of `workspace`, e.g. `https://acme.fibery.io/`.
    pub fn base_url(&self, workspace: &str) -> Result<Url> {
        Ok(self.endpoint(workspace)?.base)
    }

    /// Execute one command, returns its `result`.
    pub async fn execute_command(&self, workspace: &str, command: &Command) -> Result<Value> {
        log::debug!("Executing {} in workspace {workspace}", command.name());

        let request = self
            .rest_client
            .post(self.endpoint(workspace)?.commands()?)
            .header(AUTHORIZATION, self.authorization(workspace)?)
            .json(command)
            .build()?;

        self.execute_request::<CommandResponse>(workspace, request)
            .await?
            .into_result()
            .map_err(|e| {
                e.with_context("workspace", workspace)
                    .with_context("command", command.name())
            })
    }

    /// Execute `commands` in one `fibery.command/batch` round trip.
    pub async fn execute_batch(&self, workspace: &str, commands: Vec<Command>) -> Result<Value> {
        self.execute_command(workspace, &Command::Batch(commands))
            .await
    }

    /// Read the documents behind `secrets`.
    pub async fn get_documents(
        &self,
        workspace: &str,
        secrets: &[String],
        format: DocumentFormat,
    ) -> Result<Vec<Document>> {
        if secrets.is_empty() {
            return Ok(vec![]);
        }

        let command = DocumentCommand::GetDocuments(
            secrets
                .iter()
                .map(|secret| SecretRef { secret: secret.as_str() })
                .collect(),
        );
        self.execute_documents_command(workspace, &command, format)
            .await
    }

    /// Write document contents, creating documents that don't exist yet.
    pub async fn update_documents(
        &self,
        workspace: &str,
        documents: &[Document],
        format: DocumentFormat,
    ) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }

        let command = DocumentCommand::CreateOrUpdateDocuments(documents);
        self.execute_documents_command::<Value>(workspace, &command, format)
            .await?;
        Ok(())
    }

    async fn execute_documents_command<T: DeserializeOwned>(
        &self,
        workspace: &str,
        command: &DocumentCommand<'_>,
        format: DocumentFormat,
    ) -> Result<T> {
        let request = self
            .rest_client
            .post(self.endpoint(workspace)?.documents(format)?)
            .header(AUTHORIZATION, self.authorization(workspace)?)
            .json(command)
            .build()?;

        self.execute_request(workspace, request).await
    }

    async fn execute_request<T: DeserializeOwned>(
        &self,
        workspace: &str,
        request: Request,
    ) -> Result<T> {
        log::debug!("Executing request: {} {}", request.method(), request.url());

        let resp = self.rest_client.execute(request).await?;

        match resp.status() {
            StatusCode::OK => {
                let text = resp.text().await?;
                log::debug!("Response text is: {text}");
                Ok(serde_json::from_slice::<T>(text.as_bytes())?)
            }
            other => Err(status_error(workspace, other, resp.text().await?)),
        }
    }

    fn endpoint(&self, workspace: &str) -> Result<Endpoint> {
        Endpoint::new(workspace, &self.config.domain)
    }

    fn authorization(&self, workspace: &str) -> Result<String> {
        self.config
            .tokens
            .get(workspace)
            .map(|token| format!("Token {token}"))
            .ok_or_else(|| {
                Error::new(
                    ErrorKind::ConfigInvalid,
                    format!("No api token configured for workspace {workspace}"),
                )
                .with_context("workspace", workspace)
            })
    }
}

fn status_error(workspace: &str, status: StatusCode, text: String) -> Error {
    let message = match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
            format!("Request rejected, check the api token: {text}")
        }
        other => format!("Failed to execute http request, status code: {other}, message: {text}"),
    };

    Error::new(ErrorKind::Transport, message)
        .with_context("workspace", workspace)
        .with_context("status", status.as_str())
}

#[derive(Debug)]
struct Endpoint {
    base: Url,
}

impl Endpoint {
    fn new(workspace: &str, domain: &str) -> Result<Self> {
        if workspace.is_empty() || !workspace.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        {
            return Err(Error::new(
                ErrorKind::InvalidInput,
                format!("Invalid workspace name {workspace}"),
            ));
        }

        let base = Url::parse(&format!("https://{workspace}.{domain}/")).map_err(|e| {
            Error::new(ErrorKind::ConfigInvalid, "Can't build workspace url.")
                .with_context("workspace", workspace)
                .set_source(e)
        })?;
        Ok(Self { base })
    }

    fn schema(&self) -> Result<Url> {
        self.join(&[PATH_API, "schema"])
    }

    fn commands(&self) -> Result<Url> {
        self.join(&[PATH_API, "commands"])
    }

    fn documents(&self, format: DocumentFormat) -> Result<Url> {
        let mut url = self.join(&[PATH_API, "documents", "commands"])?;
        url.query_pairs_mut().append_pair("format", format.as_str());
        Ok(url)
    }

    fn join(&self, segments: &[&str]) -> Result<Url> {
        self.base.join(&segments.join("/")).map_err(|e| {
            Error::new(ErrorKind::Unexpected, "Can't build endpoint url.").set_source(e)
        })
    }
}

mod _models {
    use serde::{Deserialize, Serialize};
    use serde_json::Value;

    use crate::{Error, ErrorKind, Result};

    #[derive(Clone, Debug, Serialize, Deserialize)]
    pub(super) struct CommandResponse {
        pub(super) success: bool,
        #[serde(default)]
        pub(super) result: Value,
    }

    impl CommandResponse {
        pub(super) fn into_result(self) -> Result<Value> {
            if self.success {
                return Ok(self.result);
            }

            let message = self
                .result
                .get("message")
                .and_then(Value::as_str)
                .map(str::to_string)
                .unwrap_or_else(|| self.result.to_string());
            Err(Error::new(ErrorKind::CommandFailed, message))
        }
    }
}
