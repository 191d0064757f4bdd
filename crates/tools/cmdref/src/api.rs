//! Typed client for the cmdref catalog API.

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::debug;
use url::Url;

pub const COMMANDS_PATH: &str = "/v1/commands";

pub type ApiResult<T> = Result<T, ApiError>;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("not found: {path}")]
    NotFound { path: String },

    #[error("catalog API returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("catalog request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid catalog response: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid API base URL: {0}")]
    Url(#[from] url::ParseError),
}

/// A saved command as returned by the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Command {
    pub id: u64,
    pub title: String,
    pub command: String,
    #[serde(default, deserialize_with = "null_as_empty")]
    pub tags: Vec<String>,
    #[serde(default)]
    pub notes: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<String>,
}

/// Payload for creating a command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NewCommand {
    pub title: String,
    pub command: String,
    pub tags: Vec<String>,
    pub notes: String,
}

fn null_as_empty<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(Option::<Vec<String>>::deserialize(deserializer)?.unwrap_or_default())
}

pub struct CatalogClient {
    http_client: Client,
    base: String,
    token: String,
}

impl CatalogClient {
    pub fn new(api_base: &str, token: impl Into<String>, http_timeout: Duration) -> ApiResult<Self> {
        // Fail early on a malformed base instead of on the first request
        Url::parse(api_base)?;
        let http_client = Client::builder().timeout(http_timeout).build()?;

        Ok(Self {
            http_client,
            base: api_base.trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    fn url(&self, path: &str) -> ApiResult<Url> {
        Ok(Url::parse(&format!("{}{}", self.base, path))?)
    }

    pub async fn create(&self, new_command: &NewCommand) -> ApiResult<Command> {
        let url = self.url(COMMANDS_PATH)?;
        debug!("POST {}", url);

        let response = self
            .http_client
            .post(url)
            .bearer_auth(&self.token)
            .json(new_command)
            .send()
            .await?;

        decode(COMMANDS_PATH, response).await
    }

    pub async fn list(&self) -> ApiResult<Vec<Command>> {
        let url = self.url(COMMANDS_PATH)?;
        debug!("GET {}", url);

        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        decode(COMMANDS_PATH, response).await
    }

    pub async fn search(&self, query: &str) -> ApiResult<Vec<Command>> {
        let mut url = self.url(COMMANDS_PATH)?;
        url.query_pairs_mut().append_pair("q", query);
        debug!("GET {}", url);

        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        decode(COMMANDS_PATH, response).await
    }

    pub async fn get(&self, id: u64) -> ApiResult<Command> {
        let path = format!("{}/{}", COMMANDS_PATH, id);
        let url = self.url(&path)?;
        debug!("GET {}", url);

        let response = self
            .http_client
            .get(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        decode(&path, response).await
    }

    pub async fn delete(&self, id: u64) -> ApiResult<()> {
        let path = format!("{}/{}", COMMANDS_PATH, id);
        let url = self.url(&path)?;
        debug!("DELETE {}", url);

        let response = self
            .http_client
            .delete(url)
            .bearer_auth(&self.token)
            .send()
            .await?;

        check_status(&path, response).await.map(|_| ())
    }
}

async fn check_status(path: &str, response: Response) -> ApiResult<String> {
    let status = response.status();
    let body = response.text().await?;

    if status == StatusCode::NOT_FOUND {
        return Err(ApiError::NotFound {
            path: path.to_string(),
        });
    }
    if !status.is_success() {
        return Err(ApiError::Status {
            status: status.as_u16(),
            body: body.trim().to_string(),
        });
    }

    Ok(body)
}

async fn decode<T: DeserializeOwned>(path: &str, response: Response) -> ApiResult<T> {
    let body = check_status(path, response).await?;
    Ok(serde_json::from_str(&body)?)
}
