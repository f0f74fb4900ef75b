use crate::adapters::tams::auth::TokenProvider;
use crate::ports::tams::{Page, TamsApi, TamsError};
use async_trait::async_trait;
use reqwest::header::LINK;
use reqwest::{Client, RequestBuilder, Response};
use serde_json::Value;
use url::Url;

/// TamsClient implements TamsApi over HTTPS.
pub struct TamsClient {
    client: Client,
    endpoint: Url,
    tokens: TokenProvider,
}

impl TamsClient {
    pub fn new(client: Client, endpoint: &str, tokens: TokenProvider) -> Result<Self, TamsError> {
        let endpoint = Url::parse(endpoint).map_err(|err| TamsError::Transport(err.to_string()))?;
        Ok(Self {
            client,
            endpoint,
            tokens,
        })
    }

    /// Paths are appended to the endpoint. Absolute URLs (continuation
    /// links) are used as given, but only on the endpoint's origin since
    /// every request carries the bearer token.
    fn resolve(&self, path: &str) -> Result<Url, TamsError> {
        if let Ok(url) = Url::parse(path) {
            if url.origin() != self.endpoint.origin() {
                return Err(TamsError::ForeignOrigin(url.to_string()));
            }
            return Ok(url);
        }
        let joined = format!("{}{}", self.endpoint.as_str().trim_end_matches('/'), path);
        Url::parse(&joined).map_err(|err| TamsError::Transport(err.to_string()))
    }

    async fn send(&self, request: RequestBuilder, path: &str) -> Result<Response, TamsError> {
        let request = match self.tokens.bearer().await? {
            Some(token) => request.bearer_auth(token),
            None => request,
        };
        let response = request
            .send()
            .await
            .map_err(|err| TamsError::Transport(err.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(TamsError::Status {
                path: path.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response)
    }
}

#[async_trait]
impl TamsApi for TamsClient {
    async fn get(&self, path: &str) -> Result<Page, TamsError> {
        let url = self.resolve(path)?;
        let response = self.send(self.client.get(url), path).await?;
        let next = response
            .headers()
            .get_all(LINK)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(next_link);
        let body = response.json().await.map_err(|err| TamsError::Decode {
            path: path.to_string(),
            reason: err.to_string(),
        })?;
        Ok(Page { body, next })
    }

    async fn put(&self, path: &str, body: &Value) -> Result<(), TamsError> {
        let url = self.resolve(path)?;
        self.send(self.client.put(url).json(body), path).await?;
        Ok(())
    }

    async fn delete(&self, path: &str) -> Result<(), TamsError> {
        let url = self.resolve(path)?;
        self.send(self.client.delete(url), path).await?;
        Ok(())
    }
}

/// Target of the `rel="next"` entry in a `Link` header value.
fn next_link(header: &str) -> Option<String> {
    header.split(',').find_map(|link| {
        let mut params = link.split(';');
        let target = params
            .next()?
            .trim()
            .strip_prefix('<')?
            .strip_suffix('>')?;
        params
            .map(str::trim)
            .any(|param| param == "rel=\"next\"" || param == "rel=next")
            .then(|| target.to_string())
    })
}
