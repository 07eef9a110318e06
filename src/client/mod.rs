//! Client side of the CLI: shorten, expand, render, and extract commands
//! executed against a running daemon over its JSON API.

mod commands;

pub use commands::run;

use reqwest::Client;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use url::Url;

use crate::infra::http::error::ApiErrorBody;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("server address is required (use --addr or UMLPIPE_ADDR)")]
    MissingAddr,
    #[error("invalid server address: {0}")]
    Url(#[from] url::ParseError),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("server error ({code}): {message}")]
    Server { code: String, message: String },
    #[error("failed to read {path}: {source}")]
    InputFile {
        path: String,
        source: std::io::Error,
    },
    #[error("failed reading stdin: {0}")]
    Stdin(std::io::Error),
    #[error("couldn't write output: {0}")]
    Output(std::io::Error),
    #[error("server returned undecodable image data: {0}")]
    ImageData(#[from] base64::DecodeError),
    #[error("invalid input: {0}")]
    InvalidInput(String),
}

pub struct Ctx {
    client: Client,
    base: Url,
}

impl Ctx {
    pub fn new(addr: &str) -> Result<Self, CliError> {
        let base = if addr.contains("://") {
            Url::parse(addr)?
        } else {
            Url::parse(&format!("http://{addr}"))?
        };
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .build()?;
        Ok(Self { client, base })
    }

    pub fn user_agent() -> &'static str {
        concat!("umlpipe/", env!("CARGO_PKG_VERSION"))
    }

    fn url(&self, path: &str) -> Result<Url, CliError> {
        self.base.join(path).map_err(CliError::Url)
    }

    pub async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, CliError>
    where
        Req: Serialize,
        Resp: DeserializeOwned,
    {
        let response = self.client.post(self.url(path)?).json(body).send().await?;
        Self::handle(response).await
    }

    pub async fn post_bytes<Resp>(
        &self,
        path: &str,
        query: &[(&str, String)],
        body: Vec<u8>,
    ) -> Result<Resp, CliError>
    where
        Resp: DeserializeOwned,
    {
        let response = self
            .client
            .post(self.url(path)?)
            .query(query)
            .body(body)
            .send()
            .await?;
        Self::handle(response).await
    }

    async fn handle<Resp: DeserializeOwned>(response: reqwest::Response) -> Result<Resp, CliError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json().await?);
        }
        match response.json::<ApiErrorBody>().await {
            Ok(body) => Err(CliError::Server {
                code: body.error.code,
                message: body.error.hint.unwrap_or(body.error.message),
            }),
            Err(_) => Err(CliError::Server {
                code: status.as_u16().to_string(),
                message: status.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bare_host_port_becomes_http_url() {
        let ctx = Ctx::new("localhost:8440").expect("ctx");
        assert_eq!(ctx.base.as_str(), "http://localhost:8440/");
    }

    #[test]
    fn explicit_scheme_is_preserved() {
        let ctx = Ctx::new("https://uml.example.com").expect("ctx");
        assert_eq!(ctx.base.scheme(), "https");
    }
}
