//! HTTP client for the external DOI registration service.
//!
//! Requests are authenticated by an HMAC-SHA1 signature over the method,
//! content headers, user and canonical path, carried Base64-encoded in the
//! `Authorization` header.

use crate::doi::{DoiService, DoiStatus};
use crate::error::{Result, SeedbankError};
use crate::model::Doi;
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use md5::{Digest as _, Md5};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use sha1::Sha1;
use std::time::Duration;

type HmacSha1 = Hmac<Sha1>;

const AUTH_SCHEME: &str = "SEEDBANK";
const CONTENT_TYPE_JSON: &str = "application/json";
const USER_HEADER: &str = "x-seedbank-user";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpDoiServiceConfig {
    pub api_url: String,
    pub app_key: String,
    pub secret: String,
    /// DOI prefix used when minting without an existing DOI.
    pub prefix: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_timeout_secs() -> u64 {
    30
}

pub struct HttpDoiService {
    client: reqwest::Client,
    config: HttpDoiServiceConfig,
}

#[derive(Serialize)]
struct RegistrationBody<'a> {
    doi: String,
    user: &'a str,
    metadata: &'a str,
}

#[derive(Deserialize)]
struct StatusBody {
    status: String,
}

impl HttpDoiService {
    pub fn new(config: HttpDoiServiceConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| SeedbankError::Config(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn doi_path(&self, doi: &Doi) -> String {
        format!("/doi/{}/{}", doi.prefix, doi.suffix)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.api_url.trim_end_matches('/'), path)
    }

    fn sign(&self, method: &str, path: &str, content_md5: &str, user: &str) -> Result<String> {
        let canonical = canonical_string(method, path, content_md5, CONTENT_TYPE_JSON, user);
        let mut mac = HmacSha1::new_from_slice(self.config.secret.as_bytes())
            .map_err(|e| SeedbankError::Config(format!("invalid signing secret: {}", e)))?;
        mac.update(canonical.as_bytes());
        let signature = BASE64.encode(mac.finalize().into_bytes());
        Ok(format!(
            "{} {}:{}",
            AUTH_SCHEME, self.config.app_key, signature
        ))
    }

    async fn send_signed(
        &self,
        method: reqwest::Method,
        path: &str,
        user: &str,
        body: Option<String>,
    ) -> Result<reqwest::Response> {
        let payload = body.unwrap_or_default();
        let content_md5 = BASE64.encode(Md5::digest(payload.as_bytes()));
        let authorization = self.sign(method.as_str(), path, &content_md5, user)?;

        let response = self
            .client
            .request(method, self.url(path))
            .header("authorization", authorization)
            .header("content-md5", content_md5)
            .header("content-type", CONTENT_TYPE_JSON)
            .header(USER_HEADER, user)
            .body(payload)
            .send()
            .await
            .map_err(|e| SeedbankError::TransientIo(e.to_string()))?;

        Ok(response)
    }
}

/// The signed canonical request representation.
fn canonical_string(
    method: &str,
    path: &str,
    content_md5: &str,
    content_type: &str,
    user: &str,
) -> String {
    format!(
        "{}\n{}\n{}\n{}\n{}",
        method, content_md5, content_type, user, path
    )
}

fn check_response(response: &reqwest::Response, context: &str) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    if status == StatusCode::CONFLICT {
        return Err(SeedbankError::Conflict(format!(
            "{}: DOI service reported a conflict",
            context
        )));
    }
    if status.is_server_error() {
        return Err(SeedbankError::TransientIo(format!(
            "{} failed with status {}",
            context, status
        )));
    }
    Err(SeedbankError::Fatal(format!(
        "{} failed with status {}",
        context, status
    )))
}

#[async_trait]
impl DoiService for HttpDoiService {
    async fn register(
        &self,
        metadata: &str,
        user: &str,
        existing: Option<&Doi>,
    ) -> Result<Doi> {
        let doi = match existing {
            Some(doi) => doi.clone(),
            None => Doi::random(&self.config.prefix)?,
        };

        let body = serde_json::to_string(&RegistrationBody {
            doi: doi.to_string(),
            user,
            metadata,
        })?;

        let response = self
            .send_signed(reqwest::Method::POST, "/doi", user, Some(body))
            .await?;
        check_response(&response, "DOI registration")?;

        tracing::info!("Registered DOI {}", doi);
        Ok(doi)
    }

    async fn update(&self, metadata: &str, user: &str, doi: &Doi) -> Result<()> {
        let body = serde_json::to_string(&RegistrationBody {
            doi: doi.to_string(),
            user,
            metadata,
        })?;

        let path = self.doi_path(doi);
        let response = self
            .send_signed(reqwest::Method::PUT, &path, user, Some(body))
            .await?;
        check_response(&response, "DOI metadata update")
    }

    async fn delete(&self, doi: &Doi) -> Result<()> {
        let path = self.doi_path(doi);
        let response = self
            .send_signed(reqwest::Method::DELETE, &path, "", None)
            .await?;

        // An already-deregistered DOI is not an error.
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(());
        }
        check_response(&response, "DOI deregistration")
    }

    async fn get(&self, doi: &Doi) -> Result<Option<DoiStatus>> {
        let path = self.doi_path(doi);
        let response = self
            .send_signed(reqwest::Method::GET, &path, "", None)
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        check_response(&response, "DOI status fetch")?;

        let body: StatusBody = response
            .json()
            .await
            .map_err(|e| SeedbankError::Http(e.to_string()))?;

        match body.status.as_str() {
            "reserved" => Ok(Some(DoiStatus::Reserved)),
            "registered" => Ok(Some(DoiStatus::Registered)),
            "deleted" => Ok(Some(DoiStatus::Deleted)),
            other => Err(SeedbankError::Http(format!(
                "unknown DOI status: {}",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_string_layout() {
        let canonical = canonical_string(
            "POST",
            "/doi",
            "1B2M2Y8AsgTpgAmY7PhCfg==",
            "application/json",
            "alice",
        );
        assert_eq!(
            canonical,
            "POST\n1B2M2Y8AsgTpgAmY7PhCfg==\napplication/json\nalice\n/doi"
        );
    }

    #[test]
    fn test_signature_is_deterministic_base64() {
        let service = HttpDoiService::new(HttpDoiServiceConfig {
            api_url: "https://doi.example.org".to_string(),
            app_key: "seedbank".to_string(),
            secret: "s3cret".to_string(),
            prefix: "10.5072".to_string(),
            timeout_secs: 5,
        })
        .unwrap();

        let first = service.sign("POST", "/doi", "md5", "alice").unwrap();
        let second = service.sign("POST", "/doi", "md5", "alice").unwrap();
        assert_eq!(first, second);

        let header = first.strip_prefix("SEEDBANK seedbank:").unwrap();
        // HMAC-SHA1 digests are 20 bytes, 28 characters in Base64.
        assert_eq!(header.len(), 28);

        let other_path = service.sign("POST", "/doi/10.5072/x", "md5", "alice").unwrap();
        assert_ne!(first, other_path);
    }
}
