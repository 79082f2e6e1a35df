use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;

use crate::{
    config::Config,
    models::referralmodel::GenerationStore,
    service::error::ServiceError,
};

/// Where per-generation referral buckets come from.
#[async_trait]
pub trait GenerationSource: Send + Sync {
    async fn fetch_generations(&self, user_id: &str, pack_id: &str) -> Result<GenerationStore, ServiceError>;
}

/// Client for the platform backend that owns the referral data.
#[derive(Debug, Clone)]
pub struct HttpGenerationSource {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl HttpGenerationSource {
    pub fn new(config: &Config) -> Result<Self, ServiceError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upstream_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            base_url: config.upstream_api_url.clone(),
            token: config.upstream_api_token.clone(),
        })
    }

    fn endpoint(&self, user_id: &str, pack_id: &str) -> String {
        format!(
            "{}/admin/users/{}/packs/{}/referrals",
            self.base_url,
            urlencoding::encode(user_id),
            urlencoding::encode(pack_id)
        )
    }
}

#[async_trait]
impl GenerationSource for HttpGenerationSource {
    async fn fetch_generations(&self, user_id: &str, pack_id: &str) -> Result<GenerationStore, ServiceError> {
        let url = self.endpoint(user_id, pack_id);
        tracing::debug!("Fetching downline from {}", url);

        let mut request = self.client.get(&url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == StatusCode::NOT_FOUND {
            return Err(ServiceError::DownlineNotFound {
                user_id: user_id.to_string(),
                pack_id: pack_id.to_string(),
            });
        }

        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(ServiceError::UpstreamStatus {
                status: status.as_u16(),
                message,
            });
        }

        let body: Value = response.json().await?;
        Ok(GenerationStore::from_value(unwrap_payload(body)))
    }
}

/// Upstream sometimes wraps the buckets as `{ "data": [...] }`.
pub fn unwrap_payload(body: Value) -> Value {
    match body {
        Value::Object(mut map) if map.contains_key("data") => map.remove("data").unwrap_or(Value::Null),
        other => other,
    }
}
