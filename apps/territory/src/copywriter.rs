use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde::{Deserialize, Serialize};

use crate::config::Config;
use crate::reveal::{AREA_LIST_MARKER, RevealCopy, split_reveal_copy};

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, thiserror::Error)]
pub enum CopywriterError {
    #[error("copywriter is not configured")]
    NotConfigured,
    #[error("copywriter transport error: {0}")]
    Transport(String),
    #[error("copywriter upstream returned {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("copywriter response unusable: {0}")]
    Decode(String),
}

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message>,
}

#[derive(Debug, Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(default)]
    text: Option<String>,
}

/// Drafts reveal copy for preview pages through the Anthropic messages API.
///
/// Without an API key every request falls back to [`default_copy`].
pub struct Copywriter {
    client: reqwest::Client,
    api_key: Option<String>,
    model: String,
    endpoint: Option<Url>,
    max_tokens: u32,
}

impl Copywriter {
    pub fn from_config(config: &Config) -> Result<Self, CopywriterError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.copywriter_timeout_ms))
            .build()
            .map_err(|error| CopywriterError::Transport(format!("client build failed: {error}")))?;
        let endpoint = Url::parse(&config.copywriter_base_url)
            .and_then(|base| base.join("v1/messages"))
            .map_err(|error| CopywriterError::Transport(format!("invalid base url: {error}")))?;
        Ok(Self {
            client,
            api_key: config.copywriter_api_key.clone(),
            model: config.copywriter_model.clone(),
            endpoint: Some(endpoint),
            max_tokens: config.copywriter_max_tokens,
        })
    }

    pub fn disabled() -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key: None,
            model: String::new(),
            endpoint: None,
            max_tokens: 0,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.api_key.is_some() && self.endpoint.is_some()
    }

    /// Model-drafted copy, or the static fallback when the call fails.
    pub async fn reveal_copy_or_default(
        &self,
        business_name: &str,
        category: &str,
        zip: &str,
    ) -> RevealCopy {
        if !self.is_enabled() {
            return default_copy(category, zip);
        }
        match self.draft(business_name, category, zip).await {
            Ok(copy) => copy,
            Err(error) => {
                tracing::warn!(
                    target: "territory.copywriter",
                    error = %error,
                    "copy draft failed; using fallback copy",
                );
                default_copy(category, zip)
            }
        }
    }

    pub async fn draft(
        &self,
        business_name: &str,
        category: &str,
        zip: &str,
    ) -> Result<RevealCopy, CopywriterError> {
        let (Some(api_key), Some(endpoint)) = (self.api_key.as_deref(), self.endpoint.as_ref())
        else {
            return Err(CopywriterError::NotConfigured);
        };

        let request = MessagesRequest {
            model: &self.model,
            max_tokens: self.max_tokens,
            messages: vec![Message {
                role: "user",
                content: prompt(business_name, category, zip),
            }],
        };
        let response = self
            .client
            .post(endpoint.clone())
            .header("x-api-key", api_key)
            .header("anthropic-version", ANTHROPIC_VERSION)
            .json(&request)
            .send()
            .await
            .map_err(|error| CopywriterError::Transport(error.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            let message = response.text().await.unwrap_or_default();
            return Err(CopywriterError::Upstream {
                status: status.as_u16(),
                message,
            });
        }
        let body: MessagesResponse = response
            .json()
            .await
            .map_err(|error| CopywriterError::Decode(error.to_string()))?;
        let text = body
            .content
            .into_iter()
            .find_map(|block| block.text)
            .unwrap_or_default();
        let copy = split_reveal_copy(&text);
        if copy.bullets.is_empty() {
            return Err(CopywriterError::Decode("reply contained no bullets".to_string()));
        }
        Ok(copy)
    }
}

fn prompt(business_name: &str, category: &str, zip: &str) -> String {
    format!(
        "Write reveal-page copy for {business_name}, a {category} serving postal area {zip}.\n\
         Reply with three or four short trust bullets, one per line, no numbering.\n\
         Then a final line starting with {AREA_LIST_MARKER} followed by a comma-separated \
         list of nearby neighbourhoods or towns served."
    )
}

pub fn default_copy(category: &str, zip: &str) -> RevealCopy {
    let category = if category.trim().is_empty() {
        "business".to_string()
    } else {
        category.trim().to_lowercase()
    };
    RevealCopy {
        bullets: vec![
            format!("The only {category} we feature in {zip}"),
            "Verified contact details".to_string(),
            "Locally owned and reviewed".to_string(),
        ],
        area_list: zip.trim().to_string(),
    }
}
