//! Provider Configuration
//!
//! 環境変数からプロバイダの接続設定（認証情報、エンドポイント、モデル）を読み込みます。
//!
//! | プロバイダ | 変数 | デフォルト |
//! |---|---|---|
//! | OpenAI | `OPENAI_API_KEY` | 必須 |
//! | OpenAI | `OPENAI_BASE_URL` | `https://api.openai.com/v1` |
//! | OpenAI | `OPENAI_MODEL` | `gpt-4o` |
//! | Bedrock | `AWS_BEARER_TOKEN_BEDROCK` | 必須 |
//! | Bedrock | `AWS_REGION` / `AWS_DEFAULT_REGION` | `ap-southeast-1` |
//! | Bedrock | `BEDROCK_MODEL_ID` | `global.anthropic.claude-sonnet-4-5-20250929-v1:0` |

use std::fmt;
use std::time::Duration;

use crate::api::Provider;
use crate::error::XlsxVisionError;

pub const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o";
pub const DEFAULT_AWS_REGION: &str = "ap-southeast-1";
pub const DEFAULT_BEDROCK_MODEL: &str = "global.anthropic.claude-sonnet-4-5-20250929-v1:0";

/// HTTPリクエストのデフォルトタイムアウト
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);

/// プロバイダの接続設定
#[derive(Clone)]
pub struct ProviderConfig {
    pub provider: Provider,
    /// APIキーまたはBearerトークン
    pub(crate) credential: String,
    /// OpenAIのベースURL（Bedrockでは未使用）
    pub base_url: String,
    /// AWSリージョン（OpenAIでは未使用）
    pub region: String,
    pub model: String,
    pub timeout: Duration,
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider", &self.provider)
            .field("credential", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("region", &self.region)
            .field("model", &self.model)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderConfig {
    /// プロセスの環境変数から読み込む
    pub fn from_env(provider: Provider) -> Result<Self, XlsxVisionError> {
        Self::from_lookup(provider, |key| std::env::var(key).ok())
    }

    /// 任意の変数ルックアップから読み込む
    ///
    /// 空文字列の変数は未設定として扱います。
    pub fn from_lookup<F>(provider: Provider, lookup: F) -> Result<Self, XlsxVisionError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        match provider {
            Provider::OpenAi => {
                let credential = var("OPENAI_API_KEY").ok_or_else(|| {
                    XlsxVisionError::Credentials("OPENAI_API_KEY is not set".to_string())
                })?;
                Ok(Self {
                    provider,
                    credential,
                    base_url: var("OPENAI_BASE_URL")
                        .unwrap_or_else(|| DEFAULT_OPENAI_BASE_URL.to_string()),
                    region: String::new(),
                    model: var("OPENAI_MODEL").unwrap_or_else(|| DEFAULT_OPENAI_MODEL.to_string()),
                    timeout: DEFAULT_TIMEOUT,
                })
            }
            Provider::Bedrock => {
                let credential = var("AWS_BEARER_TOKEN_BEDROCK").ok_or_else(|| {
                    XlsxVisionError::Credentials("AWS_BEARER_TOKEN_BEDROCK is not set".to_string())
                })?;
                if var("AWS_ACCESS_KEY_ID").is_none() || var("AWS_SECRET_ACCESS_KEY").is_none() {
                    tracing::warn!("AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY not set, using bearer token only");
                }
                Ok(Self {
                    provider,
                    credential,
                    base_url: String::new(),
                    region: var("AWS_REGION")
                        .or_else(|| var("AWS_DEFAULT_REGION"))
                        .unwrap_or_else(|| DEFAULT_AWS_REGION.to_string()),
                    model: var("BEDROCK_MODEL_ID")
                        .unwrap_or_else(|| DEFAULT_BEDROCK_MODEL.to_string()),
                    timeout: DEFAULT_TIMEOUT,
                })
            }
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_openai_defaults() {
        let config =
            ProviderConfig::from_lookup(Provider::OpenAi, lookup(&[("OPENAI_API_KEY", "sk-test")]))
                .unwrap();
        assert_eq!(config.credential, "sk-test");
        assert_eq!(config.base_url, DEFAULT_OPENAI_BASE_URL);
        assert_eq!(config.model, DEFAULT_OPENAI_MODEL);
        assert_eq!(config.timeout, Duration::from_secs(300));
    }

    #[test]
    fn test_openai_overrides() {
        let config = ProviderConfig::from_lookup(
            Provider::OpenAi,
            lookup(&[
                ("OPENAI_API_KEY", "sk-test"),
                ("OPENAI_BASE_URL", "http://localhost:8080/v1"),
                ("OPENAI_MODEL", "gpt-4o-mini"),
            ]),
        )
        .unwrap();
        assert_eq!(config.base_url, "http://localhost:8080/v1");
        assert_eq!(config.model, "gpt-4o-mini");
    }

    #[test]
    fn test_missing_credentials() {
        for provider in [Provider::OpenAi, Provider::Bedrock] {
            match ProviderConfig::from_lookup(provider, lookup(&[])) {
                Err(XlsxVisionError::Credentials(_)) => {}
                other => panic!("Expected Credentials error, got {:?}", other),
            }
        }
        assert!(ProviderConfig::from_lookup(
            Provider::OpenAi,
            lookup(&[("OPENAI_API_KEY", "  ")])
        )
        .is_err());
    }

    #[test]
    fn test_bedrock_region_fallback() {
        let config = ProviderConfig::from_lookup(
            Provider::Bedrock,
            lookup(&[
                ("AWS_BEARER_TOKEN_BEDROCK", "token"),
                ("AWS_DEFAULT_REGION", "us-west-2"),
            ]),
        )
        .unwrap();
        assert_eq!(config.region, "us-west-2");
        assert_eq!(config.model, DEFAULT_BEDROCK_MODEL);

        let config = ProviderConfig::from_lookup(
            Provider::Bedrock,
            lookup(&[
                ("AWS_BEARER_TOKEN_BEDROCK", "token"),
                ("AWS_REGION", "eu-west-1"),
                ("AWS_DEFAULT_REGION", "us-west-2"),
            ]),
        )
        .unwrap();
        assert_eq!(config.region, "eu-west-1");

        let config = ProviderConfig::from_lookup(
            Provider::Bedrock,
            lookup(&[("AWS_BEARER_TOKEN_BEDROCK", "token")]),
        )
        .unwrap();
        assert_eq!(config.region, DEFAULT_AWS_REGION);
    }

    #[test]
    fn test_debug_redacts_credential() {
        let config =
            ProviderConfig::from_lookup(Provider::OpenAi, lookup(&[("OPENAI_API_KEY", "sk-secret")]))
                .unwrap()
                .with_model("m");
        let debug = format!("{:?}", config);
        assert!(!debug.contains("sk-secret"));
        assert!(debug.contains("\"m\""));
    }
}
