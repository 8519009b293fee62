use std::env;

use secure_review_core::analysis::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL};
use secure_review_core::source::github::DEFAULT_API_URL;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server_host: String,
    pub server_port: u16,
    pub database_url: String,
    pub jwt_secret: String,
    pub openai_api_key: String,
    pub openai_model: String,
    pub openai_base_url: String,
    pub github_api_url: String,
    pub github_token: Option<String>,
    pub analysis_workers: usize,
    pub analysis_queue_capacity: usize,
    pub static_dir: String,
    pub log_format: LogFormat,
}

impl Config {
    /// 读取进程环境变量（main 中已先加载 .env）
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        let text = |key: &str, default: &str| get(key).unwrap_or_else(|| default.to_string());

        let jwt_secret = get("JWT_SECRET")
            .ok_or_else(|| anyhow::anyhow!("JWT_SECRET must be set"))?;

        let log_format = match get("LOG_FORMAT").as_deref().map(str::to_ascii_lowercase) {
            Some(ref f) if f == "json" => LogFormat::Json,
            _ => LogFormat::Text,
        };

        Ok(Self {
            server_host: text("SERVER_HOST", "0.0.0.0"),
            server_port: parse_or(get("SERVER_PORT"), 8080),
            database_url: text("DATABASE_URL", "sqlite://secure_review.db"),
            jwt_secret,
            openai_api_key: text("OPENAI_API_KEY", ""),
            openai_model: text("OPENAI_MODEL", DEFAULT_MODEL),
            openai_base_url: text("OPENAI_BASE_URL", DEFAULT_BASE_URL),
            github_api_url: text("GITHUB_API_URL", DEFAULT_API_URL),
            github_token: get("GITHUB_TOKEN"),
            analysis_workers: parse_or(get("ANALYSIS_WORKERS"), 4),
            analysis_queue_capacity: parse_or(get("ANALYSIS_QUEUE_CAPACITY"), 64),
            static_dir: text("STATIC_DIR", "./dist"),
            log_format,
        })
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.server_host, self.server_port)
    }
}

/// 数值解析失败时回退到默认值
fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> anyhow::Result<Config> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn defaults_apply() {
        let config = config_from(&[("JWT_SECRET", "s3cret")]).unwrap();
        assert_eq!(config.bind_address(), "0.0.0.0:8080");
        assert_eq!(config.database_url, "sqlite://secure_review.db");
        assert_eq!(config.openai_model, "gpt-4-turbo-preview");
        assert_eq!(config.openai_base_url, "https://api.openai.com/v1");
        assert_eq!(config.github_api_url, "https://api.github.com");
        assert_eq!(config.github_token, None);
        assert_eq!(config.analysis_workers, 4);
        assert_eq!(config.analysis_queue_capacity, 64);
        assert_eq!(config.static_dir, "./dist");
        assert_eq!(config.log_format, LogFormat::Text);
    }

    #[test]
    fn jwt_secret_is_required() {
        assert!(config_from(&[]).is_err());
        assert!(config_from(&[("JWT_SECRET", "  ")]).is_err());
    }

    #[test]
    fn bad_numbers_fall_back() {
        let config = config_from(&[
            ("JWT_SECRET", "x"),
            ("SERVER_PORT", "eighty"),
            ("ANALYSIS_WORKERS", "8"),
            ("LOG_FORMAT", "JSON"),
            ("GITHUB_TOKEN", "ghp_abc"),
        ])
        .unwrap();
        assert_eq!(config.server_port, 8080);
        assert_eq!(config.analysis_workers, 8);
        assert_eq!(config.log_format, LogFormat::Json);
        assert_eq!(config.github_token.as_deref(), Some("ghp_abc"));
    }
}
