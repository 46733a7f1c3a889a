//! 运行配置
//! 全部来自环境变量, 启动时读取一次

use std::num::NonZeroU32;
use std::time::Duration;
use thiserror::Error;

const DEFAULT_UPSTREAM_BASE: &str = "http://127.0.0.1:9000/api";

#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("环境变量 {key} 无效: {value}")]
    Invalid { key: &'static str, value: String },
    #[error("限流格式无效: {0} (应为 <次数>-<S|M|H>)")]
    RateLimit(String),
}

/// 限流配置, 格式与 `20-S` 一致
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimit {
    pub requests: NonZeroU32,
    pub period: Duration,
}

impl RateLimit {
    pub fn parse(raw: &str) -> Result<Self, ConfigError> {
        let err = || ConfigError::RateLimit(raw.to_string());
        let (count, unit) = raw.trim().split_once('-').ok_or_else(err)?;
        let requests = count
            .trim()
            .parse::<u32>()
            .ok()
            .and_then(NonZeroU32::new)
            .ok_or_else(err)?;
        let period = match unit.trim().to_ascii_uppercase().as_str() {
            "S" => Duration::from_secs(1),
            "M" => Duration::from_secs(60),
            "H" => Duration::from_secs(3600),
            _ => return Err(err()),
        };
        Ok(Self { requests, period })
    }
}

/// 上游接口地址
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamUrls {
    pub trending: String,
    pub for_you: String,
    pub new_releases: String,
    pub popular_search: String,
    pub search: String,
    pub episodes: String,
}

impl UpstreamUrls {
    pub fn from_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            trending: format!("{base}/trending"),
            for_you: format!("{base}/foryou"),
            new_releases: format!("{base}/latest"),
            popular_search: format!("{base}/populersearch"),
            search: format!("{base}/search"),
            episodes: format!("{base}/allepisode"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub allowed_origins: Vec<String>,
    pub rate_limit: RateLimit,
    pub upstream_timeout: Duration,
    pub upstream_max_retries: u32,
    pub upstream: UpstreamUrls,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 从任意键值来源构建配置
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, fallback: &str| lookup(key).unwrap_or_else(|| fallback.to_string());

        let port = parse_var("PORT", get("PORT", "8080"))?;
        let allowed_origins = get("ALLOWED_ORIGINS", "*")
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();
        let rate_limit = RateLimit::parse(&get("RATE_LIMIT", "20-S"))?;
        let timeout_secs: u64 = parse_var("UPSTREAM_TIMEOUT_SECS", get("UPSTREAM_TIMEOUT_SECS", "600"))?;
        let upstream_max_retries = parse_var("UPSTREAM_MAX_RETRIES", get("UPSTREAM_MAX_RETRIES", "3"))?;

        let base = get("UPSTREAM_BASE_URL", DEFAULT_UPSTREAM_BASE);
        let defaults = UpstreamUrls::from_base(&base);
        let upstream = UpstreamUrls {
            trending: lookup("UPSTREAM_TRENDING_URL").unwrap_or(defaults.trending),
            for_you: lookup("UPSTREAM_FOR_YOU_URL").unwrap_or(defaults.for_you),
            new_releases: lookup("UPSTREAM_NEW_URL").unwrap_or(defaults.new_releases),
            popular_search: lookup("UPSTREAM_POPULAR_SEARCH_URL").unwrap_or(defaults.popular_search),
            search: lookup("UPSTREAM_SEARCH_URL").unwrap_or(defaults.search),
            episodes: lookup("UPSTREAM_EPISODES_URL").unwrap_or(defaults.episodes),
        };

        for value in [
            &upstream.trending,
            &upstream.for_you,
            &upstream.new_releases,
            &upstream.popular_search,
            &upstream.search,
            &upstream.episodes,
        ] {
            if url::Url::parse(value).is_err() {
                return Err(ConfigError::Invalid {
                    key: "UPSTREAM_*_URL",
                    value: value.clone(),
                });
            }
        }

        Ok(Self {
            port,
            allowed_origins,
            rate_limit,
            upstream_timeout: Duration::from_secs(timeout_secs),
            upstream_max_retries,
            upstream,
        })
    }

    /// 是否允许任意来源跨域
    pub fn allows_any_origin(&self) -> bool {
        self.allowed_origins.is_empty() || self.allowed_origins.iter().any(|o| o == "*")
    }
}

fn parse_var<T: std::str::FromStr>(key: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::Invalid { key, value })
}
