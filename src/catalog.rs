//! 短剧目录客户端
//! 代理上游的首页/搜索/剧集接口, 并合并详情信息

use crate::config::UpstreamUrls;
use crate::http_client::{HttpClient, HttpClientError};
use crate::types::{DramaBasic, Episode, ForYouItem};
use async_trait::async_trait;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info, warn};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error(transparent)]
    Http(#[from] HttpClientError),
    #[error("解析响应失败: {0}")]
    Parse(#[from] serde_json::Error),
}

/// 目录接口, 服务端通过它访问上游
#[async_trait]
pub trait CatalogApi: Send + Sync {
    async fn trending(&self) -> Result<Bytes, CatalogError>;
    async fn for_you(&self) -> Result<Bytes, CatalogError>;
    async fn new_releases(&self) -> Result<Bytes, CatalogError>;
    async fn popular_search(&self) -> Result<Bytes, CatalogError>;
    async fn search(&self, query: &str) -> Result<Bytes, CatalogError>;
    /// 原始剧集列表 JSON
    async fn episodes(&self, book_id: &str) -> Result<Bytes, CatalogError>;

    /// 剧集列表, 保持上游顺序
    async fn fetch_episodes(&self, book_id: &str) -> Result<Vec<Episode>, CatalogError> {
        let body = self.episodes(book_id).await?;
        Ok(serde_json::from_slice(&body)?)
    }

    /// 在首页各列表中查找短剧, 必要时按名称搜索补全简介
    async fn detail(&self, book_id: &str) -> Result<Option<DramaBasic>, CatalogError> {
        let (trending, new_releases, for_you) =
            tokio::join!(self.trending(), self.new_releases(), self.for_you());

        let trending = decode_feed::<Vec<DramaBasic>>("trending", trending);
        let new_releases = decode_feed::<Vec<DramaBasic>>("new", new_releases);
        let for_you = decode_feed::<Vec<ForYouItem>>("foryou", for_you);

        let Some(mut drama) = find_drama(
            book_id,
            trending.as_deref(),
            new_releases.as_deref(),
            for_you.as_deref(),
        ) else {
            return Ok(None);
        };

        if drama.introduction.is_empty() && !drama.book_name.is_empty() {
            match self.search(&drama.book_name).await {
                Ok(body) => match serde_json::from_slice::<Vec<DramaBasic>>(&body) {
                    Ok(hits) => {
                        if let Some(hit) = hits.into_iter().next() {
                            merge_search_hit(&mut drama, hit);
                        }
                    }
                    Err(e) => debug!("搜索结果解析失败 {}: {}", drama.book_name, e),
                },
                Err(e) => debug!("按名称搜索失败 {}: {}", drama.book_name, e),
            }
        }

        if drama.tags.is_empty() && !drama.tag_names.is_empty() {
            drama.tags = drama.tag_names.clone();
        }

        Ok(Some(drama))
    }
}

/// 基于 HTTP 的目录客户端
pub struct CatalogClient {
    http: HttpClient,
    urls: UpstreamUrls,
}

impl CatalogClient {
    pub fn new(http: HttpClient, urls: UpstreamUrls) -> Self {
        Self { http, urls }
    }

    async fn get(&self, url: &str) -> Result<Bytes, CatalogError> {
        debug!("上游请求: {}", url);
        Ok(self.http.get_bytes(url).await?)
    }
}

#[async_trait]
impl CatalogApi for CatalogClient {
    async fn trending(&self) -> Result<Bytes, CatalogError> {
        self.get(&self.urls.trending).await
    }

    async fn for_you(&self) -> Result<Bytes, CatalogError> {
        self.get(&self.urls.for_you).await
    }

    async fn new_releases(&self) -> Result<Bytes, CatalogError> {
        self.get(&self.urls.new_releases).await
    }

    async fn popular_search(&self) -> Result<Bytes, CatalogError> {
        self.get(&self.urls.popular_search).await
    }

    async fn search(&self, query: &str) -> Result<Bytes, CatalogError> {
        let url = format!("{}?query={}", self.urls.search, urlencoding::encode(query));
        info!("🔍 搜索: {}", query);
        self.get(&url).await
    }

    async fn episodes(&self, book_id: &str) -> Result<Bytes, CatalogError> {
        let url = format!("{}?bookId={}", self.urls.episodes, urlencoding::encode(book_id));
        self.get(&url).await
    }
}

fn decode_feed<T: DeserializeOwned>(name: &str, result: Result<Bytes, CatalogError>) -> Option<T> {
    let parsed = result.and_then(|body| Ok(serde_json::from_slice::<T>(&body)?));
    match parsed {
        Ok(feed) => Some(feed),
        Err(e) => {
            warn!("列表 {} 获取失败, 跳过: {}", name, e);
            None
        }
    }
}

/// 依次在 trending, new, foryou 中查找
pub fn find_drama(
    book_id: &str,
    trending: Option<&[DramaBasic]>,
    new_releases: Option<&[DramaBasic]>,
    for_you: Option<&[ForYouItem]>,
) -> Option<DramaBasic> {
    let flat = trending
        .into_iter()
        .flatten()
        .chain(new_releases.into_iter().flatten())
        .chain(
            for_you
                .into_iter()
                .flatten()
                .flat_map(|item| item.tag_card_vo.tag_books.iter()),
        );

    flat.into_iter().find(|d| d.book_id == book_id).cloned()
}

/// 合并搜索结果中的非空字段, 封面保持不变
pub fn merge_search_hit(drama: &mut DramaBasic, hit: DramaBasic) {
    if !hit.introduction.is_empty() {
        drama.introduction = hit.introduction;
    }
    if !hit.tag_names.is_empty() {
        drama.tags = hit.tag_names;
    }
    if !hit.protagonist.is_empty() {
        drama.protagonist = hit.protagonist;
    }
}
