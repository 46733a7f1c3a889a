mod catalog;
mod config;
mod http_client;
mod middleware;
mod navigator;
mod resolver;
mod types;

use axum::{
    extract::{Query, State},
    http::{header, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use bytes::Bytes;
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing::{debug, error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use crate::catalog::{CatalogApi, CatalogClient, CatalogError};
use crate::config::Config;
use crate::http_client::HttpClient;
use crate::navigator::{LoadOutcome, PlaybackNavigator};

/// 处理器共享状态
#[derive(Clone)]
struct AppState {
    catalog: Arc<dyn CatalogApi>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 初始化日志
    let _subscriber = FmtSubscriber::builder()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    let config = Config::from_env()?;
    let http = HttpClient::new(config.upstream_timeout, config.upstream_max_retries)?;
    let state = AppState {
        catalog: Arc::new(CatalogClient::new(http, config.upstream.clone())),
    };

    let app = app(state, &config);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!("🚀 短剧 API 启动在 http://{}", addr);
    info!(
        "📡 上游剧集接口: {}, 限流 {}/{:?}",
        config.upstream.episodes, config.rate_limit.requests, config.rate_limit.period
    );

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

/// 构建路由
fn app(state: AppState, config: &Config) -> Router {
    let limiter = middleware::create_limiter(config.rate_limit);

    let api = Router::new()
        .route("/", get(api_info_handler))
        .route("/home/trending", get(trending_handler))
        .route("/home/foryou", get(for_you_handler))
        .route("/home/new", get(new_handler))
        .route("/search/popular", get(popular_search_handler))
        .route("/search", get(search_handler))
        .route("/drama/episodes", get(episodes_handler))
        .route("/drama/detail", get(detail_handler))
        .route("/drama/stream", get(stream_handler));

    Router::new()
        .route("/health", get(health_handler))
        .nest("/api", api)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(middleware::cors_layer(config))
                .layer(axum::middleware::from_fn(middleware::security_headers))
                .layer(axum::middleware::from_fn_with_state(
                    limiter,
                    middleware::rate_limit,
                )),
        )
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(json!({"error": message.into()}))).into_response()
}

/// 原样转发上游 JSON
fn proxy_response(result: Result<Bytes, CatalogError>, failure: &str) -> Response {
    match result {
        Ok(body) => (
            StatusCode::OK,
            [(header::CONTENT_TYPE, "application/json")],
            body,
        )
            .into_response(),
        Err(e) => {
            error!("上游请求失败: {}", e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, failure)
        }
    }
}

/// GET /api - API 信息
async fn api_info_handler() -> impl IntoResponse {
    Json(json!({
        "name": "Drama Stream API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "GET /api/home/trending": "热门短剧",
            "GET /api/home/foryou": "为你推荐",
            "GET /api/home/new": "最新上架",
            "GET /api/search/popular": "热门搜索词",
            "GET /api/search": "搜索 (?query=)",
            "GET /api/drama/episodes": "剧集列表 (?bookId=)",
            "GET /api/drama/detail": "短剧详情 (?bookId=)",
            "GET /api/drama/stream": "播放状态 (?bookId=&chapterId=&index=&action=next|previous|completed)",
            "GET /health": "健康检查"
        }
    }))
}

/// 健康检查
async fn health_handler() -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339()
    }))
}

async fn trending_handler(State(state): State<AppState>) -> Response {
    proxy_response(
        state.catalog.trending().await,
        "Failed to fetch data from upstream",
    )
}

async fn for_you_handler(State(state): State<AppState>) -> Response {
    proxy_response(
        state.catalog.for_you().await,
        "Failed to fetch data from upstream",
    )
}

async fn new_handler(State(state): State<AppState>) -> Response {
    proxy_response(
        state.catalog.new_releases().await,
        "Failed to fetch data from upstream",
    )
}

async fn popular_search_handler(State(state): State<AppState>) -> Response {
    proxy_response(state.catalog.popular_search().await, "Failed to fetch data")
}

#[derive(Debug, Deserialize)]
struct SearchQuery {
    query: Option<String>,
}

/// GET /api/search?query=
async fn search_handler(
    State(state): State<AppState>,
    Query(params): Query<SearchQuery>,
) -> Response {
    let query = match params.query.as_deref().map(str::trim) {
        Some(q) if !q.is_empty() => q,
        _ => return error_response(StatusCode::BAD_REQUEST, "Query parameter is required"),
    };
    proxy_response(state.catalog.search(query).await, "Failed to fetch data")
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct BookQuery {
    book_id: Option<String>,
}

fn require_book_id(book_id: Option<&str>) -> Result<&str, Response> {
    match book_id.map(str::trim) {
        Some(id) if !id.is_empty() => Ok(id),
        _ => Err(error_response(
            StatusCode::BAD_REQUEST,
            "bookId parameter is required",
        )),
    }
}

/// GET /api/drama/episodes?bookId=
async fn episodes_handler(
    State(state): State<AppState>,
    Query(params): Query<BookQuery>,
) -> Response {
    let book_id = match require_book_id(params.book_id.as_deref()) {
        Ok(id) => id,
        Err(response) => return response,
    };
    proxy_response(
        state.catalog.episodes(book_id).await,
        "Failed to fetch episodes",
    )
}

/// GET /api/drama/detail?bookId=
async fn detail_handler(
    State(state): State<AppState>,
    Query(params): Query<BookQuery>,
) -> Response {
    let book_id = match require_book_id(params.book_id.as_deref()) {
        Ok(id) => id,
        Err(response) => return response,
    };

    match state.catalog.detail(book_id).await {
        Ok(Some(drama)) => Json(drama).into_response(),
        Ok(None) => error_response(StatusCode::NOT_FOUND, "Drama not found in lists"),
        Err(e) => {
            error!("获取详情失败 {}: {}", book_id, e);
            error_response(StatusCode::INTERNAL_SERVER_ERROR, "Failed to fetch detail")
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StreamQuery {
    book_id: Option<String>,
    chapter_id: Option<String>,
    index: Option<String>,
    action: Option<String>,
}

/// 定位之后执行的切集动作
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlaybackAction {
    Next,
    Previous,
    Completed,
}

impl PlaybackAction {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "next" => Some(Self::Next),
            "previous" | "prev" => Some(Self::Previous),
            "completed" | "ended" => Some(Self::Completed),
            _ => None,
        }
    }

    fn apply(self, navigator: &mut PlaybackNavigator) -> bool {
        match self {
            Self::Next => navigator.next(),
            Self::Previous => navigator.previous(),
            Self::Completed => navigator.on_playback_completed(),
        }
    }
}

/// GET /api/drama/stream?bookId=&chapterId=&index=&action=
///
/// 加载剧集并定位到指定集, 再执行可选的切集动作, 返回播放页所需状态。
/// index 优先于 chapterId, 越界或无法解析的 index 被忽略。
/// 在首尾集上的 previous/next 不改变位置。
async fn stream_handler(
    State(state): State<AppState>,
    Query(params): Query<StreamQuery>,
) -> Response {
    let book_id = match require_book_id(params.book_id.as_deref()) {
        Ok(id) => id,
        Err(response) => return response,
    };

    let action = match params.action.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match PlaybackAction::parse(raw) {
            Some(action) => Some(action),
            None => {
                return error_response(
                    StatusCode::BAD_REQUEST,
                    "action must be one of next, previous, completed",
                )
            }
        },
    };

    let mut navigator = PlaybackNavigator::new();
    let ticket = navigator.begin_load();
    let result = state.catalog.fetch_episodes(book_id).await;

    // 每个请求独占一个导航器, 凭证不会过期, 只需处理失败
    if let LoadOutcome::Failed(message) =
        navigator.finish_load(ticket, result, params.chapter_id.as_deref())
    {
        return error_response(StatusCode::BAD_GATEWAY, message);
    }

    if navigator.is_empty() {
        return error_response(StatusCode::NOT_FOUND, "No episodes available");
    }

    if let Some(raw) = params.index.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        match raw.parse::<usize>() {
            Ok(index) if navigator.go_to(index) => {}
            _ => warn!("忽略无效的集数 {} (共 {} 集)", raw, navigator.len()),
        }
    }

    if let Some(action) = action {
        if !action.apply(&mut navigator) {
            debug!(
                "切集动作 {:?} 未改变位置, 停在第 {:?} 集",
                action,
                navigator.current_index().map(|i| i + 1)
            );
        }
    }

    match navigator.view() {
        Some(view) => Json(view).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "No episodes available"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http_client::HttpClientError;
    use async_trait::async_trait;
    use axum::body::Body;
    use axum::http::Request;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    /// 固定数据的目录
    struct FakeCatalog {
        episodes: Option<serde_json::Value>,
    }

    fn ok_json(value: serde_json::Value) -> Result<Bytes, CatalogError> {
        Ok(Bytes::from(value.to_string()))
    }

    fn upstream_down() -> Result<Bytes, CatalogError> {
        Err(CatalogError::Http(HttpClientError::BadStatus(503)))
    }

    #[async_trait]
    impl CatalogApi for FakeCatalog {
        async fn trending(&self) -> Result<Bytes, CatalogError> {
            ok_json(json!([{"bookId": "1", "bookName": "Trending One", "introduction": "Intro"}]))
        }

        async fn for_you(&self) -> Result<Bytes, CatalogError> {
            upstream_down()
        }

        async fn new_releases(&self) -> Result<Bytes, CatalogError> {
            ok_json(json!([]))
        }

        async fn popular_search(&self) -> Result<Bytes, CatalogError> {
            ok_json(json!(["ceo", "revenge"]))
        }

        async fn search(&self, query: &str) -> Result<Bytes, CatalogError> {
            ok_json(json!([{"bookId": "9", "bookName": query}]))
        }

        async fn episodes(&self, _book_id: &str) -> Result<Bytes, CatalogError> {
            match &self.episodes {
                Some(value) => ok_json(value.clone()),
                None => upstream_down(),
            }
        }
    }

    fn three_episodes() -> serde_json::Value {
        json!([
            {"chapterId": "a", "chapterName": "EP 1", "cdnList": [
                {"isDefault": false, "videoPathList": [{"videoPath": "https://cdn/a-alt.mp4"}]},
                {"isDefault": true, "videoPathList": [{"videoPath": "https://cdn/a.mp4"}]}
            ]},
            {"chapterId": "b", "chapterName": "EP 2", "cdnList": []},
            {"chapterId": "c", "chapterName": "EP 3", "cdnList": [
                {"videoPathList": [{"isDefault": true, "videoPath": "https://cdn/c.mp4"}]}
            ]}
        ])
    }

    fn test_app(episodes: Option<serde_json::Value>) -> Router {
        let config = Config::from_lookup(|key| match key {
            "RATE_LIMIT" => Some("1000-S".to_string()),
            _ => None,
        })
        .unwrap();
        let state = AppState {
            catalog: Arc::new(FakeCatalog { episodes }),
        };
        app(state, &config)
    }

    async fn get_json(app: Router, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app
            .oneshot(Request::get(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn health_has_security_headers() {
        let response = test_app(None)
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-frame-options"], "DENY");
        assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    }

    #[tokio::test]
    async fn api_info_lists_endpoints() {
        let (status, body) = get_json(test_app(None), "/api").await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["endpoints"]["GET /api/drama/stream"].is_string());
    }

    #[tokio::test]
    async fn missing_parameters_are_rejected() {
        for uri in [
            "/api/search",
            "/api/search?query=%20",
            "/api/drama/episodes",
            "/api/drama/detail?bookId=",
            "/api/drama/stream",
        ] {
            let (status, body) = get_json(test_app(None), uri).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(body["error"].is_string());
        }
    }

    #[tokio::test]
    async fn proxies_upstream_json() {
        let (status, body) = get_json(test_app(None), "/api/search/popular").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!(["ceo", "revenge"]));

        let (status, body) = get_json(test_app(None), "/api/home/foryou").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to fetch data from upstream");

        let (status, body) = get_json(test_app(None), "/api/drama/episodes?bookId=1").await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["error"], "Failed to fetch episodes");
    }

    #[tokio::test]
    async fn detail_lookup() {
        let (status, body) = get_json(test_app(None), "/api/drama/detail?bookId=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["bookName"], "Trending One");

        let (status, body) = get_json(test_app(None), "/api/drama/detail?bookId=2").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "Drama not found in lists");
    }

    #[tokio::test]
    async fn stream_starts_at_chapter() {
        let app = test_app(Some(three_episodes()));
        let (status, body) = get_json(app, "/api/drama/stream?bookId=1&chapterId=c").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["index"], 2);
        assert_eq!(body["episodeNumber"], 3);
        assert_eq!(body["videoUrl"], "https://cdn/c.mp4");
        assert_eq!(body["hasNext"], false);
        assert_eq!(body["hasPrevious"], true);
        assert_eq!(body["total"], 3);
    }

    #[tokio::test]
    async fn stream_index_wins_and_reports_unavailable() {
        let app = test_app(Some(three_episodes()));
        let (status, body) = get_json(app, "/api/drama/stream?bookId=1&chapterId=c&index=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["chapterId"], "b");
        assert_eq!(body["available"], false);
        assert!(body["videoUrl"].is_null());

        let app = test_app(Some(three_episodes()));
        let (_, body) = get_json(app, "/api/drama/stream?bookId=1&index=9").await;
        assert_eq!(body["index"], 0);
        assert_eq!(body["videoUrl"], "https://cdn/a.mp4");
    }

    #[tokio::test]
    async fn stream_failures() {
        let (status, _) = get_json(test_app(None), "/api/drama/stream?bookId=1").await;
        assert_eq!(status, StatusCode::BAD_GATEWAY);

        let (status, body) = get_json(test_app(Some(json!([]))), "/api/drama/stream?bookId=1").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"], "No episodes available");
    }

    #[tokio::test]
    async fn stream_accepts_integer_default_flags() {
        let episodes = json!([
            {"chapterId": "x", "chapterName": "EP 1", "cdnList": [
                {"isDefault": 0, "videoPathList": [{"isDefault": 0, "videoPath": "a"}]},
                {"isDefault": 1, "videoPathList": [{"isDefault": 1, "videoPath": "b"}]}
            ]}
        ]);
        let (status, body) = get_json(test_app(Some(episodes)), "/api/drama/stream?bookId=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["videoUrl"], "b");
        assert_eq!(body["available"], true);
    }

    #[tokio::test]
    async fn stream_next_at_last_episode_stays() {
        let app = test_app(Some(three_episodes()));
        let (status, body) = get_json(app, "/api/drama/stream?bookId=1&index=2&action=next").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["index"], 2);
        assert_eq!(body["hasNext"], false);

        let app = test_app(Some(three_episodes()));
        let (_, body) = get_json(app, "/api/drama/stream?bookId=1&index=2&action=completed").await;
        assert_eq!(body["index"], 2);
        assert_eq!(body["videoUrl"], "https://cdn/c.mp4");
    }

    #[tokio::test]
    async fn stream_previous_at_first_episode_stays() {
        let app = test_app(Some(three_episodes()));
        let (status, body) = get_json(app, "/api/drama/stream?bookId=1&index=0&action=previous").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["index"], 0);
        assert_eq!(body["hasPrevious"], false);
        assert_eq!(body["videoUrl"], "https://cdn/a.mp4");
    }

    #[tokio::test]
    async fn stream_actions_move_between_episodes() {
        let app = test_app(Some(three_episodes()));
        let (_, body) = get_json(app, "/api/drama/stream?bookId=1&chapterId=a&action=completed").await;
        assert_eq!(body["chapterId"], "b");
        assert_eq!(body["available"], false);

        let app = test_app(Some(three_episodes()));
        let (_, body) = get_json(app, "/api/drama/stream?bookId=1&chapterId=c&action=previous").await;
        assert_eq!(body["index"], 1);

        let app = test_app(Some(three_episodes()));
        let (_, body) = get_json(app, "/api/drama/stream?bookId=1&index=1&action=next").await;
        assert_eq!(body["index"], 2);
    }

    #[tokio::test]
    async fn stream_bad_parameters() {
        for uri in [
            "/api/drama/stream?bookId=1&index=-1",
            "/api/drama/stream?bookId=1&index=abc",
        ] {
            let (status, body) = get_json(test_app(Some(three_episodes())), uri).await;
            assert_eq!(status, StatusCode::OK, "{uri}");
            assert_eq!(body["index"], 0);
        }

        let (status, body) =
            get_json(test_app(Some(three_episodes())), "/api/drama/stream?bookId=1&action=rewind").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].is_string());
    }
}
