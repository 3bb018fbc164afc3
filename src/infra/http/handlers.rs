use axum::extract::{Query, State};
use axum::http::HeaderMap;
use axum::{Form, Json};
use axum::response::IntoResponse;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::application::recommend::RecommendationRequest;
use crate::domain::entities::PostRecord;
use crate::domain::ranking::TeamRank;
use crate::domain::reader::ReaderId;

use super::HttpState;
use super::error::{ApiError, mark_as_read_to_api, repo_to_api};
use crate::application::rankings::RankingScope;

/// Reader identity headers, set by the upstream auth proxy. Sessions and
/// cookies are terminated before requests reach this service.
const USER_ID_HEADER: &str = "x-user-id";
const CLIENT_ID_HEADER: &str = "x-client-id";

fn reader_from_headers(headers: &HeaderMap) -> Result<Option<ReaderId>, ApiError> {
    if let Some(value) = headers.get(USER_ID_HEADER) {
        let raw = value
            .to_str()
            .map_err(|_| ApiError::bad_request("invalid reader header", None))?;
        let id = Uuid::parse_str(raw).map_err(|err| {
            ApiError::bad_request("invalid user id", Some(err.to_string()))
        })?;
        return Ok(Some(ReaderId::User(id)));
    }
    if let Some(value) = headers.get(CLIENT_ID_HEADER) {
        let raw = value
            .to_str()
            .map_err(|_| ApiError::bad_request("invalid reader header", None))?;
        if !raw.is_empty() {
            return Ok(Some(ReaderId::Client(raw.to_string())));
        }
    }
    Ok(None)
}

#[derive(Debug, Deserialize)]
pub struct MarkAsReadForm {
    pub slug: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MarkAsReadResponse {
    pub success: bool,
}

pub async fn mark_as_read(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Form(form): Form<MarkAsReadForm>,
) -> Result<impl IntoResponse, ApiError> {
    let Some(slug) = form.slug.filter(|slug| !slug.is_empty()) else {
        return Err(ApiError::bad_request("missing slug", None));
    };
    let reader = reader_from_headers(&headers)?;

    state
        .tracking
        .mark_as_read(&slug, reader)
        .await
        .map_err(mark_as_read_to_api)?;

    Ok(Json(MarkAsReadResponse { success: true }))
}

/// Public listing entry, shaped for the site's `blog.json` consumers.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BlogPostJson {
    pub id: String,
    pub slug: String,
    pub production_url: String,
    pub title: String,
    pub categories: Vec<String>,
    pub keywords: Vec<String>,
    pub description: String,
}

impl BlogPostJson {
    fn from_record(post: PostRecord, blog_base_url: &str) -> Self {
        let base = blog_base_url.trim_end_matches('/');
        Self {
            id: post.slug.clone(),
            production_url: format!("{base}/{}", post.slug),
            slug: post.slug,
            title: post.title,
            categories: post.categories,
            keywords: post.keywords,
            description: post.description,
        }
    }
}

pub async fn blog_json(
    State(state): State<HttpState>,
) -> Result<Json<Vec<BlogPostJson>>, ApiError> {
    let posts = state.posts.list_all().await.map_err(repo_to_api)?;
    let listing = posts
        .into_iter()
        .filter(PostRecord::is_listed)
        .map(|post| BlogPostJson::from_record(post, &state.blog_base_url))
        .collect();
    Ok(Json(listing))
}

#[derive(Debug, Deserialize)]
pub struct RankingsQuery {
    pub slug: Option<String>,
}

pub async fn rankings(
    State(state): State<HttpState>,
    Query(query): Query<RankingsQuery>,
) -> Result<Json<Vec<TeamRank>>, ApiError> {
    let scope = match query.slug.as_deref() {
        Some(slug) => RankingScope::Post(slug),
        None => RankingScope::Site,
    };
    let ranks = state
        .rankings
        .read_rankings(scope, false)
        .await
        .map_err(repo_to_api)?;
    Ok(Json(ranks))
}

#[derive(Debug, Deserialize)]
pub struct RecommendationsQuery {
    /// Comma-separated keyword list.
    pub keywords: Option<String>,
    /// Comma-separated slugs to exclude (typically the current post).
    pub exclude: Option<String>,
    pub limit: Option<usize>,
}

fn split_csv(raw: Option<String>) -> Vec<String> {
    raw.map(|raw| {
        raw.split(',')
            .map(str::trim)
            .filter(|part| !part.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

pub async fn recommendations(
    State(state): State<HttpState>,
    headers: HeaderMap,
    Query(query): Query<RecommendationsQuery>,
) -> Result<Json<Vec<BlogPostJson>>, ApiError> {
    let reader = reader_from_headers(&headers)?;
    let request = RecommendationRequest {
        reader,
        keywords: split_csv(query.keywords),
        excludes: split_csv(query.exclude),
        limit: query.limit,
    };
    let posts = state
        .recommendations
        .recommend(request)
        .await
        .map_err(repo_to_api)?;
    let listing = posts
        .into_iter()
        .map(|post| BlogPostJson::from_record(post, &state.blog_base_url))
        .collect();
    Ok(Json(listing))
}

#[derive(Debug, Deserialize)]
pub struct ReadStatsQuery {
    pub slug: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReadStatsResponse {
    pub total_reads: u64,
    pub reader_count: u64,
}

pub async fn read_stats(
    State(state): State<HttpState>,
    Query(query): Query<ReadStatsQuery>,
) -> Result<Json<ReadStatsResponse>, ApiError> {
    let (total_reads, reader_count) = tokio::join!(
        state.tracking.total_reads(query.slug.as_deref()),
        state.tracking.reader_count(),
    );
    Ok(Json(ReadStatsResponse {
        total_reads: total_reads.map_err(repo_to_api)?,
        reader_count: reader_count.map_err(repo_to_api)?,
    }))
}

pub async fn healthz(State(state): State<HttpState>) -> Result<&'static str, ApiError> {
    state.health.ping().await.map_err(repo_to_api)?;
    Ok("ok")
}
