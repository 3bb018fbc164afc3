//! Post recommendations.
//!
//! Candidates are the listed posts minus everything the caller excluded
//! and everything the reader has already read. A bounded request splits
//! its budget across keyword relevance, popularity, and random fill; each
//! strategy overfetches and samples so repeat visitors see variety.

use std::collections::HashSet;
use std::sync::Arc;

use rand::seq::SliceRandom;
use time::Duration;

use crate::cache::keys::CacheKey;
use crate::cache::{Cache, CachePolicy, cachified};
use crate::domain::entities::PostRecord;
use crate::domain::reader::ReaderId;

use super::repos::{PostsRepo, ReadsRepo, RepoError};

/// Each strategy considers this many times its share before sampling.
const OVERFETCH_FACTOR: usize = 4;

/// Popularity shifts quickly, so its slug list lives in the memory tier
/// with a short hard TTL.
const POPULAR_SLUGS_TTL: Duration = Duration::minutes(30);
const POPULAR_SLUGS_SWR: Duration = Duration::days(1);

#[derive(Debug, Clone, Default)]
pub struct RecommendationRequest {
    pub reader: Option<ReaderId>,
    pub keywords: Vec<String>,
    pub excludes: Vec<String>,
    /// `None` (or zero) means "no budget": the whole candidate pool is
    /// returned in random order.
    pub limit: Option<usize>,
}

#[derive(Clone)]
pub struct RecommendationService {
    posts: Arc<dyn PostsRepo>,
    reads: Arc<dyn ReadsRepo>,
    cache: Arc<dyn Cache>,
}

impl RecommendationService {
    pub fn new(
        posts: Arc<dyn PostsRepo>,
        reads: Arc<dyn ReadsRepo>,
        cache: Arc<dyn Cache>,
    ) -> Self {
        Self {
            posts,
            reads,
            cache,
        }
    }

    pub async fn recommend(
        &self,
        request: RecommendationRequest,
    ) -> Result<Vec<PostRecord>, RepoError> {
        let all_posts = self.posts.list_all().await?;

        let mut exclude: HashSet<String> = request.excludes.into_iter().collect();
        exclude.extend(
            all_posts
                .iter()
                .filter(|post| !post.is_listed())
                .map(|post| post.slug.clone()),
        );
        if let Some(reader) = &request.reader {
            exclude.extend(self.reads.distinct_read_slugs(reader).await?);
        }

        let mut pool: Vec<PostRecord> = all_posts
            .into_iter()
            .filter(|post| !exclude.contains(&post.slug))
            .collect();

        let Some(limit) = request.limit.filter(|&limit| limit > 0) else {
            pool.shuffle(&mut rand::rng());
            return Ok(pool);
        };

        let keywords: Vec<String> = request
            .keywords
            .into_iter()
            .filter(|keyword| !keyword.trim().is_empty())
            .collect();
        let groups = if keywords.is_empty() { 2 } else { 3 };
        let share = (limit / groups).max(1);
        let mut recommendations: Vec<PostRecord> = Vec::with_capacity(limit);

        // The popularity source is fetched up front; ThreadRng is not Send,
        // so no await may occur while it is alive.
        let popular_source = self.popular_slugs().await?;
        let mut rng = rand::rng();

        // Keyword relevance.
        if !keywords.is_empty() {
            let mut matched: Vec<PostRecord> = Vec::new();
            let mut seen: HashSet<String> = HashSet::new();
            for keyword in &keywords {
                for post in filter_posts(&pool, keyword) {
                    if seen.insert(post.slug.clone()) {
                        matched.push(post.clone());
                    }
                }
            }
            matched.truncate(share * OVERFETCH_FACTOR);
            matched.shuffle(&mut rng);
            matched.truncate(share);
            exclude.extend(matched.iter().map(|post| post.slug.clone()));
            recommendations.extend(matched);
            pool.retain(|post| !exclude.contains(&post.slug));
        }

        // Popularity. The whole shortlist joins the exclusion set, picked
        // or not, so the random filler cannot resurface near-duplicates.
        let popular: Vec<String> = popular_source
            .into_iter()
            .filter(|slug| !exclude.contains(slug))
            .take(share * OVERFETCH_FACTOR)
            .collect();
        let mut popular_posts: Vec<PostRecord> = popular
            .iter()
            .filter_map(|slug| pool.iter().find(|post| &post.slug == slug).cloned())
            .collect();
        popular_posts.shuffle(&mut rng);
        popular_posts.truncate(share);
        exclude.extend(popular);
        recommendations.extend(popular_posts);
        pool.retain(|post| !exclude.contains(&post.slug));

        // Random fill for whatever budget is left.
        if recommendations.len() < limit {
            pool.shuffle(&mut rng);
            let remaining = limit - recommendations.len();
            recommendations.extend(pool.into_iter().take(remaining));
        }

        recommendations.shuffle(&mut rng);
        recommendations.truncate(limit);
        Ok(recommendations)
    }

    async fn popular_slugs(&self) -> Result<Vec<String>, RepoError> {
        let reads = self.reads.clone();
        cachified(
            self.cache.clone(),
            &CacheKey::PopularPostSlugs.render(),
            CachePolicy::new(POPULAR_SLUGS_TTL, POPULAR_SLUGS_SWR),
            Some(looks_like_slug_list),
            move || async move { reads.popular_post_slugs().await },
        )
        .await
    }
}

/// Rank candidates for one keyword: title containment outranks containment
/// in categories, keywords, or the description. Matching is
/// case-insensitive and order within a tier follows the pool.
fn filter_posts<'a>(pool: &'a [PostRecord], keyword: &str) -> Vec<&'a PostRecord> {
    let needle = keyword.to_lowercase();
    let mut strong: Vec<&PostRecord> = Vec::new();
    let mut weak: Vec<&PostRecord> = Vec::new();

    for post in pool {
        if post.title.to_lowercase().contains(&needle) {
            strong.push(post);
        } else if post
            .categories
            .iter()
            .chain(post.keywords.iter())
            .any(|term| term.to_lowercase().contains(&needle))
            || post.description.to_lowercase().contains(&needle)
        {
            weak.push(post);
        }
    }

    strong.extend(weak);
    strong
}

fn looks_like_slug_list(value: &serde_json::Value) -> bool {
    value
        .as_array()
        .is_some_and(|slugs| slugs.iter().all(|slug| slug.is_string()))
}
