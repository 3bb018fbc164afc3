//! Cache key definitions.
//!
//! Every cached computation renders its key through here so the two
//! backends never disagree on naming.

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum CacheKey<'a> {
    /// Site-wide team rankings.
    SiteRankings,
    /// Per-post team rankings.
    PostRankings(&'a str),
    /// Read-count-descending slug list feeding the popularity strategy.
    PopularPostSlugs,
    /// Distinct reader count across the whole site.
    ReaderCount,
    /// Total read count, site-wide or for one slug.
    TotalReads(Option<&'a str>),
}

impl CacheKey<'_> {
    pub fn render(&self) -> String {
        match self {
            CacheKey::SiteRankings => "blog:rankings".to_string(),
            CacheKey::PostRankings(slug) => format!("blog:{slug}:rankings"),
            CacheKey::PopularPostSlugs => "sorted-most-popular-post-slugs".to_string(),
            CacheKey::ReaderCount => "reader-count".to_string(),
            CacheKey::TotalReads(None) => "total-post-reads:__all-posts__".to_string(),
            CacheKey::TotalReads(Some(slug)) => format!("total-post-reads:{slug}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_are_scope_distinct() {
        assert_eq!(CacheKey::SiteRankings.render(), "blog:rankings");
        assert_eq!(
            CacheKey::PostRankings("my-post").render(),
            "blog:my-post:rankings"
        );
        assert_eq!(
            CacheKey::TotalReads(None).render(),
            "total-post-reads:__all-posts__"
        );
        assert_eq!(
            CacheKey::TotalReads(Some("my-post")).render(),
            "total-post-reads:my-post"
        );
        assert_ne!(
            CacheKey::PopularPostSlugs.render(),
            CacheKey::ReaderCount.render()
        );
    }
}
