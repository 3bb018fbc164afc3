use std::{
    process,
    sync::{
        Arc,
        atomic::{AtomicUsize, Ordering},
    },
};

use futures::{StreamExt, stream};
use lettura::{
    application::error::AppError,
    application::notify::LeaderboardNotifier,
    application::rankings::{RankingScope, RankingService, RankingWindows},
    application::reads::ReadTrackingService,
    application::recommend::RecommendationService,
    application::repos::{HealthRepo, PostsRepo, ReadsRepo, UsersRepo},
    cache::{Cache, MemoryCache},
    config::{self, RankingsCacheBackend},
    infra::{
        db::{PgCache, PostgresRepositories},
        discord::DiscordBot,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
    },
};
use tracing::{Dispatch, Level, dispatcher, error, info};
use tracing_subscriber::fmt as tracing_fmt;

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Recompute(args) => run_recompute(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let http_state = build_application_context(repositories, &settings)?;

    let router = http::build_router(http_state);
    let listener = tokio::net::TcpListener::bind(settings.server.public_addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "lettura::serve",
        addr = %settings.server.public_addr,
        "Listening",
    );

    axum::serve(listener, router.into_make_service())
        .await
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))
}

async fn run_recompute(
    settings: config::Settings,
    args: config::RecomputeArgs,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let rankings = build_ranking_service(&repositories, &settings);
    let posts: Arc<dyn PostsRepo> = repositories.clone();

    let concurrency = args.concurrency.clamp(1, 32);
    info!(
        target = "lettura::recompute",
        concurrency, "Starting ranking recompute"
    );

    let refreshed = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));

    let all_posts = posts
        .list_all()
        .await
        .map_err(|err| AppError::unexpected(err.to_string()))?;

    stream::iter(all_posts)
        .for_each_concurrent(Some(concurrency), |post| {
            let rankings = rankings.clone();
            let refreshed = refreshed.clone();
            let failed = failed.clone();
            async move {
                match rankings
                    .read_rankings(RankingScope::Post(&post.slug), true)
                    .await
                {
                    Ok(_) => {
                        refreshed.fetch_add(1, Ordering::Relaxed);
                    }
                    Err(err) => {
                        failed.fetch_add(1, Ordering::Relaxed);
                        error!(
                            target = "lettura::recompute",
                            slug = %post.slug,
                            error = %err,
                            "snapshot refresh failed",
                        );
                    }
                }
            }
        })
        .await;

    rankings
        .read_rankings(RankingScope::Site, true)
        .await
        .map_err(|err| AppError::unexpected(format!("site snapshot refresh failed: {err}")))?;

    info!(
        target = "lettura::recompute",
        posts = refreshed.load(Ordering::Relaxed),
        failures = failed.load(Ordering::Relaxed),
        "Recompute completed",
    );
    Ok(())
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool =
        PostgresRepositories::connect(database_url, settings.database.max_connections.get())
            .await
            .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_ranking_service(
    repositories: &Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Arc<RankingService> {
    let reads: Arc<dyn ReadsRepo> = repositories.clone();
    let rankings_cache: Arc<dyn Cache> = match settings.cache.rankings_backend {
        RankingsCacheBackend::Durable => Arc::new(PgCache::new(repositories.clone())),
        RankingsCacheBackend::Memory => {
            Arc::new(MemoryCache::new(settings.cache.memory_capacity))
        }
    };
    let windows = RankingWindows {
        recent_reads: settings.ranking.recent_reads_window,
        active_members: settings.ranking.active_members_window,
    };
    Arc::new(RankingService::new(reads, rankings_cache, windows))
}

fn build_application_context(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<HttpState, AppError> {
    let reads: Arc<dyn ReadsRepo> = repositories.clone();
    let posts: Arc<dyn PostsRepo> = repositories.clone();
    let users: Arc<dyn UsersRepo> = repositories.clone();
    let health: Arc<dyn HealthRepo> = repositories.clone();

    let memory_cache: Arc<dyn Cache> = Arc::new(MemoryCache::new(settings.cache.memory_capacity));
    let rankings = build_ranking_service(&repositories, settings);

    let notifier = match settings.discord.as_ref() {
        Some(discord) => {
            let bot = DiscordBot::new(discord).map_err(AppError::from)?;
            Some(Arc::new(LeaderboardNotifier::new(
                Arc::new(bot),
                discord.leaderboard_channel_id.clone(),
                settings.site.blog_base_url.clone(),
            )))
        }
        None => None,
    };

    let recommendations = Arc::new(RecommendationService::new(
        posts.clone(),
        reads.clone(),
        memory_cache.clone(),
    ));

    let tracking = Arc::new(ReadTrackingService::new(
        reads,
        users,
        rankings.clone(),
        notifier,
        memory_cache,
        settings.tracking.dedupe_window,
    ));

    Ok(HttpState {
        tracking,
        rankings,
        recommendations,
        posts,
        health,
        blog_base_url: settings.site.blog_base_url.clone(),
    })
}
