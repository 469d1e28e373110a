use std::sync::Arc;
use invoice_match_rust::{
    api, create_pool, service::scorer_from_config, AppConfig, DiscrepancyChecker, MatcherService,
    PgCandidateSource,
};
use tracing::info;
use tracing_subscriber::fmt::time::ChronoLocal;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // 初始化日志 - 本地时间格式
    tracing_subscriber::fmt()
        .with_timer(ChronoLocal::new("%Y-%m-%d %H:%M:%S".to_string()))
        .with_target(true)
        .with_level(true)
        .init();

    // 加载配置
    let config = AppConfig::load()?;
    info!("Starting server with config: {:?}", config);

    // 创建数据库连接池
    let pool = create_pool(&config.database.url).await?;
    info!("Database pool created");

    let source = Arc::new(PgCandidateSource::new(pool.clone()));
    let scorer = scorer_from_config(&config.ai);

    let state = api::AppState {
        matcher: Arc::new(MatcherService::new(
            source.clone(),
            scorer,
            config.matching,
            config.ai.timeout(),
        )),
        checker: Arc::new(DiscrepancyChecker::new(source)),
        pool,
    };
    let app = api::router(state);

    // 启动服务器
    let addr = format!("{}:{}", config.server.host, config.server.port);
    info!("Server listening on {}", addr);
    info!("API Endpoints:");
    info!("  POST /api/match/preview          - score supplied candidates");
    info!("  POST /api/match/batch            - match stored invoices");
    info!("  POST /api/discrepancies/check    - run discrepancy rules");
    info!("  POST /api/matches/:id/status     - confirm or reject a match");
    info!("  POST /api/flags/:id/resolve      - resolve a flag");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
