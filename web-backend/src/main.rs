use actix_cors::Cors;
use actix_files::Files;
use actix_web::{web, App, HttpServer};
use anyhow::Result;
use std::path::Path;
use tracing_actix_web::TracingLogger;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

mod api;
mod auth;
mod config;
mod error;
mod state;

use api::create_api_router;
use auth::TokenVerifier;
use config::{Config, LogFormat};
use state::AppState;

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        "secure_review_web=debug,secure_review_core=debug,actix_web=info".into()
    });
    let registry = tracing_subscriber::registry().with(filter);

    match format {
        LogFormat::Json => registry.with(tracing_subscriber::fmt::layer().json()).init(),
        LogFormat::Text => registry.with(tracing_subscriber::fmt::layer()).init(),
    }
}

#[actix_web::main]
async fn main() -> Result<()> {
    // 加载 .env（不存在时忽略）
    dotenv::dotenv().ok();

    let config = Config::from_env()?;
    init_tracing(config.log_format);

    // 初始化状态
    let state = AppState::new(&config).await?;

    // 上次进程遗留的评审
    match state.reviews.recover_interrupted().await {
        Ok(summary) => tracing::debug!(?summary, "Startup recovery finished"),
        Err(e) => tracing::error!("Startup recovery failed: {}", e),
    }

    let verifier = web::Data::new(TokenVerifier::new(&config.jwt_secret));
    let static_dir = config.static_dir.clone();
    let serve_static = Path::new(&static_dir).is_dir();
    if !serve_static {
        tracing::info!("Static directory {} not found, frontend disabled", static_dir);
    }

    let bind_address = config.bind_address();
    tracing::info!("Secure Review server listening on {}", bind_address);

    HttpServer::new(move || {
        let mut app = App::new()
            .app_data(web::Data::new(state.clone()))
            .app_data(verifier.clone())
            .wrap(TracingLogger::default())
            .wrap(Cors::permissive())
            // API 路由
            .service(create_api_router())
            // 健康检查
            .configure(api::health::configure_health_routes);

        // 静态文件服务
        if serve_static {
            app = app.service(Files::new("/", &static_dir).index_file("index.html"));
        }
        app
    })
    .bind(bind_address)?
    .run()
    .await?;

    Ok(())
}
