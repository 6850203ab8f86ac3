use flashcard_srs::api::{app_router, ApiState};
use flashcard_srs::config::Config;
use flashcard_srs::Db;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(&config.log_level))
        .init();

    let db = Db::connect(&config.database_url).await?;
    let app = app_router(ApiState { db });

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(addr).await?;
    log::info!("flashcard server listening on http://{}", addr);

    axum::serve(listener, app).await?;
    Ok(())
}
