// src/main.rs

use std::time::Duration;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use crm_backend::{
    config::{AppState, Settings},
    routes,
};

// Mensagens por rodada do despachante do outbox
const OUTBOX_BATCH: i64 = 50;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .compact()
        .init();

    // Se a configuração falhar, a aplicação não deve iniciar
    let settings = Settings::from_env()?;
    let app_state = AppState::new(&settings).await?;

    // Faz o app rodar as migrações do SQLx na inicialização
    if let Some(pool) = &app_state.db_pool {
        sqlx::migrate!().run(pool).await?;
        tracing::info!("✅ Migrações do banco de dados executadas com sucesso!");
    }

    if let Err(e) = app_state.pipeline_service.ensure_default_pipeline().await {
        tracing::warn!("Não foi possível garantir o funil padrão: {:?}", e);
    }

    if settings.outbox_dispatch_secs > 0 {
        app_state
            .outbox_service
            .clone()
            .spawn_dispatcher(Duration::from_secs(settings.outbox_dispatch_secs), OUTBOX_BATCH);
        tracing::info!("📬 Despachante de e-mails a cada {}s", settings.outbox_dispatch_secs);
    }

    let app = routes::app(app_state);

    let listener = TcpListener::bind(&settings.bind_addr).await?;
    tracing::info!("🚀 Servidor escutando em {}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}
