use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use tokio::net::TcpListener;

use price_common::contributors::ContributorAnnouncer;
use price_common::fingerprint::Fingerprinter;
use price_common::geo::{HttpLocationResolver, LocationResolver, NoopLocationResolver};
use price_common::notify::{build_http_client, LogNotifier, NotificationSink, WebhookNotifier};
use price_common::store::memory::MemoryObservationStore;
use price_common::store::postgres::PgObservationStore;
use price_common::time::SystemTime;

use crate::config::Config;
use crate::router;

fn announcer(config: &Config) -> anyhow::Result<ContributorAnnouncer> {
    let client = build_http_client(config.outbound_timeout())
        .context("failed to construct reqwest client for outbound calls")?;

    let resolver: Arc<dyn LocationResolver + Send + Sync> = match &config.geoip_url {
        Some(url) => Arc::new(HttpLocationResolver::new(client.clone(), url)),
        None => Arc::new(NoopLocationResolver),
    };
    let sink: Arc<dyn NotificationSink + Send + Sync> = match &config.notification_webhook_url {
        Some(url) => Arc::new(WebhookNotifier::new(client, url)),
        None => Arc::new(LogNotifier),
    };

    Ok(ContributorAnnouncer::new(resolver, sink))
}

pub async fn serve<F>(config: Config, listener: TcpListener, shutdown: F) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let fingerprinter = Fingerprinter::new(config.fingerprint_salt.clone());
    let announcer = announcer(&config)?;

    let state = if config.memory_store {
        tracing::warn!("using the in-memory store, observations are lost on shutdown");
        router::State::new(
            SystemTime {},
            MemoryObservationStore::new(),
            fingerprinter,
            announcer,
            config.lookback_window(),
        )
    } else {
        let store = PgObservationStore::new(
            &config.database_url,
            config.max_pg_connections,
            config.pg_acquire_timeout(),
        )
        .await
        .context("failed to connect to the price store")?;

        if config.run_migrations {
            sqlx::migrate!("../migrations")
                .run(store.pool())
                .await
                .context("failed to run migrations")?;
        }

        router::State::new(
            SystemTime {},
            store,
            fingerprinter,
            announcer,
            config.lookback_window(),
        )
    };

    let app = router::router(
        state,
        config.max_body_size,
        config.concurrency_limit,
        config.export_prometheus,
    );

    tracing::info!("listening on {:?}", listener.local_addr()?);
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown)
    .await?;

    Ok(())
}
