use std::sync::Arc;

use actix_request_identifier::{IdReuse, RequestIdentifier};
use actix_web::web::Data;
use anyhow::Context;
use tracing::info;
use tracing_actix_web::TracingLogger;
use tracing_bunyan_formatter::{BunyanFormattingLayer, JsonStorageLayer};
use tracing_subscriber::filter::filter_fn;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::Registry;

use coop_ledger::config::Settings;
use coop_ledger::database::connect::{create_db_connection_pool, run_migrations};
use coop_ledger::database::postgres::PgLedgerStore;
use coop_ledger::ledger::Ledger;
use coop_ledger::routes;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    let settings = Settings::from_env()?;

    // setup tracing and use bunyan formatter
    let level = settings.log_level;
    let formatting_layer = BunyanFormattingLayer::new("coop-ledger".into(), std::io::stdout);
    let subscriber = Registry::default()
        .with(filter_fn(move |metadata| *metadata.level() <= level))
        .with(JsonStorageLayer)
        .with(formatting_layer);
    tracing::subscriber::set_global_default(subscriber)?;

    let db = create_db_connection_pool(&settings).context("failed to create database pool")?;
    run_migrations(&db)?;

    let ledger = Ledger::new(Arc::new(PgLedgerStore::new(db)));

    info!(bind_address = %settings.bind_address, "starting server");
    let server = actix_web::HttpServer::new(move || {
        actix_web::App::new()
            .wrap(RequestIdentifier::with_uuid().use_incoming_id(IdReuse::UseIncoming))
            .wrap(TracingLogger::default())
            .app_data(Data::new(ledger.clone()))
            .configure(routes::configure)
    });

    server.bind(&settings.bind_address)?.run().await?;
    Ok(())
}
