use std::sync::Arc;

use actix_web::{App, HttpServer, web};
use tracing::info;
use tracing_subscriber::EnvFilter;

use rs_markov_core::config::load_config;
use rs_markov_core::corpus::{CorpusStore, FsCorpusBackend};
use rs_markov_core::engine::ResponseEngine;
use rs_markov_core::settings::JsonSettingsStore;

mod routes;

use routes::SharedData;

/// Main entry point for the server.
///
/// Loads the configuration, opens the settings and corpus stores under
/// `data_dir` and serves the HTTP API the transport and command
/// collaborators talk to.
#[actix_web::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	tracing_subscriber::fmt()
		.with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
		.init();

	let config = load_config()?;
	let settings = Arc::new(JsonSettingsStore::open(&config.data_dir, config.max_corpus_bytes)?);
	let backend = Arc::new(FsCorpusBackend::new(config.data_dir.join("corpus")));
	let corpus = Arc::new(CorpusStore::new(backend, settings, config.state_size));

	let address = (config.bind_address.clone(), config.port);
	let shared_data = web::Data::new(SharedData::new(ResponseEngine::new(corpus, config)));

	info!(address = %address.0, port = address.1, "starting markov server");
	HttpServer::new(move || App::new().app_data(shared_data.clone()).configure(routes::configure))
		.bind(address)?
		.run()
		.await?;
	Ok(())
}
