pub mod worker;

mod error;

pub use error::{Error, Result};

use std::path::PathBuf;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use perimeter_service::{Backends, PerimeterService};
use perimeter_storage::{db::Db, qdrant::QdrantStore};

#[derive(Debug, Parser)]
#[command(
	version = perimeter_cli::VERSION,
	rename_all = "kebab",
	styles = perimeter_cli::styles(),
)]
pub struct Args {
	#[arg(long, short = 'c', value_name = "FILE")]
	pub config: PathBuf,
	/// Drain the queue once and exit instead of polling.
	#[arg(long)]
	pub once: bool,
}

pub async fn run(args: Args) -> color_eyre::Result<()> {
	let config = perimeter_config::load(&args.config)?;
	let filter = EnvFilter::new(config.service.log_level.clone());

	tracing_subscriber::fmt().with_env_filter(filter).init();

	let service = build_service(config).await?;

	if args.once {
		let processed = worker::process_jobs_once(&service).await?;

		tracing::info!(processed, "Drained job queue.");

		return Ok(());
	}

	worker::run_worker(&service).await?;

	Ok(())
}

async fn build_service(config: perimeter_config::Config) -> Result<PerimeterService> {
	let db = Db::connect(&config.storage.postgres).await?;

	db.ensure_schema().await?;

	let qdrant = QdrantStore::new(&config.storage.qdrant)?;

	qdrant.ensure_collection().await?;

	let tokenizer = perimeter_chunking::load_tokenizer(perimeter_config::tokenizer_repo(&config))?;

	tracing::info!(
		collection = %config.storage.qdrant.collection,
		tokenizer = perimeter_config::tokenizer_repo(&config),
		"Worker backends are ready."
	);

	Ok(PerimeterService::new(config, Backends::production(db, qdrant), tokenizer))
}
