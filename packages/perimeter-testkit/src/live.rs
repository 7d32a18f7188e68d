//! Disposable databases for tests that talk to real Postgres and Qdrant. Suites read
//! `PERIMETER_PG_DSN` and `PERIMETER_QDRANT_URL` and skip when either is unset.

use std::{env, mem, str::FromStr, sync::Mutex, thread, time::Duration};

use qdrant_client::Qdrant;
use sqlx::{
	ConnectOptions, Connection, Executor,
	postgres::{PgConnectOptions, PgConnection},
};
use tokio::{runtime::Builder, time};
use uuid::Uuid;

use crate::{Error, Result};

const MAINTENANCE_DATABASES: [&str; 2] = ["postgres", "template1"];
const QDRANT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

pub fn env_dsn() -> Option<String> {
	env::var("PERIMETER_PG_DSN").ok()
}

pub fn env_qdrant_url() -> Option<String> {
	env::var("PERIMETER_QDRANT_URL").ok()
}

/// A uniquely named database created on the server behind the base DSN. Qdrant collections
/// handed out by `collection_name` are dropped together with it.
pub struct TestDatabase {
	name: String,
	dsn: String,
	maintenance: PgConnectOptions,
	collections: Mutex<Vec<String>>,
	dropped: bool,
}
impl TestDatabase {
	pub async fn new(base_dsn: &str) -> Result<Self> {
		let base = PgConnectOptions::from_str(base_dsn)
			.map_err(|err| Error::Message(format!("Invalid PERIMETER_PG_DSN: {err}.")))?;
		let (maintenance, mut conn) = connect_maintenance(&base).await?;
		let name = format!("perimeter_test_{}", Uuid::new_v4().simple());

		conn.execute(format!(r#"CREATE DATABASE "{name}""#).as_str())
			.await
			.map_err(|err| Error::Message(format!("Failed to create {name}: {err}.")))?;

		let dsn = base.database(&name).to_url_lossy().to_string();

		Ok(Self { name, dsn, maintenance, collections: Mutex::new(Vec::new()), dropped: false })
	}

	pub fn dsn(&self) -> &str {
		&self.dsn
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn collection_name(&self, prefix: &str) -> String {
		let collection = format!("{prefix}_{}", self.name);
		let mut collections = self.collections.lock().unwrap_or_else(|err| err.into_inner());

		if !collections.contains(&collection) {
			collections.push(collection.clone());
		}

		collection
	}

	pub async fn cleanup(mut self) -> Result<()> {
		self.dropped = true;

		let collections = self.take_collections();

		teardown(&self.name, &self.maintenance, &collections).await
	}

	fn take_collections(&self) -> Vec<String> {
		mem::take(&mut *self.collections.lock().unwrap_or_else(|err| err.into_inner()))
	}
}
impl Drop for TestDatabase {
	fn drop(&mut self) {
		if self.dropped {
			return;
		}

		let name = self.name.clone();
		let maintenance = self.maintenance.clone();
		let collections = self.take_collections();
		// Drop may run inside a runtime, so the async teardown gets its own thread.
		let handle = thread::spawn(move || {
			let result = Builder::new_current_thread()
				.enable_all()
				.build()
				.map_err(|err| Error::Message(err.to_string()))
				.and_then(|runtime| runtime.block_on(teardown(&name, &maintenance, &collections)));

			if let Err(err) = result {
				eprintln!("Test database teardown failed: {err}");
			}
		});
		let _ = handle.join();
	}
}

async fn connect_maintenance(base: &PgConnectOptions) -> Result<(PgConnectOptions, PgConnection)> {
	let mut errors = Vec::new();

	for database in MAINTENANCE_DATABASES {
		let options = base.clone().database(database);

		match PgConnection::connect_with(&options).await {
			Ok(conn) => return Ok((options, conn)),
			Err(err) => errors.push(format!("{database}: {err}")),
		}
	}

	Err(Error::Message(format!("No maintenance database reachable ({}).", errors.join("; "))))
}

async fn teardown(name: &str, maintenance: &PgConnectOptions, collections: &[String]) -> Result<()> {
	let qdrant = drop_collections(collections).await;
	let mut conn = PgConnection::connect_with(maintenance).await?;
	let _ = sqlx::query(
		"\
SELECT pg_terminate_backend(pid)
FROM pg_stat_activity
WHERE datname = $1 AND pid <> pg_backend_pid()",
	)
	.bind(name)
	.fetch_all(&mut conn)
	.await;

	conn.execute(format!(r#"DROP DATABASE IF EXISTS "{name}""#).as_str()).await?;

	qdrant
}

async fn drop_collections(collections: &[String]) -> Result<()> {
	if collections.is_empty() {
		return Ok(());
	}

	let Some(url) = env_qdrant_url() else {
		eprintln!("PERIMETER_QDRANT_URL is unset; leaving test collections in place.");

		return Ok(());
	};
	let client = Qdrant::from_url(&url)
		.build()
		.map_err(|err| Error::Message(format!("Failed to build Qdrant client: {err}.")))?;

	for collection in collections {
		match time::timeout(QDRANT_CALL_TIMEOUT, client.delete_collection(collection.clone())).await
		{
			Ok(Ok(_)) => {},
			Ok(Err(err)) =>
				return Err(Error::Message(format!("Failed to drop collection {collection}: {err}."))),
			Err(_) =>
				return Err(Error::Message(format!("Dropping collection {collection} timed out."))),
		}
	}

	Ok(())
}
