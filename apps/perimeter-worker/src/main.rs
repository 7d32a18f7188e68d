use clap::Parser;

use perimeter_worker::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	perimeter_worker::run(Args::parse()).await
}
