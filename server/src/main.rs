use clap::{Parser, Subcommand};
use std::path::PathBuf;

use slipway::prelude::*;
use store_adapter_sqlite::StoreAdapterSqlite;

#[derive(Parser)]
#[command(name = "slipway", about = "Multi-tenant application launcher and ingress gateway")]
struct Cli {
	/// Path to the YAML configuration file
	#[arg(short = 'c', long = "config")]
	config: Option<PathBuf>,

	#[command(subcommand)]
	command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
	/// Upgrade the database schema to the latest version
	Upgrade,
	/// Downgrade the database schema by one version
	Downgrade,
	/// Print an example configuration file
	GenConfig,
	/// Print build metadata
	Version,
}

async fn open_adapter(config: &slipway::Configs) -> SwResult<StoreAdapterSqlite> {
	tokio::fs::create_dir_all(config.data_dir()).await?;
	StoreAdapterSqlite::new(config.data_dir().join("slipway.db")).await
}

async fn execute(cli: Cli) -> SwResult<()> {
	match cli.command {
		Some(Command::GenConfig) => {
			print!("{}", slipway::config::EXAMPLE);
			Ok(())
		}
		Some(Command::Version) => {
			println!("slipway {}", slipway::VERSION);
			Ok(())
		}
		Some(Command::Upgrade) => {
			let config = slipway::config::load(cli.config.as_deref())?;
			let applied = open_adapter(&config).await?.migrate_up().await?;
			if applied.is_empty() {
				info!("no new migrations to apply");
			}
			for name in applied {
				info!("migration applied: {}", name);
			}
			Ok(())
		}
		Some(Command::Downgrade) => {
			let config = slipway::config::load(cli.config.as_deref())?;
			match open_adapter(&config).await?.migrate_down().await? {
				Some(name) => info!("migration reverted: {}", name),
				None => info!("no migration to revert"),
			}
			Ok(())
		}
		None => {
			let config = slipway::config::load(cli.config.as_deref())?;
			slipway::run(config).await
		}
	}
}

#[tokio::main]
async fn main() {
	tracing_subscriber::fmt()
		.with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
		.with_target(false)
		.init();

	let cli = Cli::parse();
	if let Err(err) = execute(cli).await {
		error!("{}", err);
		std::process::exit(1);
	}
}

// vim: ts=4
