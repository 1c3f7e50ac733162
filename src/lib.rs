use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

pub mod commands;
pub mod config;
pub mod documents;
pub mod pipeline;
pub mod sinks;
pub mod sources;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Load a directory of Parquet files into the raw events staging table.
    ///
    /// Every record becomes one jsonb document; the staging table is dropped
    /// and recreated at the start of each run.
    Load(LoadArgs),
}

#[derive(Args, Debug)]
pub struct LoadArgs {
    /// Postgres host.
    #[arg(long, env = "PGHOST", default_value = "localhost")]
    pub host: String,

    /// Postgres port.
    #[arg(long, env = "PGPORT", default_value_t = 5434)]
    pub port: u16,

    /// Postgres user.
    #[arg(long, env = "PGUSER")]
    pub user: String,

    /// Postgres password.
    #[arg(long, env = "PGPASSWORD")]
    pub password: String,

    /// Target database name.
    #[arg(long, env = "PGDATABASE")]
    pub database: String,

    /// Directory scanned for *.parquet input files.
    #[arg(long, env = "DATA_DIR", default_value = "./data/raw/events")]
    pub data_dir: PathBuf,
}
