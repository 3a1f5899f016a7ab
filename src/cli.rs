use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::semantic::{DEFAULT_MODEL_ID, DevicePreference};
use crate::store::StoreLayout;

#[derive(Parser, Debug)]
#[command(
    name = "vecsync",
    version,
    about = "Incrementally embed SQLite records and mirror them into a vector index"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Embed every pending record and publish it to the vector index.
    Embed(EmbedArgs),
    /// Prepare the embedding column, pending index and vector index table.
    Setup(SetupArgs),
    /// Report pending, embedded and published record counts.
    Status(StatusArgs),
}

#[derive(Args, Debug, Clone)]
pub struct StoreArgs {
    #[arg(long, default_value = "data/products.db")]
    pub db_path: PathBuf,

    #[arg(long, default_value = "products")]
    pub table: String,

    #[arg(long, default_value = "id")]
    pub id_column: String,

    #[arg(long, default_value = "search_text")]
    pub text_column: String,

    #[arg(long, default_value = "embedding")]
    pub embedding_column: String,

    #[arg(long, default_value = "vec_products")]
    pub index_table: String,
}

impl StoreArgs {
    pub fn layout(&self) -> StoreLayout {
        StoreLayout {
            table: self.table.clone(),
            id_column: self.id_column.clone(),
            text_column: self.text_column.clone(),
            embedding_column: self.embedding_column.clone(),
            index_table: self.index_table.clone(),
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum DeviceArg {
    Auto,
    Cpu,
    Cuda,
}

impl From<DeviceArg> for DevicePreference {
    fn from(value: DeviceArg) -> Self {
        match value {
            DeviceArg::Auto => Self::Auto,
            DeviceArg::Cpu => Self::Cpu,
            DeviceArg::Cuda => Self::Cuda,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct EmbedArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, default_value = DEFAULT_MODEL_ID)]
    pub model_id: String,

    #[arg(long, value_enum, default_value_t = DeviceArg::Auto)]
    pub device: DeviceArg,

    #[arg(long, default_value_t = 25_000)]
    pub batch_limit: usize,

    #[arg(long, default_value_t = 128)]
    pub encode_batch_size: usize,

    #[arg(long, default_value_t = 500)]
    pub publish_chunk_size: usize,

    #[arg(long)]
    pub manifest_dir: Option<PathBuf>,

    #[arg(long, default_value_t = false)]
    pub skip_backfill: bool,
}

#[derive(Args, Debug, Clone)]
pub struct SetupArgs {
    #[command(flatten)]
    pub store: StoreArgs,

    #[arg(long, default_value = DEFAULT_MODEL_ID)]
    pub model_id: String,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    #[command(flatten)]
    pub store: StoreArgs,
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn embed_device_flag_maps_onto_device_preference() {
        let cli = Cli::parse_from(["vecsync", "embed", "--device", "cuda"]);
        let Commands::Embed(args) = cli.command else {
            panic!("expected the embed subcommand");
        };
        assert_eq!(DevicePreference::from(args.device), DevicePreference::Cuda);

        let cli = Cli::parse_from(["vecsync", "embed"]);
        let Commands::Embed(args) = cli.command else {
            panic!("expected the embed subcommand");
        };
        assert_eq!(DevicePreference::from(args.device), DevicePreference::Auto);
        assert_eq!(DevicePreference::from(DeviceArg::Cpu), DevicePreference::Cpu);
    }
}
