use anyhow::{Context, Result};
use tracing::info;

use crate::cli::SetupArgs;
use crate::semantic::{load_model, resolve_model_config};
use crate::store::{bootstrap, open_connection};

pub fn run(args: SetupArgs) -> Result<()> {
    let layout = args.store.layout();
    let model_config = resolve_model_config(&args.model_id);
    let model = load_model(&model_config)
        .with_context(|| format!("failed to load model {}", model_config.model_id))?;
    let dimensions = model.dimensions();
    info!(
        model_id = %model_config.model_id,
        dimensions,
        "detected embedding dimension"
    );

    let db_path = &args.store.db_path;
    let connection = open_connection(db_path)
        .with_context(|| format!("failed to open database: {}", db_path.display()))?;
    let metadata = bootstrap(&connection, &layout, &model_config, dimensions)
        .context("failed to prepare schema")?;

    info!(
        path = %db_path.display(),
        index_table = %metadata.index_table,
        dimensions = metadata.dimensions,
        created_at = %metadata.created_at,
        "setup complete"
    );

    Ok(())
}
