use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;
use std::time::Instant;

use anyhow::{Context, Result};
use chrono::Utc;
use tracing::{info, warn};

use super::context::{PipelineContext, PipelineSettings};
use super::driver::run_pipeline;
use super::types::PipelineSummary;
use crate::cli::EmbedArgs;
use crate::error::PipelineError;
use crate::model::{EmbeddingRunManifest, RunSettingsSnapshot};
use crate::semantic::{load_model, resolve_model_config};
use crate::shutdown::install_stop_handler;
use crate::store::{bootstrap, open_connection};
use crate::util::{now_utc_string, utc_compact_string, write_json_pretty};

pub fn run(args: EmbedArgs) -> Result<()> {
    let settings = PipelineSettings {
        batch_limit: args.batch_limit,
        encode_batch_size: args.encode_batch_size,
        publish_chunk_size: args.publish_chunk_size,
        backfill: !args.skip_backfill,
    };
    let model_config = resolve_model_config(&args.model_id);

    info!(
        model_id = %model_config.model_id,
        backend = %model_config.backend,
        "loading embedding model"
    );
    let model = load_model(&model_config)
        .with_context(|| format!("failed to load model {}", model_config.model_id))?;
    let context = PipelineContext::new(
        args.store.layout(),
        settings,
        model_config,
        model,
        args.device.into(),
    )?;
    info!(
        device = context.device.as_str(),
        dimensions = context.dimensions,
        "embedding model ready"
    );

    let db_path = &args.store.db_path;
    let mut connection = open_connection(db_path)
        .with_context(|| format!("failed to open database: {}", db_path.display()))?;
    bootstrap(
        &connection,
        &context.layout,
        &context.model_config,
        context.dimensions,
    )
    .context("failed to prepare schema")?;

    let stop = Arc::new(AtomicBool::new(false));
    install_stop_handler(Arc::clone(&stop))?;

    let generated_at = now_utc_string();
    let started = Instant::now();
    let outcome = run_pipeline(&mut connection, &context, &stop);

    if let Some(manifest_dir) = &args.manifest_dir {
        let manifest = build_manifest(
            db_path,
            &context,
            generated_at,
            started.elapsed().as_millis(),
            &outcome,
        );
        write_run_manifest(manifest_dir, &manifest);
    }

    let summary = outcome.context("embedding pipeline aborted")?;
    info!(
        written = summary.written,
        published = summary.published,
        pending_after = summary.pending_after,
        stopped_early = summary.stopped_early,
        "embedding generation and index sync complete"
    );

    Ok(())
}

/// Best effort: a manifest that cannot be written is logged, never allowed
/// to replace the pipeline's own outcome.
pub(super) fn write_run_manifest(
    manifest_dir: &Path,
    manifest: &EmbeddingRunManifest,
) -> Option<PathBuf> {
    let manifest_path = manifest_dir.join(format!(
        "embedding_run_{}.json",
        utc_compact_string(Utc::now())
    ));
    match write_json_pretty(&manifest_path, manifest) {
        Ok(()) => {
            info!(path = %manifest_path.display(), status = %manifest.status, "run manifest written");
            Some(manifest_path)
        }
        Err(err) => {
            warn!(
                path = %manifest_path.display(),
                error = %format!("{err:#}"),
                "failed to write run manifest"
            );
            None
        }
    }
}

pub(super) fn build_manifest(
    db_path: &Path,
    context: &PipelineContext,
    generated_at: String,
    duration_ms: u128,
    outcome: &Result<PipelineSummary, PipelineError>,
) -> EmbeddingRunManifest {
    let (summary, status, error_kind, error) = match outcome {
        Ok(summary) => {
            let status = if summary.stopped_early { "stopped" } else { "completed" };
            (Some(summary.clone()), status, None, None)
        }
        Err(err) => (
            None,
            "failed",
            Some(err.kind().to_string()),
            Some(err.to_string()),
        ),
    };

    EmbeddingRunManifest {
        manifest_version: 1,
        run_id: format!("embed-{}", utc_compact_string(Utc::now())),
        generated_at,
        db_path: db_path.display().to_string(),
        table: context.layout.table.clone(),
        index_table: context.layout.index_table.clone(),
        model_id: context.model_config.model_id.clone(),
        model_name: context.model_config.model_name.clone(),
        backend: context.model_config.backend.clone(),
        model_checksum: context.model_config.checksum(),
        embedding_dim: context.dimensions,
        device: context.device.as_str().to_string(),
        settings: RunSettingsSnapshot {
            batch_limit: context.settings.batch_limit,
            encode_batch_size: context.settings.encode_batch_size,
            publish_chunk_size: context.settings.publish_chunk_size,
            backfill: context.settings.backfill,
        },
        summary,
        duration_ms,
        status: status.to_string(),
        error_kind,
        error,
    }
}
