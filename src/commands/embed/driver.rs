use std::sync::atomic::{AtomicBool, Ordering};

use rusqlite::Connection;
use tracing::{info, warn};

use super::context::PipelineContext;
use super::generator::generate;
use super::locator::{count_pending, fetch_pending, fetch_unpublished};
use super::publisher::publish;
use super::types::{DriverState, PipelineSummary, RecordId};
use super::writer::write;
use crate::error::{PipelineError, PipelineResult};

/// Runs locate -> generate -> write -> publish until no pending record is
/// left or `stop` is raised. `stop` is only observed before a fetch, so a
/// started batch always finishes its write and publish.
pub fn run_pipeline(
    connection: &mut Connection,
    context: &PipelineContext,
    stop: &AtomicBool,
) -> PipelineResult<PipelineSummary> {
    let mut driver = Driver::new(connection, context)?;

    if context.settings.backfill {
        driver.backfill()?;
    }

    while driver.state == DriverState::Running {
        if stop.load(Ordering::SeqCst) {
            info!(
                total_processed = driver.summary.written,
                "stop requested; not starting another batch"
            );
            driver.summary.stopped_early = true;
            driver.state = DriverState::Done;
            break;
        }
        driver.state = driver.step()?;
    }

    driver.finish()
}

pub(super) struct Driver<'a> {
    connection: &'a mut Connection,
    context: &'a PipelineContext,
    pub(super) state: DriverState,
    pub(super) summary: PipelineSummary,
}

impl<'a> Driver<'a> {
    pub(super) fn new(
        connection: &'a mut Connection,
        context: &'a PipelineContext,
    ) -> PipelineResult<Self> {
        let pending_before = count_pending(connection, &context.layout)?;
        info!(
            table = %context.layout.table,
            pending = pending_before,
            batch_limit = context.settings.batch_limit,
            model_id = %context.model_config.model_id,
            device = context.device.as_str(),
            "starting embedding pipeline"
        );

        Ok(Self {
            connection,
            context,
            state: DriverState::Running,
            summary: PipelineSummary {
                pending_before,
                ..PipelineSummary::default()
            },
        })
    }

    /// One iteration. Returns `Done` once the locator finds nothing.
    pub(super) fn step(&mut self) -> PipelineResult<DriverState> {
        let layout = &self.context.layout;
        let settings = &self.context.settings;

        let batch = fetch_pending(self.connection, layout, settings.batch_limit)?;
        if batch.is_empty() {
            info!(
                total_processed = self.summary.written,
                "no pending records left"
            );
            return Ok(DriverState::Done);
        }

        let iteration = self.summary.iterations + 1;
        info!(
            iteration,
            batch = batch.len(),
            total_processed = self.summary.written,
            "processing batch"
        );

        let vectors = generate(&batch, self.context)?;
        let written = write(self.connection, layout, &batch, &vectors)?;
        if written == 0 {
            return Err(PipelineError::config(format!(
                "no record of a {}-record batch was updated; is {}.{} a unique, non-NULL key?",
                batch.len(),
                layout.table,
                layout.id_column
            )));
        }
        if written < batch.len() {
            warn!(
                written,
                batch = batch.len(),
                "fewer rows updated than records located"
            );
        }

        let ids = batch
            .iter()
            .map(|record| record.id.clone())
            .collect::<Vec<RecordId>>();
        let report = publish(self.connection, layout, &ids, settings.publish_chunk_size)?;

        self.summary.iterations = iteration;
        self.summary.located += batch.len();
        self.summary.embedded += vectors.len();
        self.summary.written += written;
        self.summary.published += report.published;

        info!(
            iteration,
            written,
            published = report.published,
            index_statements = report.statements,
            total_processed = self.summary.written,
            remaining = self.summary.pending_before.saturating_sub(self.summary.written),
            "batch complete"
        );

        Ok(DriverState::Running)
    }

    /// Republishes embedded records that never reached the index, e.g. after
    /// a crash between a committed write and its publish.
    pub(super) fn backfill(&mut self) -> PipelineResult<usize> {
        let layout = &self.context.layout;
        let settings = &self.context.settings;

        loop {
            let ids = fetch_unpublished(self.connection, layout, settings.batch_limit)?;
            if ids.is_empty() {
                break;
            }

            let report = publish(self.connection, layout, &ids, settings.publish_chunk_size)?;
            if report.published == 0 {
                warn!(
                    unpublished = ids.len(),
                    "index backfill made no progress; leaving remaining records for later"
                );
                break;
            }

            self.summary.backfilled += report.published;
            info!(
                published = report.published,
                total_backfilled = self.summary.backfilled,
                "backfilled vector index"
            );
        }

        Ok(self.summary.backfilled)
    }

    fn finish(self) -> PipelineResult<PipelineSummary> {
        let mut summary = self.summary;
        summary.pending_after = count_pending(self.connection, &self.context.layout)?;

        info!(
            iterations = summary.iterations,
            written = summary.written,
            published = summary.published,
            backfilled = summary.backfilled,
            pending_after = summary.pending_after,
            stopped_early = summary.stopped_early,
            "embedding pipeline finished"
        );

        Ok(summary)
    }
}
