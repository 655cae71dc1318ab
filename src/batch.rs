//! Batch scheduling: bounded groups, positional results, delivery handoff.
//!
//! A batch is split into consecutive groups of at most `group_size` files.
//! Groups run strictly one after another; the files inside a group convert
//! concurrently on the current task (`join_all`, no spawning), so at most
//! `group_size` conversions are ever in flight. Results land in the slot of
//! their submission index, whatever order they complete in.

use crate::convert::ConversionPipeline;
use crate::delivery::{DeliveryQueue, DeliveryTarget};
use crate::error::Any2PdfError;
use crate::output::{BatchReport, BatchStats, ConversionResult};
use crate::pipeline::input::SourceFile;
use crate::progress::{NoopProgressCallback, ProgressCallback};
use futures::future::join_all;
use std::ops::Range;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Drives a [`ConversionPipeline`] over a batch of files.
#[derive(Debug)]
pub struct BatchScheduler {
    pipeline: ConversionPipeline,
}

impl BatchScheduler {
    pub fn new(pipeline: ConversionPipeline) -> Self {
        Self { pipeline }
    }

    pub fn pipeline(&self) -> &ConversionPipeline {
        &self.pipeline
    }

    /// Index ranges of the groups a batch of `total` files is split into.
    pub fn plan(total: usize, group_size: usize) -> Vec<Range<usize>> {
        let size = group_size.max(1);
        (0..total)
            .step_by(size)
            .map(|start| start..(start + size).min(total))
            .collect()
    }

    /// Convert `files` and hand every success to `target`.
    ///
    /// # Errors
    /// [`Any2PdfError::TooManyFiles`] when the batch is over the limit; in
    /// that case nothing is converted or delivered. Per-file failures are
    /// recorded in the report and never abort later groups.
    pub async fn run(
        &self,
        files: Vec<SourceFile>,
        target: Arc<dyn DeliveryTarget>,
    ) -> Result<BatchReport, Any2PdfError> {
        let config = self.pipeline.config();
        let total = files.len();
        if total > config.max_batch_files {
            return Err(Any2PdfError::TooManyFiles {
                submitted: total,
                limit: config.max_batch_files,
            });
        }

        let started = Instant::now();
        let groups = Self::plan(total, config.group_size);
        let progress: ProgressCallback = config
            .progress_callback
            .clone()
            .unwrap_or_else(|| Arc::new(NoopProgressCallback));
        let queue = DeliveryQueue::new(target, config.delivery);

        info!(
            "Starting batch: {} files in {} groups of ≤{}, {:?} delivery",
            total,
            groups.len(),
            config.group_size,
            config.delivery
        );
        progress.on_batch_start(total, groups.len());

        let mut slots: Vec<Option<ConversionResult>> = (0..total).map(|_| None).collect();
        let mut files = files.into_iter().enumerate();

        for (group, range) in groups.iter().enumerate() {
            let members: Vec<(usize, SourceFile)> = files.by_ref().take(range.len()).collect();
            let names: Vec<String> = members.iter().map(|(_, f)| f.name().to_string()).collect();
            debug!("Group {}/{}: {:?}", group + 1, groups.len(), names);
            progress.on_group_start(group, &names);

            let outcomes = join_all(members.into_iter().map(|(index, file)| {
                let progress = Arc::clone(&progress);
                let queue = &queue;
                async move {
                    progress.on_file_start(index, total, file.name());
                    let result = self.pipeline.convert(file).await;
                    match &result {
                        ConversionResult::Converted(doc) => {
                            progress.on_file_complete(index, total, &doc.source_name);
                            queue.push(doc.clone());
                        }
                        ConversionResult::Failed { error, .. } => {
                            progress.on_file_error(index, total, &error.to_string());
                        }
                    }
                    (index, result)
                }
            }))
            .await;

            let mut converted = 0;
            for (index, result) in outcomes {
                converted += usize::from(result.is_success());
                slots[index] = Some(result);
            }

            queue.flush().await;
            if converted > 0 {
                progress.on_group_delivered(group, converted);
            }
        }

        queue.wait_idle().await;

        let results = slots
            .into_iter()
            .enumerate()
            .map(|(i, slot)| slot.ok_or_else(|| Any2PdfError::Internal(format!("no result for file #{i}"))))
            .collect::<Result<Vec<_>, _>>()?;

        let delivery = queue.stats();
        let converted = results.iter().filter(|r| r.is_success()).count();
        let stats = BatchStats {
            total_files: total,
            converted,
            failed: total - converted,
            groups: groups.len(),
            delivered: delivery.delivered,
            delivery_failures: delivery.failed,
            total_duration_ms: started.elapsed().as_millis() as u64,
        };

        info!(
            "Batch complete: {}/{} converted, {} delivered, {}ms",
            stats.converted, stats.total_files, stats.delivered, stats.total_duration_ms
        );
        progress.on_batch_complete(total, converted);

        Ok(BatchReport { results, stats })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_groups_of_three() {
        assert_eq!(BatchScheduler::plan(7, 3), vec![0..3, 3..6, 6..7]);
        assert_eq!(BatchScheduler::plan(3, 3), vec![0..3]);
        assert_eq!(BatchScheduler::plan(10, 3).len(), 4);
        assert!(BatchScheduler::plan(0, 3).is_empty());
    }

    #[test]
    fn plan_with_zero_group_size_degrades_to_one() {
        assert_eq!(BatchScheduler::plan(2, 0), vec![0..1, 1..2]);
    }
}
