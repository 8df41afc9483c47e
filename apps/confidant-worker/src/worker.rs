//! Repairs messages stored without an embedding, polling until the process is stopped.

use std::time::Duration;

use tokio::time;

use confidant_service::{BackfillReport, ConfidantService};

const BASE_BACKOFF_MS: u64 = 500;
const MAX_BACKOFF_MS: u64 = 30_000;

#[derive(Debug, Clone, Copy)]
pub struct WorkerState {
	pub poll_interval: Duration,
	pub batch_size: u32,
}
impl WorkerState {
	pub fn from_config(config: &confidant_config::Config) -> Self {
		Self {
			poll_interval: Duration::from_millis(config.worker.poll_interval_ms),
			batch_size: config.worker.batch_size,
		}
	}
}

/// How a backfill pass should pace the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassOutcome {
	/// A full batch made progress; more orphans are likely waiting.
	Busy,
	/// Fewer orphans than a batch, or none at all.
	Idle,
	/// Orphans were found but none could be stored.
	Stalled,
}

pub fn classify_pass(report: &BackfillReport, batch_size: u32) -> PassOutcome {
	if report.scanned > 0 && report.embedded == 0 {
		PassOutcome::Stalled
	} else if report.scanned >= u64::from(batch_size) {
		PassOutcome::Busy
	} else {
		PassOutcome::Idle
	}
}

pub async fn run_worker(service: &ConfidantService, state: WorkerState) -> color_eyre::Result<()> {
	tracing::info!(
		poll_interval_ms = state.poll_interval.as_millis() as u64,
		batch_size = state.batch_size,
		"Backfill worker started."
	);

	let mut failures = 0;

	loop {
		let outcome = process_backfill_once(service, state.batch_size)
			.await
			.map(|report| (classify_pass(&report, state.batch_size), report));
		let delay = match outcome {
			Ok((PassOutcome::Busy, _)) => {
				failures = 0;

				Duration::ZERO
			},
			Ok((PassOutcome::Idle, _)) => {
				failures = 0;

				state.poll_interval
			},
			Ok((PassOutcome::Stalled, report)) => {
				failures += 1;

				let backoff = backoff_for_attempt(failures);

				tracing::error!(
					scanned = report.scanned,
					failures,
					backoff_ms = backoff.as_millis() as u64,
					"Embedding backfill stored nothing."
				);

				backoff
			},
			Err(err) => {
				failures += 1;

				let backoff = backoff_for_attempt(failures);

				tracing::error!(
					error = %err,
					failures,
					backoff_ms = backoff.as_millis() as u64,
					"Embedding backfill failed."
				);

				backoff
			},
		};

		time::sleep(delay).await;
	}
}

pub async fn process_backfill_once(
	service: &ConfidantService,
	batch_size: u32,
) -> confidant_service::Result<BackfillReport> {
	let report = service.backfill_embeddings(batch_size).await?;

	if report.failed > 0 {
		tracing::warn!(failed = report.failed, "Some messages could not be backfilled.");
	}

	Ok(report)
}

/// 500 ms doubling per consecutive failure, capped at 30 s.
pub fn backoff_for_attempt(attempt: u32) -> Duration {
	let exp = attempt.max(1).saturating_sub(1).min(6);
	let base = BASE_BACKOFF_MS.saturating_mul(1 << exp);

	Duration::from_millis(base.min(MAX_BACKOFF_MS))
}
