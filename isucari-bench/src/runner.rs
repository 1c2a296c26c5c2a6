//! Phases of one benchmark run: initialize, verify, validation, final check.

use crate::context::{BenchContext, Deadline};
use crate::scenario;
use crate::score::{self, BenchOutput};
use isucari_core::{Error, Result};
use isucari_external::Simulators;
use isucari_session::InitializeResponse;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Highest campaign level `/initialize` may ask for.
pub const MAX_CAMPAIGN: i64 = 4;

/// `POST /initialize` and validation of its answer.
///
/// # Errors
/// Returns an application failure for a failed request, a campaign level
/// outside `0..=4` or an empty language.
pub async fn initialize(ctx: &BenchContext) -> Result<InitializeResponse> {
    let session = ctx.new_session()?;
    let timeout = Duration::from_millis(ctx.config.target.initialize_timeout_ms);
    let response = session.initialize(timeout).await?;
    if !(0..=MAX_CAMPAIGN).contains(&response.campaign) {
        return Err(Error::application(format!(
            "POST /initialize: campaign rate must be between 0 and {MAX_CAMPAIGN}"
        )));
    }
    if response.language.is_empty() {
        return Err(Error::application("POST /initialize: language must not be empty"));
    }
    Ok(response)
}

/// Run every phase against the target and produce the verdict.
pub async fn run_bench(ctx: Arc<BenchContext>, simulators: &Simulators) -> BenchOutput {
    info!("=== initialize ===");
    let InitializeResponse { campaign, language } = match initialize(&ctx).await {
        Ok(response) => response,
        Err(e) => {
            ctx.failures.add(&e);
            return BenchOutput::failed(0, "", ctx.failures.messages());
        },
    };
    info!(campaign, %language, "target initialized");

    info!("=== verify ===");
    scenario::verify::verify(&ctx).await;
    if !ctx.failures.is_empty() {
        warn!(failures = ctx.failures.len(), "verification failed");
        return BenchOutput::failed(campaign, language, ctx.failures.messages());
    }

    info!("=== validation ===");
    simulators.set_delay(Duration::from_millis(ctx.config.external.validation_delay_ms));
    let deadline = Deadline::after(ctx.config.execution_time());
    scenario::run(Arc::clone(&ctx), deadline, campaign).await;

    let run = ctx.failures.snapshot();
    if score::disqualified(&run.1) {
        warn!(critical = run.1.critical, application = run.1.application, "validation failed");
        return BenchOutput::failed(campaign, language, isucari_core::unique_messages(run.0));
    }

    tokio::time::sleep(Duration::from_millis(ctx.config.timing.final_check_wait_ms)).await;

    info!("=== final check ===");
    let raw = scenario::final_check::final_check(&ctx).await;
    let output = score::settle(raw, run, ctx.final_failures.snapshot(), campaign, &language);
    info!(raw, score = output.score, pass = output.pass, "run finished");
    output
}
