use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use pass_load_runner::prelude::{HookResult, MetricTags};
use pass_services_client::prelude::{endpoint, Exchange, HttpResponse, Pass, PassServicesClient};
use rand::seq::SliceRandom;
use rand::Rng;

use crate::fixtures::Fixtures;
use crate::runner_context::PassWorkerContext;
use crate::weights::{ImageBranch, PassesBranch, WorkloadChoices, WorkloadKind};

/// Shortest and longest pause after an iteration of the continuous workflow.
pub const CONTINUOUS_THINK_TIME: (Duration, Duration) =
    (Duration::from_secs(1), Duration::from_secs(3));

struct Resources {
    client: Arc<PassServicesClient>,
    fixtures: Arc<Fixtures>,
    choices: Arc<WorkloadChoices>,
    tags: MetricTags,
}

impl Resources {
    fn from_context(ctx: &PassWorkerContext) -> anyhow::Result<Self> {
        let values = ctx.runner_context().get();
        Ok(Self {
            client: values.client()?,
            fixtures: values.fixtures()?,
            choices: values.choices()?,
            tags: ctx.metric_tags().clone(),
        })
    }

    fn status_is(&self, exchange: &Exchange, name: &str, status: u16) -> bool {
        self.client.check(exchange, name, |r| r.status() == status)
    }

    fn image_content_type(&self, exchange: &Exchange, name: &str) -> bool {
        self.client
            .check(exchange, name, HttpResponse::has_image_content_type)
    }
}

/// Wait for a request on the worker, giving up if the worker is interrupted.
fn call(
    ctx: &mut PassWorkerContext,
    request: impl Future<Output = Exchange>,
) -> anyhow::Result<Exchange> {
    ctx.execute(async move { Ok(request.await) })
}

/// Either list every pass or search passes in a random elevation range.
pub fn passes_workload(ctx: &mut PassWorkerContext) -> HookResult {
    let res = Resources::from_context(ctx)?;

    match res.choices.passes.choose(ctx.rng_mut()) {
        PassesBranch::ListAll => {
            let passes = call(ctx, res.client.list_passes(&res.tags, endpoint::GET_ALL_PASSES))?;
            res.status_is(&passes, "status is 200", 200);
            res.client.check(&passes, "response has passes", |r| {
                r.json::<Vec<serde_json::Value>>()
                    .is_ok_and(|passes| !passes.is_empty())
            });
        }
        PassesBranch::ElevationRange => {
            let range = res.fixtures.random_elevation_range(ctx.rng_mut());
            let passes = call(ctx, res.client.passes_by_elevation(&res.tags, range))?;
            res.status_is(&passes, "status is 200", 200);
        }
    }

    Ok(())
}

/// Fetch an image, either straight from the image service or through the passes service for a
/// pass that has coordinates.
pub fn image_workload(ctx: &mut PassWorkerContext) -> HookResult {
    let res = Resources::from_context(ctx)?;

    match res.choices.image.choose(ctx.rng_mut()) {
        ImageBranch::Direct => {
            let coordinate = res.fixtures.random_coordinate(ctx.rng_mut()).clone();
            let image = call(ctx, res.client.direct_image(&res.tags, &coordinate))?;
            res.status_is(&image, "direct image status is 200", 200);
            res.image_content_type(&image, "direct image content-type is image");
        }
        ImageBranch::ViaPasses => {
            let passes = call(ctx, res.client.list_passes(&res.tags, endpoint::GET_ALL_PASSES))?;
            let Some(passes) = passes.passes() else {
                log::trace!("No pass list for {}, skipping image", ctx.worker_id());
                return Ok(());
            };

            let located = passes
                .iter()
                .filter(|pass| pass.has_coordinates())
                .collect::<Vec<_>>();
            let Some(pass) = located.choose(ctx.rng_mut()) else {
                log::trace!("No pass with coordinates for {}", ctx.worker_id());
                return Ok(());
            };
            let id = pass.id;

            let image = call(
                ctx,
                res.client
                    .pass_image(&res.tags, endpoint::GET_PASS_IMAGE_VIA_API, id),
            )?;
            res.status_is(&image, "pass-api image status is 200", 200);
            res.image_content_type(&image, "pass-api image content-type is image");
        }
    }

    Ok(())
}

/// Fetch the pass summary, with the slow variant of it sometimes called as well or instead.
pub fn summary_workload(ctx: &mut PassWorkerContext) -> HookResult {
    let res = Resources::from_context(ctx)?;
    let branch = *res.choices.summary.choose(ctx.rng_mut());

    if branch.calls_normal() {
        let summary = call(ctx, res.client.pass_summary(&res.tags, endpoint::GET_PASS_SUMMARY))?;
        res.status_is(&summary, "status is 200", 200);
        res.client
            .check(&summary, "has pass_count", |r| has_number(r, "pass_count"));
        res.client
            .check(&summary, "has total_ascent", |r| has_number(r, "total_ascent"));
    }

    if branch.calls_slow() {
        let slow = call(ctx, res.client.pass_summary_slow(&res.tags))?;
        res.status_is(&slow, "slow endpoint status is 200", 200);
    }

    Ok(())
}

/// A user journey across the services: the summary, the pass list, the detail of a random pass
/// and the image of that pass if it has coordinates.
///
/// Steps that need data from an earlier step are skipped when that step did not provide it.
pub fn combined_workflow(ctx: &mut PassWorkerContext) -> HookResult {
    let res = Resources::from_context(ctx)?;

    let summary = call(ctx, res.client.pass_summary(&res.tags, endpoint::WORKFLOW_SUMMARY))?;
    res.status_is(&summary, "status is 200", 200);

    let passes = call(ctx, res.client.list_passes(&res.tags, endpoint::WORKFLOW_PASSES))?;
    res.status_is(&passes, "status is 200", 200);

    let Some(passes) = passes.passes() else {
        return Ok(());
    };
    let Some(id) = passes.choose(ctx.rng_mut()).map(|pass| pass.id) else {
        log::trace!("Empty pass list for {}, workflow ends early", ctx.worker_id());
        return Ok(());
    };

    let detail = call(
        ctx,
        res.client
            .pass_detail(&res.tags, endpoint::WORKFLOW_PASS_DETAIL, id),
    )?;
    res.status_is(&detail, "status is 200", 200);

    if detail.json::<Pass>().is_some_and(|pass| pass.has_coordinates()) {
        let image = call(
            ctx,
            res.client
                .pass_image(&res.tags, endpoint::WORKFLOW_PASS_IMAGE, id),
        )?;
        res.status_is(&image, "status is 200", 200);
    }

    Ok(())
}

/// Background traffic: one of the other workloads picked by weight, then a random pause within
/// [CONTINUOUS_THINK_TIME].
pub fn continuous_workflow(ctx: &mut PassWorkerContext) -> HookResult {
    let choices = ctx.runner_context().get().choices()?;

    let kind = *choices.mix.choose(ctx.rng_mut());
    log::trace!("{} runs the {kind:?} workload", ctx.worker_id());
    match kind {
        WorkloadKind::Passes => passes_workload(ctx)?,
        WorkloadKind::Summary => summary_workload(ctx)?,
        WorkloadKind::Image => image_workload(ctx)?,
        WorkloadKind::Combined => combined_workflow(ctx)?,
    }

    let (shortest, longest) = CONTINUOUS_THINK_TIME;
    let pause = ctx
        .rng_mut()
        .gen_range(shortest.as_secs_f64()..longest.as_secs_f64());
    ctx.think(Duration::from_secs_f64(pause))
}

/// The field is present in the JSON body and holds a number.
fn has_number(response: &HttpResponse, field: &str) -> bool {
    response
        .json::<serde_json::Value>()
        .is_ok_and(|body| body.get(field).is_some_and(serde_json::Value::is_number))
}
