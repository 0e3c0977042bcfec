use std::sync::OnceLock;
use std::time::Duration;

use pass_services_runner::prelude::*;
use pretty_assertions::assert_eq;
use serde_json::json;
use tokio::runtime::Runtime;
use wiremock::matchers::{method, path, path_regex};
use wiremock::{Mock, MockServer, ResponseTemplate};

type Setup = fn(&mut RunnerContext<PassRunnerContext>) -> HookResult;
type Behaviour = fn(&mut PassWorkerContext) -> HookResult;

/// The runner owns its own Tokio runtime, so the mock server gets a separate one and the tests
/// are plain `#[test]` functions.
struct Harness {
    server: MockServer,
    runtime: Runtime,
}

impl Harness {
    fn start() -> Self {
        let runtime = Runtime::new().unwrap();
        let server = runtime.block_on(MockServer::start());
        Self { server, runtime }
    }

    fn mount(&self, mock: Mock) {
        self.runtime.block_on(mock.mount(&self.server));
    }

    fn verify(&self) {
        self.runtime.block_on(self.server.verify());
    }
}

fn config_for(uri: &str) -> LoadConfig {
    LoadConfig::from_lookup(|key| match key {
        "PASS_API_URL" | "PASS_IMAGE_API_URL" | "PASS_SUMMARY_API_URL" => Some(uri.to_string()),
        _ => None,
    })
    .unwrap()
}

fn cli() -> PassLoadCli {
    PassLoadCli {
        duration: None,
        soak: false,
        thresholds: vec![],
        seed: Some(42),
        no_progress: true,
        ignore_dropped_iterations: false,
        run_id: None,
    }
}

/// Run `behaviour` for exactly one iteration.
fn run_once(setup: Setup, name: &str, behaviour: Behaviour) -> RunReport {
    let report = run(RunDefinitionBuilder::<PassRunnerContext, ()>::new("workload_test", cli())
        .with_report_config(ReportConfig::default().enable_in_memory())
        .use_setup(setup)
        .with_scenario(ScenarioSpec::constant_arrival_rate(
            name,
            behaviour,
            ArrivalRate::per_second(1.0),
            Duration::from_millis(500),
        )))
    .unwrap();

    assert_eq!(report.scenario(name).unwrap().iterations_completed, 1);
    report
}

fn endpoints_called(report: &RunReport) -> Vec<String> {
    report
        .metrics()
        .operation_records()
        .iter()
        .map(|op| op.endpoint().to_string())
        .collect()
}

fn check_passed(report: &RunReport, endpoint: &str, name: &str) -> bool {
    let counts = report
        .metrics()
        .check(name, &TagFilter::new().with("endpoint", endpoint));
    assert_eq!(counts.total(), 1, "check [{name}] on [{endpoint}]");
    counts.passes == 1
}

fn quiet_summary() -> WorkloadWeights {
    WorkloadWeights {
        slow_summary: 0.0,
        ..WorkloadWeights::main()
    }
}

#[test]
fn summary_with_both_fields_passes_presence_checks() {
    static URI: OnceLock<String> = OnceLock::new();
    fn setup(ctx: &mut RunnerContext<PassRunnerContext>) -> HookResult {
        configure_runner_context_with(ctx, &config_for(URI.get().unwrap()), quiet_summary())
    }

    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/pass-summary"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(json!({"pass_count": 5, "total_ascent": 1200})),
            )
            .expect(1),
    );
    URI.set(harness.server.uri()).unwrap();

    let report = run_once(setup, "pass_summary_api", summary_workload);

    let summary = endpoint::GET_PASS_SUMMARY;
    assert!(check_passed(&report, summary, "status is 200"));
    assert!(check_passed(&report, summary, "has pass_count"));
    assert!(check_passed(&report, summary, "has total_ascent"));
    assert_eq!(endpoints_called(&report), vec![summary.to_string()]);
    harness.verify();
}

#[test]
fn summary_missing_total_ascent_fails_only_that_check() {
    static URI: OnceLock<String> = OnceLock::new();
    fn setup(ctx: &mut RunnerContext<PassRunnerContext>) -> HookResult {
        configure_runner_context_with(ctx, &config_for(URI.get().unwrap()), quiet_summary())
    }

    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/pass-summary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"pass_count": 5}))),
    );
    URI.set(harness.server.uri()).unwrap();

    let report = run_once(setup, "pass_summary_api", summary_workload);

    let summary = endpoint::GET_PASS_SUMMARY;
    assert!(check_passed(&report, summary, "status is 200"));
    assert!(check_passed(&report, summary, "has pass_count"));
    assert!(!check_passed(&report, summary, "has total_ascent"));
}

#[test]
fn slow_summary_is_called_when_chosen() {
    static URI: OnceLock<String> = OnceLock::new();
    fn setup(ctx: &mut RunnerContext<PassRunnerContext>) -> HookResult {
        let weights = WorkloadWeights {
            slow_summary: 1.0,
            ..WorkloadWeights::main()
        };
        configure_runner_context_with(ctx, &config_for(URI.get().unwrap()), weights)
    }

    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/pass-summary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({}))),
    );
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/pass-summary/slow"))
            .respond_with(ResponseTemplate::new(500))
            .expect(1),
    );
    URI.set(harness.server.uri()).unwrap();

    let report = run_once(setup, "pass_summary_api", summary_workload);

    assert!(!check_passed(
        &report,
        endpoint::GET_PASS_SUMMARY_SLOW,
        "slow endpoint status is 200"
    ));
    let slow = report
        .metrics()
        .latency(&TagFilter::new().with("endpoint", endpoint::GET_PASS_SUMMARY_SLOW))
        .unwrap();
    assert_eq!(slow.failed(), 1);
    harness.verify();
}

#[test]
fn continuous_profile_calls_slow_summary_instead_of_normal() {
    static URI: OnceLock<String> = OnceLock::new();
    fn setup(ctx: &mut RunnerContext<PassRunnerContext>) -> HookResult {
        let weights = WorkloadWeights {
            slow_summary: 1.0,
            ..WorkloadWeights::continuous()
        };
        configure_runner_context_with(ctx, &config_for(URI.get().unwrap()), weights)
    }

    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/pass-summary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({})))
            .expect(0),
    );
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/pass-summary/slow"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"pass_count": 5})))
            .expect(1),
    );
    URI.set(harness.server.uri()).unwrap();

    let report = run_once(setup, "pass_summary_api", summary_workload);

    assert_eq!(
        endpoints_called(&report),
        vec![endpoint::GET_PASS_SUMMARY_SLOW.to_string()]
    );
    assert!(check_passed(
        &report,
        endpoint::GET_PASS_SUMMARY_SLOW,
        "slow endpoint status is 200"
    ));
    harness.verify();
}

#[test]
fn combined_workflow_with_empty_list_makes_only_summary_and_list_calls() {
    static URI: OnceLock<String> = OnceLock::new();
    fn setup(ctx: &mut RunnerContext<PassRunnerContext>) -> HookResult {
        configure_runner_context_with(ctx, &config_for(URI.get().unwrap()), quiet_summary())
    }

    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/pass-summary"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"pass_count": 0})))
            .expect(1),
    );
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/passes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([])))
            .expect(1),
    );
    harness.mount(
        Mock::given(method("GET"))
            .and(path_regex("^/passes/.+"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0),
    );
    URI.set(harness.server.uri()).unwrap();

    let report = run_once(setup, "combined_workflow", combined_workflow);

    assert_eq!(
        endpoints_called(&report),
        vec![
            endpoint::WORKFLOW_SUMMARY.to_string(),
            endpoint::WORKFLOW_PASSES.to_string()
        ]
    );
    assert!(check_passed(&report, endpoint::WORKFLOW_PASSES, "status is 200"));
    harness.verify();
}

#[test]
fn combined_workflow_continues_after_failed_summary() {
    static URI: OnceLock<String> = OnceLock::new();
    fn setup(ctx: &mut RunnerContext<PassRunnerContext>) -> HookResult {
        configure_runner_context_with(ctx, &config_for(URI.get().unwrap()), quiet_summary())
    }

    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/pass-summary"))
            .respond_with(ResponseTemplate::new(503)),
    );
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/passes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 7}]))),
    );
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/passes/7"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "id": 7,
                "name": "Stelvio Pass",
                "latitude": 46.5309,
                "longitude": 10.4515
            })))
            .expect(1),
    );
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/passes/7/image"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/png"))
            .expect(1),
    );
    URI.set(harness.server.uri()).unwrap();

    let report = run_once(setup, "combined_workflow", combined_workflow);

    assert_eq!(
        endpoints_called(&report),
        vec![
            endpoint::WORKFLOW_SUMMARY.to_string(),
            endpoint::WORKFLOW_PASSES.to_string(),
            endpoint::WORKFLOW_PASS_DETAIL.to_string(),
            endpoint::WORKFLOW_PASS_IMAGE.to_string(),
        ]
    );
    assert!(!check_passed(&report, endpoint::WORKFLOW_SUMMARY, "status is 200"));
    assert!(check_passed(&report, endpoint::WORKFLOW_PASS_IMAGE, "status is 200"));
    harness.verify();
}

#[test]
fn image_via_passes_picks_the_only_pass_with_coordinates() {
    static URI: OnceLock<String> = OnceLock::new();
    fn setup(ctx: &mut RunnerContext<PassRunnerContext>) -> HookResult {
        let weights = WorkloadWeights {
            direct_image: 0.0,
            ..WorkloadWeights::main()
        };
        configure_runner_context_with(ctx, &config_for(URI.get().unwrap()), weights)
    }

    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/passes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": 1, "latitude": 0.0, "longitude": 8.102121},
                {"id": 2, "latitude": 46.5309, "longitude": 10.4515},
                {"id": 3}
            ]))),
    );
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/passes/2/image"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "image/jpeg")
                    .set_body_bytes(vec![0xFF, 0xD8, 0xFF]),
            )
            .expect(1),
    );
    harness.mount(
        Mock::given(method("GET"))
            .and(path_regex("^/passes/[13]/image$"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0),
    );
    URI.set(harness.server.uri()).unwrap();

    let report = run_once(setup, "pass_image_api", image_workload);

    let via_api = endpoint::GET_PASS_IMAGE_VIA_API;
    assert!(check_passed(&report, via_api, "pass-api image status is 200"));
    assert!(check_passed(&report, via_api, "pass-api image content-type is image"));
    harness.verify();
}

#[test]
fn image_via_passes_skips_passes_that_do_not_decode() {
    static URI: OnceLock<String> = OnceLock::new();
    fn setup(ctx: &mut RunnerContext<PassRunnerContext>) -> HookResult {
        let weights = WorkloadWeights {
            direct_image: 0.0,
            ..WorkloadWeights::main()
        };
        configure_runner_context_with(ctx, &config_for(URI.get().unwrap()), weights)
    }

    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/passes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([
                {"id": "1", "latitude": 45.9, "longitude": 7.1},
                {"id": 5, "latitude": 46.5309, "longitude": 10.4515}
            ]))),
    );
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/passes/5/image"))
            .respond_with(ResponseTemplate::new(200).insert_header("content-type", "image/png"))
            .expect(1),
    );
    URI.set(harness.server.uri()).unwrap();

    let report = run_once(setup, "pass_image_api", image_workload);

    assert!(check_passed(
        &report,
        endpoint::GET_PASS_IMAGE_VIA_API,
        "pass-api image status is 200"
    ));
    harness.verify();
}

#[test]
fn direct_image_requires_an_image_content_type() {
    static URI: OnceLock<String> = OnceLock::new();
    fn setup(ctx: &mut RunnerContext<PassRunnerContext>) -> HookResult {
        let weights = WorkloadWeights {
            direct_image: 1.0,
            ..WorkloadWeights::main()
        };
        configure_runner_context_with(ctx, &config_for(URI.get().unwrap()), weights)
    }

    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .and(path_regex(r"^/images/[0-9.]+/[0-9.]+/500$"))
            .respond_with(ResponseTemplate::new(200).set_body_string("not an image"))
            .expect(1),
    );
    URI.set(harness.server.uri()).unwrap();

    let report = run_once(setup, "pass_image_api", image_workload);

    let direct = endpoint::GET_DIRECT_IMAGE;
    assert!(check_passed(&report, direct, "direct image status is 200"));
    assert!(!check_passed(&report, direct, "direct image content-type is image"));
    harness.verify();
}

#[test]
fn empty_pass_list_fails_the_has_passes_check() {
    static URI: OnceLock<String> = OnceLock::new();
    fn setup(ctx: &mut RunnerContext<PassRunnerContext>) -> HookResult {
        let weights = WorkloadWeights {
            list_all: 1.0,
            ..WorkloadWeights::main()
        };
        configure_runner_context_with(ctx, &config_for(URI.get().unwrap()), weights)
    }

    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/passes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([]))),
    );
    URI.set(harness.server.uri()).unwrap();

    let report = run_once(setup, "pass_api", passes_workload);

    assert!(check_passed(&report, endpoint::GET_ALL_PASSES, "status is 200"));
    assert!(!check_passed(&report, endpoint::GET_ALL_PASSES, "response has passes"));
}

#[test]
fn elevation_search_uses_a_fixture_range() {
    static URI: OnceLock<String> = OnceLock::new();
    fn setup(ctx: &mut RunnerContext<PassRunnerContext>) -> HookResult {
        let weights = WorkloadWeights {
            list_all: 0.0,
            ..WorkloadWeights::main()
        };
        configure_runner_context_with(ctx, &config_for(URI.get().unwrap()), weights)
    }

    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/passes/elevation"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}])))
            .expect(1),
    );
    URI.set(harness.server.uri()).unwrap();

    let report = run_once(setup, "pass_api", passes_workload);

    assert!(check_passed(
        &report,
        endpoint::GET_PASSES_BY_ELEVATION,
        "status is 200"
    ));

    let requests = harness
        .runtime
        .block_on(harness.server.received_requests())
        .unwrap();
    let query = requests[0].url.query().unwrap_or_default().to_string();
    let ranges = Fixtures::sample()
        .unwrap()
        .elevation_ranges()
        .iter()
        .map(|r| format!("min={}&max={}", r.min, r.max))
        .collect::<Vec<_>>();
    assert!(ranges.contains(&query), "unexpected query {query}");
}

#[test]
fn continuous_workflow_tags_records_with_mode() {
    static URI: OnceLock<String> = OnceLock::new();
    fn setup(ctx: &mut RunnerContext<PassRunnerContext>) -> HookResult {
        let weights = WorkloadWeights {
            list_all: 1.0,
            mix: vec![(1.0, WorkloadKind::Passes)],
            ..WorkloadWeights::continuous()
        };
        configure_runner_context_with(ctx, &config_for(URI.get().unwrap()), weights)
    }

    let harness = Harness::start();
    harness.mount(
        Mock::given(method("GET"))
            .and(path("/passes"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 1}]))),
    );
    URI.set(harness.server.uri()).unwrap();

    let report = run(RunDefinitionBuilder::<PassRunnerContext, ()>::new("workload_test", cli())
        .with_report_config(ReportConfig::default().enable_in_memory())
        .use_setup(setup)
        .with_scenario(
            ScenarioSpec::continuous("continuous", continuous_workflow, ArrivalRate::continuous(1.0))
                .with_duration(Duration::from_millis(500))
                .with_tag("mode", "continuous"),
        ))
    .unwrap();

    // The think time is cut short when the scenario stops.
    assert_eq!(report.scenario("continuous").unwrap().iterations_completed, 1);

    let metrics = report.metrics();
    let continuous = TagFilter::new().with("mode", "continuous");
    assert_eq!(metrics.checks(&continuous).total(), 2);
    assert_eq!(metrics.checks(&continuous), metrics.checks(&TagFilter::new()));
    assert!(metrics
        .operation_records()
        .iter()
        .all(|op| op.tags().get("mode") == Some("continuous")));
}

#[test]
fn unconfigured_context_fails_the_iteration() {
    fn setup(_ctx: &mut RunnerContext<PassRunnerContext>) -> HookResult {
        Ok(())
    }

    let report = run(RunDefinitionBuilder::<PassRunnerContext, ()>::new("workload_test", cli())
        .with_report_config(ReportConfig::default().enable_in_memory())
        .use_setup(setup)
        .with_scenario(ScenarioSpec::constant_arrival_rate(
            "pass_api",
            passes_workload,
            ArrivalRate::per_second(1.0),
            Duration::from_millis(500),
        )))
    .unwrap();

    let scenario = report.scenario("pass_api").unwrap();
    assert_eq!(scenario.iterations_failed, 1);
    assert!(report.metrics().operation_records().is_empty());
}
