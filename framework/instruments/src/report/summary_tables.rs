use crate::metrics::RunMetrics;
use tabled::settings::Style;
use tabled::{Table, Tabled};

#[derive(Tabled)]
struct EndpointRow {
    scenario: String,
    endpoint: String,
    requests: u64,
    #[tabled(display = "percent")]
    failed: f64,
    #[tabled(display = "float2")]
    avg_ms: f64,
    #[tabled(display = "float2")]
    p50_ms: f64,
    #[tabled(display = "float2")]
    p90_ms: f64,
    #[tabled(display = "float2")]
    p95_ms: f64,
    #[tabled(display = "float2")]
    p99_ms: f64,
    #[tabled(display = "float2")]
    max_ms: f64,
}

#[derive(Tabled)]
struct CheckRow {
    scenario: String,
    endpoint: String,
    check: String,
    passes: u64,
    fails: u64,
    #[tabled(display = "percent")]
    pass_rate: f64,
}

fn float2(n: &f64) -> String {
    format!("{n:.2}")
}

fn percent(n: &f64) -> String {
    format!("{:.2}%", n * 100.0)
}

pub(super) fn print_summary(metrics: &RunMetrics) {
    let endpoint_rows = metrics
        .latency_series()
        .into_iter()
        .map(|(key, series)| EndpointRow {
            scenario: key.tags.scenario().to_string(),
            endpoint: key.endpoint.clone(),
            requests: series.requests(),
            failed: series.failure_rate().unwrap_or_default(),
            avg_ms: series.mean_ms().unwrap_or_default(),
            p50_ms: series.percentile_ms(50.0).unwrap_or_default(),
            p90_ms: series.percentile_ms(90.0).unwrap_or_default(),
            p95_ms: series.percentile_ms(95.0).unwrap_or_default(),
            p99_ms: series.percentile_ms(99.0).unwrap_or_default(),
            max_ms: series.max_ms().unwrap_or_default(),
        })
        .collect::<Vec<_>>();

    if endpoint_rows.is_empty() {
        println!("\nNo requests were recorded");
    } else {
        println!("\nSummary of requests");
        let mut table = Table::new(&endpoint_rows);
        table.with(Style::modern());
        println!("{table}");
    }

    let check_rows = metrics
        .check_series()
        .into_iter()
        .map(|(key, counts)| CheckRow {
            scenario: key.series.tags.scenario().to_string(),
            endpoint: key.series.endpoint.clone(),
            check: key.name.clone(),
            passes: counts.passes,
            fails: counts.fails,
            pass_rate: counts.pass_rate().unwrap_or_default(),
        })
        .collect::<Vec<_>>();

    if !check_rows.is_empty() {
        println!("\nSummary of checks");
        let mut table = Table::new(&check_rows);
        table.with(Style::modern());
        println!("{table}");
    }
}
