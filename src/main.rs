use clap::Parser;
use http_test::cli::{init_tracing, Cli};
use http_test::config::Config;
use http_test::constants;
use http_test::error::Error;
use http_test::runner::{RunOptions, RunReport, TestRunner};
use std::collections::HashMap;
use std::path::Path;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<i32, Error> {
    let config_dir = cli
        .file
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let mut config = Config::load_from_dir(config_dir)?;

    if cli.parallel {
        config.performance.parallel = true;
    }
    if let Some(n) = cli.max_concurrency {
        config.performance.max_concurrency = n;
    }
    if cli.insecure {
        config.security.reject_unauthorized = false;
    }

    let external_variables = match &cli.var {
        Some(path) => load_variables(path)?,
        None => HashMap::new(),
    };

    let options = RunOptions {
        parallel: config.performance.parallel,
        max_concurrency: config.performance.max_concurrency,
        bail: cli.bail,
        no_cache: cli.no_cache,
        timeout_override_ms: cli.timeout,
        env_dir: cli
            .env_file
            .clone()
            .unwrap_or_else(|| config_dir.to_path_buf()),
        external_variables,
    };

    let runner = TestRunner::new(config, options)?;

    let cancel = runner.cancel_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            cancel.cancel();
        }
    });

    let run_report = runner.run_file(&cli.file).await?;
    print_summary(&run_report);

    if cli.verbose {
        print_diagnostics(&runner);
    }

    if let Some(path) = &cli.report {
        let json = serde_json::to_string_pretty(&run_report.report)?;
        std::fs::write(path, json)?;
    }

    Ok(if run_report.report.all_passed() {
        constants::EXIT_OK
    } else {
        constants::EXIT_ASSERT_FAILED
    })
}

fn load_variables(path: &Path) -> Result<HashMap<String, String>, Error> {
    let content = std::fs::read_to_string(path)?;
    let values: serde_json::Value = serde_json::from_str(&content)
        .map_err(|e| Error::invalid_config(format!("{}: {e}", path.display())))?;
    let serde_json::Value::Object(map) = values else {
        return Err(Error::invalid_config(format!(
            "{}: expected a JSON object of variables",
            path.display()
        )));
    };
    Ok(map
        .into_iter()
        .map(|(k, v)| {
            let rendered = match v {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            };
            (k, rendered)
        })
        .collect())
}

fn print_summary(run_report: &RunReport) {
    for outcome in run_report.outcomes.iter().flatten() {
        let marker = if outcome.passed { "PASS" } else { "FAIL" };
        let cached = if outcome.from_cache { " (cached)" } else { "" };
        println!(
            "[{marker}] {} ({} ms){cached}",
            outcome.request_name,
            outcome.duration.as_millis()
        );
        for result in &outcome.results {
            if result.passed {
                println!("  ok   {}", result.name);
            } else {
                println!(
                    "  FAIL {} - {}",
                    result.name,
                    result.error.as_deref().unwrap_or("assertion failed")
                );
            }
        }
    }
    for (index, slot) in run_report.outcomes.iter().enumerate() {
        if slot.is_none() {
            println!("[SKIP] request #{}", index + 1);
        }
    }

    let summary = &run_report.report.summary;
    println!(
        "\n{} tests, {} passed, {} failed in {} ms",
        summary.total_tests,
        summary.passed_tests,
        summary.failed_tests,
        summary.total_execution_time
    );
}

fn print_diagnostics(runner: &TestRunner) {
    let entries = runner.diagnostics().entries();
    if entries.is_empty() {
        return;
    }
    eprintln!("\ndiagnostics:");
    for entry in entries {
        let source = entry.source.as_deref().unwrap_or("-");
        eprintln!(
            "  [{}] {} {}: {}",
            entry.level.as_str(),
            entry.timestamp.format("%H:%M:%S%.3f"),
            source,
            entry.message
        );
    }
    if let Some(stats) = runner.diagnostics().metric_stats("request_ms") {
        eprintln!(
            "  request timing: count={} avg={:.1}ms min={:.1}ms max={:.1}ms",
            stats.count, stats.avg, stats.min, stats.max
        );
    }
}
