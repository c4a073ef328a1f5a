use serde::Serialize;
use sokoni_core::config::{AppConfig, LoadOptions};
use sokoni_store::connect_with_settings;

const CHECK_CONFIG: &str = "config_validation";
const CHECK_BOT_TOKEN: &str = "bot_token_readiness";
const CHECK_DATABASE: &str = "database_connectivity";

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
enum CheckStatus {
    Pass,
    Fail,
    Skipped,
}

#[derive(Debug, Serialize)]
struct Check {
    name: &'static str,
    status: CheckStatus,
    details: String,
}

impl Check {
    fn pass(name: &'static str, details: impl Into<String>) -> Self {
        Check { name, status: CheckStatus::Pass, details: details.into() }
    }

    fn fail(name: &'static str, details: impl Into<String>) -> Self {
        Check { name, status: CheckStatus::Fail, details: details.into() }
    }

    fn skipped(name: &'static str) -> Self {
        Check {
            name,
            status: CheckStatus::Skipped,
            details: "skipped because configuration did not load".to_string(),
        }
    }
}

#[derive(Debug, Serialize)]
struct DoctorReport {
    overall_status: CheckStatus,
    summary: String,
    checks: Vec<Check>,
}

impl DoctorReport {
    fn from_checks(checks: Vec<Check>) -> Self {
        let all_pass = checks.iter().all(|check| check.status == CheckStatus::Pass);
        DoctorReport {
            overall_status: if all_pass { CheckStatus::Pass } else { CheckStatus::Fail },
            summary: if all_pass {
                "doctor: all readiness checks passed".to_string()
            } else {
                "doctor: one or more readiness checks failed".to_string()
            },
            checks,
        }
    }
}

pub fn run(json_output: bool) -> String {
    let report = build_report();

    if json_output {
        serde_json::to_string_pretty(&report).unwrap_or_else(|_| {
            r#"{"overall_status":"fail","summary":"doctor report serialization failed","checks":[]}"#
                .to_string()
        })
    } else {
        render_human(&report)
    }
}

// Readiness checks run in dependency order. Anything downstream of a broken
// configuration is reported as skipped rather than guessed at.
fn build_report() -> DoctorReport {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return DoctorReport::from_checks(vec![
                Check::fail(CHECK_CONFIG, error.to_string()),
                Check::skipped(CHECK_BOT_TOKEN),
                Check::skipped(CHECK_DATABASE),
            ]);
        }
    };

    DoctorReport::from_checks(vec![
        Check::pass(CHECK_CONFIG, "configuration loaded and validated"),
        check_bot_token(&config),
        check_database_connectivity(&config),
    ])
}

fn check_bot_token(config: &AppConfig) -> Check {
    if config.telegram.has_token() {
        Check::pass(CHECK_BOT_TOKEN, "bot token format validated by config contract")
    } else {
        Check::pass(
            CHECK_BOT_TOKEN,
            "no bot token configured; the server will run with the no-op transport",
        )
    }
}

fn check_database_connectivity(config: &AppConfig) -> Check {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return Check::fail(
                CHECK_DATABASE,
                format!("failed to initialize async runtime: {error}"),
            );
        }
    };

    let connect = runtime.block_on(async {
        let pool = connect_with_settings(
            &config.database.url,
            config.database.max_connections,
            config.database.timeout_secs,
        )
        .await
        .map_err(|error| format!("failed to connect to database: {error}"))?;
        pool.close().await;
        Ok::<(), String>(())
    });

    match connect {
        Ok(()) => Check::pass(CHECK_DATABASE, format!("connected using `{}`", config.database.url)),
        Err(error) => Check::fail(CHECK_DATABASE, error),
    }
}

fn render_human(report: &DoctorReport) -> String {
    let mut lines = vec![report.summary.clone()];

    for check in &report.checks {
        let marker = match check.status {
            CheckStatus::Pass => "ok",
            CheckStatus::Fail => "fail",
            CheckStatus::Skipped => "skip",
        };
        lines.push(format!("- [{marker}] {}: {}", check.name, check.details));
    }

    lines.join("\n")
}
