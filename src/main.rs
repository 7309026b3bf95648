mod app;
mod config;
mod models;
mod parsers;
mod sink;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use log::info;

use config::Config;

/// Normalize JUnit XML, HTML and Excel test reports and publish them to a collector.
#[derive(Debug, Parser)]
#[command(name = "tally", version)]
struct Cli {
    /// Path to the configuration file (JSON, or TOML with a `.toml` extension).
    #[arg(default_value = "config.json")]
    config: PathBuf,

    /// Read reports from this directory instead of `reportsDir`.
    #[arg(long)]
    reports_dir: Option<PathBuf>,

    /// Print the payload instead of sending it.
    #[arg(long)]
    dry_run: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {err}");
            for cause in err.chain().skip(1) {
                eprintln!("Caused by: {cause}");
            }
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    info!("Reading config from {}", cli.config.display());
    let mut config = Config::load(&cli.config)?;
    if let Some(dir) = cli.reports_dir {
        config.reports_dir = Some(dir);
    }

    let collected = app::collect(&config).await?;
    if collected.files_unsupported + collected.files_failed > 0 {
        info!(
            "Left out {} unsupported and {} unparsable file(s)",
            collected.files_unsupported, collected.files_failed
        );
    }

    if cli.dry_run {
        println!("{}", serde_json::to_string_pretty(&collected.report)?);
        return Ok(());
    }

    config.validate()?;
    let sink = sink::connect(&config)?;
    let published = app::publish(&collected.report, sink.as_ref()).await;
    // Release the sink even when publishing failed.
    let closed = sink.shutdown().await;
    published?;
    closed?;

    info!("Test results published successfully");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cli_defaults_to_config_json() {
        let cli = Cli::try_parse_from(["tally"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("config.json"));
        assert!(!cli.dry_run);
        assert!(cli.reports_dir.is_none());
    }

    #[test]
    fn cli_accepts_overrides() {
        let cli =
            Cli::try_parse_from(["tally", "ci.toml", "--reports-dir", "out", "--dry-run"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("ci.toml"));
        assert_eq!(cli.reports_dir, Some(PathBuf::from("out")));
        assert!(cli.dry_run);
    }

    #[tokio::test]
    async fn dry_run_skips_sink_settings() {
        let dir = tempfile::tempdir().unwrap();
        let reports = dir.path().join("reports");
        std::fs::create_dir(&reports).unwrap();
        std::fs::write(
            reports.join("a.xml"),
            r#"<testsuite name="s"><testcase name="a"/></testsuite>"#,
        )
        .unwrap();
        let config = dir.path().join("config.json");
        std::fs::write(&config, r#"{ "userId": "ci", "projectName": "web" }"#).unwrap();

        let cli = Cli {
            config: config.clone(),
            reports_dir: Some(reports.clone()),
            dry_run: true,
        };
        run(cli).await.unwrap();

        let cli = Cli {
            config,
            reports_dir: Some(reports),
            dry_run: false,
        };
        let err = run(cli).await.unwrap_err();
        assert_eq!(err.to_string(), "serverApiUrl is required in the configuration");
    }
}
