use std::path::PathBuf;
use tracing::{error, info, warn};

use mnrega_muster::core::config::load_scraper_config;
use mnrega_muster::setup::{self, SetupOptions};

const USAGE: &str = "usage: mnrega-muster <WORK_CODE> [--out DIR]\n       mnrega-muster --setup [--out DIR]";

struct CliArgs {
    work_code: Option<String>,
    out_dir: Option<PathBuf>,
    setup_only: bool,
}

fn parse_args() -> anyhow::Result<CliArgs> {
    let mut parsed = CliArgs {
        work_code: None,
        out_dir: None,
        setup_only: false,
    };
    let mut args = std::env::args().skip(1);
    while let Some(a) = args.next() {
        if a == "--setup" {
            parsed.setup_only = true;
        } else if a == "--out" {
            let v = args
                .next()
                .ok_or_else(|| anyhow::anyhow!("--out needs a directory\n{}", USAGE))?;
            parsed.out_dir = Some(PathBuf::from(v));
        } else if let Some(rest) = a.strip_prefix("--out=") {
            parsed.out_dir = Some(PathBuf::from(rest));
        } else if a == "-h" || a == "--help" {
            println!("{}", USAGE);
            std::process::exit(0);
        } else if a.starts_with("--") {
            anyhow::bail!("unknown option {}\n{}", a, USAGE);
        } else if parsed.work_code.is_none() {
            parsed.work_code = Some(a);
        } else {
            anyhow::bail!("only one work code may be given\n{}", USAGE);
        }
    }
    Ok(parsed)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chromiumoxide=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    let config = load_scraper_config();
    let output_dir = args
        .out_dir
        .clone()
        .unwrap_or_else(|| config.resolve_output_dir());

    if args.setup_only {
        let report = setup::check_all(&SetupOptions::new(config, output_dir)).await;
        println!("{}", report);
        report.print_action_required_blocks();
        if report.has_failures() {
            std::process::exit(2);
        }
        return Ok(());
    }

    let Some(work_code) = args.work_code else {
        anyhow::bail!("missing work code\n{}", USAGE);
    };

    info!("Starting muster roll run for {}", work_code);
    match mnrega_muster::run_mnrega_scraper(&work_code, &output_dir, &config).await {
        Ok(path) => {
            println!("{}", path.display());
            Ok(())
        }
        Err(e) => {
            error!("{}", e);
            if matches!(e, mnrega_muster::MusterError::BrowserLaunch(_)) {
                warn!("run `mnrega-muster --setup` to check the browser installation");
            }
            eprintln!("error: {}", e);
            std::process::exit(1);
        }
    }
}
