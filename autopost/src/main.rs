//! autopost - Post one image with one caption to Facebook, X and Instagram

use anyhow::Context;
use clap::Parser;
use libautopost::config::Config;
use libautopost::events::EventReceiver;
use libautopost::logging::LoggingConfig;
use libautopost::preparer::ImagePreparer;
use libautopost::types::parse_platform_list;
use libautopost::{
    create_platforms, AutopostError, Credentials, Event, Orchestrator, OverallOutcome, PostReport,
    PostRequest, Result,
};
use std::io::{IsTerminal, Read};
use std::path::PathBuf;
use tokio::sync::broadcast::error::RecvError;
use tracing::debug;

#[derive(Parser, Debug)]
#[command(name = "autopost")]
#[command(version, about = "Post an image with a caption to several social platforms")]
#[command(long_about = r#"Post an image with a caption to Facebook, X and Instagram at once.

The image is re-encoded once as a JPEG and published to every selected
platform concurrently. One platform failing never stops the others.

EXAMPLES:
    # Post to every default platform
    autopost quake.png "M5.2 earthquake, 40 km SW of the coast"

    # Caption from stdin
    echo "Aftershock update" | autopost quake.png

    # Only some platforms
    autopost quake.png "Update" --platform facebook,x

    # JSON report for scripting
    autopost quake.png "Update" --format json | jq '.results.x.post_id'

CREDENTIALS (environment or .env file):
    FB_PAGE_ID, FB_PAGE_ACCESS_TOKEN
    X_API_KEY, X_API_SECRET_KEY, X_ACCESS_TOKEN, X_ACCESS_TOKEN_SECRET
    IG_USER_ID, IG_ACCESS_TOKEN
    IMAGEKIT_PRIVATE_KEY (image relay used by Instagram)

EXIT CODES:
    0 - Posted to every selected platform
    1 - At least one platform failed, or the image/config could not be used
    2 - Every failure was a missing or rejected credential
    3 - Invalid input (empty caption, unknown platform)
    4 - Another post is already in flight
"#)]
struct Cli {
    /// Image file to post
    image: PathBuf,

    /// Caption (reads from stdin if not provided)
    caption: Option<String>,

    /// Target specific platform(s) (comma-separated)
    #[arg(short, long)]
    platform: Option<String>,

    /// Output format
    #[arg(short, long, default_value = "text", value_parser = ["text", "json"])]
    format: String,

    /// Configuration file (defaults to AUTOPOST_CONFIG or the user config dir)
    #[arg(short, long, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    /// Progress goes to stderr for text output, and for JSON only when verbose
    fn shows_progress(&self) -> bool {
        self.format == "text" || self.verbose
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // A missing .env file is normal
    let _ = dotenvy::dotenv();

    LoggingConfig::from_env(cli.verbose).init();

    let report = match run(&cli).await {
        Ok(report) => report,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    if let Err(e) = print_report(&report, &cli.format) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }

    std::process::exit(exit_code(&report));
}

async fn run(cli: &Cli) -> Result<PostReport> {
    let config = match &cli.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };

    let caption = match &cli.caption {
        Some(caption) => caption.clone(),
        None => read_caption_from_stdin()?,
    };

    let targets = match &cli.platform {
        Some(list) => parse_platform_list(list)?,
        None => config.defaults.platforms.iter().copied().collect(),
    };

    let request = PostRequest::new(&cli.image, caption, targets);
    request.validate()?;
    debug!("Request {} targets {:?}", request.id, request.targets);

    let registry = create_platforms(&config, &Credentials::from_env())?;
    let orchestrator = Orchestrator::new(ImagePreparer::from_config(&config.image), registry);

    let progress = cli
        .shows_progress()
        .then(|| tokio::spawn(print_progress(orchestrator.subscribe())));

    let result = orchestrator.submit(request).await;

    if let Some(progress) = progress {
        match &result {
            // The final event has been sent; let the printer drain it
            Ok(_) => {
                let _ = progress.await;
            }
            Err(_) => progress.abort(),
        }
    }

    result
}

/// Print one stderr line per lifecycle event until the post finishes
async fn print_progress(mut events: EventReceiver) {
    loop {
        match events.recv().await {
            Ok(Event::PostingStarted { platforms, .. }) => {
                let names: Vec<&str> = platforms.iter().map(|p| p.as_str()).collect();
                eprintln!("Posting to {}...", names.join(", "));
            }
            Ok(Event::PlatformCompleted { result, .. }) => {
                if result.is_success() {
                    eprintln!("  {}: done", result.platform);
                } else {
                    eprintln!("  {}: failed", result.platform);
                }
            }
            Ok(Event::PostingCompleted { .. }) | Ok(Event::PostingFailed { .. }) => break,
            Err(RecvError::Lagged(skipped)) => debug!("Missed {} progress events", skipped),
            Err(RecvError::Closed) => break,
        }
    }
}

fn read_caption_from_stdin() -> Result<String> {
    let mut stdin = std::io::stdin();
    if stdin.is_terminal() {
        return Err(AutopostError::InvalidInput(
            "Please enter a caption".to_string(),
        ));
    }

    let mut caption = String::new();
    stdin
        .read_to_string(&mut caption)
        .map_err(|e| AutopostError::InvalidInput(format!("Failed to read caption from stdin: {}", e)))?;
    Ok(caption)
}

fn print_report(report: &PostReport, format: &str) -> anyhow::Result<()> {
    if format == "json" {
        let json = serde_json::to_string_pretty(report).context("Failed to serialize report")?;
        println!("{}", json);
        return Ok(());
    }

    for result in report.results.values() {
        match (result.post_id(), result.reason()) {
            (Some(id), _) => println!("{}: ok ({})", result.platform, id),
            (None, Some(reason)) => println!("{}: failed: {}", result.platform, reason),
            (None, None) => println!("{}: failed", result.platform),
        }
    }

    match report.overall {
        OverallOutcome::AllSucceeded => println!("Successfully posted to all platforms!"),
        OverallOutcome::PartialFailure => {
            let succeeded = report.results.values().filter(|r| r.is_success()).count();
            println!(
                "Posted to {} of {} platforms",
                succeeded,
                report.results.len()
            );
        }
        OverallOutcome::TotalFailure => println!("Failed to post to any platform"),
    }

    Ok(())
}

fn exit_code(report: &PostReport) -> i32 {
    match report.overall {
        OverallOutcome::AllSucceeded => 0,
        _ if report.only_authentication_failures() => 2,
        _ => 1,
    }
}
