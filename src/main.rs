//! segdl - CLI entry point.

use std::process::ExitCode;

use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{fmt, EnvFilter};

use segmented_downloader::{
    cli::Args,
    config::{validate_config, Config},
    download::{Dispatcher, GlobalState, Outcome},
    error::{exit_codes, Error, Result},
    fs::ensure_dir,
    http::HttpClient,
    media::{load_manifest, resolve_direct, select_items, Data},
    output::{
        print_banner, print_config_summary, print_error, print_failures, print_global_stats,
        print_info, print_success, print_summary, print_warning,
    },
};

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::from(exit_codes::SUCCESS as u8),
        Err(e) => {
            print_error(&format!("{}", e));
            let code = match &e {
                _ if e.is_cancelled() => exit_codes::CANCELLED,
                Error::Config(_)
                | Error::ConfigValidation { .. }
                | Error::MissingConfig(_)
                | Error::TomlParse(_) => exit_codes::CONFIG_ERROR,
                Error::Resolver(_) | Error::Json(_) | Error::UrlParse(_) => {
                    exit_codes::RESOLVER_ERROR
                }
                Error::ItemsFailed(_) => exit_codes::SOME_ITEMS_FAILED,
                Error::SegmentsFailed { .. }
                | Error::PartsFailed { .. }
                | Error::Request { .. }
                | Error::HttpStatus { .. }
                | Error::Http(_)
                | Error::Merge(_)
                | Error::FFmpeg(_)
                | Error::FFmpegNotFound
                | Error::Delegate(_) => exit_codes::DOWNLOAD_ERROR,
                _ => exit_codes::UNEXPECTED_ERROR,
            };
            ExitCode::from(code as u8)
        }
    }
}

async fn run() -> Result<()> {
    // Parse CLI arguments
    let args = Args::parse();

    // Set up logging
    let log_level = if args.debug { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt().with_env_filter(filter).with_target(false).init();

    // Load configuration
    let config_path = args.config.clone();
    let config_missing = !config_path.exists();
    let mut config = if config_missing {
        Config::default()
    } else {
        Config::load(&config_path)?
    };

    let url = args.url.clone();
    let manifest = args.manifest.clone();
    let output_name = args.output_name.clone();
    let (playlist, items, item_start, item_end) =
        (args.playlist, args.items.clone(), args.item_start, args.item_end);

    // Merge CLI arguments into config
    args.merge_into_config(&mut config);
    validate_config(&config)?;

    if !config.download.silent {
        print_banner();
    }
    if config_missing {
        print_warning(&format!(
            "Configuration file not found: {}",
            config_path.display()
        ));
        print_info("Using default configuration with CLI arguments");
    }

    let client = HttpClient::new(&config.request)?;

    // Resolve what to download
    let resolved: Vec<Data> = match (manifest, url) {
        (Some(path), _) => load_manifest(&path)?,
        (None, Some(url)) => vec![resolve_direct(&client, &url).await?],
        (None, None) => return Err(Error::Config("Either a URL or --manifest is required".into())),
    };
    let selected = select_items(resolved, playlist, &items, item_start, item_end)?;
    if selected.is_empty() {
        print_warning("No items selected");
        return Ok(());
    }

    let output_dir = config.output_directory();
    ensure_dir(&output_dir)?;

    if !config.download.silent {
        print_config_summary(
            selected.len(),
            &config.download.mode.to_string(),
            config.download.thread_number,
            &output_dir.display().to_string(),
        );
    }

    // Ctrl-C stops every task at its next suspension point
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            print_warning("Interrupted, stopping downloads...");
            on_signal.cancel();
        }
    });

    let output_name = if selected.len() == 1 { output_name } else { None };
    let dispatcher = Dispatcher::new(config, client, cancel.clone()).with_output_name(output_name);
    let reports = dispatcher.load_playlist(selected).await;

    let state = GlobalState::from_reports(&reports);
    if reports.len() > 1 {
        print_failures(&reports);
        print_global_stats(&state);
    } else {
        print_summary(&state);
    }
    for report in &reports {
        if let Ok(Outcome::Downloaded { path, .. }) = &report.result {
            print_success(&format!("Saved {}", path.display()));
        }
    }

    if cancel.is_cancelled() {
        return Err(Error::Cancelled);
    }
    if state.failed > 0 {
        if reports.len() == 1 {
            if let Some(Err(e)) = reports.into_iter().next().map(|r| r.result) {
                return Err(e);
            }
        }
        return Err(Error::ItemsFailed(state.failed));
    }

    Ok(())
}
