mod api;
mod chart;
mod feed;
mod filter;
mod poll;
mod sink;
mod state;
#[cfg(test)]
mod testutil;

use emocam_common::config::Config;
use std::path::PathBuf;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

use api::ApiClient;
use chart::{ChartRenderer, TermChart};
use feed::FeedMode;
use filter::FilterKind;
use state::{LoopSettings, StreamControl};

#[tokio::main]
async fn main() {
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    let config = match Config::load(&config_path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Failed to load config from {}: {e}", config_path.display());
            std::process::exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.level.parse().unwrap_or_default()),
        )
        .init();

    let mode = match config.poll.mode.as_str() {
        "snapshot" => FeedMode::Snapshot,
        "mjpeg" => FeedMode::Mjpeg,
        other => {
            error!(mode = other, "unknown poll mode, expected 'snapshot' or 'mjpeg'");
            std::process::exit(1);
        }
    };

    let initial_filter: FilterKind = match config.filter.initial.parse() {
        Ok(kind) => kind,
        Err(e) => {
            error!(error = %e, "invalid initial filter in config");
            std::process::exit(1);
        }
    };

    info!(
        server = config.server.base_url,
        interval_ms = config.poll.interval_ms,
        mode = config.poll.mode,
        filter = initial_filter.name(),
        output_dir = config.output.dir,
        "starting emocam dashboard"
    );

    let client = match ApiClient::new(
        &config.server.base_url,
        Duration::from_secs(config.server.connect_timeout_secs),
    ) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            error!(error = %e, "failed to build HTTP client");
            std::process::exit(1);
        }
    };

    let mut control = StreamControl::new(
        Arc::clone(&client),
        initial_filter,
        LoopSettings {
            interval: Duration::from_millis(config.poll.interval_ms),
            mode,
            output_dir: PathBuf::from(&config.output.dir),
            keep_history: config.output.history,
        },
    );

    print_help();
    run_console(&mut control, &client).await;

    // wind down cleanly so a final frame write is not cut off mid-file
    control.shutdown().await;
    info!("emocam dashboard exiting");
}

async fn run_console(control: &mut StreamControl, client: &ApiClient) {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !handle_command(line.trim(), control, client).await {
                    break;
                }
            }
            // EOF: treat like quit
            Ok(None) => break,
            Err(e) => {
                error!(error = %e, "failed to read console input");
                break;
            }
        }
    }
}

/// Returns `false` when the console should exit.
async fn handle_command(line: &str, control: &mut StreamControl, client: &ApiClient) -> bool {
    let (cmd, rest) = match line.split_once(' ') {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };

    match cmd {
        "" => {}
        "toggle" => match control.toggle().await {
            Ok(running) => {
                let state = if running { "on" } else { "off" };
                println!("streaming {state} [{}]", control.action_label());
            }
            Err(e) => println!("toggle failed: {e}"),
        },
        "filter" => {
            if rest.is_empty() {
                println!("usage: filter <none|sketch|cartoon|oil|emboss|sepia>");
            } else {
                match rest.parse::<FilterKind>() {
                    Ok(kind) => {
                        control.set_filter(kind);
                        println!("filter: {kind}");
                    }
                    Err(e) => println!("{e}"),
                }
            }
        }
        "filters" => {
            let names: Vec<&str> = FilterKind::ALL.iter().map(|kind| kind.name()).collect();
            println!("filters: {}", names.join(", "));
        }
        "server-filter" => {
            if rest.is_empty() {
                println!("usage: server-filter <name>");
            } else {
                match client.set_server_filter(rest).await {
                    Ok(applied) => println!("server filter: {applied}"),
                    Err(e) => println!("server filter failed: {e}"),
                }
            }
        }
        "chart" => match client.fetch_history().await {
            Ok(hist) => TermChart::new().draw(&hist.values(), hist.dominant()),
            Err(e) => println!("chart fetch failed: {e}"),
        },
        "status" => print_status(control, client).await,
        "help" => print_help(),
        "quit" | "exit" => return false,
        other => println!("unknown command '{other}', try 'help'"),
    }
    true
}

async fn print_status(control: &StreamControl, client: &ApiClient) {
    let state = if control.is_running() {
        "running"
    } else {
        "stopped"
    };
    println!("stream:  {state} [{}]", control.action_label());
    println!("filter:  {}", control.current_filter());
    println!("server:  {}", client.base_url());
    if let Some(stats) = control.stats() {
        println!(
            "ticks: {}  rendered: {}  frame failures: {}  chart failures: {}",
            stats.ticks.load(Ordering::Relaxed),
            stats.frames_rendered.load(Ordering::Relaxed),
            stats.frame_failures.load(Ordering::Relaxed),
            stats.chart_failures.load(Ordering::Relaxed),
        );
    }
    match client.fetch_dominant().await {
        Ok(Some(emotion)) => println!("dominant emotion: {emotion}"),
        Ok(None) => println!("dominant emotion: none yet"),
        Err(e) => println!("dominant emotion unavailable: {e}"),
    }
}

fn print_help() {
    println!("commands:");
    println!("  toggle                start or stop the camera stream");
    println!("  filter <name>         switch the client-side filter");
    println!("  filters               list client-side filters");
    println!("  server-filter <name>  set the server-side filter chain");
    println!("  chart                 fetch and draw the emotion chart once");
    println!("  status                show stream state and tick counters");
    println!("  help                  show this help");
    println!("  quit                  exit");
}
