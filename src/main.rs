mod browser;
mod cache;
mod chrome;
mod commit;
mod cookies;
mod csp;
mod css_parser;
mod dom;
mod draw;
mod error;
mod frame;
mod html_parser;
mod http;
mod js_context;
mod layout;
mod main_thread;
mod network;
mod pool;
mod rect;
mod selector;
mod services;
mod tab;
mod task;
mod trace;
mod url;

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{EnvFilter, Layer};

use browser::Browser;
use services::Services;
use trace::ChromeTraceLayer;

/// A minimal, multi-threaded web browser engine.
#[derive(Parser)]
#[command(name = "browser", version)]
struct Cli {
    /// Page to load on startup.
    #[arg(default_value = "about:blank")]
    url: String,

    /// Chrome Trace Event Format output path.
    #[arg(long, default_value = "trace.json")]
    trace_file: String,

    /// Size of the network thread pool.
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Increase log verbosity (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> eframe::Result<()> {
    let cli = Cli::parse();

    let filter_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let trace_layer = Arc::new(ChromeTraceLayer::new(cli.trace_file.clone()));

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter_level)))
        .with(tracing_subscriber::fmt::layer())
        .with(trace_layer.clone().with_filter(tracing_subscriber::filter::LevelFilter::TRACE))
        .init();

    let services = Services::new(cli.workers);

    let options = eframe::NativeOptions::default();
    let result = eframe::run_native(
        "browser",
        options,
        Box::new(move |cc| Ok(Box::new(Browser::new(cc, services.clone(), cli.url.clone())))),
    );

    trace_layer.finish();
    result
}
