//! digraph - terminal dashboard for a live dependency graph
//!
//! Connects to a process manager's `/websocket` endpoint, mirrors its node
//! graph and reads line commands on stdin. Logs go to stderr; the dashboard
//! owns stdout.
//!
//! Config location:
//! - Linux: ~/.config/digraph/config.json
//! - Windows: %APPDATA%\digraph\config.json
//! - MacOS: ~/Library/Application Support/digraph/config.json

use std::path::PathBuf;
use std::process;

use digraph::channel::Channel;
use digraph::config::ClientConfig;
use digraph::controller::Controller;
use digraph::view::MemorySurface;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};

mod commands;
mod render;

use commands::Flow;

// ═══════════════════════════════════════════════════════════════════════════
// Arguments
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    origin: Option<String>,
    url: Option<String>,
}

fn usage() -> ! {
    eprintln!("digraph (connects to ws://127.0.0.1:8080/websocket by default)");
    eprintln!("Usage: digraph [--config path] [--origin http://host:port | --url ws://host:port/websocket]\n");
    eprintln!("{}", commands::HELP);
    process::exit(1);
}

fn parse_args() -> Args {
    let mut args = Args::default();
    let mut it = std::env::args().skip(1);
    while let Some(flag) = it.next() {
        if flag == "-h" || flag == "--help" {
            usage();
        }
        let Some(value) = it.next() else { usage() };
        match flag.as_str() {
            "--config" => args.config = Some(PathBuf::from(value)),
            "--origin" => args.origin = Some(value),
            "--url" => args.url = Some(value),
            _ => usage(),
        }
    }
    if args.origin.is_some() && args.url.is_some() {
        usage();
    }
    args
}

// ═══════════════════════════════════════════════════════════════════════════
// Main
// ═══════════════════════════════════════════════════════════════════════════

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Stdout belongs to the dashboard.
    tracing_subscriber::fmt().with_writer(std::io::stderr).init();

    let args = parse_args();
    let mut config = ClientConfig::load_or_default(args.config.as_deref())?;
    if let Some(origin) = &args.origin {
        config = config.with_origin(origin)?;
    }
    if let Some(url) = &args.url {
        config = config.with_endpoint(url)?;
    }
    info!(endpoint = %config.endpoint, "starting dashboard");

    let (handle, mut events) = Channel::connect(&config);
    let mut controller = Controller::new(MemorySurface::new(), handle, &config);

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => controller.handle_channel_event(event),
                None => {
                    info!("connection task ended");
                    break;
                }
            },
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => match commands::parse(&line) {
                    Ok(Some(input)) => match commands::apply(&mut controller, input) {
                        Flow::Quit => break,
                        Flow::Redraw => print!("{}", render::frame(&controller)),
                        Flow::Continue => {}
                    },
                    Ok(None) => {}
                    Err(e) => println!("{e}"),
                },
                Ok(None) => stdin_open = false,
                Err(e) => {
                    error!(error = %e, "stdin read failed");
                    stdin_open = false;
                }
            },
        }

        if controller.take_render_request() {
            print!("{}", render::frame(&controller));
        }
    }

    print!("{}", render::frame(&controller));
    Ok(())
}
