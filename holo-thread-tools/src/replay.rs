//
// Copyright (c) The Holo Core Contributors
//
// SPDX-License-Identifier: MIT
//

mod config;

use clap::{App, Arg};
use config::{Config, LoggingFmtStyle};
use holo_thread::instance::Instance;
use holo_thread::tasks::messages::ProtocolInputMsg;
use serde_json::json;
use tokio::signal::unix::{SignalKind, signal};
use tokio::sync::mpsc;
use tracing::info;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::Layer;
use tracing_subscriber::prelude::*;

fn init_tracing(config: &config::Logging) {
    let stderr = config.enabled.then(|| {
        let log_level_filter = LevelFilter::from_level(tracing::Level::TRACE);
        let layer = tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(false)
            .with_thread_ids(config.show_thread_id)
            .with_file(config.show_source)
            .with_line_number(config.show_source)
            .with_ansi(config.colors);
        let layer = match config.style {
            LoggingFmtStyle::Compact => layer.compact().boxed(),
            LoggingFmtStyle::Full => layer.boxed(),
            LoggingFmtStyle::Json => layer.json().boxed(),
            LoggingFmtStyle::Pretty => layer.pretty().boxed(),
        };
        layer.with_filter(log_level_filter)
    });

    let env_filter = tracing_subscriber::EnvFilter::builder()
        .with_default_directive("holo=debug".parse().unwrap())
        .from_env_lossy();
    tracing_subscriber::registry()
        .with(env_filter)
        .with(stderr)
        .init();
}

fn signal_listener() -> mpsc::Receiver<()> {
    let (signal_tx, signal_rx) = mpsc::channel(1);

    tokio::task::spawn(async move {
        let mut sigint = signal(SignalKind::interrupt()).unwrap();
        let mut sigterm = signal(SignalKind::terminate()).unwrap();

        tokio::select! {
            _ = sigint.recv() => {
                info!("received SIGINT");
                let _ = signal_tx.send(()).await;
            },
            _ = sigterm.recv() => {
                info!("received SIGTERM");
                let _ = signal_tx.send(()).await;
            }
        }
    });

    signal_rx
}

// ===== main =====

#[tokio::main]
async fn main() {
    // Parse command-line parameters.
    let matches = App::new("Replay Network Data Leader events")
        .about("Replay Network Data Leader events from a record file")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .value_name("file")
                .help("Specify a configuration file."),
        )
        .arg(
            Arg::with_name("wait")
                .short("w")
                .long("wait")
                .help("Keep the instance running until SIGINT or SIGTERM."),
        )
        .arg(
            Arg::with_name("FILENAME")
                .help("Events file path")
                .required(true)
                .index(1),
        )
        .get_matches();
    let config = Config::load(matches.value_of("config"));
    let filename = matches.value_of("FILENAME").unwrap();

    // Initialize tracing.
    init_tracing(&config.logging);

    // Spawn Network Data Leader instance.
    let (output_tx, mut output_rx) = mpsc::unbounded_channel();
    let (instance, input_tx, input_rx) =
        Instance::new(config.leader, config.router_table, output_tx);
    let instance = tokio::spawn(instance.run(input_rx));

    // Print the instance output, one JSON object per line.
    let printer = tokio::spawn(async move {
        while let Some(msg) = output_rx.recv().await {
            let msg = serde_json::to_string(&msg)
                .expect("Failed to serialize instance message");
            println!("{msg}");
        }
    });

    // Push events from the record file.
    let mut events = 0;
    for msg in std::fs::read_to_string(filename)
        .expect("Unable to read record file")
        .lines()
        .filter(|line| !line.trim().is_empty())
    {
        let msg: ProtocolInputMsg = serde_json::from_str(msg)
            .expect("Failed to parse instance message");
        input_tx
            .requests
            .send(msg)
            .expect("Instance terminated unexpectedly");
        events += 1;
    }
    info!(%filename, %events, "replay finished");

    // Pending timers only fire while the instance is kept running.
    if matches.is_present("wait") {
        let _ = signal_listener().recv().await;
    }

    // Close the instance and print the final Network Data.
    drop(input_tx);
    let leader = instance.await.expect("Instance task failed");
    printer.await.expect("Printer task failed");
    let summary = json!({
        "version": leader.version(),
        "stable_version": leader.stable_version(),
        "network_data": leader.network_data(),
    });
    println!("{summary}");
}
