mod cli;
mod config;
mod controller;
mod error;
mod hooks;
mod selector;
mod tailer;
#[cfg(test)]
mod tests;
mod types;
mod utils;
mod watch;

use anyhow::Context;
use clap::Parser;
use kube::{Client, config as kubeconfig};
use std::io::IsTerminal;
use tokio::sync::mpsc;
use tracing::{debug, info};

use cli::Cli;
use config::Config;
use controller::{Controller, Scope};
use hooks::{ConsoleHooks, ContainerFilter};
use selector::parse_selector;
use tailer::{TailOptions, TailerFactory};
use types::LogMessage;
use utils::{OutputOptions, format_line};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Diagnostics go to stderr so stdout carries only log lines
    let filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter)),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let config = Config::for_cli(&cli)?.merge_cli(&cli);
    debug!("Effective config: {:?}", config);

    let (client, default_namespace) = initialize_client(cli.context.as_deref()).await?;

    let scope = Scope {
        namespace: if cli.all_namespaces {
            None
        } else {
            Some(cli.namespace.clone().unwrap_or(default_namespace))
        },
        selector: parse_selector(cli.selector.as_deref().unwrap_or_default())
            .context("Invalid label selector")?,
    };
    info!(
        "Watching pods in {} (selector: {})",
        scope.namespace.as_deref().unwrap_or("all namespaces"),
        cli.selector.as_deref().unwrap_or("<none>")
    );

    let filter = ContainerFilter::new(&config.include, &config.exclude)?;
    let hooks = ConsoleHooks::new(filter, config.quiet);

    let mut options = TailOptions {
        tail_lines: config.tail,
        ..Default::default()
    };
    if let Some(max_retries) = config.max_retries {
        options.max_retries = max_retries;
    }
    let factory = TailerFactory::new(client.clone(), options);

    let (log_tx, log_rx) = mpsc::channel::<LogMessage>(cli.buffer_size);
    let output = OutputOptions {
        raw: config.raw,
        timestamps: config.timestamps,
        color: !config.no_color && std::io::stdout().is_terminal(),
    };
    let printer = tokio::spawn(print_logs(log_rx, output));

    let controller = Controller::new(scope, factory, hooks, log_tx);
    let events = watch::pod_events(client, controller.scope());

    tokio::select! {
        _ = controller.run(events) => {}
        res = tokio::signal::ctrl_c() => {
            res?;
            debug!("Interrupted");
        }
    }

    controller.shutdown().await;
    // Workers hold the remaining senders; the printer ends once they have all stopped.
    drop(controller);
    let _ = tokio::time::timeout(std::time::Duration::from_secs(1), printer).await;
    Ok(())
}

async fn initialize_client(context: Option<&str>) -> anyhow::Result<(Client, String)> {
    let config = match context {
        Some(ctx) => kubeconfig::Config::from_kubeconfig(&kubeconfig::KubeConfigOptions {
            context: Some(ctx.to_string()),
            ..Default::default()
        })
        .await
        .map_err(|e| anyhow::anyhow!("Context '{}' not found in kubeconfig: {}", ctx, e))?,
        None => kubeconfig::Config::infer().await?,
    };
    let namespace = config.default_namespace.clone();
    let client = Client::try_from(config)?;
    info!("Using context: {}", context.unwrap_or("current"));
    Ok((client, namespace))
}

async fn print_logs(mut log_rx: mpsc::Receiver<LogMessage>, output: OutputOptions) {
    while let Some(msg) = log_rx.recv().await {
        println!("{}", format_line(&msg, output));
    }
}
