mod bootstrap_helpers;
mod cli_args;

use std::collections::BTreeMap;
use std::process::ExitCode;

use anyhow::{Context, Result};
use beacon_core::CooperativeCancellationToken;
use beacon_engine::Engine;
use clap::Parser;
use serde::Serialize;

use crate::bootstrap_helpers::{
    init_tracing, read_base_filters, read_bindings, resolve_engine_config,
};
use crate::cli_args::{BuildArgs, BuildCommand, Cli};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    init_tracing();
    run_cli(Cli::parse()).await
}

async fn run_cli(cli: Cli) -> Result<ExitCode> {
    let env = std::env::vars().collect::<BTreeMap<_, _>>();
    let mut config = resolve_engine_config(cli.config.as_deref(), &env)?;
    let args = match &cli.command {
        BuildCommand::Widget(args) | BuildCommand::Comparison(args) => args,
    };
    if let Some(catalog) = &args.catalog {
        config.definitions_dir = catalog.clone();
    }
    let engine = Engine::from_config(&config)?;
    let bindings = read_bindings(args.bindings.as_deref())?;
    let base_filters = read_base_filters(args.base_filters.as_deref())?;

    let token = CooperativeCancellationToken::new();
    let interrupt = token.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("interrupt received; cancelling build");
            interrupt.cancel();
        }
    });

    let outcome = match &cli.command {
        BuildCommand::Widget(_) => engine
            .build_widget(&args.id, bindings, &base_filters, &token)
            .await
            .map(|output| render(&output, args)),
        BuildCommand::Comparison(_) => engine
            .build_comparison(&args.id, bindings, &base_filters, &token)
            .await
            .map(|output| render(&output, args)),
    };

    match outcome {
        Ok(rendered) => {
            println!("{}", rendered?);
            Ok(ExitCode::SUCCESS)
        }
        Err(error) => {
            println!("{}", render(&error.to_body(), args)?);
            Ok(ExitCode::FAILURE)
        }
    }
}

fn render<T: Serialize>(value: &T, args: &BuildArgs) -> Result<String> {
    let rendered = if args.compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    rendered.context("failed to encode output")
}
