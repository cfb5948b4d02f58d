// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! ddp-cli: command-line DDP client.
//!
//! Drives a [`ddp_client::Engine`] over real WebSockets: `call` runs one
//! method, `watch` streams a subscription's documents.

pub mod cli;
pub mod config;
pub mod driver;
pub mod error;
pub mod ws;

use tracing_subscriber::{EnvFilter, FmtSubscriber};

use ddp_client::Value;

pub use cli::{Cli, Command};
pub use config::Config;
pub use driver::{parse_params, render_value, Driver};
pub use error::{Error, Result};

/// Installs the stderr log subscriber. `RUST_LOG` applies unless
/// `verbose` forces debug output.
pub fn init_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    let subscriber = FmtSubscriber::builder().with_env_filter(filter).with_writer(std::io::stderr).finish();
    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("warning: logging already initialized: {}", e);
    }
}

pub async fn run(cli: Cli) -> Result<()> {
    let cwd = std::env::current_dir()?;
    let config = Config::discover(cli.config.as_deref(), &cwd)?.with_endpoint(cli.endpoint);
    let endpoint = config.endpoint()?.to_string();

    let mut driver = Driver::new(&config);
    let connection = driver.engine().open(&endpoint, Value::Null);
    match cli.command {
        Command::Call { method, params, retry } => {
            let params = parse_params(driver.engine().codec(), &params)?;
            let result = driver.call(&connection, &method, params, retry).await?;
            println!("{}", render_value(driver.engine().codec(), &result)?);
        }
        Command::Watch { name, params } => {
            let params = parse_params(driver.engine().codec(), &params)?;
            driver.watch(&connection, &name, params, &mut std::io::stdout()).await?;
        }
    }
    driver.engine().close(&connection);
    Ok(())
}
