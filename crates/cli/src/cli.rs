// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use std::path::PathBuf;

use clap::{Parser, Subcommand};

const EXAMPLES_HELP: &str = "\
Examples:
  ddp -e ws://localhost:3000/websocket call tasks.count '\"open\"'
  ddp watch tasks.mine '{\"limit\": 10}'";

#[derive(Parser, Debug)]
#[command(name = "ddp")]
#[command(about = "Call methods and watch subscriptions on a DDP server")]
#[command(after_help = EXAMPLES_HELP)]
pub struct Cli {
    /// Config file (default: ./ddp.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Server WebSocket URL, overriding the config file
    #[arg(short, long, global = true)]
    pub endpoint: Option<String>,

    /// Enable debug logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, PartialEq)]
pub enum Command {
    /// Call a method and print its result as EJSON
    Call {
        method: String,
        /// Method params, one JSON value each
        params: Vec<String>,
        /// Re-issue the call if the connection drops before it completes
        #[arg(long)]
        retry: bool,
    },

    /// Subscribe and print documents as they change, until Ctrl-C
    Watch {
        name: String,
        /// Subscription params, one JSON value each
        params: Vec<String>,
    },
}

#[cfg(test)]
#[path = "cli_tests.rs"]
mod tests;
