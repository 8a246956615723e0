/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/.
 */

//! Thin process shell around [`etherlink_engine::Engine`]: parse flags,
//! resolve configuration, open the raw interface, start the engine's
//! worker threads, and serve the local command/event socket until a
//! signal asks us to stop (SPEC_FULL.md §2a).

mod socket;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use clap::Parser;

use etherlink_engine::config::{RuntimeConfig, SysClassNet};
use etherlink_engine::{raw, Engine};

const EXIT_OK: i32 = 0;
const EXIT_CONFIG_ERROR: i32 = 1;

/// Command-line overrides for the environment-driven configuration
/// (SPEC_FULL.md §6). Any flag left unset falls back to the matching
/// environment variable, then to the documented default.
#[derive(Parser, Debug)]
#[command(name = "etherlinkd", about = "Neighbor discovery, messaging, and file transfer over a raw Ethernet link")]
struct Args {
    #[arg(long)]
    interface: Option<String>,
    #[arg(long)]
    ethertype: Option<String>,
    #[arg(long)]
    alias: Option<String>,
    #[arg(long)]
    psk: Option<String>,
    #[arg(long)]
    base_dir: Option<String>,
    #[arg(long)]
    chunk_size: Option<String>,
    #[arg(long, default_value = "/tmp/etherlinkd.sock")]
    socket: PathBuf,
}

fn overridden_env(args: &Args) -> HashMap<String, String> {
    let mut env: HashMap<String, String> = std::env::vars().collect();
    let mut set = |key: &str, value: &Option<String>| {
        if let Some(v) = value {
            env.insert(key.to_string(), v.clone());
        }
    };
    set("INTERFACE", &args.interface);
    set("ETHER_TYPE", &args.ethertype);
    set("ALIAS", &args.alias);
    set("PSK", &args.psk);
    set("BASE_DIR", &args.base_dir);
    set("CHUNK_SIZE", &args.chunk_size);
    env
}

fn main() {
    tracing_subscriber::fmt().with_env_filter(tracing_subscriber::EnvFilter::from_default_env()).init();

    let args = Args::parse();
    let env = overridden_env(&args);

    let config = match RuntimeConfig::resolve(&SysClassNet, &env) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    tracing::info!(interface = %config.interface_name, ethertype = %format!("0x{:04x}", config.ethertype), alias = %config.alias, "resolved configuration");

    let iface = match raw::open(&config.interface_name, config.ethertype) {
        Ok(i) => i,
        Err(e) => {
            eprintln!("failed to open interface {}: {}", config.interface_name, e);
            std::process::exit(EXIT_CONFIG_ERROR);
        }
    };

    let engine = Engine::new(config, iface);
    engine.start();

    let shutdown = Arc::new(AtomicBool::new(false));
    let handler_flag = shutdown.clone();
    if let Err(e) = ctrlc::set_handler(move || handler_flag.store(true, Ordering::SeqCst)) {
        tracing::warn!(error = %e, "failed to install signal handler; Ctrl-C will terminate abruptly");
    }

    let socket_path = args.socket;
    let socket_engine = engine.clone();
    let socket_shutdown = shutdown.clone();
    let socket_handle = thread::spawn(move || {
        if let Err(e) = socket::serve(socket_engine, &socket_path, socket_shutdown) {
            tracing::error!(error = %e, "command socket exited");
        }
    });

    while !shutdown.load(Ordering::SeqCst) {
        thread::sleep(Duration::from_millis(200));
    }

    tracing::info!("shutdown requested, stopping engine");
    engine.stop();
    let _ = socket_handle.join();

    std::process::exit(EXIT_OK);
}
