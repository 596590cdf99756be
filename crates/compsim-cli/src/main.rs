//! compsim - host for simulated scriptable machines
//!
//! # Configuration
//!
//! Configuration is loaded from multiple sources with priority:
//!
//! 1. CLI arguments (highest priority)
//! 2. Environment variables (`COMPSIM_*`)
//! 3. Explicit config file (`--config`)
//! 4. Global config (`~/.compsim/config.toml`)
//! 5. Default values (lowest priority)
//!
//! # Environment Variables
//!
//! - `COMPSIM_DEBUG`: Enable debug mode (`true`/`false`)
//! - `COMPSIM_ROOT`: Host directory holding machine storage
//! - `COMPSIM_TICK_MS`: Registry tick interval in milliseconds
//! - `COMPSIM_BOOT_SCRIPT`: Boot script path inside each machine

mod console;

use anyhow::Result;
use clap::Parser;
use compsim_lua::LuaEngine;
use compsim_runtime::{
    ConfigError, ConfigLoader, ConfigResolver, IoBridge, IoQueue, MachineEnv, MachineRegistry,
    SimConfig,
};
use console::{ConsoleStream, ConsoleSurfaceFactory};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Machine created when neither config nor flags name one.
const DEFAULT_MACHINE: &str = "main";

/// How long shutdown waits for terminal surfaces to close.
const BRIDGE_DRAIN: Duration = Duration::from_secs(1);

/// compsim - host for simulated scriptable machines
#[derive(Parser, Debug)]
#[command(name = "compsim")]
#[command(version, about, long_about = None)]
struct Args {
    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Config file layered over the global config
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Host directory holding machine storage (also: COMPSIM_ROOT)
    #[arg(long, value_name = "DIR")]
    root: Option<PathBuf>,

    /// Directory copied into each new machine's filesystem
    #[arg(long, value_name = "DIR")]
    template: Option<PathBuf>,

    /// Machine to create at startup (repeatable)
    #[arg(short, long = "machine", value_name = "NAME")]
    machines: Vec<String>,

    /// Registry tick interval in milliseconds
    #[arg(long, value_name = "MS")]
    tick_ms: Option<u64>,

    /// Skip the global config file
    #[arg(long)]
    no_global_config: bool,

    /// Run a single tick, save every machine and exit
    #[arg(long)]
    once: bool,
}

/// CLI-based configuration resolver.
///
/// Loads file/env config via [`ConfigLoader`] and applies CLI argument
/// overrides as the highest-priority layer.
struct CliConfigResolver {
    debug: bool,
    config_file: Option<PathBuf>,
    root: Option<PathBuf>,
    template: Option<PathBuf>,
    machines: Vec<String>,
    tick_ms: Option<u64>,
    skip_global: bool,
}

impl CliConfigResolver {
    fn from_args(args: &Args) -> Self {
        Self {
            debug: args.debug,
            config_file: args.config.clone(),
            root: args.root.clone(),
            template: args.template.clone(),
            machines: args.machines.clone(),
            tick_ms: args.tick_ms,
            skip_global: args.no_global_config,
        }
    }

    fn resolve(&self) -> Result<SimConfig, ConfigError> {
        let mut loader = ConfigLoader::new();
        if self.skip_global {
            loader = loader.skip_global_config();
        }
        if let Some(ref path) = self.config_file {
            loader = loader.with_file(path);
        }
        let mut config = loader.load()?;
        self.apply(&mut config);
        Ok(config)
    }
}

impl ConfigResolver for CliConfigResolver {
    fn apply(&self, config: &mut SimConfig) {
        if self.debug {
            config.debug = true;
        }
        if let Some(ref root) = self.root {
            config.storage.root.clone_from(root);
        }
        if let Some(ref template) = self.template {
            config.storage.template = Some(template.clone());
        }
        if let Some(ms) = self.tick_ms {
            config.scheduler.tick_ms = ms;
        }
        for name in &self.machines {
            if !config.boot.machines.contains(name) {
                config.boot.machines.push(name.clone());
            }
        }
    }
}

/// Names of the machines to create at startup.
fn startup_machines(config: &SimConfig) -> Vec<String> {
    if config.boot.machines.is_empty() {
        vec![DEFAULT_MACHINE.to_string()]
    } else {
        config.boot.machines.clone()
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let resolver = CliConfigResolver::from_args(&args);
    let config = resolver
        .resolve()
        .map_err(|e| anyhow::anyhow!("Config error: {e}"))?;

    // Terminal filter: --debug > --verbose > RUST_LOG env > default "warn".
    // Logs go to stderr so machine output owns stdout.
    let filter = if args.debug || config.debug {
        EnvFilter::new("debug")
    } else if args.verbose {
        EnvFilter::new("info")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr)
                .with_filter(filter),
        )
        .init();

    info!(
        root = %config.storage.root.display(),
        boot = %config.boot.script,
        tick_ms = config.scheduler.tick_ms,
        "compsim v{}",
        env!("CARGO_PKG_VERSION")
    );

    let (queue, rx) = IoQueue::channel();
    let bridge = IoBridge::new(rx, Arc::new(ConsoleSurfaceFactory))
        .with_prefix(config.terminal.prefix.clone());
    let bridge_task = tokio::spawn(bridge.run());

    let engine = Arc::new(LuaEngine::from_config(&config.script));
    let env = MachineEnv::from_config(&config, engine, queue)
        .with_default_stream(Arc::new(ConsoleStream));
    let mut registry = MachineRegistry::new(env);

    for name in startup_machines(&config) {
        match registry.create(&name).await {
            Ok(designation) => info!(machine = %designation, "machine started"),
            Err(e) => error!(name = %name, error = %e, "failed to create machine"),
        }
    }
    if registry.is_empty() {
        registry.shutdown_all().await;
        anyhow::bail!("no machine could be started");
    }

    if args.once {
        registry.tick_all();
    } else {
        let period = Duration::from_millis(config.scheduler.tick_ms.max(1));
        registry
            .run_ticks(period, async {
                if let Err(e) = tokio::signal::ctrl_c().await {
                    warn!(error = %e, "cannot listen for Ctrl-C");
                    std::future::pending::<()>().await;
                }
            })
            .await;
        info!("interrupted, shutting down");
    }

    registry.shutdown_all().await;
    drop(registry);

    if tokio::time::timeout(BRIDGE_DRAIN, bridge_task).await.is_err() {
        warn!("terminal bridge did not close in time");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn resolver() -> CliConfigResolver {
        CliConfigResolver {
            debug: false,
            config_file: None,
            root: None,
            template: None,
            machines: Vec::new(),
            tick_ms: None,
            skip_global: true,
        }
    }

    #[test]
    fn apply_without_overrides_keeps_config() {
        let mut config = SimConfig::default();
        let original = config.clone();
        resolver().apply(&mut config);
        assert_eq!(config, original);
    }

    #[test]
    fn cli_flags_override_config() {
        let mut config = SimConfig::default();
        config.scheduler.tick_ms = 20;
        let resolver = CliConfigResolver {
            debug: true,
            root: Some(PathBuf::from("/tmp/compsim-root")),
            template: Some(PathBuf::from("/tmp/compsim-template")),
            tick_ms: Some(5),
            ..resolver()
        };
        resolver.apply(&mut config);

        assert!(config.debug);
        assert_eq!(config.storage.root, PathBuf::from("/tmp/compsim-root"));
        assert_eq!(
            config.storage.template,
            Some(PathBuf::from("/tmp/compsim-template"))
        );
        assert_eq!(config.scheduler.tick_ms, 5);
    }

    #[test]
    fn machine_flags_extend_configured_machines() {
        let mut config = SimConfig::default();
        config.boot.machines = vec!["office".into()];
        let resolver = CliConfigResolver {
            machines: vec!["lab".into(), "office".into()],
            ..resolver()
        };
        resolver.apply(&mut config);
        assert_eq!(config.boot.machines, vec!["office", "lab"]);
    }

    #[test]
    fn default_machine_when_none_named() {
        let config = SimConfig::default();
        assert_eq!(startup_machines(&config), vec![DEFAULT_MACHINE]);
    }

    #[test]
    fn resolve_reads_explicit_file() {
        let temp = TempDir::new().expect("temp dir");
        let path = temp.path().join("compsim.toml");
        std::fs::write(&path, "[scheduler]\ntick_ms = 7\n[boot]\nmachines = [\"lab\"]\n")
            .expect("write config");
        let resolver = CliConfigResolver {
            config_file: Some(path),
            machines: vec!["office".into()],
            ..resolver()
        };

        let config = resolver.resolve().expect("resolve");
        assert_eq!(config.scheduler.tick_ms, 7);
        assert_eq!(config.boot.machines, vec!["lab", "office"]);
    }

    #[test]
    fn args_parse_repeated_machines() {
        let args = Args::parse_from([
            "compsim", "--once", "--root", "/tmp/r", "-m", "a", "--machine", "b",
        ]);
        assert!(args.once);
        assert_eq!(args.machines, vec!["a", "b"]);
        assert_eq!(args.root, Some(PathBuf::from("/tmp/r")));
    }
}
