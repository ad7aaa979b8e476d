//! harnessd - kernel test harness daemon
//!
//! Consumes build state change messages from the bus relay and, for every
//! completed primary kernel build, records the latest kernel for its
//! release and starts that release's arm64 and x86_64 test VMs.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use harness_core::{write_pid_file, Harness, HarnessConfig, JsonLinesSource};
use tracing::{info, Level};
use virsh_control::{VirshConfig, VirshHypervisor};

#[derive(Parser, Debug)]
#[command(name = "harnessd")]
#[command(author = "Fedora Kernel Test Maintainers")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Boot test VMs for freshly built kernels", long_about = None)]
struct Args {
    /// Path to a TOML config file (defaults apply when omitted)
    #[arg(short, long, env = "HARNESS_CONFIG")]
    config: Option<PathBuf>,

    /// Emit JSON-formatted log lines
    #[arg(long)]
    json: bool,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let level = if args.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    harness_core::init_tracing(args.json, level);

    let config = load_config(args.config.as_deref())?;

    let hypervisor = VirshHypervisor::new(VirshConfig::from(&config.hypervisor));
    let harness = Harness::new(&config, Arc::new(hypervisor))
        .with_context(|| format!("Marker directory {}", config.marker_dir.display()))?;

    let pid = write_pid_file(&config.pid_path)
        .with_context(|| format!("Failed to write PID file {}", config.pid_path.display()))?;
    info!(pid, version = harness_core::VERSION, "harnessd started");

    match config.bus.endpoint.as_deref() {
        Some(endpoint) => {
            let mut source = JsonLinesSource::connect(endpoint)
                .await
                .with_context(|| format!("Failed to connect to bus relay at {endpoint}"))?;
            harness.run(&mut source).await?;
        }
        None => {
            info!("reading bus messages from stdin");
            let mut source = JsonLinesSource::stdin();
            harness.run(&mut source).await?;
        }
    }

    info!("harnessd stopped");
    Ok(())
}

fn load_config(path: Option<&Path>) -> Result<HarnessConfig> {
    let config = HarnessConfig::load(path).with_context(|| match path {
        Some(path) => format!("Invalid config {}", path.display()),
        None => "Invalid default config".to_string(),
    })?;
    Ok(config)
}
