//! vsockcid - vsock context ID allocation CLI
//!
//! Allocates a guest CID on the host's vhost-vsock device, probes disk
//! formats, and reports vsock support.
//!
//! ## Usage
//!
//! ```sh
//! vsockcid allocate [--device <path>] [--json] [--hold]
//! vsockcid devformat <disk>
//! vsockcid check [--device <path>]
//! ```
//!
//! A CID is only held while the device fd stays open. Without `--hold` the
//! allocated CID is released as soon as the command exits, which makes
//! `allocate` useful for checking that a CID *can* be allocated. With
//! `--hold` the fd is kept open (and inheritable) until stdin reaches EOF.

use std::io::Read;
use std::os::fd::AsRawFd;
use std::path::PathBuf;
use std::process::ExitCode;

use tracing::Level;
use tracing_subscriber::FmtSubscriber;
use vsockcid::{BlkidProbe, ContextIdAllocator, DEFAULT_VHOST_VSOCK_DEVICE, VsockSupport};

// =============================================================================
// CLI Parsing
// =============================================================================

#[derive(Debug)]
enum Command {
    Allocate {
        device: PathBuf,
        json: bool,
        hold: bool,
    },
    DevFormat {
        disk: PathBuf,
    },
    Check {
        device: PathBuf,
    },
    Version,
    Help,
}

#[derive(Debug)]
struct Cli {
    command: Command,
    verbose: bool,
}

fn parse_args() -> Result<Cli, String> {
    let args: Vec<String> = std::env::args().collect();
    let verbose = args.iter().any(|a| a == "--verbose" || a == "-v");

    if args.len() < 2 {
        return Ok(Cli {
            command: Command::Help,
            verbose,
        });
    }

    let device_arg = || -> Result<PathBuf, String> {
        match args.iter().position(|a| a == "--device" || a == "-d") {
            Some(i) => args
                .get(i + 1)
                .map(PathBuf::from)
                .ok_or_else(|| "--device requires a path".to_string()),
            None => Ok(PathBuf::from(DEFAULT_VHOST_VSOCK_DEVICE)),
        }
    };

    let command = match args[1].as_str() {
        "allocate" => Command::Allocate {
            device: device_arg()?,
            json: args.iter().any(|a| a == "--json"),
            hold: args.iter().any(|a| a == "--hold"),
        },
        "devformat" => {
            let disk = args
                .get(2)
                .filter(|a| !a.starts_with('-'))
                .ok_or_else(|| "devformat requires <disk>".to_string())?;
            Command::DevFormat {
                disk: PathBuf::from(disk),
            }
        }
        "check" => Command::Check {
            device: device_arg()?,
        },
        "version" | "--version" => Command::Version,
        "help" | "--help" | "-h" => Command::Help,
        unknown => return Err(format!("unknown command: {}", unknown)),
    };

    Ok(Cli { command, verbose })
}

// =============================================================================
// Commands
// =============================================================================

fn cmd_allocate(device: PathBuf, json: bool, hold: bool) -> Result<(), String> {
    let allocation = ContextIdAllocator::new()
        .with_device_path(&device)
        .allocate()
        .map_err(|e| e.to_string())?;

    if json {
        let out = serde_json::json!({
            "cid": allocation.cid,
            "device": allocation.handle.path(),
            "fd": allocation.handle.as_raw_fd(),
            "direction": allocation.direction,
            "attempts": allocation.attempts,
        });
        let text = serde_json::to_string_pretty(&out).map_err(|e| format!("serialize: {}", e))?;
        println!("{}", text);
    } else {
        println!("{}", allocation.cid);
    }

    if hold {
        allocation
            .handle
            .set_inheritable(true)
            .map_err(|e| format!("failed to make fd inheritable: {}", e))?;
        eprintln!(
            "holding CID {} on fd {} until stdin closes",
            allocation.cid,
            allocation.handle.as_raw_fd()
        );
        let mut sink = Vec::new();
        std::io::stdin()
            .read_to_end(&mut sink)
            .map_err(|e| format!("failed to read stdin: {}", e))?;
    }

    // Dropping the handle releases the CID.
    drop(allocation);
    Ok(())
}

fn cmd_devformat(disk: PathBuf) -> Result<(), String> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|e| format!("failed to start runtime: {}", e))?;

    let fstype = runtime
        .block_on(BlkidProbe::new().dev_format(&disk))
        .map_err(|e| e.to_string())?;

    println!("{}", fstype.unwrap_or_default());
    Ok(())
}

fn cmd_check(device: PathBuf) -> Result<(), String> {
    let support = VsockSupport::detect_at(&device);
    let text = serde_json::to_string_pretty(&support).map_err(|e| format!("serialize: {}", e))?;
    println!("{}", text);

    if support.is_usable() {
        Ok(())
    } else {
        Err(format!("{} is not usable", device.display()))
    }
}

fn cmd_version() {
    println!("vsockcid version {}", env!("CARGO_PKG_VERSION"));
}

fn cmd_help() {
    println!(
        r#"vsockcid - vsock context ID allocation

USAGE:
    vsockcid <COMMAND> [OPTIONS]

COMMANDS:
    allocate              Allocate a free guest CID
    devformat <disk>      Print the filesystem type on a disk (empty if unformatted)
    check                 Report vhost-vsock availability (JSON)
    version               Show version info
    help                  Show this help

OPTIONS:
    --device, -d <path>   vhost-vsock device (default: {DEFAULT_VHOST_VSOCK_DEVICE})
    --json                Print allocation details as JSON
    --hold                Keep the CID until stdin closes
    --verbose, -v         Enable debug logging

EXAMPLES:
    vsockcid allocate
    vsockcid allocate --json --hold < /run/guest.lock
    vsockcid devformat /dev/vdb
"#
    );
}

// =============================================================================
// Main
// =============================================================================

fn init_tracing(verbose: bool) {
    let level = if verbose { Level::DEBUG } else { Level::WARN };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .finish();
    // Ignore the error: a subscriber may already be installed.
    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn main() -> ExitCode {
    match parse_args() {
        Ok(cli) => {
            init_tracing(cli.verbose);

            let result = match cli.command {
                Command::Allocate { device, json, hold } => cmd_allocate(device, json, hold),
                Command::DevFormat { disk } => cmd_devformat(disk),
                Command::Check { device } => cmd_check(device),
                Command::Version => {
                    cmd_version();
                    Ok(())
                }
                Command::Help => {
                    cmd_help();
                    Ok(())
                }
            };

            match result {
                Ok(()) => ExitCode::SUCCESS,
                Err(e) => {
                    eprintln!("error: {}", e);
                    ExitCode::FAILURE
                }
            }
        }
        Err(e) => {
            eprintln!("error: {}", e);
            cmd_help();
            ExitCode::FAILURE
        }
    }
}
