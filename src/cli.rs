/*!
Command-line front end.

Every command prints pretty JSON on stdout; logs go to stderr.
*/

use std::{
    net::IpAddr,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use serde::Serialize;
use tokio::sync::watch;

use crate::{
    config::EngineConfig,
    parsers::bundle::SnapshotBundle,
    topology::{FileSnapshotSource, SnapshotStore, SnapshotWatcher},
    trace::TraceRequest,
};

#[derive(Debug, PartialEq, Eq)]
pub enum CliCommand {
    Classify {
        bundle: PathBuf,
    },
    Trace {
        bundle: PathBuf,
        request: TraceRequest,
    },
    Watch {
        bundle: Option<PathBuf>,
    },
    Help,
    Version,
}

pub fn version_text() -> String {
    format!("fabric-trace {}", env!("CARGO_PKG_VERSION"))
}

pub fn usage_text() -> String {
    format!(
        "{version}
Leaf/spine topology inference and path tracing

Usage:
  fabric-trace classify <BUNDLE>
  fabric-trace trace <BUNDLE> <SRC-IP> <SRC-VRF> <DST-IP> [DST-VRF] [--vrf-override <VRF>]
  fabric-trace watch [BUNDLE]
  fabric-trace --help
  fabric-trace --version

Options:
      --vrf-override <VRF>  Trace: run both ends in this VRF, without auto-correction
  -h, --help                Show this help text
  -V, --version             Show version

Environment:
  FABRIC_SNAPSHOT_PATH      Bundle watched when `watch` has no BUNDLE argument
  FABRIC_POLL_INTERVAL      Watch polling interval (default: 60s)
  RUST_LOG                  Log filter (default: fabric_trace=info)",
        version = version_text()
    )
}

fn parse_ip(what: &str, raw: &str) -> Result<IpAddr> {
    raw.parse::<IpAddr>().map_err(|_| {
        anyhow::anyhow!(
            "Invalid {}: '{}'. Expected an IPv4 or IPv6 address.\n\n{}",
            what,
            raw,
            usage_text()
        )
    })
}

pub fn parse_cli_args<I, S>(args: I) -> Result<CliCommand>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut iter = args.into_iter();
    let _program_name = iter.next();

    let mut positional: Vec<String> = Vec::new();
    let mut vrf_override: Option<String> = None;

    while let Some(arg) = iter.next() {
        let arg = arg.as_ref();
        match arg {
            "-h" | "--help" => return Ok(CliCommand::Help),
            "-V" | "--version" => return Ok(CliCommand::Version),
            "--vrf-override" => {
                let value = iter.next().ok_or_else(|| {
                    anyhow::anyhow!("Missing value for --vrf-override.\n\n{}", usage_text())
                })?;
                vrf_override = Some(value.as_ref().to_string());
            }
            _ if arg.starts_with("--vrf-override=") => {
                let value = arg.split_once('=').map(|(_, v)| v).unwrap_or_default();
                if value.is_empty() {
                    return Err(anyhow::anyhow!(
                        "Missing value for --vrf-override.\n\n{}",
                        usage_text()
                    ));
                }
                vrf_override = Some(value.to_string());
            }
            _ if arg.starts_with('-') => {
                return Err(anyhow::anyhow!("Unknown argument: {arg}\n\n{}", usage_text()));
            }
            _ => positional.push(arg.to_string()),
        }
    }

    let Some((command, rest)) = positional.split_first() else {
        return Ok(CliCommand::Help);
    };
    if vrf_override.is_some() && command != "trace" {
        return Err(anyhow::anyhow!(
            "--vrf-override is only valid with trace.\n\n{}",
            usage_text()
        ));
    }

    match (command.as_str(), rest) {
        ("classify", [bundle]) => Ok(CliCommand::Classify {
            bundle: PathBuf::from(bundle),
        }),
        ("trace", [bundle, src_ip, src_vrf, dst_ip, dst_vrf @ ..]) if dst_vrf.len() <= 1 => {
            let mut request = TraceRequest::new(
                parse_ip("source address", src_ip)?,
                src_vrf,
                parse_ip("destination address", dst_ip)?,
                dst_vrf.first().map(String::as_str),
            );
            if let Some(vrf) = &vrf_override {
                request = request.with_vrf_override(vrf);
            }
            Ok(CliCommand::Trace {
                bundle: PathBuf::from(bundle),
                request,
            })
        }
        ("watch", []) => Ok(CliCommand::Watch { bundle: None }),
        ("watch", [bundle]) => Ok(CliCommand::Watch {
            bundle: Some(PathBuf::from(bundle)),
        }),
        ("classify" | "trace" | "watch", _) => Err(anyhow::anyhow!(
            "Wrong number of arguments for {}.\n\n{}",
            command,
            usage_text()
        )),
        _ => Err(anyhow::anyhow!("Unknown command: {command}\n\n{}", usage_text())),
    }
}

/// Parses `args` and runs the command.
pub async fn run<I, S>(args: I, config: EngineConfig) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let command = parse_cli_args(args)?;
    execute_command(command, config).await
}

pub async fn execute_command(command: CliCommand, config: EngineConfig) -> Result<()> {
    match command {
        CliCommand::Help => {
            println!("{}", usage_text());
            Ok(())
        }
        CliCommand::Version => {
            println!("{}", version_text());
            Ok(())
        }
        CliCommand::Classify { bundle } => {
            let store = load_store(&bundle, config).await?;
            print_json(&store.classify()?)
        }
        CliCommand::Trace { bundle, request } => {
            let store = load_store(&bundle, config).await?;
            print_json(&store.trace_path(&request)?)
        }
        CliCommand::Watch { bundle } => {
            let bundle = bundle
                .or_else(|| config.snapshot_path.clone())
                .context("watch needs a BUNDLE argument or FABRIC_SNAPSHOT_PATH")?;
            watch_bundle(bundle, config).await
        }
    }
}

async fn load_store(path: &Path, config: EngineConfig) -> Result<SnapshotStore> {
    let bundle = SnapshotBundle::load(path)
        .await
        .with_context(|| format!("Failed to load bundle {}", path.display()))?;
    let store = SnapshotStore::new(config)?;
    store.publish(bundle);
    Ok(store)
}

/// Prints a classification report for every generation until Ctrl-C.
async fn watch_bundle(path: PathBuf, config: EngineConfig) -> Result<()> {
    let store = Arc::new(SnapshotStore::new(config)?);
    let watcher = SnapshotWatcher::new(FileSnapshotSource::new(path), Arc::clone(&store));
    let mut generations = watcher.subscribe();
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handle = tokio::spawn(watcher.run(shutdown_rx));

    loop {
        tokio::select! {
            changed = generations.changed() => {
                if changed.is_err() {
                    break;
                }
                if generations.borrow_and_update().is_some() {
                    print_json(&store.classify()?)?;
                }
            }
            signal = tokio::signal::ctrl_c() => {
                signal.context("Failed to listen for Ctrl-C")?;
                tracing::info!("Interrupted, shutting down");
                break;
            }
        }
    }

    shutdown_tx.send_replace(true);
    handle.await.context("Watcher task failed")?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_help_and_version() {
        assert_eq!(parse_cli_args(["fabric-trace", "--help"]).unwrap(), CliCommand::Help);
        assert_eq!(parse_cli_args(["fabric-trace", "-V"]).unwrap(), CliCommand::Version);
        assert_eq!(parse_cli_args(["fabric-trace"]).unwrap(), CliCommand::Help);
    }

    #[test]
    fn test_trace_arguments() {
        let parsed = parse_cli_args([
            "fabric-trace",
            "trace",
            "bundle.json",
            "172.16.1.10",
            "tenant-1",
            "172.16.2.40",
            "tenant-2",
        ])
        .unwrap();
        let expected = TraceRequest::new(
            "172.16.1.10".parse().unwrap(),
            "tenant-1",
            "172.16.2.40".parse().unwrap(),
            Some("tenant-2"),
        );
        assert_eq!(
            parsed,
            CliCommand::Trace {
                bundle: PathBuf::from("bundle.json"),
                request: expected,
            }
        );
    }

    #[test]
    fn test_trace_with_override() {
        let parsed = parse_cli_args([
            "fabric-trace",
            "trace",
            "--vrf-override=tenant-2",
            "bundle.json",
            "172.16.1.10",
            "tenant-1",
            "172.16.2.40",
        ])
        .unwrap();
        let CliCommand::Trace { request, .. } = parsed else {
            panic!("expected a trace command");
        };
        assert_eq!(request.vrf_override.as_deref(), Some("tenant-2"));
        assert_eq!(request.dst_vrf, None);
    }

    #[test]
    fn test_invalid_arguments() {
        assert!(parse_cli_args(["fabric-trace", "trace", "b.json", "not-an-ip", "v", "10.0.0.1"]).is_err());
        assert!(parse_cli_args(["fabric-trace", "classify"]).is_err());
        assert!(parse_cli_args(["fabric-trace", "classify", "b.json", "--vrf-override", "x"]).is_err());
        assert!(parse_cli_args(["fabric-trace", "frobnicate"]).is_err());
        assert!(parse_cli_args(["fabric-trace", "watch", "--bogus"]).is_err());
    }

    #[test]
    fn test_watch_bundle_is_optional() {
        assert_eq!(
            parse_cli_args(["fabric-trace", "watch"]).unwrap(),
            CliCommand::Watch { bundle: None }
        );
    }

    #[tokio::test]
    async fn test_classify_command_runs_on_fixture() {
        let path = PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("test_data/fabric_snapshot.json");
        let command = CliCommand::Classify { bundle: path };
        execute_command(command, EngineConfig::default()).await.unwrap();
    }
}
