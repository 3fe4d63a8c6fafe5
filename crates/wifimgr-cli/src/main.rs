//! wifimgr command-line tool.
//!
//! Drives a connection manager over the simulated driver and prints every
//! notification as one JSON line on stdout.

use std::net::IpAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::json;
use wifimgr_core::{
    CommandId, ControlCallbacks, MacAddr, ManagerConfig, Role, ScanEntry, ScanParams,
    StatusReport, WifiConfig, WifiManager, WifiMgrError,
};
use wifimgr_testing::{Completion, SimulatedDriver};

/// wifimgr - WiFi connection manager
#[derive(Parser, Debug)]
#[command(name = "wifimgr")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Steps to run in order, e.g. `open-sta scan connect:home:secret12 sta-status`
    #[arg(required = true)]
    steps: Vec<Step>,

    /// Manager config as JSON; missing fields take their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Number of random networks the simulated driver reports
    #[arg(long, default_value_t = 5)]
    networks: usize,

    /// Driver completion delay in milliseconds (0 completes inline)
    #[arg(long, default_value_t = 50)]
    delay_ms: u64,

    /// Status the simulated driver reports for connect requests
    #[arg(long, default_value_t = 0, allow_hyphen_values = true)]
    connect_status: i32,

    /// Time to let each step settle before the next one is queued
    #[arg(long, default_value_t = 200)]
    settle_ms: u64,

    /// Log as JSON instead of compact text
    #[arg(long)]
    json_logs: bool,
}

/// One step of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Step {
    OpenSta,
    CloseSta,
    Scan(u8),
    Connect { ssid: String, passphrase: String },
    Disconnect,
    StaConfig,
    StaStatus,
    OpenAp,
    CloseAp,
    StartAp {
        ssid: String,
        passphrase: String,
        channel: u8,
    },
    StopAp,
    ApConfig,
    ApStatus,
    DelStation(MacAddr),
    NotifyIp(IpAddr),
    Wait(Duration),
}

impl FromStr for Step {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        let (name, rest) = s.split_once(':').unwrap_or((s, ""));
        let mut args = rest.splitn(3, ':');
        let mut next = || args.next().unwrap_or("").to_string();
        let number = |v: String, what: &str| -> std::result::Result<u8, String> {
            if v.is_empty() {
                return Ok(0);
            }
            v.parse().map_err(|_| format!("invalid {what} '{v}'"))
        };

        let step = match name {
            "open-sta" => Step::OpenSta,
            "close-sta" => Step::CloseSta,
            "scan" => Step::Scan(number(next(), "channel")?),
            "connect" => {
                let ssid = next();
                if ssid.is_empty() {
                    return Err("connect needs an SSID: connect:<ssid>[:<passphrase>]".into());
                }
                Step::Connect {
                    ssid,
                    passphrase: next(),
                }
            }
            "disconnect" => Step::Disconnect,
            "sta-config" => Step::StaConfig,
            "sta-status" => Step::StaStatus,
            "open-ap" => Step::OpenAp,
            "close-ap" => Step::CloseAp,
            "start-ap" => {
                let ssid = next();
                if ssid.is_empty() {
                    return Err(
                        "start-ap needs an SSID: start-ap:<ssid>[:<passphrase>[:<channel>]]".into(),
                    );
                }
                let passphrase = next();
                Step::StartAp {
                    ssid,
                    passphrase,
                    channel: number(next(), "channel")?,
                }
            }
            "stop-ap" => Step::StopAp,
            "ap-config" => Step::ApConfig,
            "ap-status" => Step::ApStatus,
            "del-station" => {
                Step::DelStation(rest.parse().map_err(|e: WifiMgrError| e.to_string())?)
            }
            "notify-ip" => {
                Step::NotifyIp(rest.parse().map_err(|_| format!("invalid address '{rest}'"))?)
            }
            "wait" => {
                let ms: u64 = rest
                    .parse()
                    .map_err(|_| format!("invalid wait '{rest}', expected milliseconds"))?;
                Step::Wait(Duration::from_millis(ms))
            }
            other => return Err(format!("unknown step '{other}'")),
        };
        Ok(step)
    }
}

/// Prints notifications as JSON lines.
struct PrintCallbacks;

impl PrintCallbacks {
    fn emit(&self, value: serde_json::Value) {
        println!("{value}");
    }
}

impl ControlCallbacks for PrintCallbacks {
    fn config(&self, role: Role, config: &WifiConfig) {
        let mut shown = config.clone();
        if !shown.passphrase.is_empty() {
            shown.passphrase = "********".to_string();
        }
        self.emit(json!({ "notification": "config", "role": role, "config": shown }));
    }

    fn status(&self, status: &StatusReport) {
        self.emit(json!({ "notification": "status", "status": status }));
    }

    fn scan_result(&self, entry: &ScanEntry) {
        self.emit(json!({ "notification": "scan_result", "entry": entry }));
    }

    fn scan_done(&self, result: i32) {
        self.emit(json!({ "notification": "scan_done", "result": result }));
    }

    fn connect(&self, status: i32) {
        self.emit(json!({ "notification": "connect", "status": status }));
    }

    fn disconnect(&self, reason: i32) {
        self.emit(json!({ "notification": "disconnect", "reason": reason }));
    }

    fn new_station(&self, connected: bool, mac: MacAddr) {
        self.emit(json!({
            "notification": "new_station",
            "connected": connected,
            "mac": mac.to_string(),
        }));
    }

    fn ap_failure(&self, reason: i32) {
        self.emit(json!({ "notification": "ap_failure", "reason": reason }));
    }

    fn command_dropped(&self, id: CommandId, error: &WifiMgrError) {
        self.emit(json!({
            "notification": "command_dropped",
            "command": id.name(),
            "errno": error.errno(),
            "error": error.to_string(),
        }));
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("wifimgr=info"));

    if args.json_logs {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .compact()
            .init();
    }

    let config = load_config(args.config.as_deref())?;
    let completion = match args.delay_ms {
        0 => Completion::Immediate,
        ms => Completion::Delayed(Duration::from_millis(ms)),
    };
    let driver = SimulatedDriver::new()
        .with_completion(completion)
        .with_connect_status(args.connect_status)
        .with_random_networks(args.networks);

    let manager = WifiManager::new(Arc::new(driver), Arc::new(PrintCallbacks), config)
        .context("failed to start manager")?;

    let settle = Duration::from_millis(args.settle_ms);
    let outcome = run_steps(&manager, &args.steps, settle).await;

    manager.shutdown().await;
    outcome
}

/// Environment overrides win over the file.
fn load_config(path: Option<&std::path::Path>) -> Result<ManagerConfig> {
    let Some(path) = path else {
        return Ok(ManagerConfig::from_env());
    };
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let config = ManagerConfig::from_json_str(&text)
        .with_context(|| format!("invalid config in {}", path.display()))?;
    Ok(config.with_env_overrides())
}

async fn run_steps(manager: &WifiManager, steps: &[Step], settle: Duration) -> Result<()> {
    for step in steps {
        tracing::debug!(?step, "running step");
        match step {
            Step::OpenSta => manager.open_sta()?,
            Step::CloseSta => manager.close_sta()?,
            Step::Scan(channel) => manager.scan(ScanParams {
                channel: *channel,
                ..ScanParams::default()
            })?,
            Step::Connect { ssid, passphrase } => {
                manager.set_sta_config(WifiConfig::new(ssid).with_passphrase(passphrase))?;
                manager.connect()?;
            }
            Step::Disconnect => manager.disconnect()?,
            Step::StaConfig => manager.get_sta_config()?,
            Step::StaStatus => manager.get_sta_status()?,
            Step::OpenAp => manager.open_ap()?,
            Step::CloseAp => manager.close_ap()?,
            Step::StartAp {
                ssid,
                passphrase,
                channel,
            } => {
                manager.set_ap_config(
                    WifiConfig::new(ssid)
                        .with_passphrase(passphrase)
                        .with_channel(*channel),
                )?;
                manager.start_ap()?;
            }
            Step::StopAp => manager.stop_ap()?,
            Step::ApConfig => manager.get_ap_config()?,
            Step::ApStatus => manager.get_ap_status()?,
            Step::DelStation(mac) => manager.del_station(*mac)?,
            Step::NotifyIp(addr) => manager.notify_ip(*addr)?,
            Step::Wait(duration) => {
                tokio::time::sleep(*duration).await;
                continue;
            }
        }
        tokio::time::sleep(settle).await;
    }

    if !manager.is_running().await {
        bail!("manager worker stopped unexpectedly");
    }
    Ok(())
}
