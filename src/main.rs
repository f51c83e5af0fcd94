use std::fs::File;
use std::path::PathBuf;
use std::time::Duration;

use port_reach_rs::config::{self, ProbeConfig, ScanConfig, ENV_DEBUG, ENV_SERVICE_HOST, ENV_SERVICE_PATH};
use port_reach_rs::portlist::PortList;
use port_reach_rs::prober::Prober;
use port_reach_rs::types::{ScanReport, Verdict};
use port_reach_rs::{firewall, logging, netdetect, ports, scanner, server};

use anyhow::{bail, Context, Result};
use clap::builder::FalseyValueParser;
use clap::Parser;
use tracing::{info, warn};

/// port-reach-rs: check whether local TCP/UDP ports are reachable from outside.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "port-reach-rs",
    version,
    about = "Open transient listeners on local ports and ask an external service whether they are reachable.",
    long_about = None
)]
struct Cli {
    /// Local IPv4 address to listen on. Defaults to the first non-loopback address.
    #[arg(long)]
    host: Option<String>,

    /// Path to ports file (`[tcp|udp] <port-or-range>` per line).
    #[arg(long)]
    ports: Option<PathBuf>,

    /// Port to check, e.g. `8080`, `udp:53`, `tcp:8000-8010`. Repeatable.
    #[arg(long = "port", value_name = "SPEC")]
    port: Vec<String>,

    /// Reachability service host (and optional :port).
    #[arg(long, env = ENV_SERVICE_HOST, default_value = "")]
    service_host: String,

    /// Reachability service path prefix.
    #[arg(long, env = ENV_SERVICE_PATH, default_value = "")]
    service_path: String,

    /// How long each listener waits for a peer, in milliseconds.
    #[arg(long = "listen-timeout-ms", default_value_t = 3000)]
    listen_timeout_ms: u64,

    /// Timeout for each reachability request, in milliseconds.
    #[arg(long = "probe-timeout-ms", default_value_t = 10_000)]
    probe_timeout_ms: u64,

    /// Maximum number of ports across both protocols.
    #[arg(long = "max-ports", default_value_t = 128)]
    max_ports: usize,

    /// Write the report as pretty JSON to this path (optional).
    #[arg(long)]
    output: Option<PathBuf>,

    /// Serve the HTTP control API on this address instead of scanning once.
    #[arg(long = "serve-ui", value_name = "BIND")]
    serve_ui: Option<String>,

    /// Verbose logging, also written to the log file. `DEBUG=True` works too.
    #[arg(long, env = ENV_DEBUG, value_parser = FalseyValueParser::new())]
    debug: bool,

    /// Log file used in debug mode.
    #[arg(long = "log-file", default_value = logging::DEFAULT_LOG_FILE)]
    log_file: PathBuf,

    /// Skip the start-up probe that triggers the OS firewall prompt.
    #[arg(long = "no-firewall-prompt", default_value_t = false)]
    no_firewall_prompt: bool,

    /// Print local IPv4 addresses and exit.
    #[arg(long = "list-interfaces", default_value_t = false)]
    list_interfaces: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let dotenv = config::load_dotenv();
    let cli = Cli::parse();
    logging::init_logging(cli.debug, cli.debug.then_some(cli.log_file.as_path()))?;
    if cli.debug {
        info!("Running in debug mode");
    }
    if let Some(path) = dotenv {
        info!("Loaded environment from {}", path.display());
    }

    if cli.list_interfaces {
        for ip in netdetect::local_ipv4_addrs()? {
            println!("{ip}");
        }
        return Ok(());
    }

    let probe = ProbeConfig::new(cli.service_host.clone(), cli.service_path.clone())
        .with_timeout(Duration::from_millis(cli.probe_timeout_ms));
    if !probe.is_configured() {
        bail!("no reachability service configured (set --service-host or {ENV_SERVICE_HOST})");
    }
    let mut config = ScanConfig::new(probe);
    config.listen_timeout = Duration::from_millis(cli.listen_timeout_ms);
    config.max_ports = cli.max_ports;
    let prober = Prober::new(config.probe.clone());

    let host = match cli.host.as_deref() {
        Some(h) => netdetect::parse_host(h)?,
        None => netdetect::default_host(),
    };

    let mut list = PortList::new(config.max_ports);
    if let Some(path) = cli.ports.as_deref() {
        ports::load_ports_from_path(path, &mut list, config.max_range)?;
    }
    for arg in &cli.port {
        let (protocol, spec) = ports::parse_port_arg(arg).with_context(|| format!("--port {arg}"))?;
        if let Err(e) = list.add_input(protocol, spec, config.max_range) {
            warn!("Skipping --port {arg}: {e}");
        }
    }

    println!("port-reach-rs configuration:");
    println!("  host         : {host}");
    println!(
        "  service      : http://{}/{}",
        config.probe.service_host,
        config.probe.service_path.trim_matches('/')
    );
    println!("  tcp ports    : {}", list.ports().tcp.len());
    println!("  udp ports    : {}", list.ports().udp.len());
    println!("  listen (ms)  : {}", cli.listen_timeout_ms);
    println!("  probe (ms)   : {}", cli.probe_timeout_ms);

    if !cli.no_firewall_prompt {
        firewall::trigger_firewall_prompt(&config, &prober, list.ports());
    }

    if let Some(bind) = cli.serve_ui.as_deref() {
        let state = server::AppState::new(list, config);
        println!("Control API at http://{bind}/api (Ctrl+C to stop)");
        tokio::select! {
            res = server::spawn_server(bind, state) => res?,
            _ = tokio::signal::ctrl_c() => {}
        }
        return Ok(());
    }

    if list.is_empty() {
        bail!("no ports to check (use --ports or --port)");
    }

    let handle = scanner::spawn_scan(list.snapshot(), host, config, prober);
    let stop = handle.stop_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl+C received; waiting for launched checks to finish");
            stop.cancel();
        }
    });
    let report = handle.finished().await?;

    print_results_table(&list, &report);
    if let Some(path) = cli.output.as_deref() {
        if let Err(e) = write_report_json(path, &report) {
            eprintln!("Failed to write JSON to {}: {}", path.display(), e);
        } else {
            println!("Wrote JSON report to {}", path.display());
        }
    }

    Ok(())
}

/// Print rows in the list's display order.
fn print_results_table(list: &PortList, report: &ScanReport) {
    println!(
        "\nOpen: {}  Closed: {}  (host {})",
        report.open.len(),
        report.closed.len(),
        report.host
    );
    println!("{:>5}  {:<8}  {:<7}", "port", "protocol", "status");
    println!("{:-<5}  {:-<8}  {:-<7}", "", "", "");
    for (protocol, port) in list.ports().iter() {
        let status = match report.verdict_of(protocol, port) {
            Some(Verdict::Open) => "open",
            Some(Verdict::Closed) => "closed",
            None => "unknown",
        };
        println!(
            "{:>5}  {:<8}  {:<7}",
            port,
            protocol.as_str().to_uppercase(),
            status
        );
    }
}

fn write_report_json(path: &std::path::Path, report: &ScanReport) -> anyhow::Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, report)?;
    Ok(())
}
