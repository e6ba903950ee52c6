//! NScan command-line frontend.
//!
//! Thin presentation layer over [`ScanService`]: browse and search scan
//! history, inspect stored devices, delete data, and run a simulated
//! discovery pass end to end (the real Bluetooth/LAN drivers are platform
//! components and plug into the same [`nscan::ScanDriver`] contract).

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Result};
use chrono::{DateTime, Local, Utc};
use clap::{Parser, Subcommand};
use comfy_table::{presets::UTF8_FULL_CONDENSED, ContentArrangement, Table};
use nscan::{
    DeviceRecord, DeviceStore, DeviceTypeFilter, Discovery, DriverEvent, DriverKind, ScanConfig,
    ScanDriver, ScanService, ScriptedDriver, SessionId, SortOrder, TimeWindow,
};
use nscan_logging::{default_db_path, init_logging, LogConfig};
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "nscan", about = "Device discovery sessions: scan, persist, browse")]
struct Cli {
    /// Enable verbose logging (info/debug to stderr)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    /// Database path (defaults to ~/.nscan/nscan.sqlite3)
    #[arg(long, global = true, env = "NSCAN_DB")]
    db: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a discovery pass and persist it as a session
    Scan {
        /// Use the built-in simulated drivers (the only drivers shipped
        /// with the CLI)
        #[arg(long)]
        simulate: bool,
        /// Scan ceiling in seconds
        #[arg(long, default_value_t = 15)]
        duration_secs: u64,
    },
    /// List past scan sessions
    History {
        /// Time window: hour, today, week, all
        #[arg(long, default_value = "all")]
        window: String,
        /// Keep only devices matching this text (name, IP, or MAC)
        #[arg(long, default_value = "")]
        search: String,
        /// Sort order: asc or desc
        #[arg(long, default_value = "desc")]
        sort: SortOrder,
    },
    /// List stored devices
    Devices {
        /// Kind filter: all, bluetooth, lan
        #[arg(long, default_value = "all")]
        kind: DeviceTypeFilter,
        /// Sort order: asc or desc
        #[arg(long, default_value = "desc")]
        sort: SortOrder,
    },
    /// Show stored-device totals
    Stats,
    /// Delete one session and all its member devices
    DeleteSession {
        /// Session id (UUID)
        id: String,
    },
    /// Delete every stored session and device
    Wipe {
        /// Confirm the wipe
        #[arg(long)]
        yes: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    if let Err(e) = init_logging(LogConfig {
        app_name: "nscan",
        verbose: cli.verbose,
    }) {
        eprintln!("Failed to initialize logging: {e:#}");
        return ExitCode::FAILURE;
    }

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let db_path = cli.db.unwrap_or_else(default_db_path);
    let store = DeviceStore::open(&db_path).await;
    if let Some(err) = store.init_error() {
        bail!("Device store unavailable at {}: {err}", db_path.display());
    }
    let service = ScanService::new(store);

    match cli.command {
        Commands::Scan {
            simulate,
            duration_secs,
        } => cmd_scan(&service, simulate, duration_secs).await,
        Commands::History {
            window,
            search,
            sort,
        } => cmd_history(&service, &window, &search, sort).await,
        Commands::Devices { kind, sort } => cmd_devices(&service, kind, sort).await,
        Commands::Stats => cmd_stats(&service).await,
        Commands::DeleteSession { id } => {
            let id: SessionId = id.parse().map_err(anyhow::Error::msg)?;
            service.delete_session(&id).await?;
            println!("Deleted session {id}");
            Ok(())
        }
        Commands::Wipe { yes } => {
            if !yes {
                bail!("Refusing to wipe without --yes");
            }
            service.delete_all_data().await?;
            println!("All scan data deleted");
            Ok(())
        }
    }
}

async fn cmd_scan(service: &ScanService, simulate: bool, duration_secs: u64) -> Result<()> {
    if !simulate {
        bail!("Only --simulate is available in the CLI build; platform scan drivers attach through the library API");
    }

    let config = ScanConfig {
        max_scan_duration: Duration::from_secs(duration_secs),
        ..Default::default()
    };
    let mut handle = service
        .start_run(simulated_drivers(), config)
        .await
        .map_err(anyhow::Error::from)?;

    println!("Scanning (session {})...", handle.session_id());
    let mut scanning = handle.subscribe_scanning();
    // Wait for the run to start, then to end
    while !*scanning.borrow_and_update() {
        if scanning.changed().await.is_err() {
            break;
        }
    }
    while *scanning.borrow_and_update() {
        if scanning.changed().await.is_err() {
            break;
        }
    }

    while let Some(error) = handle.try_next_error() {
        eprintln!("scan warning: {error}");
    }
    let found = handle.device_count();
    let session_id = handle.wait().await;
    info!(session = %session_id, found, "Scan run complete");
    println!("Found {found} device(s)");

    let sessions = service
        .filtered_sessions(TimeWindow::LastHour, "", SortOrder::Descending)
        .await?;
    if let Some(latest) = sessions.iter().find(|s| s.session.id == session_id) {
        print_device_table(&latest.devices);
    }
    Ok(())
}

async fn cmd_history(
    service: &ScanService,
    window: &str,
    search: &str,
    sort: SortOrder,
) -> Result<()> {
    let window = parse_window(window)?;
    let sessions = service.filtered_sessions(window, search, sort).await?;
    if sessions.is_empty() {
        println!("No sessions match.");
        return Ok(());
    }

    let mut table = new_table(vec!["Session", "Started", "Duration", "Devices"]);
    let now = Utc::now();
    for snapshot in &sessions {
        let duration = snapshot.session.duration(now);
        table.add_row(vec![
            snapshot.session.id.to_string(),
            format_time(snapshot.session.started_at),
            format!("{}s", duration.num_seconds()),
            snapshot.member_count().to_string(),
        ]);
    }
    println!("{table}");
    Ok(())
}

async fn cmd_devices(service: &ScanService, kind: DeviceTypeFilter, sort: SortOrder) -> Result<()> {
    let devices = service
        .store()
        .devices_where(kind, TimeWindow::All, sort)
        .await?;
    if devices.is_empty() {
        println!("No devices stored.");
        return Ok(());
    }
    print_device_table(&devices);
    Ok(())
}

async fn cmd_stats(service: &ScanService) -> Result<()> {
    let stats = service.statistics().await?;
    println!("Total devices:     {}", stats.total_devices);
    println!("  Bluetooth:       {}", stats.bluetooth_devices);
    println!("  LAN:             {}", stats.lan_devices);
    Ok(())
}

fn parse_window(s: &str) -> Result<TimeWindow> {
    match s.to_lowercase().as_str() {
        "hour" => Ok(TimeWindow::LastHour),
        "today" => Ok(TimeWindow::Today),
        "week" => Ok(TimeWindow::LastWeek),
        "all" => Ok(TimeWindow::All),
        other => bail!("Invalid window: '{other}'. Expected: hour, today, week, or all"),
    }
}

fn new_table(header: Vec<&str>) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL_CONDENSED)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header);
    table
}

fn print_device_table(devices: &[DeviceRecord]) {
    let mut table = new_table(vec!["Kind", "Name", "Address", "Signal", "Discovered"]);
    for device in devices {
        let address = device
            .ip_address
            .clone()
            .or_else(|| device.radio_id.clone())
            .unwrap_or_default();
        let signal = device
            .rssi
            .map(|rssi| format!("{rssi} dBm"))
            .unwrap_or_else(|| "-".to_string());
        table.add_row(vec![
            device.kind.to_string(),
            device.name.clone().unwrap_or_else(|| "(unnamed)".to_string()),
            address,
            signal,
            format_time(device.discovered_at),
        ]);
    }
    println!("{table}");
}

fn format_time(at: DateTime<Utc>) -> String {
    at.with_timezone(&Local).format("%Y-%m-%d %H:%M:%S").to_string()
}

/// Deterministic stand-ins for the platform drivers: a handful of nearby
/// devices per channel, with a few duplicate advertisements thrown in.
fn simulated_drivers() -> Vec<Arc<dyn ScanDriver>> {
    let radio_script = vec![
        DriverEvent::ScanningChanged(true),
        DriverEvent::Discovered(Discovery::Radio {
            identifier: "4bf0f6f3-2c6a-4a5e-9f6e-2b6f36d1c001".into(),
            name: Some("Wireless Earbuds".into()),
            rssi: Some(-48),
            status: Some("advertising".into()),
        }),
        DriverEvent::Discovered(Discovery::Radio {
            identifier: "4bf0f6f3-2c6a-4a5e-9f6e-2b6f36d1c002".into(),
            name: Some("Fitness Tracker".into()),
            rssi: Some(-71),
            status: None,
        }),
        // Duplicate advertisement, weaker signal; dedup keeps the first
        DriverEvent::Discovered(Discovery::Radio {
            identifier: "4bf0f6f3-2c6a-4a5e-9f6e-2b6f36d1c001".into(),
            name: Some("Wireless Earbuds".into()),
            rssi: Some(-62),
            status: Some("advertising".into()),
        }),
    ];

    let network_script = vec![
        DriverEvent::ScanningChanged(true),
        DriverEvent::Discovered(Discovery::Network {
            ip: "192.168.1.1".into(),
            mac: Some("11:22:33:44:55:66".into()),
            name: Some("Router".into()),
        }),
        DriverEvent::Progress(0.5),
        DriverEvent::Discovered(Discovery::Network {
            ip: "192.168.1.23".into(),
            mac: Some("aa:bb:cc:dd:ee:ff".into()),
            name: Some("Printer".into()),
        }),
        DriverEvent::Progress(1.0),
    ];

    vec![
        Arc::new(ScriptedDriver::new(
            DriverKind::Radio,
            radio_script,
            Duration::from_millis(120),
        )),
        Arc::new(ScriptedDriver::new(
            DriverKind::Network,
            network_script,
            Duration::from_millis(150),
        )),
    ]
}
