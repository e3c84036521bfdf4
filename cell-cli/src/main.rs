//! Cellular modem command line tool
//!
//! Probes a modem over its AT port, reports SIM state and identification,
//! unlocks the SIM and negotiates power saving mode.

mod settings;

use std::sync::Arc;

use anyhow::{bail, Context};
use cell_at::{Connector, SimState};
use cell_device::{CellularDevice, DeviceConfig, SerialConnector};
use cell_sim::VirtualModem;
use clap::{Parser, Subcommand};
use settings::Settings;
use tracing_subscriber::EnvFilter;

/// Cellular modem control tool.
#[derive(Parser, Debug)]
#[command(name = "cellctl", about = "Probe and configure a cellular modem over AT commands")]
struct Cli {
    /// Serial port of the AT interface (defaults to the saved setting).
    #[arg(long)]
    port: Option<String>,

    /// Baud rate.
    #[arg(long)]
    baud: Option<u32>,

    /// AT exchange timeout in milliseconds.
    #[arg(long)]
    timeout_ms: Option<u64>,

    /// Log every AT line sent and received.
    #[arg(long, default_value_t = false)]
    modem_debug: bool,

    /// Talk to a virtual modem instead of a serial port.
    #[arg(long, default_value_t = false)]
    simulate: bool,

    /// Save the effective port/baud/timeout settings.
    #[arg(long, default_value_t = false)]
    save: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List serial ports.
    Ports,
    /// Check the modem answers and report the SIM state.
    Status,
    /// Report manufacturer, model, revision and IMEI.
    Info,
    /// Unlock the SIM.
    Pin {
        /// SIM PIN.
        pin: Option<String>,
    },
    /// Request power saving mode; both zero disables it.
    Psm {
        /// Periodic TAU in seconds.
        #[arg(long, default_value_t = 0)]
        periodic: u32,
        /// Active time in seconds.
        #[arg(long, default_value_t = 0)]
        active: u32,
    },
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("cellctl=info,cell_at=info,cell_device=info,cell_sim=info")
        }))
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::load();
    if let Some(port) = cli.port {
        settings.port = port;
    }
    if let Some(baud) = cli.baud {
        settings.baud_rate = baud;
    }
    if let Some(timeout_ms) = cli.timeout_ms {
        settings.timeout_ms = timeout_ms;
    }
    settings.modem_debug |= cli.modem_debug;

    if cli.save {
        let path = settings.save()?;
        tracing::info!("Saved settings to {}", path.display());
    }

    if let Command::Ports = cli.command {
        return list_ports();
    }

    let connector: Arc<dyn Connector> = if cli.simulate {
        Arc::new(VirtualModem::new())
    } else {
        Arc::new(SerialConnector::new(settings.baud_rate))
    };

    let config = DeviceConfig {
        default_transport: settings.port.as_str().into(),
        timeout_ms: settings.timeout_ms,
        modem_debug: settings.modem_debug,
    };
    let device = CellularDevice::new(config, connector)
        .with_context(|| format!("cannot open modem on {}", settings.port))?;

    device.is_ready().context("modem is not responding")?;

    match cli.command {
        Command::Ports => {}
        Command::Status => {
            let state = device.sim_state().context("SIM state query failed")?;
            println!("modem: ready");
            println!("sim:   {}", state);
        }
        Command::Info => {
            device.init_module()?;
            let Some(information) = device.open_information(None) else {
                bail!("information subsystem unavailable");
            };
            println!("manufacturer: {}", information.manufacturer()?);
            println!("model:        {}", information.model()?);
            println!("revision:     {}", information.revision()?);
            println!("imei:         {}", information.serial_number()?);
            device.close_information();
        }
        Command::Pin { pin } => {
            device.set_pin(pin.as_deref()).context("SIM unlock failed")?;
            let state = device.sim_state().unwrap_or(SimState::Unknown);
            println!("sim: {}", state);
        }
        Command::Psm { periodic, active } => {
            device
                .set_power_save_mode(periodic, active)
                .context("power saving mode request rejected")?;
            if periodic == 0 && active == 0 {
                println!("psm: disabled");
            } else {
                println!("psm: requested periodic {}s, active {}s", periodic, active);
            }
        }
    }

    Ok(())
}

fn list_ports() -> anyhow::Result<()> {
    let ports = serialport::available_ports().context("failed to enumerate ports")?;
    if ports.is_empty() {
        println!("no serial ports found");
    }
    for port in ports {
        match port.port_type {
            serialport::SerialPortType::UsbPort(usb) => println!(
                "{}  {:04x}:{:04x}  {}",
                port.port_name,
                usb.vid,
                usb.pid,
                usb.product.unwrap_or_default()
            ),
            _ => println!("{}", port.port_name),
        }
    }
    Ok(())
}
