use clap::{Args, Parser, Subcommand};
use color_eyre::eyre::{Result, WrapErr};
use ferrovia_bmc::{configure_vlan_and_boot, connect, BmcProtocol, RedfishConfig, DEFAULT_REDFISH_PORT};
use ferrovia_server::{ServerConfig, ServiceRunner};
use std::io::stderr;
use std::path::PathBuf;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, registry, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about = "Bare-metal ESXi provisioning", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output - shows more detailed logs
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the TFTP and kickstart services
    Serve(ServeArgs),
    /// Control a server through its BMC (Redfish)
    Bmc(BmcArgs),
}

#[derive(Args, Debug)]
struct ServeArgs {
    /// YAML configuration file
    #[arg(short, long, env = "FERROVIA_CONFIG", default_value = "ferrovia.yaml")]
    config: PathBuf,
}

#[derive(Args, Debug)]
struct BmcArgs {
    /// BMC address, either a bare host or https://host:port
    #[arg(short = 'H', long, global = true, env = "FERROVIA_BMC_HOST")]
    host: Option<String>,

    #[arg(short, long, global = true, env = "FERROVIA_BMC_USERNAME")]
    username: Option<String>,

    #[arg(short, long, global = true, env = "FERROVIA_BMC_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[arg(long, global = true, default_value_t = DEFAULT_REDFISH_PORT)]
    port: u16,

    #[command(subcommand)]
    action: BmcAction,
}

#[derive(Subcommand, Debug)]
enum BmcAction {
    /// List network interfaces known to the BMC
    Interfaces {
        /// Include interfaces without link
        #[arg(short = 'A', long)]
        all: bool,
    },
    /// Set the BIOS network boot VLAN
    SetVlanId { vlan_id: u16 },
    /// Boot from UEFI HTTP on the next boot
    SetOneTimeBoot,
    /// Hard reset the server
    Reboot,
    /// Power the server on
    Start,
    /// Hard power off the server
    Stop,
    /// Set the VLAN, arm HTTP boot and reboot
    SetVlanReboot { vlan_id: u16 },
}

impl BmcArgs {
    fn protocol(&self) -> BmcProtocol {
        let (host, port) = split_host_port(self.host.as_deref().unwrap_or_default(), self.port);
        BmcProtocol::Redfish(RedfishConfig::new(
            host,
            port,
            self.username.clone().unwrap_or_default(),
            self.password.clone().unwrap_or_default(),
        ))
    }
}

/// Accept `host`, `host:port` or `https://host:port`
fn split_host_port(address: &str, default_port: u16) -> (&str, u16) {
    let address = address.trim().trim_start_matches("https://").trim_end_matches('/');
    match address.rsplit_once(':') {
        Some((host, port)) if !host.contains(':') => match port.parse() {
            Ok(port) => (host, port),
            Err(_) => (address, default_port),
        },
        _ => (address, default_port),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    // Respect RUST_LOG, fall back to verbose/info for our crates
    let level = if cli.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "ferrovia={level},ferrovia_server={level},ferrovia_tftp={level},ferrovia_boot={level},ferrovia_bmc={level},hyper=warn,reqwest=warn,tower_http=warn,minijinja=warn",
            level = level
        ))
    });
    registry().with(filter).with(fmt::layer().with_writer(stderr)).init();

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Bmc(args) => bmc(args).await,
    }
}

async fn serve(args: ServeArgs) -> Result<()> {
    let config = ServerConfig::load(&args.config)
        .wrap_err_with(|| format!("Failed to load {}", args.config.display()))?;
    let runner = ServiceRunner::new(config).wrap_err("Failed to load inventory")?;

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let handles = runner.start(shutdown_rx).await.wrap_err("Failed to start services")?;
    info!(tftp = %handles.tftp_addr, http = %handles.http_addr, "ferrovia started, press Ctrl+C to stop");

    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Ctrl+C received, shutting down"),
            Err(e) => error!("Failed to listen for Ctrl+C: {}", e),
        }
        let _ = shutdown_tx.send(true);
    });

    handles.join().await?;
    info!("Shutdown complete");
    Ok(())
}

async fn bmc(args: BmcArgs) -> Result<()> {
    let controller = connect(args.protocol())?;

    match args.action {
        BmcAction::Interfaces { all } => {
            let interfaces = controller.get_host_config(!all).await?;
            println!("{}", serde_json::to_string_pretty(&interfaces)?);
        }
        BmcAction::SetVlanId { vlan_id } => {
            controller.set_vlan_id(vlan_id).await?;
            println!("VLAN ID set to {}", vlan_id);
        }
        BmcAction::SetOneTimeBoot => {
            controller.set_one_time_http_boot().await?;
            println!("One-time HTTP boot armed");
        }
        BmcAction::Reboot => {
            controller.reboot_server().await?;
            println!("Server rebooting");
        }
        BmcAction::Start => {
            controller.start_server().await?;
            println!("Server powering on");
        }
        BmcAction::Stop => {
            controller.stop_server().await?;
            println!("Server powering off");
        }
        BmcAction::SetVlanReboot { vlan_id } => {
            configure_vlan_and_boot(controller.as_ref(), vlan_id).await?;
            println!("VLAN ID set to {}, HTTP boot armed, server rebooting", vlan_id);
        }
    }
    Ok(())
}
