use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser};
use rigflash_core::{HostnameMode, Settings, UpgradeOutcome, UpgradeRequest, EXIT_STOP};
use rigflash_platform::{AntminerPlatform, NandBackup, RandomHwId};
use rigflash_remote::{SshConnector, TcpPortWaiter};

mod logging;
mod render;
mod upgrade_flow;

use render::TerminalRenderer;
use upgrade_flow::{run_upgrade, Collaborators};

#[derive(Parser, Debug)]
#[command(name = "rigflash")]
#[command(about = "Replace stock miner firmware over SSH", long_about = None)]
struct Cli {
    #[command(flatten)]
    upgrade: UpgradeArgs,
    #[arg(
        long,
        value_name = "PATH",
        help = "TOML settings file; built-in defaults are used when omitted"
    )]
    config: Option<PathBuf>,
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Args, Debug)]
struct UpgradeArgs {
    #[arg(help = "Hostname of the miner running the stock firmware")]
    hostname: String,
    #[arg(long, help = "Back up the miner before upgrading")]
    backup: bool,
    #[arg(long, help = "Skip the full NAND dump (configuration is still backed up)")]
    no_nand_backup: bool,
    #[arg(
        long,
        value_name = "VALUE",
        num_args = 0..=1,
        help = "Username and worker name for the default pool"
    )]
    pool_user: Option<Option<String>>,
    #[arg(
        long,
        value_name = "N",
        num_args = 0..=1,
        help = "PSU power limit in watts; 0 disables autotuning"
    )]
    psu_power_limit: Option<Option<u32>>,
    #[arg(long, help = "Do not keep the network configuration (use DHCP)")]
    no_keep_network: bool,
    #[arg(long, help = "Do not keep the pool configuration")]
    no_keep_pools: bool,
    #[arg(
        long,
        conflicts_with = "keep_hostname",
        help = "Generate a new hostname from the MAC address"
    )]
    no_keep_hostname: bool,
    #[arg(long, help = "Keep any hostname, including a factory one")]
    keep_hostname: bool,
    #[arg(long, help = "Do not wait until the miner is back online")]
    no_wait: bool,
    #[arg(long, help = "Run every upgrade step without flashing")]
    dry_run: bool,
    #[arg(
        long,
        value_name = "PATH",
        num_args = 0..=1,
        help = "Directory with a stage3.sh script run after the first boot"
    )]
    post_upgrade: Option<Option<PathBuf>>,
}

impl UpgradeArgs {
    fn into_request(self) -> UpgradeRequest {
        UpgradeRequest {
            backup: self.backup,
            nand_backup: !self.no_nand_backup,
            pool_user: self.pool_user.flatten().filter(|value| !value.is_empty()),
            psu_power_limit: self.psu_power_limit.flatten(),
            keep_network: !self.no_keep_network,
            keep_pools: !self.no_keep_pools,
            keep_hostname: HostnameMode::from_flags(self.keep_hostname, self.no_keep_hostname),
            wait: !self.no_wait,
            dry_run: self.dry_run,
            post_upgrade: self.post_upgrade.flatten(),
            ..UpgradeRequest::new(self.hostname)
        }
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_tracing(cli.verbose);
    let renderer = TerminalRenderer::current();

    let settings = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => settings,
        Err(err) => {
            renderer.fail(&format!("{err:#}"));
            return ExitCode::from(EXIT_STOP as u8);
        }
    };
    let request = cli.upgrade.into_request();

    let connector = SshConnector::new(
        settings.ssh_port,
        settings.connect_timeout(),
        settings.identity_file.clone(),
    );
    let platform = AntminerPlatform::default();
    let backup = NandBackup {
        nand: request.nand_backup,
    };
    let deps = Collaborators {
        connector: &connector,
        platform: &platform,
        backup: &backup,
        identity: &RandomHwId,
        waiter: &TcpPortWaiter,
    };

    let outcome = run_upgrade(&request, &settings, &deps, renderer);
    report_outcome(renderer, &outcome);
    ExitCode::from(outcome.exit_code() as u8)
}

fn report_outcome(renderer: TerminalRenderer, outcome: &UpgradeOutcome) {
    match outcome {
        UpgradeOutcome::Success | UpgradeOutcome::DryRunSuccess => {}
        UpgradeOutcome::IncompatibleTarget { board_name } => {
            renderer.fail(&format!("Unsupported board '{board_name}'"));
        }
        UpgradeOutcome::PostUpgradeBundleMissing { reason } => {
            renderer.fail(reason);
        }
        UpgradeOutcome::Fatal(err) => renderer.fail(&err.to_string()),
    }
}
