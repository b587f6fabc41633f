use std::path::Path;

use chrono::Local;
use rigflash_core::{
    assess_board_name, shell_quote, CompatibilityReport, Settings, Stage1Args, StopReason,
    UpgradeError, UpgradeOutcome, UpgradeRequest, BOARD_NAME_PATH, REMOTE_TARGET_DIR, USERNAME,
};
use rigflash_payload::{write_stage3_archive, PayloadError, StagedPayload, STAGE3_FILE};
use rigflash_platform::{
    backup_output_dir, read_mac, Backup, IdentityProvider, Platform, PlatformError,
};
use rigflash_remote::{
    local_tree_size, remote_join, upload_tree, Connector, PortWaiter, ReconnectWindow,
    RemoteFiles, RemoteSession, SessionGuard, WaitStatus,
};
use tracing::{debug, warn};

use crate::render::TerminalRenderer;

const REBOOT_COMMAND: &str = "/sbin/reboot";
const NO_WAIT_GRACE_SECS: u64 = 120;

pub(crate) struct Collaborators<'a> {
    pub(crate) connector: &'a dyn Connector,
    pub(crate) platform: &'a dyn Platform,
    pub(crate) backup: &'a dyn Backup,
    pub(crate) identity: &'a dyn IdentityProvider,
    pub(crate) waiter: &'a dyn PortWaiter,
}

enum StageResult {
    Upgraded { stdout: String },
    DryRun,
    ScriptFailed { status: i32, stderr: String },
}

pub(crate) fn run_upgrade(
    request: &UpgradeRequest,
    settings: &Settings,
    deps: &Collaborators<'_>,
    renderer: TerminalRenderer,
) -> UpgradeOutcome {
    match execute(request, settings, deps, renderer) {
        Ok(()) => UpgradeOutcome::Success,
        Err(err) => UpgradeOutcome::from(err),
    }
}

fn execute(
    request: &UpgradeRequest,
    settings: &Settings,
    deps: &Collaborators<'_>,
    renderer: TerminalRenderer,
) -> Result<(), UpgradeError> {
    let payload = StagedPayload::resolve(
        &settings.firmware_dir,
        &settings.post_upgrade_dir,
        request.post_upgrade.as_deref(),
    )
    .map_err(payload_error)?;

    renderer.step("Connecting to remote host...");
    let mut guard = SessionGuard::acquire(deps.connector, &request.hostname, USERNAME)
        .map_err(UpgradeError::Transport)?;

    run_remote_stages(&mut *guard, request, settings, &payload, deps, renderer)?;

    if let Err(err) = guard.release() {
        warn!(error = %format!("{err:#}"), "session teardown after reboot failed");
    }

    if request.wait {
        wait_for_reboot(&request.hostname, settings, deps.waiter, renderer);
    } else {
        renderer.warn(&format!(
            "Wait for {NO_WAIT_GRACE_SECS} seconds before the system becomes fully operational!"
        ));
    }
    Ok(())
}

fn run_remote_stages(
    session: &mut dyn RemoteSession,
    request: &UpgradeRequest,
    settings: &Settings,
    payload: &StagedPayload,
    deps: &Collaborators<'_>,
    renderer: TerminalRenderer,
) -> Result<(), UpgradeError> {
    check_compatibility(session, renderer)?;

    if request.backup {
        run_backup(session, settings, deps.backup, renderer)?;
    }

    let result = match flash(session, request, settings, payload, deps, renderer) {
        Ok(result) => result,
        Err(err) => {
            cleanup(session, deps.platform, renderer);
            return Err(err);
        }
    };

    match result {
        StageResult::ScriptFailed { status, stderr } => {
            cleanup(session, deps.platform, renderer);
            renderer.fail("Error log:");
            renderer.echo(stderr.lines());
            Err(StopReason::RemoteScriptFailed { status }.into())
        }
        StageResult::DryRun => {
            cleanup(session, deps.platform, renderer);
            renderer.done("Dry run of upgrade was successful!");
            Err(StopReason::DryRunComplete.into())
        }
        StageResult::Upgraded { stdout } => {
            renderer.echo(stdout.lines());
            renderer.done("Upgrade was successful!");
            renderer.step("Rebooting...");
            reboot(session);
            Ok(())
        }
    }
}

fn check_compatibility(
    session: &mut dyn RemoteSession,
    renderer: TerminalRenderer,
) -> Result<(), UpgradeError> {
    let contents = session
        .open(BOARD_NAME_PATH)
        .map_err(UpgradeError::Transport)?
        .map(|raw| String::from_utf8_lossy(&raw).into_owned());

    match assess_board_name(contents.as_deref()) {
        CompatibilityReport::Compatible => Ok(()),
        CompatibilityReport::Incompatible {
            board_name,
            native_upgrade,
        } => {
            renderer.fail(&format!(
                "This tool cannot be used for remote target with board name '{board_name}'!"
            ));
            if native_upgrade {
                renderer.echo([
                    "Remote target is running the new firmware already and should be upgraded as follows:",
                    "- from standard web interface",
                    "- from command line with 'opkg' utility",
                ]);
            }
            Err(StopReason::IncompatibleTarget { board_name }.into())
        }
    }
}

fn run_backup(
    session: &mut dyn RemoteSession,
    settings: &Settings,
    backup: &dyn Backup,
    renderer: TerminalRenderer,
) -> Result<(), UpgradeError> {
    renderer.step("Backing up miner...");
    let mac = read_mac(session)
        .map_err(UpgradeError::Transport)?
        .ok_or(StopReason::MacUnavailable)?;
    let output_dir = backup_output_dir(&settings.backup_root, &mac, Local::now().naive_local());
    let captured = backup
        .backup(session, &output_dir, &mac)
        .map_err(UpgradeError::Transport)?;
    if !captured {
        return Err(StopReason::BackupFailed.into());
    }
    renderer.done(&format!("Backup stored in '{}'", output_dir.display()));
    Ok(())
}

fn flash(
    session: &mut dyn RemoteSession,
    request: &UpgradeRequest,
    settings: &Settings,
    payload: &StagedPayload,
    deps: &Collaborators<'_>,
    renderer: TerminalRenderer,
) -> Result<StageResult, UpgradeError> {
    let target = shell_quote(REMOTE_TARGET_DIR);
    run_checked(session, &format!("rm -fr {target}"))?;
    run_checked(session, &format!("mkdir -p {target}"))?;

    renderer.step("Preparing remote system...");
    let installed = deps
        .platform
        .prepare_system(session, &settings.system_dir)
        .map_err(platform_error)?;
    if !installed.is_empty() {
        debug!(utilities = ?installed, "remote utilities installed");
    }

    let mut files = session.open_sftp().map_err(UpgradeError::Transport)?;
    renderer.step("Uploading firmware...");
    upload_firmware(&mut *files, &payload.firmware_dir, renderer)?;

    if let Some(bundle) = &payload.post_upgrade {
        renderer.step("Uploading post-upgrade (stage3)...");
        let staging = tempfile::tempdir().map_err(|err| {
            UpgradeError::from(StopReason::LocalPayload(format!(
                "failed to create stage3 staging directory: {err}"
            )))
        })?;
        let archive = staging.path().join(STAGE3_FILE);
        let size = write_stage3_archive(bundle, &archive).map_err(|err| {
            UpgradeError::from(StopReason::LocalPayload(format!("{err:#}")))
        })?;
        let remote = remote_join(REMOTE_TARGET_DIR, Path::new(STAGE3_FILE));
        upload_file(&mut *files, &archive, &remote, size, renderer)?;
    }
    drop(files);

    let hw_id = deps.identity.generate();
    let command = Stage1Args::from_request(request, hw_id).command(REMOTE_TARGET_DIR);

    renderer.step("Upgrading firmware...");
    let output = session.run(&command).map_err(UpgradeError::Transport)?;
    if !output.success() {
        return Ok(StageResult::ScriptFailed {
            status: output.exit_status,
            stderr: output.stderr,
        });
    }
    if request.dry_run {
        return Ok(StageResult::DryRun);
    }
    Ok(StageResult::Upgraded {
        stdout: output.stdout,
    })
}

fn upload_firmware(
    files: &mut dyn RemoteFiles,
    firmware_dir: &Path,
    renderer: TerminalRenderer,
) -> Result<(), UpgradeError> {
    let total = local_tree_size(firmware_dir)
        .map_err(|err| UpgradeError::from(StopReason::LocalPayload(format!("{err:#}"))))?;
    let mut progress = renderer.transfer("firmware", total);
    let result = upload_tree(files, firmware_dir, REMOTE_TARGET_DIR, &mut |current: u64| {
        progress.update(current)
    });
    match result {
        Ok(summary) => {
            debug!(
                dirs = summary.dirs,
                files = summary.files,
                bytes = summary.bytes,
                "firmware uploaded"
            );
            progress.complete();
            Ok(())
        }
        Err(err) => {
            progress.abandon();
            Err(UpgradeError::Transport(err))
        }
    }
}

fn upload_file(
    files: &mut dyn RemoteFiles,
    local: &Path,
    remote: &str,
    size: u64,
    renderer: TerminalRenderer,
) -> Result<(), UpgradeError> {
    let mut progress = renderer.transfer("stage3", size);
    let result = files.put(local, remote, &mut |current: u64| progress.update(current));
    match result {
        Ok(_) => {
            progress.complete();
            Ok(())
        }
        Err(err) => {
            progress.abandon();
            Err(UpgradeError::Transport(err))
        }
    }
}

fn run_checked(session: &mut dyn RemoteSession, command: &str) -> Result<(), UpgradeError> {
    let output = session.run(command).map_err(UpgradeError::Transport)?;
    if !output.success() {
        return Err(StopReason::RemoteCommandFailed {
            command: command.to_string(),
            status: output.exit_status,
        }
        .into());
    }
    Ok(())
}

fn cleanup(session: &mut dyn RemoteSession, platform: &dyn Platform, renderer: TerminalRenderer) {
    renderer.step("Cleaning remote system...");
    if let Err(err) = platform.cleanup_system(session) {
        warn!(error = %format!("{err:#}"), "remote cleanup failed");
    }
}

// The miner drops the connection while rebooting, so neither a transport
// error nor a non-zero status means the reboot failed.
fn reboot(session: &mut dyn RemoteSession) {
    match session.run(REBOOT_COMMAND) {
        Ok(output) if output.success() => {}
        Ok(output) => debug!(status = output.exit_status, "reboot returned non-zero status"),
        Err(err) => debug!(error = %format!("{err:#}"), "reboot broke the connection"),
    }
}

fn wait_for_reboot(
    hostname: &str,
    settings: &Settings,
    waiter: &dyn PortWaiter,
    renderer: TerminalRenderer,
) {
    let window = ReconnectWindow::after_reboot(settings.wait_timeout(), settings.probe_interval());
    renderer.step("Waiting for the miner to come back online...");

    let mut ticked = false;
    let status = waiter.wait_for_port(hostname, &window, &mut |_attempt| {
        renderer.tick();
        ticked = true;
    });
    if ticked {
        renderer.end_ticks();
    }

    match status {
        Ok(WaitStatus::Reachable { attempts }) => {
            debug!(hostname, attempts, "miner answered after reboot");
            renderer.done("Miner is back online.");
        }
        Ok(WaitStatus::TimedOut { attempts }) => {
            warn!(hostname, attempts, "miner did not answer after reboot");
            renderer.warn(&format!(
                "Miner did not answer on port {} within {} seconds; check it manually.",
                window.port,
                window.timeout.as_secs()
            ));
        }
        Err(err) => {
            warn!(hostname, error = %format!("{err:#}"), "waiting for the miner failed");
            renderer.warn("Unable to wait for the miner; check it manually.");
        }
    }
}

fn payload_error(err: PayloadError) -> UpgradeError {
    match err {
        PayloadError::Bundle(bundle) => StopReason::PostUpgradeBundle(bundle.to_string()).into(),
        PayloadError::MissingFirmware(_) => StopReason::LocalPayload(err.to_string()).into(),
    }
}

fn platform_error(err: PlatformError) -> UpgradeError {
    match err {
        PlatformError::Stop(reason) => UpgradeError::Platform(reason),
        PlatformError::Transport(err) => UpgradeError::Transport(err),
    }
}
