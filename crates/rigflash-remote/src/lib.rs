mod guard;
mod session;
mod ssh;
mod transfer;
mod wait;

pub use guard::SessionGuard;
pub use session::{CommandOutput, Connector, RemoteFiles, RemoteSession};
pub use ssh::SshConnector;
pub use transfer::{copy_with_progress, local_tree_size, remote_join, upload_tree, TreeUpload};
pub use wait::{
    probe_port, PortWaiter, ReconnectWindow, TcpPortWaiter, WaitStatus, LIVENESS_PORT,
    REBOOT_DELAY_MAX, REBOOT_DELAY_MIN,
};
