use std::ops::{Deref, DerefMut};

use anyhow::Result;
use tracing::{debug, warn};

use crate::session::{Connector, RemoteSession};

// Owns a connected session and tears it down exactly once, on `release` or on drop.
pub struct SessionGuard {
    session: Box<dyn RemoteSession>,
    hostname: String,
    released: bool,
}

impl SessionGuard {
    pub fn acquire(connector: &dyn Connector, hostname: &str, username: &str) -> Result<Self> {
        let session = connector.connect(hostname, username)?;
        debug!(hostname, username, "session acquired");
        Ok(Self {
            session,
            hostname: hostname.to_string(),
            released: false,
        })
    }

    pub fn release(mut self) -> Result<()> {
        self.released = true;
        debug!(hostname = %self.hostname, "session released");
        self.session.disconnect()
    }
}

impl Deref for SessionGuard {
    type Target = dyn RemoteSession;

    fn deref(&self) -> &Self::Target {
        self.session.as_ref()
    }
}

impl DerefMut for SessionGuard {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.session.as_mut()
    }
}

impl Drop for SessionGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(err) = self.session.disconnect() {
            warn!(hostname = %self.hostname, error = %format!("{err:#}"), "session teardown failed");
        }
    }
}
