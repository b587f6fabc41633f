use std::net::{TcpStream, ToSocketAddrs};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::Result;
use rand::Rng;
use tracing::debug;

pub const LIVENESS_PORT: u16 = 80;
pub const REBOOT_DELAY_MIN: Duration = Duration::from_secs(3);
pub const REBOOT_DELAY_MAX: Duration = Duration::from_secs(5);

const PROBE_CONNECT_TIMEOUT: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconnectWindow {
    pub port: u16,
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub probe_interval: Duration,
    pub probe_timeout: Duration,
    pub timeout: Duration,
}

impl ReconnectWindow {
    pub fn after_reboot(timeout: Duration, probe_interval: Duration) -> Self {
        Self {
            port: LIVENESS_PORT,
            min_delay: REBOOT_DELAY_MIN,
            max_delay: REBOOT_DELAY_MAX,
            probe_interval,
            probe_timeout: PROBE_CONNECT_TIMEOUT,
            timeout,
        }
    }

    pub fn initial_delay<R: Rng + ?Sized>(&self, rng: &mut R) -> Duration {
        let min = self.min_delay.as_millis() as u64;
        let max = (self.max_delay.as_millis() as u64).max(min);
        Duration::from_millis(rng.gen_range(min..=max))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    Reachable { attempts: u32 },
    TimedOut { attempts: u32 },
}

pub trait PortWaiter {
    fn wait_for_port(
        &self,
        hostname: &str,
        window: &ReconnectWindow,
        on_retry: &mut dyn FnMut(u32),
    ) -> Result<WaitStatus>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct TcpPortWaiter;

impl PortWaiter for TcpPortWaiter {
    fn wait_for_port(
        &self,
        hostname: &str,
        window: &ReconnectWindow,
        on_retry: &mut dyn FnMut(u32),
    ) -> Result<WaitStatus> {
        let delay = window.initial_delay(&mut rand::thread_rng());
        debug!(hostname, delay_ms = delay.as_millis() as u64, "waiting before first probe");
        thread::sleep(delay);

        let deadline = Instant::now() + window.timeout;
        let mut attempts = 0_u32;
        loop {
            attempts += 1;
            if probe_port(hostname, window.port, window.probe_timeout) {
                return Ok(WaitStatus::Reachable { attempts });
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(WaitStatus::TimedOut { attempts });
            }
            on_retry(attempts);
            thread::sleep(window.probe_interval.min(deadline - now));
        }
    }
}

pub fn probe_port(hostname: &str, port: u16, timeout: Duration) -> bool {
    let addrs = match (hostname, port).to_socket_addrs() {
        Ok(addrs) => addrs,
        Err(err) => {
            debug!(hostname, port, error = %err, "probe address resolution failed");
            return false;
        }
    };
    addrs
        .into_iter()
        .any(|addr| TcpStream::connect_timeout(&addr, timeout).is_ok())
}
