use std::collections::{HashMap, VecDeque};
use std::fmt::{Display, Formatter};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use serde::Serialize;

const MINUTE: Duration = Duration::from_secs(60);
const HOUR: Duration = Duration::from_secs(60 * 60);

/// Byte ceilings enforced by [`BandwidthLedger`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandwidthConfig {
    pub per_ip_minute: u64,
    pub per_ip_hour: u64,
    pub global_hour: u64,
}

impl Default for BandwidthConfig {
    fn default() -> Self {
        Self {
            per_ip_minute: 5 * 1024 * 1024,
            per_ip_hour: 50 * 1024 * 1024,
            global_hour: 1024 * 1024 * 1024,
        }
    }
}

/// Which ceiling a transfer would exceed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BandwidthScope {
    IpMinute,
    IpHour,
    GlobalHour,
}

impl BandwidthScope {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::IpMinute => "per-ip minute",
            Self::IpHour => "per-ip hour",
            Self::GlobalHour => "global hour",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BandwidthRejection {
    pub scope: BandwidthScope,
    pub used: u64,
    pub requested: u64,
    pub limit: u64,
    pub retry_after: Duration,
}

impl Display for BandwidthRejection {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} bandwidth ceiling exceeded: {} + {} of {} bytes; retry in {}ms",
            self.scope.as_str(),
            self.used,
            self.requested,
            self.limit,
            self.retry_after.as_millis()
        )
    }
}

/// Timestamped byte counts inside a rolling window.
#[derive(Debug, Default)]
struct Transfers {
    entries: VecDeque<(Instant, u64)>,
}

impl Transfers {
    fn push(&mut self, at: Instant, bytes: u64) {
        self.entries.push_back((at, bytes));
    }

    fn prune(&mut self, now: Instant, horizon: Duration) {
        while let Some(&(at, _)) = self.entries.front() {
            if now.duration_since(at) < horizon {
                break;
            }
            self.entries.pop_front();
        }
    }

    fn used_within(&self, now: Instant, window: Duration) -> u64 {
        self.entries
            .iter()
            .filter(|(at, _)| now.duration_since(*at) < window)
            .map(|(_, bytes)| bytes)
            .sum()
    }

    /// Time until enough old transfers age out for `requested` to fit.
    fn retry_after(&self, now: Instant, window: Duration, requested: u64, limit: u64) -> Duration {
        if requested > limit {
            return window;
        }

        let mut used = self.used_within(now, window);
        for &(at, bytes) in &self.entries {
            if now.duration_since(at) >= window {
                continue;
            }
            used -= bytes;
            if used + requested <= limit {
                return (at + window).saturating_duration_since(now);
            }
        }
        window
    }

    fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[derive(Debug, Default)]
struct LedgerInner {
    per_ip: HashMap<String, Transfers>,
    global: Transfers,
}

/// Rolling per-ip and global byte ledger.
#[derive(Debug)]
pub struct BandwidthLedger {
    config: BandwidthConfig,
    inner: Mutex<LedgerInner>,
}

impl Default for BandwidthLedger {
    fn default() -> Self {
        Self::new(BandwidthConfig::default())
    }
}

impl BandwidthLedger {
    pub fn new(config: BandwidthConfig) -> Self {
        Self {
            config,
            inner: Mutex::new(LedgerInner::default()),
        }
    }

    pub const fn config(&self) -> BandwidthConfig {
        self.config
    }

    /// Checks whether `bytes` more for `ip` fits under every ceiling.
    ///
    /// Ceilings are checked narrowest first so the rejection names the
    /// tightest one.
    pub fn check(&self, ip: &str, bytes: u64) -> Result<(), BandwidthRejection> {
        let now = Instant::now();
        let mut guard = self
            .inner
            .lock()
            .expect("bandwidth ledger lock is not poisoned");
        let inner = &mut *guard;
        inner.global.prune(now, HOUR);

        let empty = Transfers::default();
        let transfers = match inner.per_ip.get_mut(ip) {
            Some(transfers) => {
                transfers.prune(now, HOUR);
                &*transfers
            }
            None => &empty,
        };

        let ceilings = [
            (transfers, BandwidthScope::IpMinute, MINUTE, self.config.per_ip_minute),
            (transfers, BandwidthScope::IpHour, HOUR, self.config.per_ip_hour),
            (&inner.global, BandwidthScope::GlobalHour, HOUR, self.config.global_hour),
        ];
        for (transfers, scope, window, limit) in ceilings {
            check_ceiling(transfers, now, scope, window, bytes, limit)?;
        }
        Ok(())
    }

    /// Books an actual transfer against the caller and the global window.
    pub fn record(&self, ip: &str, bytes: u64) {
        let now = Instant::now();
        let mut inner = self
            .inner
            .lock()
            .expect("bandwidth ledger lock is not poisoned");
        inner.per_ip.entry(ip.to_owned()).or_default().push(now, bytes);
        inner.global.push(now, bytes);
    }

    pub fn usage(&self, ip: &str) -> (u64, u64) {
        let now = Instant::now();
        let inner = self
            .inner
            .lock()
            .expect("bandwidth ledger lock is not poisoned");
        inner.per_ip.get(ip).map_or((0, 0), |transfers| {
            (
                transfers.used_within(now, MINUTE),
                transfers.used_within(now, HOUR),
            )
        })
    }

    pub fn global_usage(&self) -> u64 {
        let now = Instant::now();
        self.inner
            .lock()
            .expect("bandwidth ledger lock is not poisoned")
            .global
            .used_within(now, HOUR)
    }

    /// Prunes aged-out transfers and forgets idle callers.
    pub fn cleanup(&self) -> usize {
        let now = Instant::now();
        let mut inner = self
            .inner
            .lock()
            .expect("bandwidth ledger lock is not poisoned");
        inner.global.prune(now, HOUR);
        let before = inner.per_ip.len();
        inner.per_ip.retain(|_, transfers| {
            transfers.prune(now, HOUR);
            !transfers.is_empty()
        });
        before - inner.per_ip.len()
    }
}

fn check_ceiling(
    transfers: &Transfers,
    now: Instant,
    scope: BandwidthScope,
    window: Duration,
    requested: u64,
    limit: u64,
) -> Result<(), BandwidthRejection> {
    let used = transfers.used_within(now, window);
    if used.saturating_add(requested) <= limit {
        return Ok(());
    }

    Err(BandwidthRejection {
        scope,
        used,
        requested,
        limit,
        retry_after: transfers.retry_after(now, window, requested, limit),
    })
}
