use std::collections::{BTreeSet, HashSet};

use futures::future::join_all;
use tracing::{debug, info};

use punt_device::DeviceBridge;
use punt_types::Membership;

/// Resolves which process ids belong to the watched packages.
///
/// Negative answers are memoized for the whole run; only an id that has
/// never been seen triggers a re-resolution of every package.
pub struct ProcessTracker<B> {
    bridge: B,

    /// Watched package names (empty = passthrough)
    packages: Vec<String>,

    /// Ids currently resolved to a watched package
    tracked: BTreeSet<String>,

    /// Every id resolved so far, tracked or not. Superset of `tracked`.
    all_seen: HashSet<String>,

    /// Number of full re-resolutions performed
    resolutions: u64,
}

impl<B: DeviceBridge> ProcessTracker<B> {
    /// Create a tracker without querying the device
    pub fn new(bridge: B, packages: Vec<String>) -> Self {
        Self {
            bridge,
            packages,
            tracked: BTreeSet::new(),
            all_seen: HashSet::new(),
            resolutions: 0,
        }
    }

    /// Create a tracker and resolve the watched packages once
    pub async fn start(bridge: B, packages: Vec<String>) -> Self {
        let mut tracker = Self::new(bridge, packages);
        if !tracker.is_passthrough() {
            tracker.refresh().await;
        }
        tracker
    }

    /// With no watched packages every process is tracked
    pub fn is_passthrough(&self) -> bool {
        self.packages.is_empty()
    }

    /// Answer from memoized state only, never querying the device
    pub fn peek(&self, pid: &str) -> Membership {
        if self.is_passthrough() || self.tracked.contains(pid) {
            Membership::Tracked
        } else if self.all_seen.contains(pid) {
            Membership::Ignored
        } else {
            Membership::Unknown
        }
    }

    /// Resolve the membership of `pid`, querying the device on a cache miss
    pub async fn lookup(&mut self, pid: &str) -> Membership {
        match self.peek(pid) {
            Membership::Unknown => {}
            known => return known,
        }

        // A watched package gets a new pid when it restarts
        self.refresh().await;
        if self.tracked.contains(pid) {
            return Membership::Tracked;
        }

        self.all_seen.insert(pid.to_string());
        Membership::Ignored
    }

    /// Replace the tracked set with a fresh package -> pid resolution
    pub async fn refresh(&mut self) {
        self.resolutions += 1;

        let queries = self.packages.iter().map(|package| self.bridge.pidof(package));
        let results = join_all(queries).await;

        let mut fresh = BTreeSet::new();
        for (package, result) in self.packages.iter().zip(results) {
            match result {
                Ok(pids) if !pids.is_empty() => fresh.extend(pids),
                Ok(_) => debug!(%package, "package not running"),
                Err(e) => debug!(%package, error = %e, "package resolution failed"),
            }
        }

        if fresh != self.tracked {
            info!(tracked = ?fresh, "tracked processes changed");
        }
        self.all_seen.extend(fresh.iter().cloned());
        self.tracked = fresh;
    }

    /// Currently tracked ids, sorted
    pub fn tracked(&self) -> impl Iterator<Item = &str> {
        self.tracked.iter().map(String::as_str)
    }

    pub fn packages(&self) -> &[String] {
        &self.packages
    }

    pub fn resolutions(&self) -> u64 {
        self.resolutions
    }

    pub fn bridge(&self) -> &B {
        &self.bridge
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use punt_device::BridgeError;
    use std::cell::{Cell, RefCell};
    use std::collections::HashMap;

    /// Bridge answering from a mutable package -> pids table
    #[derive(Default)]
    struct FakeBridge {
        pids: RefCell<HashMap<String, Vec<String>>>,
        calls: Cell<u64>,
    }

    impl FakeBridge {
        fn with(package: &str, pids: &[&str]) -> Self {
            let bridge = Self::default();
            bridge.set(package, pids);
            bridge
        }

        fn set(&self, package: &str, pids: &[&str]) {
            self.pids.borrow_mut().insert(
                package.to_string(),
                pids.iter().map(|p| p.to_string()).collect(),
            );
        }
    }

    impl DeviceBridge for FakeBridge {
        async fn pidof(&self, package: &str) -> Result<Vec<String>, BridgeError> {
            self.calls.set(self.calls.get() + 1);
            match self.pids.borrow().get(package) {
                Some(pids) => Ok(pids.clone()),
                None => Err(BridgeError::Failed {
                    command: format!("pidof {}", package),
                    status: "exit status: 1".to_string(),
                }),
            }
        }

        async fn proc_status(&self, _pid: &str) -> Result<String, BridgeError> {
            Ok(String::new())
        }
    }

    fn packages(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[tokio::test]
    async fn test_passthrough_tracks_everything() {
        let mut tracker = ProcessTracker::start(FakeBridge::default(), Vec::new()).await;
        assert_eq!(tracker.peek("1"), Membership::Tracked);
        assert_eq!(tracker.lookup("99").await, Membership::Tracked);
        assert_eq!(tracker.bridge().calls.get(), 0);
        assert_eq!(tracker.resolutions(), 0);
    }

    #[tokio::test]
    async fn test_tracked_hit_needs_no_query() {
        let bridge = FakeBridge::with("com.example", &["1234"]);
        let mut tracker = ProcessTracker::start(bridge, packages(&["com.example"])).await;
        assert_eq!(tracker.bridge().calls.get(), 1);

        assert_eq!(tracker.lookup("1234").await, Membership::Tracked);
        assert_eq!(tracker.bridge().calls.get(), 1);
    }

    #[tokio::test]
    async fn test_ignored_is_memoized() {
        let bridge = FakeBridge::with("com.example", &["1234"]);
        let mut tracker = ProcessTracker::start(bridge, packages(&["com.example"])).await;

        assert_eq!(tracker.peek("9999"), Membership::Unknown);
        assert_eq!(tracker.lookup("9999").await, Membership::Ignored);
        assert_eq!(tracker.resolutions(), 2);

        for _ in 0..5 {
            assert_eq!(tracker.lookup("9999").await, Membership::Ignored);
        }
        assert_eq!(tracker.resolutions(), 2);
        assert_eq!(tracker.peek("9999"), Membership::Ignored);
    }

    #[tokio::test]
    async fn test_restarted_package_is_picked_up() {
        let bridge = FakeBridge::with("com.example", &["1234"]);
        let mut tracker = ProcessTracker::start(bridge, packages(&["com.example"])).await;

        tracker.bridge().set("com.example", &["5678"]);
        assert_eq!(tracker.lookup("5678").await, Membership::Tracked);

        // The old pid was replaced and is now ignored without another query
        let before = tracker.resolutions();
        assert_eq!(tracker.lookup("1234").await, Membership::Ignored);
        assert_eq!(tracker.resolutions(), before);
        assert_eq!(tracker.tracked().collect::<Vec<_>>(), vec!["5678"]);
    }

    #[tokio::test]
    async fn test_ignored_pid_becomes_tracked_after_refresh() {
        let bridge = FakeBridge::with("com.example", &["1234"]);
        let mut tracker = ProcessTracker::start(bridge, packages(&["com.example"])).await;

        assert_eq!(tracker.lookup("777").await, Membership::Ignored);
        assert_eq!(tracker.resolutions(), 2);

        // The package restarts as 777; another unknown pid triggers the refresh
        tracker.bridge().set("com.example", &["777"]);
        assert_eq!(tracker.lookup("888").await, Membership::Ignored);
        assert_eq!(tracker.resolutions(), 3);

        assert_eq!(tracker.peek("777"), Membership::Tracked);
        assert_eq!(tracker.lookup("777").await, Membership::Tracked);
        assert_eq!(tracker.resolutions(), 3);
    }

    #[tokio::test]
    async fn test_failed_resolution_means_not_running() {
        let bridge = FakeBridge::with("com.example", &["1234"]);
        let mut tracker =
            ProcessTracker::start(bridge, packages(&["com.example", "com.missing"])).await;

        assert_eq!(tracker.lookup("1234").await, Membership::Tracked);
        assert_eq!(tracker.lookup("4321").await, Membership::Ignored);
    }

    #[tokio::test]
    async fn test_multiple_pids_per_package() {
        let bridge = FakeBridge::with("com.example", &["10", "11"]);
        let mut tracker = ProcessTracker::start(bridge, packages(&["com.example"])).await;
        assert_eq!(tracker.lookup("10").await, Membership::Tracked);
        assert_eq!(tracker.lookup("11").await, Membership::Tracked);
    }
}
