//! Common test utilities for integration tests.

pub mod assertions;
pub mod cluster_sim;
pub mod fixtures;

use std::time::Duration;

use scyllactl::dispatcher::{Client, ClusterRef};
use scyllactl::poll::ManualClock;
use scyllactl::replace::ReplacementOptions;

// Re-export common types; not every test binary uses every helper
#[allow(unused_imports)]
pub use assertions::*;
pub use cluster_sim::*;
pub use fixtures::*;

/// Client over a fake backend whose polling runs on virtual time.
pub fn client(backend: &FakeBackend) -> (Client<FakeBackend, ManualClock>, ManualClock) {
    let clock = ManualClock::new();
    (Client::with_clock(backend.clone(), clock.clone()), clock)
}

pub fn cluster_ref() -> ClusterRef {
    ClusterRef::new(NAMESPACE, CLUSTER)
}

/// Short cadence so scenarios need few samples.
pub fn fast_options() -> ReplacementOptions {
    ReplacementOptions {
        poll_interval: Duration::from_secs(5),
        timeout: Duration::from_secs(60),
    }
}
