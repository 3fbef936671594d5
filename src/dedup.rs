//! In-flight registry guarding against concurrent work on the same archive.
//!
//! A worker claims a content identifier before doing any work for it and the
//! claim is released when the returned [`InFlightClaim`] is dropped. Released
//! identifiers stay blocked for a short settle window, so a duplicate job that
//! was already sitting in the queue is not admitted right after the original
//! finished. The window is tracked by timestamp; nothing sleeps.

use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;
use tracing::{debug, trace};

/// Default settle window after a job finishes.
pub const DEFAULT_SETTLE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy)]
enum Slot {
    /// Owned by a running worker.
    InFlight,
    /// Released at the given instant; blocked until the settle window passes.
    Settling(Instant),
}

/// Set of content identifiers currently owned by a worker.
#[derive(Debug)]
pub struct InFlightRegistry {
    entries: DashMap<String, Slot>,
    settle_delay: Duration,
}

impl Default for InFlightRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_SETTLE_DELAY)
    }
}

impl InFlightRegistry {
    /// Creates an empty registry with the given settle window.
    #[must_use]
    pub fn new(settle_delay: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            settle_delay,
        }
    }

    /// Returns the configured settle window.
    #[must_use]
    pub fn settle_delay(&self) -> Duration {
        self.settle_delay
    }

    /// Atomically claims `cid`.
    ///
    /// Returns `None` when another worker owns it or it was released less
    /// than one settle window ago.
    #[must_use]
    pub fn try_claim(self: &Arc<Self>, cid: &str) -> Option<InFlightClaim> {
        match self.entries.entry(cid.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(Slot::InFlight);
            }
            Entry::Occupied(mut occupied) => match *occupied.get() {
                Slot::InFlight => return None,
                Slot::Settling(released_at) if released_at.elapsed() < self.settle_delay => {
                    trace!(cid, "claim refused during settle window");
                    return None;
                }
                Slot::Settling(_) => {
                    occupied.insert(Slot::InFlight);
                }
            },
        }

        debug!(cid, "claimed content id");
        Some(InFlightClaim {
            registry: Arc::clone(self),
            cid: cid.to_string(),
        })
    }

    /// Returns true when `cid` is currently owned by a worker.
    #[must_use]
    pub fn is_in_flight(&self, cid: &str) -> bool {
        self.entries
            .get(cid)
            .is_some_and(|slot| matches!(*slot, Slot::InFlight))
    }

    /// Number of identifiers currently owned by workers.
    #[must_use]
    pub fn in_flight_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|slot| matches!(*slot.value(), Slot::InFlight))
            .count()
    }

    fn release(&self, cid: &str) {
        self.entries
            .insert(cid.to_string(), Slot::Settling(Instant::now()));
        debug!(cid, "released content id");
        self.prune_settled();
    }

    /// Drops entries whose settle window has passed.
    fn prune_settled(&self) {
        let settle_delay = self.settle_delay;
        self.entries.retain(|_, slot| match slot {
            Slot::InFlight => true,
            Slot::Settling(released_at) => released_at.elapsed() < settle_delay,
        });
    }
}

/// Ownership of one content identifier; released on drop.
#[derive(Debug)]
pub struct InFlightClaim {
    registry: Arc<InFlightRegistry>,
    cid: String,
}

impl InFlightClaim {
    /// The claimed content identifier.
    #[must_use]
    pub fn cid(&self) -> &str {
        &self.cid
    }
}

impl Drop for InFlightClaim {
    fn drop(&mut self) {
        self.registry.release(&self.cid);
    }
}
