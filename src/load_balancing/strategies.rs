//! Selection algorithms over an ordered list of servers.
//!
//! Both strategies skip servers whose liveness flag is down and fail with
//! `AllServersDown` once a full sweep finds nothing selectable. Neither performs I/O.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::warn;

use crate::core::error::{BalancerError, BalancerResult};
use crate::core::server::Server;

/// Round-robin over live servers with a lock-free cursor.
///
/// Each call claims one cursor position with an atomic increment-and-wrap, so concurrent
/// callers never share a position before the cursor wraps. From that position the scan
/// walks forward at most `len` servers looking for a live one.
#[derive(Debug, Default)]
pub struct RoundRobin {
    cursor: AtomicUsize,
}

impl RoundRobin {
    pub fn new() -> Self {
        Self {
            cursor: AtomicUsize::new(0),
        }
    }

    /// Claim the next cursor position, wrapping modulo `len`
    fn claim(&self, len: usize) -> usize {
        // The closure always returns Some, so both arms carry the previous value.
        match self
            .cursor
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |current| {
                Some((current + 1) % len)
            }) {
            Ok(previous) | Err(previous) => previous % len,
        }
    }

    pub fn next(&self, service: &str, servers: &[Arc<Server>]) -> BalancerResult<Arc<Server>> {
        let len = servers.len();
        if len == 0 {
            return Err(BalancerError::all_servers_down(service, 0));
        }

        let start = self.claim(len);
        (0..len)
            .map(|offset| &servers[(start + offset) % len])
            .find(|server| server.is_alive())
            .cloned()
            .ok_or_else(|| BalancerError::all_servers_down(service, len))
    }
}

#[derive(Debug, Default)]
struct WeightedState {
    /// Requests served by each server during its current turn
    counters: Vec<u64>,
    /// Server whose turn it is
    index: usize,
}

impl WeightedState {
    fn advance(&mut self) {
        self.counters[self.index] = 0;
        self.index = (self.index + 1) % self.counters.len();
    }
}

/// Weighted round-robin: server `i` receives `weight_i` consecutive requests before the
/// turn passes to server `i + 1`.
///
/// Weights come from the `weight` metadata key and default to 1, which makes an unweighted
/// pool behave exactly like [`RoundRobin`]. Non-positive weights are treated as 0, so such
/// servers are never picked. Counter state is sized to the first server list the strategy
/// sees; a list of a different length resets it.
#[derive(Debug, Default)]
pub struct WeightedRoundRobin {
    state: Mutex<WeightedState>,
}

impl WeightedRoundRobin {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(WeightedState::default()),
        }
    }

    pub fn next(&self, service: &str, servers: &[Arc<Server>]) -> BalancerResult<Arc<Server>> {
        let len = servers.len();
        if len == 0 {
            return Err(BalancerError::all_servers_down(service, 0));
        }

        let mut state = self.state.lock();

        if state.counters.len() != len {
            if !state.counters.is_empty() {
                warn!(
                    service = %service,
                    previous = state.counters.len(),
                    current = len,
                    "Server list changed size under a weighted strategy, resetting its counters"
                );
            }
            state.counters = vec![0; len];
            state.index = 0;
        }

        // Only the server holding the turn can have a non-zero counter, so after leaving it
        // every other server is reached with a fresh budget. One extra step lets the scan
        // come back to the starting server with its counter reset.
        for _ in 0..=len {
            let index = state.index;
            let server = &servers[index];

            if !server.is_alive() {
                state.advance();
                continue;
            }

            let capacity = server.weight().max(0) as u64;
            if state.counters[index] < capacity {
                state.counters[index] += 1;
                return Ok(server.clone());
            }

            state.advance();
        }

        Err(BalancerError::all_servers_down(service, len))
    }
}
