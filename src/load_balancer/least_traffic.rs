//! Least-traffic load balancing strategy.

use crate::load_balancer::backend::Backend;
use crate::load_balancer::state::PoolState;

/// Selects the healthy backend that has relayed the fewest bytes so far.
pub fn least_traffic(state: &PoolState) -> Option<Backend> {
    // Find backend with minimum bytes forwarded
    // In case of tie, the first one in the healthy set is selected (stability)
    state
        .healthy
        .as_slice()
        .iter()
        .min_by_key(|b| state.traffic.bytes_for(b))
        .cloned()
}
