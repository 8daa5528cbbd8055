// Reply Rules - What a node sends in answer to what it receives
//
// | own role | received | replies                                        |
// |----------|----------|------------------------------------------------|
// | Ping     | Pong     | Ping -> Pong, plus Ping -> Ding every Nth Pong |
// | Ping     | other    | nothing                                        |
// | Pong     | any      | Pong -> Ping                                   |
// | Ding     | any      | Ding -> Ping, Ding -> Dong                     |
// | Dong     | any      | Dong -> Ping                                   |

use crate::message::Role;

/// Every 4 pongs, the ping hits the ding
pub const DEFAULT_DING_INTERVAL: u64 = 4;

/// A reply to emit: send a `kind` message to the node playing `endpoint`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Route {
    pub kind: Role,
    pub endpoint: Role,
}

impl Route {
    pub fn new(kind: Role, endpoint: Role) -> Self {
        Self { kind, endpoint }
    }
}

/// Number of Pong messages a Ping node has received. Never decreases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PongCounter {
    count: u64,
    ding_interval: u64,
}

impl Default for PongCounter {
    fn default() -> Self {
        Self::new(DEFAULT_DING_INTERVAL)
    }
}

impl PongCounter {
    /// `ding_interval` of zero is treated as one
    pub fn new(ding_interval: u64) -> Self {
        Self {
            count: 0,
            ding_interval: ding_interval.max(1),
        }
    }

    pub fn count(&self) -> u64 {
        self.count
    }

    pub fn ding_interval(&self) -> u64 {
        self.ding_interval
    }

    /// Record one Pong; returns true when this Pong escalates to Ding
    pub fn record_pong(&mut self) -> bool {
        self.count = self.count.saturating_add(1);
        self.count % self.ding_interval == 0
    }
}

/// Compute the replies for a message of kind `received` arriving at a node
/// playing `own`. Only a Ping node receiving a Pong touches the counter.
pub fn plan_replies(own: Role, received: Role, pongs: &mut PongCounter) -> Vec<Route> {
    match own {
        Role::Ping => {
            if received != Role::Pong {
                return Vec::new();
            }
            let mut routes = Vec::with_capacity(2);
            if pongs.record_pong() {
                routes.push(Route::new(Role::Ping, Role::Ding));
            }
            routes.push(Route::new(Role::Ping, Role::Pong));
            routes
        }
        Role::Pong => vec![Route::new(Role::Pong, Role::Ping)],
        Role::Ding => vec![
            Route::new(Role::Ding, Role::Ping),
            Route::new(Role::Ding, Role::Dong),
        ],
        Role::Dong => vec![Route::new(Role::Dong, Role::Ping)],
        Role::Undefined => Vec::new(),
    }
}
