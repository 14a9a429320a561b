//! Real-time orchestration pipeline
//!
//! ```text
//! failure injection ─► SystemStateMachine HALTED (snapshot)
//!                   ─► BroadcastHub alert ─► every viewer
//!                   ─► Narrator (mcp_step …, solution) ─► every viewer
//!
//! per viewer: LiveFeed tick loop (snapshot while halted, store otherwise)
//! resume ─► LIVE + grace window ─► system_resumed
//! ```

mod state;
mod broadcast;
mod coordinator;
pub mod auto_trigger;
pub mod live_feed;
pub mod runtime;

pub use auto_trigger::AutoTrigger;
pub use broadcast::{BroadcastHub, BroadcastReport, SubscriberId, Subscription};
pub use coordinator::{CoordinatorStats, FailureInjection, IncidentCoordinator, InjectionReceipt};
pub use live_feed::{FeedError, FeedSink, LiveFeed};
pub use runtime::{Collaborators, TwinRuntime, OFFLINE_UNITS};
pub use state::*;
