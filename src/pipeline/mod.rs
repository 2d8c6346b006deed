//! Message pipeline.
//!
//! Every inbound message flows through:
//! 1. Bot filter: messages from bots are dropped
//! 2. Command routing: `/commands` go to the [`CommandHandler`](crate::commands::CommandHandler)
//!    and never reach the modules
//! 3. Module pipeline: statistics, limiter, profanity, banned words, keyword reactions,
//!    each gated by its per-chat enablement

pub mod dispatcher;

pub use dispatcher::{Dispatch, PipelineDispatcher};
