//! Directory tree crawling
//!
//! Two ways to cover a tree:
//!
//! - `Walker`: one depth-first crawler, checkpointed after every step and
//!   resumable after a crash.
//! - `FleetCoordinator`: one `Walker` per top-level subtree on a fixed pool
//!   of threads, no checkpoints.
//!
//! # Architecture
//!
//! ```text
//!                     ┌─────────────────────────┐
//!                     │         Walker          │
//!                     │  CrawlState (owned)     │
//!                     │  ListingClient          │
//!                     │  Classifier             │
//!                     └──────┬───────────┬──────┘
//!                            │           │
//!                     every step    first visit
//!                            │           │
//!                 ┌──────────▼───┐  ┌────▼──────────┐
//!                 │ Checkpoint   │  │ Reference     │
//!                 │ Store        │  │ Table (Arc)   │
//!                 └──────────────┘  └───────────────┘
//! ```

pub mod engine;
pub mod fleet;
pub mod state;

pub use engine::{CancelReason, CancelToken, WalkProgress, WalkResult, WalkStats, Walker};
pub use fleet::{FleetConfig, FleetCoordinator, FleetProgress, FleetResult, SubtreeResult};
pub use state::{CrawlState, ForkMemory, ForkPolicy};
