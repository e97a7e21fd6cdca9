//! dwhrecon Engine
//!
//! Row-level reconciliation of a source relation against its warehouse
//! copy:
//! - Identity keys and row signatures ([`KeyExtractor`])
//! - Ordered, boundable extraction ([`Materializer`])
//! - Merge-join classification ([`Reconciler`])
//! - Watermark and chunk planning ([`IncrementalPlanner`])
//! - Outcome recording ([`RunRecorder`]) and whole runs ([`LoadingRunner`])

pub mod error;
pub mod key;
pub mod materializer;
pub mod reconciler;
pub mod planner;
pub mod recorder;
pub mod runner;

pub use error::{ReconcileError, Side};
pub use key::KeyExtractor;
pub use materializer::{Chunk, ChunkBounds, Chunks, Materializer};
pub use reconciler::{Reconciler, Reconciliation, Unmatched};
pub use planner::{next_watermark, plan_chunks, IncrementalPlanner};
pub use recorder::{InMemoryRecorder, RecordError, RunOutcome, RunRecorder};
pub use runner::LoadingRunner;
