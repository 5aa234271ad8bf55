//! Download engine
//!
//! - Priority-ordered admission control shared by every task
//! - Single-stream transfer sessions with `Range`/`If-Range` resumption
//! - A per-task state machine with cooperative pause and cancel
//! - Durable resume records (JSON blob or SQLite)

mod codec;
mod coordinator;
mod persistence;
mod session;
mod speed;
mod task;

pub use codec::*;
pub use coordinator::*;
pub use persistence::*;
pub use session::*;
pub use speed::*;
pub use task::*;
