//! User corrections.
//!
//! A confirmed correction maps a normalized query to the canonical name a user
//! chose. Corrections are the highest-priority level of the cascade and the
//! only state that changes while the engine runs.
//!
//! ```text
//! record() ──▶ CorrectionLog (append, fsync) ──▶ CorrectionIndex (upsert)
//! open()   ──▶ CorrectionLog (replay in file order) ──▶ CorrectionIndex
//! ```

mod codec;
mod file_lock;
mod log;
mod store;

pub use codec::{decode_line, encode_line, DecodeError, LogRecord};
pub use file_lock::FileLock;
pub use log::{CorrectionLog, Replay};
pub use store::{
    CorrectionEntry, CorrectionMatch, CorrectionStore, MatchKind, CONTAINMENT_CONFIDENCE,
};
