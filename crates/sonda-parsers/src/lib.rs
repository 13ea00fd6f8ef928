//! Incremental output parsers for the diagnostic tools the probe drives.
//!
//! Each parser is a pure state machine over raw tool output: it can be fed
//! chunks cut at arbitrary byte boundaries, holds partial lines until the
//! newline arrives, and is finalized with an idempotent flush. Unrecognized
//! lines never corrupt state; where the raw output is preserved verbatim
//! they stay part of it.

pub mod dig;
pub mod lines;
pub mod mtr;
pub mod ping;
pub mod stats;
pub mod traceroute;

pub use dig::DigParser;
pub use lines::LineBuffer;
pub use mtr::MtrParser;
pub use ping::PingParser;
pub use traceroute::TracerouteParser;
