//! RMONITOR protocol support
//!
//! RMONITOR is the line-oriented feed race timing systems use to stream
//! live event state: entries, run and flag state, standings, passings and
//! timing-line crossings. Each line is a "sentence" whose first field is a
//! tag identifying its kind.
//!
//! This crate parses sentences into typed [`Report`]s and encodes them back
//! to the two wire forms, CSV (legacy 8-bit charset) and JSON.
//!
//! # Sentence Kinds
//!
//! | Tag | Kind | Cache key |
//! |-----|------|-----------|
//! | `$A` | Entry | per competitor |
//! | `$B` | Run info | singleton |
//! | `$C` | Class info | indexed by class id |
//! | `$COMP` | Competitor | per competitor |
//! | `$E` | Extra info | per item key |
//! | `$F` | Flag / run state | singleton |
//! | `$G` | Race position | indexed by position |
//! | `$H` | Practice/qualifying | indexed by position |
//! | `$I` | Initialization | fixed, sorts first |
//! | `$J` | Passing | per competitor |
//! | `$L` | Line crossing | not cached |
//! | `$T` | Track info | singleton |
//!
//! # Example
//!
//! ```
//! use rmonitor_protocol::{Charset, Report, ReportBody};
//!
//! let report = Report::from_csv(b"$F,0,00:00:30,14:32:01,00:05:12.500,Green", Charset::default(), false)?;
//! if let ReportBody::Flag(flag) = report.body() {
//!     assert_eq!(flag.flag, "Green");
//! }
//! assert_eq!(report.cache_key(), Some("$F"));
//! # Ok::<(), rmonitor_protocol::ProtocolError>(())
//! ```

pub mod charset;
pub mod error;
pub mod records;
pub mod registry;
pub mod report;

// Re-exports
pub use charset::Charset;
pub use error::{ProtocolError, Result};
pub use records::{
    ClassInfo, Competitor, Entry, ExtraInfo, FlagState, LapTime, LineCrossing, Passing, Position,
    ReportBody, Reset, RunInfo, TrackInfo, TrackSection,
};
pub use registry::{cache_key_for, KeyRule};
pub use report::Report;
