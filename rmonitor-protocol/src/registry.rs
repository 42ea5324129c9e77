//! Sentence kind registry
//!
//! A static table mapping each sentence tag to its record parser and its
//! cache key rule. Kinds without a key rule are never cached.

use crate::error::{ProtocolError, Result};
use crate::records::{
    ClassInfo, Competitor, Entry, ExtraInfo, FieldReader, FlagState, LapTime, LineCrossing,
    Passing, Position, ReportBody, Reset, RunInfo, TrackInfo,
};

pub const ENTRY: &str = "$A";
pub const RUN_INFO: &str = "$B";
pub const CLASS_INFO: &str = "$C";
pub const COMPETITOR: &str = "$COMP";
pub const EXTRA_INFO: &str = "$E";
pub const FLAG: &str = "$F";
pub const POSITION: &str = "$G";
pub const LAP_TIME: &str = "$H";
pub const RESET: &str = "$I";
pub const PASSING: &str = "$J";
pub const LINE_CROSSING: &str = "$L";
pub const TRACK_INFO: &str = "$T";

/// Key of the reset record; sorts ahead of every other key
pub const RESET_KEY: &str = "";

/// How a kind derives the cache key that decides which record it replaces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRule {
    /// Global state: one record per kind
    Singleton,
    /// Per-entity state: one record per kind and first field
    Mapping,
    /// Ordered rows: first field as a zero-padded integer so keys sort numerically
    Indexed,
    /// A constant key
    Fixed(&'static str),
}

impl KeyRule {
    /// Build the key for `kind` given its first data field
    pub fn derive(&self, kind: &str, subkey: Option<&str>) -> Result<String> {
        match self {
            KeyRule::Singleton => Ok(kind.to_string()),
            KeyRule::Fixed(key) => Ok((*key).to_string()),
            KeyRule::Mapping => {
                let subkey = subkey.ok_or_else(|| ProtocolError::malformed(kind, "missing key field"))?;
                Ok(format!("{}:{}", kind, subkey))
            }
            KeyRule::Indexed => {
                let subkey = subkey.ok_or_else(|| ProtocolError::malformed(kind, "missing key field"))?;
                let index: i64 = subkey.trim().parse().map_err(|_| {
                    ProtocolError::malformed(kind, format!("key field is not an integer: {:?}", subkey))
                })?;
                Ok(format!("{}#{:06}", kind, index))
            }
        }
    }
}

type ParseFn = fn(&FieldReader<'_>) -> Result<ReportBody>;

/// One row of the registry
pub struct KindSpec {
    pub tag: &'static str,
    pub name: &'static str,
    parse: ParseFn,
    pub key: Option<KeyRule>,
}

impl KindSpec {
    pub(crate) fn parse(&self, fields: &[String]) -> Result<ReportBody> {
        (self.parse)(&FieldReader::new(self.tag, fields))
    }
}

fn parse_entry(f: &FieldReader<'_>) -> Result<ReportBody> {
    Entry::parse(f).map(ReportBody::Entry)
}

fn parse_run_info(f: &FieldReader<'_>) -> Result<ReportBody> {
    RunInfo::parse(f).map(ReportBody::RunInfo)
}

fn parse_class_info(f: &FieldReader<'_>) -> Result<ReportBody> {
    ClassInfo::parse(f).map(ReportBody::ClassInfo)
}

fn parse_competitor(f: &FieldReader<'_>) -> Result<ReportBody> {
    Competitor::parse(f).map(ReportBody::Competitor)
}

fn parse_extra_info(f: &FieldReader<'_>) -> Result<ReportBody> {
    ExtraInfo::parse(f).map(ReportBody::ExtraInfo)
}

fn parse_flag(f: &FieldReader<'_>) -> Result<ReportBody> {
    FlagState::parse(f).map(ReportBody::Flag)
}

fn parse_position(f: &FieldReader<'_>) -> Result<ReportBody> {
    Position::parse(f).map(ReportBody::Position)
}

fn parse_lap_time(f: &FieldReader<'_>) -> Result<ReportBody> {
    LapTime::parse(f).map(ReportBody::LapTime)
}

fn parse_reset(f: &FieldReader<'_>) -> Result<ReportBody> {
    Reset::parse(f).map(ReportBody::Reset)
}

fn parse_passing(f: &FieldReader<'_>) -> Result<ReportBody> {
    Passing::parse(f).map(ReportBody::Passing)
}

fn parse_line_crossing(f: &FieldReader<'_>) -> Result<ReportBody> {
    LineCrossing::parse(f).map(ReportBody::LineCrossing)
}

fn parse_track_info(f: &FieldReader<'_>) -> Result<ReportBody> {
    TrackInfo::parse(f).map(ReportBody::TrackInfo)
}

static KINDS: [KindSpec; 12] = [
    KindSpec { tag: ENTRY, name: "entry", parse: parse_entry, key: Some(KeyRule::Mapping) },
    KindSpec { tag: RUN_INFO, name: "run info", parse: parse_run_info, key: Some(KeyRule::Singleton) },
    KindSpec { tag: CLASS_INFO, name: "class info", parse: parse_class_info, key: Some(KeyRule::Indexed) },
    KindSpec { tag: COMPETITOR, name: "competitor", parse: parse_competitor, key: Some(KeyRule::Mapping) },
    KindSpec { tag: EXTRA_INFO, name: "extra info", parse: parse_extra_info, key: Some(KeyRule::Mapping) },
    KindSpec { tag: FLAG, name: "flag", parse: parse_flag, key: Some(KeyRule::Singleton) },
    KindSpec { tag: POSITION, name: "race position", parse: parse_position, key: Some(KeyRule::Indexed) },
    KindSpec { tag: LAP_TIME, name: "practice/qualifying", parse: parse_lap_time, key: Some(KeyRule::Indexed) },
    KindSpec { tag: RESET, name: "initialization", parse: parse_reset, key: Some(KeyRule::Fixed(RESET_KEY)) },
    KindSpec { tag: PASSING, name: "passing", parse: parse_passing, key: Some(KeyRule::Mapping) },
    // Transient events, never cached
    KindSpec { tag: LINE_CROSSING, name: "line crossing", parse: parse_line_crossing, key: None },
    KindSpec { tag: TRACK_INFO, name: "track info", parse: parse_track_info, key: Some(KeyRule::Singleton) },
];

/// Look up a sentence tag
pub fn lookup(tag: &str) -> Option<&'static KindSpec> {
    KINDS.iter().find(|spec| spec.tag == tag)
}

/// All registered kinds, in table order
pub fn kinds() -> impl Iterator<Item = &'static KindSpec> {
    KINDS.iter()
}

/// The key a record of `kind` with first field `subkey` would be cached under
///
/// `None` for unknown kinds, uncached kinds, and subkeys the kind's rule
/// cannot use.
pub fn cache_key_for(kind: &str, subkey: Option<&str>) -> Option<String> {
    let rule = lookup(kind)?.key?;
    rule.derive(kind, subkey).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_tag_registered_once() {
        for spec in kinds() {
            assert!(std::ptr::eq(lookup(spec.tag).unwrap(), spec), "duplicate tag {}", spec.tag);
        }
        assert_eq!(kinds().count(), 12);
        assert!(lookup("$Z").is_none());
    }

    #[test]
    fn test_key_families() {
        assert_eq!(cache_key_for(RUN_INFO, None).as_deref(), Some("$B"));
        assert_eq!(cache_key_for(ENTRY, Some("12")).as_deref(), Some("$A:12"));
        assert_eq!(cache_key_for(POSITION, Some("7")).as_deref(), Some("$G#000007"));
        assert_eq!(cache_key_for(RESET, None).as_deref(), Some(""));
        assert_eq!(cache_key_for(LINE_CROSSING, Some("7")), None);
        assert_eq!(cache_key_for("$Z", Some("7")), None);
    }

    #[test]
    fn test_indexed_requires_integer() {
        assert_eq!(cache_key_for(POSITION, Some("P1")), None);
        assert_eq!(cache_key_for(POSITION, None), None);
    }

    #[test]
    fn test_indexed_keys_sort_numerically() {
        let mut keys: Vec<String> = ["2", "10", "1"]
            .into_iter()
            .filter_map(|n| cache_key_for(POSITION, Some(n)))
            .collect();
        keys.sort();
        assert_eq!(keys, vec!["$G#000001", "$G#000002", "$G#000010"]);
    }
}
