//! Typed records for each RMONITOR sentence kind
//!
//! Each record is built once from the raw positional fields of a sentence.
//! Field positions are 1-based: index 0 is always the sentence tag.

use crate::error::{ProtocolError, Result};

/// Run id the timing system uses for "no active run"
const INACTIVE_RUN_ID: i64 = 95;

/// Laps-left value meaning "not a lap-limited run"
const NO_LAP_LIMIT: i64 = 9999;

/// Time-left value meaning "not a timed run"
const NO_TIME_LIMIT: &str = "00:00:00";

/// Lap time value meaning "no lap recorded"
const NO_LAP_TIME: &str = "00:00:00.000";

/// Positional access to the fields of one sentence
pub(crate) struct FieldReader<'a> {
    kind: &'a str,
    fields: &'a [String],
}

impl<'a> FieldReader<'a> {
    pub(crate) fn new(kind: &'a str, fields: &'a [String]) -> Self {
        Self { kind, fields }
    }

    pub(crate) fn kind(&self) -> &'a str {
        self.kind
    }

    fn malformed(&self, reason: String) -> ProtocolError {
        ProtocolError::malformed(self.kind, reason)
    }

    pub(crate) fn text(&self, index: usize) -> Result<&'a str> {
        self.fields.get(index).map(String::as_str).ok_or_else(|| {
            self.malformed(format!(
                "expected at least {} fields, got {}",
                index,
                self.fields.len().saturating_sub(1)
            ))
        })
    }

    pub(crate) fn string(&self, index: usize) -> Result<String> {
        self.text(index).map(str::to_string)
    }

    pub(crate) fn int(&self, index: usize) -> Result<i64> {
        let raw = self.text(index)?;
        raw.trim()
            .parse()
            .map_err(|_| self.malformed(format!("field {} is not an integer: {:?}", index, raw)))
    }

    /// Integer field where an empty value means zero
    pub(crate) fn int_or_zero(&self, index: usize) -> Result<i64> {
        if self.text(index)?.is_empty() {
            Ok(0)
        } else {
            self.int(index)
        }
    }
}

/// Entry data (`$A`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: String,
    pub car: String,
    pub transponder: String,
    pub first_name: String,
    pub last_name: String,
    pub extra: String,
    pub class_id: String,
}

impl Entry {
    pub(crate) fn parse(f: &FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            id: f.string(1)?,
            car: f.string(2)?,
            transponder: f.string(3)?,
            first_name: f.string(4)?,
            last_name: f.string(5)?,
            extra: f.string(6)?,
            class_id: f.string(7)?,
        })
    }
}

/// Run information (`$B`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub id: i64,
    pub name: String,
}

impl RunInfo {
    pub(crate) fn parse(f: &FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            id: f.int(1)?,
            name: f.string(2)?,
        })
    }

    pub fn is_active(&self) -> bool {
        self.id != INACTIVE_RUN_ID
    }
}

/// Class information (`$C`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClassInfo {
    pub id: i64,
    pub name: String,
}

impl ClassInfo {
    pub(crate) fn parse(f: &FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            id: f.int(1)?,
            name: f.string(2)?,
        })
    }
}

/// Competitor data (`$COMP`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Competitor {
    pub id: String,
    pub car: String,
    pub class_id: String,
    pub first_name: String,
    pub last_name: String,
    pub extra: String,
    pub extra2: String,
}

impl Competitor {
    pub(crate) fn parse(f: &FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            id: f.string(1)?,
            car: f.string(2)?,
            class_id: f.string(3)?,
            first_name: f.string(4)?,
            last_name: f.string(5)?,
            extra: f.string(6)?,
            extra2: f.string(7)?,
        })
    }
}

/// Extra information item (`$E`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtraInfo {
    pub key: String,
    pub value: String,
}

impl ExtraInfo {
    pub(crate) fn parse(f: &FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            key: f.string(1)?,
            value: f.string(2)?,
        })
    }
}

/// Flag and run state (`$F`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagState {
    /// `None` when the run is not lap-limited
    pub laps_left: Option<i64>,
    /// `None` when the run is not timed
    pub time_left: Option<String>,
    pub time_of_day: String,
    pub elapsed: String,
    /// Flag condition, whitespace trimmed
    pub flag: String,
}

impl FlagState {
    /// Position of the flag field within the sentence
    pub const FLAG_FIELD: usize = 5;

    /// Minimum wire width of the flag field
    pub const FLAG_WIDTH: usize = 6;

    pub(crate) fn parse(f: &FieldReader<'_>) -> Result<Self> {
        let laps_left = f.int(1)?;
        let time_left = f.string(2)?;
        Ok(Self {
            laps_left: (laps_left != NO_LAP_LIMIT).then_some(laps_left),
            time_left: (time_left != NO_TIME_LIMIT).then_some(time_left),
            time_of_day: f.string(3)?,
            elapsed: f.string(4)?,
            flag: f.text(Self::FLAG_FIELD)?.trim().to_string(),
        })
    }

    /// Flag field as written on the wire: right-padded to the minimum width
    pub fn padded_flag(&self) -> String {
        format!("{:<width$}", self.flag, width = Self::FLAG_WIDTH)
    }
}

/// Race position report (`$G`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Position {
    pub position: i64,
    pub id: String,
    pub laps: i64,
    pub total_time: String,
}

impl Position {
    pub(crate) fn parse(f: &FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            position: f.int(1)?,
            id: f.string(2)?,
            laps: f.int_or_zero(3)?,
            total_time: f.string(4)?,
        })
    }
}

/// Practice/qualifying report (`$H`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LapTime {
    pub position: i64,
    pub id: String,
    /// Lap on which the best time was set; `None` with `best_time`
    pub best_lap: Option<i64>,
    pub best_time: Option<String>,
}

impl LapTime {
    pub(crate) fn parse(f: &FieldReader<'_>) -> Result<Self> {
        let best_lap = f.int_or_zero(3)?;
        let best_time = f.string(4)?;
        let recorded = best_lap != 0 && best_time != NO_LAP_TIME;
        Ok(Self {
            position: f.int(1)?,
            id: f.string(2)?,
            best_lap: recorded.then_some(best_lap),
            best_time: recorded.then_some(best_time),
        })
    }
}

/// Initialization (`$I`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reset {
    pub time_of_day: String,
    pub date: String,
}

impl Reset {
    pub(crate) fn parse(f: &FieldReader<'_>) -> Result<Self> {
        Ok(Self {
            time_of_day: f.string(1)?,
            date: f.string(2)?,
        })
    }
}

/// Passing report (`$J`)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Passing {
    pub id: String,
    pub last_lap: Option<String>,
    pub total_time: String,
}

impl Passing {
    pub(crate) fn parse(f: &FieldReader<'_>) -> Result<Self> {
        let last_lap = f.string(2)?;
        Ok(Self {
            id: f.string(1)?,
            last_lap: (last_lap != NO_LAP_TIME).then_some(last_lap),
            total_time: f.string(3)?,
        })
    }
}

/// Line crossing report (`$L`, IMSA extension)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineCrossing {
    pub car: String,
    pub loop_number: i64,
    pub loop_name: String,
    pub date: String,
    pub time: String,
    pub driver_id: Option<i64>,
    pub class_name: String,
}

impl LineCrossing {
    pub(crate) fn parse(f: &FieldReader<'_>) -> Result<Self> {
        let driver_id = f.int(6)?;
        Ok(Self {
            car: f.string(1)?,
            loop_number: f.int(2)?,
            loop_name: f.string(3)?,
            date: f.string(4)?,
            time: f.string(5)?,
            driver_id: (driver_id != 0).then_some(driver_id),
            class_name: f.string(7)?,
        })
    }
}

/// One timed section of the track
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackSection {
    pub name: String,
    /// Timeline the section starts at
    pub start: String,
    /// Timeline the section ends at
    pub end: String,
    /// Section length in inches
    pub distance: i64,
}

/// Track information (`$T`, IMSA extension)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackInfo {
    pub name: String,
    pub short_name: String,
    /// Track length in miles, as sent
    pub distance: String,
    pub sections: Vec<TrackSection>,
}

impl TrackInfo {
    const FIRST_SECTION: usize = 5;
    const SECTION_WIDTH: usize = 4;

    pub(crate) fn parse(f: &FieldReader<'_>) -> Result<Self> {
        let count = f.int(4)?;
        let count = usize::try_from(count)
            .map_err(|_| ProtocolError::malformed(f.kind(), format!("negative section count {}", count)))?;

        let sections = (0..count)
            .map(|i| {
                let base = Self::FIRST_SECTION + Self::SECTION_WIDTH * i;
                Ok(TrackSection {
                    name: f.string(base)?,
                    start: f.string(base + 1)?,
                    end: f.string(base + 2)?,
                    distance: f.int(base + 3)?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            name: f.string(1)?,
            short_name: f.string(2)?,
            distance: f.string(3)?,
            sections,
        })
    }
}

/// Typed view of a report
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReportBody {
    Entry(Entry),
    RunInfo(RunInfo),
    ClassInfo(ClassInfo),
    Competitor(Competitor),
    ExtraInfo(ExtraInfo),
    Flag(FlagState),
    Position(Position),
    LapTime(LapTime),
    Reset(Reset),
    Passing(Passing),
    LineCrossing(LineCrossing),
    TrackInfo(TrackInfo),
    /// Unknown or malformed sentence, carried verbatim
    Generic,
}
