//! RMONITOR report: one parsed sentence
//!
//! A `Report` keeps the raw positional fields it was built from, a typed view
//! of those fields, and its cache key. Wire encodings are computed on first
//! use and memoized.

use std::borrow::Cow;
use std::fmt;
use std::sync::OnceLock;

use crate::charset::Charset;
use crate::error::{ProtocolError, Result};
use crate::records::ReportBody;
use crate::registry::{self, KindSpec};

/// An immutable RMONITOR report
pub struct Report {
    fields: Vec<String>,
    body: ReportBody,
    cache_key: Option<String>,
    csv: OnceLock<String>,
    json: OnceLock<String>,
}

impl Report {
    /// Build a report from its field list (tag first)
    ///
    /// With `strict`, an unknown tag or malformed fields are errors. Otherwise
    /// they produce a generic report that carries the fields verbatim and is
    /// never cached.
    pub fn parse(fields: Vec<String>, strict: bool) -> Result<Self> {
        let kind = fields.first().ok_or(ProtocolError::EmptyRecord)?;

        let spec = registry::lookup(kind);
        let typed = match spec {
            Some(spec) => Self::build(spec, &fields),
            None => Err(ProtocolError::UnknownKind(kind.clone())),
        };

        match typed {
            Ok((body, cache_key)) => Ok(Self::with_body(fields, body, cache_key)),
            Err(e) if strict || !e.is_recoverable() => Err(e),
            Err(e) => {
                tracing::trace!(
                    kind = spec.map_or("unknown", |s| s.name),
                    error = %e,
                    "falling back to generic report"
                );
                Ok(Self::generic(fields))
            }
        }
    }

    fn build(spec: &KindSpec, fields: &[String]) -> Result<(ReportBody, Option<String>)> {
        let body = spec.parse(fields)?;
        let cache_key = spec
            .key
            .map(|rule| rule.derive(spec.tag, fields.get(1).map(String::as_str)))
            .transpose()?;
        Ok((body, cache_key))
    }

    fn with_body(fields: Vec<String>, body: ReportBody, cache_key: Option<String>) -> Self {
        Self {
            fields,
            body,
            cache_key,
            csv: OnceLock::new(),
            json: OnceLock::new(),
        }
    }

    /// Wrap fields without interpreting them
    fn generic(fields: Vec<String>) -> Self {
        Self::with_body(fields, ReportBody::Generic, None)
    }

    /// Parse one CSV record from wire bytes in `charset`
    pub fn from_csv(bytes: &[u8], charset: Charset, strict: bool) -> Result<Self> {
        Self::from_csv_str(&charset.decode(bytes), strict)
    }

    /// Parse one CSV record from already-decoded text
    pub fn from_csv_str(text: &str, strict: bool) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(text.as_bytes());

        let mut record = csv::StringRecord::new();
        if !reader.read_record(&mut record)? {
            return Err(ProtocolError::EmptyRecord);
        }

        // A bare CR or LF outside quotes splits the line into two records
        let mut rest = csv::StringRecord::new();
        if reader.read_record(&mut rest)? {
            return Err(ProtocolError::SplitRecord);
        }

        Self::parse(record.iter().map(str::to_string).collect(), strict)
    }

    /// Parse a JSON array of strings
    pub fn from_json(text: &str, strict: bool) -> Result<Self> {
        let fields: Vec<String> = serde_json::from_str(text)?;
        Self::parse(fields, strict)
    }

    /// Sentence tag, e.g. `$F`
    pub fn kind(&self) -> &str {
        &self.fields[0]
    }

    /// Raw fields, tag first
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Typed view of the fields
    pub fn body(&self) -> &ReportBody {
        &self.body
    }

    /// True when the fields did not parse as a registered kind
    pub fn is_generic(&self) -> bool {
        matches!(self.body, ReportBody::Generic)
    }

    /// True for the initialization sentence that clears cached state
    pub fn is_reset(&self) -> bool {
        matches!(self.body, ReportBody::Reset(_))
    }

    /// Key deciding which cached record this report replaces
    ///
    /// `None` means the report is never cached.
    pub fn cache_key(&self) -> Option<&str> {
        self.cache_key.as_deref()
    }

    /// The report as one CSV record, without line terminator
    pub fn to_csv(&self) -> &str {
        self.csv.get_or_init(|| {
            let fields = self.wire_fields();
            write_csv_record(&fields).unwrap_or_else(|e| {
                tracing::warn!(error = %e, kind = self.kind(), "CSV writer failed; joining fields unquoted");
                fields.join(",")
            })
        })
    }

    /// The CSV record encoded for the wire in `charset`
    ///
    /// Never fails: characters `charset` cannot represent are replaced.
    pub fn encode_csv(&self, charset: Charset) -> Vec<u8> {
        charset.encode(self.to_csv())
    }

    /// The raw fields as a JSON array
    pub fn to_json(&self) -> &str {
        self.json
            .get_or_init(|| serde_json::Value::from(self.fields.clone()).to_string())
    }

    /// Fields as written to the wire: the flag condition is padded for
    /// fixed-width scoreboard consumers
    fn wire_fields(&self) -> Vec<Cow<'_, str>> {
        let mut fields: Vec<Cow<'_, str>> = self.fields.iter().map(|f| Cow::Borrowed(f.as_str())).collect();
        if let ReportBody::Flag(flag) = &self.body {
            fields[crate::records::FlagState::FLAG_FIELD] = Cow::Owned(flag.padded_flag());
        }
        fields
    }
}

fn write_csv_record(fields: &[Cow<'_, str>]) -> Result<String> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .terminator(csv::Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    writer.write_record(fields.iter().map(|f| f.as_bytes()))?;

    let mut bytes = writer
        .into_inner()
        .map_err(|e| ProtocolError::Csv(csv::Error::from(e.into_error())))?;
    if bytes.last() == Some(&b'\n') {
        bytes.pop();
    }
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

impl fmt::Debug for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Report")
            .field("fields", &self.fields)
            .field("cache_key", &self.cache_key)
            .finish()
    }
}

impl PartialEq for Report {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Eq for Report {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::records::FlagState;

    fn fields(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_unknown_kind_strict() {
        let err = Report::parse(fields(&["$Q", "1"]), true).unwrap_err();
        assert!(matches!(err, ProtocolError::UnknownKind(ref k) if k == "$Q"));
    }

    #[test]
    fn test_unknown_kind_lenient() {
        let report = Report::parse(fields(&["$Q", "1"]), false).unwrap();
        assert!(report.is_generic());
        assert_eq!(report.kind(), "$Q");
        assert_eq!(report.cache_key(), None);
        assert_eq!(report.to_csv(), "$Q,1");
    }

    #[test]
    fn test_malformed_known_kind_lenient() {
        let report = Report::parse(fields(&["$G", "first", "12"]), false).unwrap();
        assert!(report.is_generic());
        assert_eq!(report.kind(), "$G");
        assert_eq!(report.cache_key(), None);

        let err = Report::parse(fields(&["$G", "first", "12"]), true).unwrap_err();
        assert!(matches!(err, ProtocolError::MalformedFields { .. }));
    }

    #[test]
    fn test_empty_record() {
        assert!(matches!(Report::parse(Vec::new(), false), Err(ProtocolError::EmptyRecord)));
        assert!(matches!(Report::from_csv_str("", false), Err(ProtocolError::EmptyRecord)));
    }

    #[test]
    fn test_flag_padding_on_encode_only() {
        let report = Report::from_csv_str("$F,12,00:10:00,14:32:01,00:05:12,Red", true).unwrap();
        match report.body() {
            ReportBody::Flag(FlagState { flag, laps_left, .. }) => {
                assert_eq!(flag, "Red");
                assert_eq!(*laps_left, Some(12));
            }
            other => panic!("expected flag, got {:?}", other),
        }
        assert_eq!(report.fields()[5], "Red");
        assert_eq!(report.to_csv(), "$F,12,00:10:00,14:32:01,00:05:12,Red   ");
    }

    #[test]
    fn test_csv_quoting() {
        let report = Report::parse(fields(&["$A", "12", "12", "5512", "Jean, Jr", "O\"Neil", "", "3"]), true).unwrap();
        assert_eq!(report.to_csv(), "$A,12,12,5512,\"Jean, Jr\",\"O\"\"Neil\",,3");

        let reparsed = Report::from_csv_str(report.to_csv(), true).unwrap();
        assert_eq!(reparsed.fields(), report.fields());
    }

    #[test]
    fn test_bare_line_break_rejected() {
        for line in ["$E,NOTE,a\rb", "$F,10,00:10:00,14:00:00,00:20:00,Gre\ren", "$B,5,Ra\nce"] {
            assert!(matches!(Report::from_csv_str(line, false), Err(ProtocolError::SplitRecord)), "{:?}", line);
            assert!(matches!(Report::from_csv_str(line, true), Err(ProtocolError::SplitRecord)), "{:?}", line);
        }

        // Quoted line breaks are field content; a trailing terminator is not a second record
        let quoted = Report::from_csv_str("$E,NOTE,\"a\rb\"", true).unwrap();
        assert_eq!(quoted.fields()[2], "a\rb");
        assert!(Report::from_csv_str("$B,5,Race\r\n", true).is_ok());
    }

    #[test]
    fn test_csv_decodes_charset() {
        let report = Report::from_csv(b"$COMP,1,1,2,Andr\xe9,M\xfcller,,", Charset::default(), true).unwrap();
        match report.body() {
            ReportBody::Competitor(c) => {
                assert_eq!(c.first_name, "André");
                assert_eq!(c.last_name, "Müller");
            }
            other => panic!("expected competitor, got {:?}", other),
        }
        assert_eq!(report.encode_csv(Charset::default()), b"$COMP,1,1,2,Andr\xe9,M\xfcller,,".to_vec());
    }

    #[test]
    fn test_json_roundtrip() {
        let report = Report::from_json(r#"["$E","TRACKNAME","Sebring"]"#, true).unwrap();
        assert_eq!(report.cache_key(), Some("$E:TRACKNAME"));
        assert_eq!(report.to_json(), r#"["$E","TRACKNAME","Sebring"]"#);
    }

    #[test]
    fn test_json_rejects_non_strings() {
        assert!(matches!(Report::from_json("[1, 2]", false), Err(ProtocolError::Json(_))));
    }

    #[test]
    fn test_extra_fields_preserved() {
        let report = Report::parse(fields(&["$I", "14:00:00", "01 Jan 24", "trailing"]), true).unwrap();
        assert!(report.is_reset());
        assert_eq!(report.cache_key(), Some(""));
        assert_eq!(report.to_csv(), "$I,14:00:00,01 Jan 24,trailing");
    }
}
