//! Line-delimited record file format and legacy migration.
//!
//! Line 1 is a header object carrying the format version and population
//! counts; every following line is one record. Older deployments wrote one
//! whole JSON document (`{"memories": [...]}` or a bare array) and records
//! without `fractal`/`resonance` sub-objects. Both shapes load into the same
//! `Vec<Record>`.

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::constants::FORMAT_VERSION;
use crate::records::{Depth, FractalLinks, LateralLinks, Record, RecordStore, RecordType};

pub const CURRENT_VERSION: u32 = FORMAT_VERSION;

// --- Wire format types ---

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct FileHeader {
    pub format_version: u32,
    #[serde(default)]
    pub dimensions: usize,
    #[serde(default)]
    pub record_count: usize,
    #[serde(default)]
    pub depth_counts: BTreeMap<u8, usize>,
    #[serde(default)]
    pub type_counts: BTreeMap<String, usize>,
    #[serde(default)]
    pub saved_at: f64,
}

#[derive(Serialize, Deserialize, Debug)]
pub struct WireRecord {
    #[serde(default)]
    pub id: String,
    pub content: String,
    pub vector: Vec<f64>,
    #[serde(rename = "type", default)]
    pub record_type: String,
    #[serde(default = "default_weight")]
    pub weight: f64,
    /// Accepts both "time" and the older "timestamp".
    #[serde(default, alias = "timestamp")]
    pub time: f64,
    #[serde(default)]
    pub fractal: Option<WireFractal>,
    #[serde(default)]
    pub resonance: Option<WireResonance>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct WireFractal {
    #[serde(default)]
    pub depth: Option<u8>,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children_ids: Vec<String>,
}

#[derive(Serialize, Deserialize, Debug, Default)]
pub struct WireResonance {
    #[serde(default)]
    pub linked_ids: Vec<String>,
    #[serde(default)]
    pub activation_count: u32,
    #[serde(default)]
    pub last_resonance: Option<f64>,
}

fn default_weight() -> f64 {
    0.5
}

/// Whole-document format written before the line-delimited migration.
#[derive(Deserialize)]
#[serde(untagged)]
enum LegacyDocument {
    Wrapped { memories: Vec<serde_json::Value> },
    Bare(Vec<serde_json::Value>),
}

// --- Conversion ---

impl WireRecord {
    pub fn from_record(r: &Record) -> Self {
        Self {
            id: r.id.clone(),
            content: r.content.clone(),
            vector: r.vector().to_vec(),
            record_type: r.record_type.as_str().to_string(),
            weight: r.weight,
            time: r.time,
            fractal: Some(WireFractal {
                depth: Some(r.depth().level()),
                parent_id: r.fractal.parent_id.clone(),
                children_ids: r.fractal.children_ids.clone(),
            }),
            resonance: Some(WireResonance {
                linked_ids: r.resonance.linked_ids.clone(),
                activation_count: r.resonance.activation_count,
                last_resonance: r.resonance.last_resonance,
            }),
        }
    }

    /// Convert to a domain record, back-filling anything a pre-migration
    /// file left out. Returns whether the vector had to be padded.
    pub fn into_record(self, dimensions: usize) -> Result<(Record, bool), String> {
        let mut vector = self.vector;
        let padded = vector.len() < dimensions;
        if vector.len() > dimensions {
            return Err(format!(
                "vector has {} dimensions, expected {dimensions}",
                vector.len()
            ));
        }
        vector.resize(dimensions, 0.0);

        let id = if self.id.is_empty() {
            Uuid::new_v4().to_string()
        } else {
            self.id
        };
        let fractal = self.fractal.unwrap_or_default();
        let resonance = self.resonance.unwrap_or_default();
        let depth = fractal
            .depth
            .and_then(|d| Depth::try_from(d).ok())
            .unwrap_or_else(|| Depth::from_weight(self.weight));

        let mut record = Record::new(
            id,
            &self.content,
            vector,
            RecordType::from_str_lossy(&self.record_type),
            self.weight,
            self.time,
        );
        record.fractal = FractalLinks {
            depth,
            parent_id: fractal.parent_id,
            children_ids: fractal.children_ids,
        };
        record.resonance = LateralLinks {
            linked_ids: resonance.linked_ids,
            activation_count: resonance.activation_count,
            last_resonance: resonance.last_resonance,
        };
        Ok((record, padded))
    }
}

// --- Loading ---

/// Which parser produced the records.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordFileFormat {
    Empty,
    LineDelimited,
    /// Line-delimited records whose header line was missing or unreadable.
    Headerless,
    Legacy,
}

#[derive(Clone, Debug, PartialEq)]
pub struct SkippedLine {
    /// 1-based line number, or record index for legacy documents.
    pub line: usize,
    pub reason: String,
}

/// What happened while parsing a record file. The caller decides how loudly
/// to report it.
#[derive(Clone, Debug)]
pub struct LoadReport {
    pub format: RecordFileFormat,
    pub header: Option<FileHeader>,
    pub loaded: usize,
    pub padded: usize,
    pub skipped: Vec<SkippedLine>,
}

impl LoadReport {
    fn new(format: RecordFileFormat) -> Self {
        Self {
            format,
            header: None,
            loaded: 0,
            padded: 0,
            skipped: Vec::new(),
        }
    }
}

/// Parse a record file of any supported shape into a fully indexed store.
///
/// Tries the line-delimited parser first. If the first line is not a
/// header, the whole text is tried as a legacy document, and failing that
/// every line is read as a headerless record line.
pub fn parse_record_file(text: &str, dimensions: usize) -> (RecordStore, LoadReport) {
    let mut lines = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());

    let Some((_, first)) = lines.next() else {
        return (
            RecordStore::new(dimensions),
            LoadReport::new(RecordFileFormat::Empty),
        );
    };

    if let Ok(header) = serde_json::from_str::<FileHeader>(first) {
        let mut report = LoadReport::new(RecordFileFormat::LineDelimited);
        report.header = Some(header);
        let records = collect_lines(lines, dimensions, &mut report);
        return (RecordStore::from_records(dimensions, records), report);
    }

    if let Ok(doc) = serde_json::from_str::<LegacyDocument>(text) {
        let values = match doc {
            LegacyDocument::Wrapped { memories } => memories,
            LegacyDocument::Bare(values) => values,
        };
        let mut report = LoadReport::new(RecordFileFormat::Legacy);
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for (i, value) in values.into_iter().enumerate() {
            let parsed = serde_json::from_value::<WireRecord>(value).map_err(|e| e.to_string());
            accept(parsed, i + 1, dimensions, &mut seen, &mut records, &mut report);
        }
        return (RecordStore::from_records(dimensions, records), report);
    }

    let mut report = LoadReport::new(RecordFileFormat::Headerless);
    let all = text
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty());
    let records = collect_lines(all, dimensions, &mut report);
    (RecordStore::from_records(dimensions, records), report)
}

fn collect_lines<'a>(
    lines: impl Iterator<Item = (usize, &'a str)>,
    dimensions: usize,
    report: &mut LoadReport,
) -> Vec<Record> {
    let mut seen = HashSet::new();
    let mut records = Vec::new();
    for (idx, line) in lines {
        let parsed = serde_json::from_str::<WireRecord>(line).map_err(|e| e.to_string());
        accept(parsed, idx + 1, dimensions, &mut seen, &mut records, report);
    }
    records
}

fn accept(
    parsed: Result<WireRecord, String>,
    line: usize,
    dimensions: usize,
    seen: &mut HashSet<String>,
    records: &mut Vec<Record>,
    report: &mut LoadReport,
) {
    let result = parsed.and_then(|wire| wire.into_record(dimensions));
    match result {
        Ok((record, padded)) => {
            if !seen.insert(record.id.clone()) {
                report.skipped.push(SkippedLine {
                    line,
                    reason: format!("duplicate id {}", record.id),
                });
                return;
            }
            if padded {
                report.padded += 1;
            }
            report.loaded += 1;
            records.push(record);
        }
        Err(reason) => report.skipped.push(SkippedLine { line, reason }),
    }
}

// --- Rendering ---

pub fn file_header(store: &RecordStore, saved_at: f64) -> FileHeader {
    let stats = store.stats();
    FileHeader {
        format_version: CURRENT_VERSION,
        dimensions: store.dimensions(),
        record_count: stats.total,
        depth_counts: stats.by_depth,
        type_counts: stats.by_type,
        saved_at,
    }
}

/// Render the store as header line plus one line per record.
pub fn render_record_file(store: &RecordStore, saved_at: f64) -> Result<String, serde_json::Error> {
    let mut out = serde_json::to_string(&file_header(store, saved_at))?;
    out.push('\n');
    for record in store.iter() {
        out.push_str(&serde_json::to_string(&WireRecord::from_record(record))?);
        out.push('\n');
    }
    Ok(out)
}
