use std::collections::{BTreeMap, BTreeSet};
use std::fs::File;
use std::path::Path;

use arrow::array::{Array, ArrayRef, AsArray};
use arrow::datatypes::{
    DataType, Date32Type, Date64Type, Float32Type, Float64Type, Int32Type, Int64Type, TimeUnit,
    TimestampMicrosecondType, TimestampMillisecondType, TimestampNanosecondType,
    TimestampSecondType,
};
use arrow::util::display::array_value_to_string;
use calamine::{open_workbook_auto, Data, Reader};
use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime};
use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
use serde_json::Value as JsonValue;

use super::error::LoadError;
use super::model::{CellValue, Column, ColumnKind, PricingTable, Record};

/// Sheet holding the pricing records in the benchmarking workbook.
pub const DEFAULT_SHEET: &str = "in";

#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Worksheet to read from workbook formats; ignored for the others.
    pub sheet: String,
}

impl Default for LoadOptions {
    fn default() -> Self {
        Self {
            sheet: DEFAULT_SHEET.to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Load a pricing table from a file.  Dispatch by extension.
///
/// Supported formats:
/// * `.xlsx` / `.xlsm` / `.xlsb` / `.xls` / `.ods` – one named sheet, header in row 1
/// * `.csv`     – header row, one record per line
/// * `.parquet` – one column per attribute
/// * `.json`    – `[{ "Material_Name": ..., "Unit_Price_Latest": ... }, ...]`
pub fn load_file(path: &Path, options: &LoadOptions) -> Result<PricingTable, LoadError> {
    // Surface a plain IO error for missing/unreadable paths before any
    // format-specific reader wraps it.
    std::fs::metadata(path)?;

    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    let table = match ext.as_str() {
        "xlsx" | "xlsm" | "xlsb" | "xls" | "ods" => load_workbook(path, &options.sheet),
        "csv" => load_csv(path),
        "parquet" | "pq" => load_parquet(path),
        "json" => load_json(path),
        other => Err(LoadError::UnsupportedExtension(other.to_string())),
    }?;

    log::info!(
        "Loaded {} records ({} columns) from {}",
        table.len(),
        table.columns().len(),
        path.display()
    );
    for (column, count) in table.degraded() {
        log::warn!("{count} unparseable value(s) in '{column}' treated as absent");
    }
    Ok(table)
}

// ---------------------------------------------------------------------------
// Raw cells and normalisation
// ---------------------------------------------------------------------------

/// A cell as read from the source, before column-specific normalisation.
#[derive(Debug, Clone, PartialEq)]
enum RawCell {
    Empty,
    Text(String),
    Number(f64),
    Bool(bool),
    DateTime(NaiveDateTime),
}

/// Outcome of normalising one cell.
#[derive(Debug, PartialEq)]
enum Normalized {
    Value(CellValue),
    /// Present in the source but unparseable for the column kind.
    Degraded,
}

fn normalize(kind: ColumnKind, raw: RawCell) -> Normalized {
    use Normalized::{Degraded, Value};

    if let RawCell::Text(s) = &raw {
        if is_null_token(s) {
            return Value(CellValue::Null);
        }
    }

    match (kind, raw) {
        (_, RawCell::Empty) => Value(CellValue::Null),

        (ColumnKind::Text, RawCell::Text(s)) => Value(CellValue::Text(s)),
        (ColumnKind::Text, RawCell::Number(v)) => Value(CellValue::Text(v.to_string())),
        (ColumnKind::Text, RawCell::Bool(b)) => Value(CellValue::Text(b.to_string())),
        (ColumnKind::Text, RawCell::DateTime(dt)) => {
            Value(CellValue::Text(CellValue::Timestamp(dt).to_string()))
        }

        (ColumnKind::Number | ColumnKind::Percent, RawCell::Number(v)) if v.is_finite() => {
            Value(CellValue::Number(v))
        }
        (ColumnKind::Number, RawCell::Text(s)) => {
            parse_number(&s).map_or(Degraded, |v| Value(CellValue::Number(v)))
        }
        (ColumnKind::Percent, RawCell::Text(s)) => {
            parse_percent(&s).map_or(Degraded, |v| Value(CellValue::Number(v)))
        }

        (ColumnKind::Timestamp, RawCell::DateTime(dt)) => Value(CellValue::Timestamp(dt)),
        (ColumnKind::Timestamp, RawCell::Text(s)) => {
            parse_timestamp(&s).map_or(Degraded, |dt| Value(CellValue::Timestamp(dt)))
        }
        (ColumnKind::Timestamp, RawCell::Number(v)) => excel_serial_to_datetime(v)
            .or_else(|| epoch_millis_to_datetime(v))
            .map_or(Degraded, |dt| Value(CellValue::Timestamp(dt))),

        _ => Degraded,
    }
}

/// Blank cells and the usual missing-value spellings.
fn is_null_token(s: &str) -> bool {
    matches!(
        s.trim(),
        "" | "NaN" | "nan" | "NaT" | "N/A" | "n/a" | "NA" | "null" | "NULL" | "None"
    )
}

fn parse_number(s: &str) -> Option<f64> {
    s.trim().parse::<f64>().ok().filter(|v| v.is_finite())
}

/// `"12.5%"`, `"-3 %"` and `"7"` all parse; the sign is kept.
pub fn parse_percent(s: &str) -> Option<f64> {
    parse_number(&s.replace('%', ""))
}

const DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
    "%Y/%m/%d %H:%M:%S",
    "%m/%d/%Y %H:%M:%S",
    "%m/%d/%Y %H:%M",
];

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%m/%d/%Y", "%d-%b-%Y", "%B %d, %Y"];

/// Parse the timestamp spellings found in exported spreadsheets.
///
/// Offsets (RFC 3339) are converted to UTC. Returns `None` when no format
/// matches.
pub fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        return Some(dt);
    }
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

/// Convert an Excel serial date (days since 1899-12-30) to a timestamp.
fn excel_serial_to_datetime(serial: f64) -> Option<NaiveDateTime> {
    // 2958465 is 9999-12-31, the last date Excel can represent.
    if !serial.is_finite() || !(0.0..2_958_466.0).contains(&serial) {
        return None;
    }
    let epoch = NaiveDate::from_ymd_opt(1899, 12, 30)?.and_hms_opt(0, 0, 0)?;
    let days = serial.trunc();
    let millis = ((serial - days) * 86_400_000.0).round() as i64;
    epoch.checked_add_signed(Duration::days(days as i64) + Duration::milliseconds(millis))
}

/// Whole-number epoch milliseconds, as pandas writes datetimes in
/// records-oriented JSON. Only consulted outside the Excel serial range.
fn epoch_millis_to_datetime(value: f64) -> Option<NaiveDateTime> {
    if !value.is_finite() || value.fract() != 0.0 {
        return None;
    }
    DateTime::from_timestamp_millis(value as i64).map(|dt| dt.naive_utc())
}

// ---------------------------------------------------------------------------
// TableBuilder – header mapping and row accumulation shared by all formats
// ---------------------------------------------------------------------------

struct TableBuilder {
    /// (source position, column) for every recognised header.
    mapping: Vec<(usize, Column)>,
    records: Vec<Record>,
    degraded: BTreeMap<Column, usize>,
}

impl TableBuilder {
    /// Match source headers against the known columns and check that every
    /// required column is present.
    fn new<S: AsRef<str>>(headers: &[S]) -> Result<Self, LoadError> {
        let mut seen = BTreeSet::new();
        let mut mapping = Vec::new();
        for (idx, header) in headers.iter().enumerate() {
            let header = header.as_ref();
            match Column::from_header(header) {
                Some(col) if seen.insert(col) => mapping.push((idx, col)),
                Some(col) => log::warn!("Duplicate column '{col}' at position {idx} ignored"),
                None => log::debug!("Ignoring unrecognised column '{header}'"),
            }
        }

        let missing: Vec<String> = Column::ALL
            .into_iter()
            .filter(|c| c.is_required() && !seen.contains(c))
            .map(|c| c.header().to_string())
            .collect();
        if !missing.is_empty() {
            return Err(LoadError::MissingColumns(missing));
        }

        Ok(Self {
            mapping,
            records: Vec::new(),
            degraded: BTreeMap::new(),
        })
    }

    fn push_row(&mut self, mut row: Vec<RawCell>) {
        let mut record = Record::default();
        for &(idx, col) in &self.mapping {
            let raw = row
                .get_mut(idx)
                .map(|c| std::mem::replace(c, RawCell::Empty))
                .unwrap_or(RawCell::Empty);
            match normalize(col.kind(), raw) {
                Normalized::Value(value) => record.set(col, value),
                Normalized::Degraded => *self.degraded.entry(col).or_insert(0) += 1,
            }
        }
        self.records.push(record);
    }

    fn finish(self) -> PricingTable {
        let columns: Vec<Column> = self.mapping.iter().map(|&(_, c)| c).collect();
        PricingTable::from_records(self.records, &columns).with_degraded(self.degraded)
    }
}

// ---------------------------------------------------------------------------
// Workbook loader
// ---------------------------------------------------------------------------

fn load_workbook(path: &Path, sheet: &str) -> Result<PricingTable, LoadError> {
    let mut workbook = open_workbook_auto(path)?;
    if !workbook.sheet_names().iter().any(|name| name == sheet) {
        return Err(LoadError::SheetNotFound(sheet.to_string()));
    }
    let range = workbook.worksheet_range(sheet)?;

    let mut rows = range.rows();
    let headers: Vec<String> = rows
        .next()
        .ok_or_else(|| LoadError::InvalidFormat(format!("sheet '{sheet}' is empty")))?
        .iter()
        .map(|cell| match cell {
            Data::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect();

    let mut builder = TableBuilder::new(&headers)?;
    for row in rows {
        builder.push_row(row.iter().map(workbook_cell).collect());
    }
    Ok(builder.finish())
}

fn workbook_cell(cell: &Data) -> RawCell {
    match cell {
        Data::Empty | Data::Error(_) => RawCell::Empty,
        Data::String(s) | Data::DateTimeIso(s) | Data::DurationIso(s) => RawCell::Text(s.clone()),
        Data::Float(f) => RawCell::Number(*f),
        Data::Int(i) => RawCell::Number(*i as f64),
        Data::Bool(b) => RawCell::Bool(*b),
        // calamine applies the workbook's 1900/1904 date system here
        Data::DateTime(dt) => dt.as_datetime().map_or(RawCell::Empty, RawCell::DateTime),
    }
}

// ---------------------------------------------------------------------------
// CSV loader
// ---------------------------------------------------------------------------

/// CSV layout: header row with the spreadsheet's column names, every field
/// read as text and normalised per column. Short rows leave the missing
/// fields absent.
fn load_csv(path: &Path) -> Result<PricingTable, LoadError> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_path(path)?;
    load_csv_reader(&mut reader)
}

/// Shared by file loading and re-parsing exported bytes.
pub(crate) fn load_csv_reader<R: std::io::Read>(
    reader: &mut csv::Reader<R>,
) -> Result<PricingTable, LoadError> {
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();
    let mut builder = TableBuilder::new(&headers)?;

    for result in reader.records() {
        let record = result?;
        builder.push_row(
            record
                .iter()
                .map(|field| {
                    if field.is_empty() {
                        RawCell::Empty
                    } else {
                        RawCell::Text(field.to_string())
                    }
                })
                .collect(),
        );
    }
    Ok(builder.finish())
}

// ---------------------------------------------------------------------------
// Parquet loader
// ---------------------------------------------------------------------------

/// Load a Parquet file with one column per attribute.
///
/// Works with files written by both **Pandas** (`df.to_parquet()`) and
/// **Polars** (`df.write_parquet()`); string, numeric, boolean, date and
/// timestamp columns are all accepted.
fn load_parquet(path: &Path) -> Result<PricingTable, LoadError> {
    let file = File::open(path)?;
    let reader_builder = ParquetRecordBatchReaderBuilder::try_new(file)?;
    let headers: Vec<String> = reader_builder
        .schema()
        .fields()
        .iter()
        .map(|f| f.name().clone())
        .collect();
    let mut builder = TableBuilder::new(&headers)?;
    let reader = reader_builder.build()?;

    for batch_result in reader {
        let batch = batch_result?;
        for row in 0..batch.num_rows() {
            builder.push_row(
                batch
                    .columns()
                    .iter()
                    .map(|col| extract_arrow_cell(col, row))
                    .collect(),
            );
        }
    }
    Ok(builder.finish())
}

/// Extract a single cell from an Arrow column at a given row.
fn extract_arrow_cell(col: &ArrayRef, row: usize) -> RawCell {
    if col.is_null(row) {
        return RawCell::Empty;
    }
    let datetime = |dt: Option<NaiveDateTime>| dt.map_or(RawCell::Empty, RawCell::DateTime);

    match col.data_type() {
        DataType::Utf8 => RawCell::Text(col.as_string::<i32>().value(row).to_string()),
        DataType::LargeUtf8 => RawCell::Text(col.as_string::<i64>().value(row).to_string()),
        DataType::Boolean => RawCell::Bool(col.as_boolean().value(row)),
        DataType::Int32 => RawCell::Number(col.as_primitive::<Int32Type>().value(row) as f64),
        DataType::Int64 => RawCell::Number(col.as_primitive::<Int64Type>().value(row) as f64),
        DataType::Float32 => RawCell::Number(col.as_primitive::<Float32Type>().value(row) as f64),
        DataType::Float64 => RawCell::Number(col.as_primitive::<Float64Type>().value(row)),
        DataType::Date32 => datetime(col.as_primitive::<Date32Type>().value_as_datetime(row)),
        DataType::Date64 => datetime(col.as_primitive::<Date64Type>().value_as_datetime(row)),
        DataType::Timestamp(unit, _) => datetime(match unit {
            TimeUnit::Second => col
                .as_primitive::<TimestampSecondType>()
                .value_as_datetime(row),
            TimeUnit::Millisecond => col
                .as_primitive::<TimestampMillisecondType>()
                .value_as_datetime(row),
            TimeUnit::Microsecond => col
                .as_primitive::<TimestampMicrosecondType>()
                .value_as_datetime(row),
            TimeUnit::Nanosecond => col
                .as_primitive::<TimestampNanosecondType>()
                .value_as_datetime(row),
        }),
        // Anything else (dictionaries, views, small ints) goes through Arrow's
        // own formatter and is normalised as text.
        _ => array_value_to_string(col, row).map_or(RawCell::Empty, RawCell::Text),
    }
}

// ---------------------------------------------------------------------------
// JSON loader
// ---------------------------------------------------------------------------

/// Expected JSON schema (records-oriented, `df.to_json(orient='records')`):
///
/// ```json
/// [
///   { "Material_Name": "Paracetamol", "Unit_Price_Latest": 12.5, ... },
///   ...
/// ]
/// ```
fn load_json(path: &Path) -> Result<PricingTable, LoadError> {
    let text = std::fs::read_to_string(path)?;
    let root: JsonValue = serde_json::from_str(&text)?;

    let records = root
        .as_array()
        .ok_or_else(|| LoadError::InvalidFormat("expected top-level JSON array".into()))?;

    let mut objects = Vec::with_capacity(records.len());
    for (i, rec) in records.iter().enumerate() {
        let obj = rec
            .as_object()
            .ok_or_else(|| LoadError::InvalidFormat(format!("row {i} is not a JSON object")))?;
        objects.push(obj);
    }

    let headers: Vec<String> = objects
        .iter()
        .flat_map(|obj| obj.keys().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let mut builder = TableBuilder::new(&headers)?;

    for obj in objects {
        builder.push_row(headers.iter().map(|h| json_cell(obj.get(h))).collect());
    }
    Ok(builder.finish())
}

fn json_cell(val: Option<&JsonValue>) -> RawCell {
    match val {
        None | Some(JsonValue::Null) => RawCell::Empty,
        Some(JsonValue::String(s)) => RawCell::Text(s.clone()),
        Some(JsonValue::Number(n)) => n.as_f64().map_or(RawCell::Empty, RawCell::Number),
        Some(JsonValue::Bool(b)) => RawCell::Bool(*b),
        Some(other) => RawCell::Text(other.to_string()),
    }
}
