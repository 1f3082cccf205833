use std::fs::File;
use std::sync::Arc;

use anyhow::{Context, Result};
use arrow::array::{ArrayRef, Float64Array, StringArray, TimestampSecondArray};
use arrow::datatypes::{DataType, Field, Schema, TimeUnit};
use arrow::record_batch::RecordBatch;
use arrow::util::pretty::pretty_format_batches;
use chrono::{Duration, NaiveDate, NaiveDateTime};
use parquet::arrow::ArrowWriter;
use serde::Serialize;

const PARQUET_PATH: &str = "sample_pricing.parquet";
const CSV_PATH: &str = "sample_pricing.csv";

/// (material, type, benchmark price per kg)
const MATERIALS: [(&str, &str, f64); 8] = [
    ("Paracetamol", "API", 42.0),
    ("Ibuprofen", "API", 55.0),
    ("Metformin HCl", "API", 38.0),
    ("Lactose Monohydrate", "Excipient", 6.5),
    ("Microcrystalline Cellulose", "Excipient", 8.0),
    ("Magnesium Stearate", "Excipient", 12.0),
    ("Ethanol 96%", "Solvent", 3.2),
    ("Purified Water", "Solvent", 0.8),
];
const VENDORS: [&str; 5] = ["Sigma Aldrich", "BASF", "Merck", "Alfa Aesar", "Spectrum"];
const CURRENCIES: [&str; 3] = ["USD", "EUR", "INR"];
const SPECIFICATIONS: [&str; 3] = ["USP", "EP", "BP"];
const GRADES: [&str; 3] = ["Pharma", "Analytical", "Technical"];
const PORTALS: [&str; 3] = ["IndiaMART", "Alibaba", "ChemDirect"];
const PORTAL_STATUSES: [&str; 3] = ["Validated", "Pending", "Rejected"];
const FORMS: [&str; 3] = ["Powder", "Liquid", "Granules"];

/// Minimal deterministic PRNG (xoshiro256**)
struct SimpleRng {
    state: [u64; 4],
}

impl SimpleRng {
    fn new(seed: u64) -> Self {
        let mut s = [0u64; 4];
        let mut x = seed;
        for slot in &mut s {
            x = x.wrapping_mul(6364136223846793005).wrapping_add(1);
            *slot = x;
        }
        SimpleRng { state: s }
    }

    fn next_u64(&mut self) -> u64 {
        let result = (self.state[1].wrapping_mul(5))
            .rotate_left(7)
            .wrapping_mul(9);
        let t = self.state[1] << 17;
        self.state[2] ^= self.state[0];
        self.state[3] ^= self.state[1];
        self.state[1] ^= self.state[2];
        self.state[0] ^= self.state[3];
        self.state[2] ^= t;
        self.state[3] = self.state[3].rotate_left(45);
        result
    }

    fn next_f64(&mut self) -> f64 {
        (self.next_u64() >> 11) as f64 / (1u64 << 53) as f64
    }

    fn pick<'a>(&mut self, items: &[&'a str]) -> &'a str {
        items[(self.next_u64() % items.len() as u64) as usize]
    }

    /// Uniform in `[lo, hi)`.
    fn range(&mut self, lo: f64, hi: f64) -> f64 {
        lo + (hi - lo) * self.next_f64()
    }
}

/// One synthetic pricing row; field names match the spreadsheet headers.
#[derive(Serialize)]
struct SampleRow {
    #[serde(rename = "Material_Name")]
    material: &'static str,
    #[serde(rename = "Material_Type")]
    material_type: &'static str,
    #[serde(rename = "Vendor_Name")]
    vendor: &'static str,
    #[serde(rename = "Unit_Price_Latest")]
    unit_price: f64,
    #[serde(rename = "Benchmark_Price")]
    benchmark_price: f64,
    #[serde(rename = "Price_Deviation (%)")]
    deviation: String,
    #[serde(rename = "Currency")]
    currency: &'static str,
    #[serde(rename = "GMP_Compliance")]
    gmp: &'static str,
    #[serde(rename = "Price_Tier")]
    tier: &'static str,
    #[serde(rename = "Internal vs External")]
    internal_external: &'static str,
    #[serde(rename = "Specification")]
    specification: &'static str,
    #[serde(rename = "Material_Grade")]
    grade: &'static str,
    #[serde(rename = "Supplier_Portal_Name")]
    portal: &'static str,
    #[serde(rename = "Portal_Validation_Status")]
    portal_status: &'static str,
    #[serde(rename = "Form")]
    form: &'static str,
    #[serde(rename = "Price_Source_Timestamp", with = "timestamp")]
    timestamp: NaiveDateTime,
}

mod timestamp {
    use chrono::NaiveDateTime;
    use serde::Serializer;

    pub fn serialize<S: Serializer>(value: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
        s.collect_str(&value.format("%Y-%m-%d %H:%M:%S"))
    }
}

fn generate(rng: &mut SimpleRng, start: NaiveDateTime) -> Vec<SampleRow> {
    let mut rows = Vec::new();
    for (day, &(material, material_type, benchmark)) in MATERIALS.iter().enumerate() {
        for vendor in VENDORS {
            // Not every vendor stocks every material.
            if rng.next_f64() < 0.2 {
                continue;
            }
            for quote in 0..3 {
                let unit_price = (benchmark * rng.range(0.75, 1.35) * 100.0).round() / 100.0;
                let deviation = (unit_price - benchmark) / benchmark * 100.0;
                let tier = match deviation {
                    d if d > 10.0 => "High",
                    d if d < -10.0 => "Low",
                    _ => "Medium",
                };
                let hours = (day * 24 + quote * 7) as i64 + (rng.next_u64() % 6) as i64;

                rows.push(SampleRow {
                    material,
                    material_type,
                    vendor,
                    unit_price,
                    benchmark_price: benchmark,
                    deviation: format!("{deviation:.1}%"),
                    currency: rng.pick(&CURRENCIES),
                    gmp: if rng.next_f64() < 0.7 { "Yes" } else { "No" },
                    tier,
                    internal_external: if rng.next_f64() < 0.4 { "Internal" } else { "External" },
                    specification: rng.pick(&SPECIFICATIONS),
                    grade: rng.pick(&GRADES),
                    portal: rng.pick(&PORTALS),
                    portal_status: rng.pick(&PORTAL_STATUSES),
                    form: if material_type == "Solvent" { "Liquid" } else { rng.pick(&FORMS) },
                    timestamp: start + Duration::hours(hours),
                });
            }
        }
    }
    rows
}

fn text_column(rows: &[SampleRow], f: impl Fn(&SampleRow) -> &str) -> ArrayRef {
    Arc::new(StringArray::from(rows.iter().map(f).collect::<Vec<_>>()))
}

fn to_batch(rows: &[SampleRow]) -> Result<RecordBatch> {
    let text = |name: &str| Field::new(name, DataType::Utf8, false);
    let number = |name: &str| Field::new(name, DataType::Float64, false);

    let schema = Arc::new(Schema::new(vec![
        text("Material_Name"),
        text("Material_Type"),
        text("Vendor_Name"),
        number("Unit_Price_Latest"),
        number("Benchmark_Price"),
        text("Price_Deviation (%)"),
        text("Currency"),
        text("GMP_Compliance"),
        text("Price_Tier"),
        text("Internal vs External"),
        text("Specification"),
        text("Material_Grade"),
        text("Supplier_Portal_Name"),
        text("Portal_Validation_Status"),
        text("Form"),
        Field::new(
            "Price_Source_Timestamp",
            DataType::Timestamp(TimeUnit::Second, None),
            false,
        ),
    ]));

    let columns: Vec<ArrayRef> = vec![
        text_column(rows, |r| r.material),
        text_column(rows, |r| r.material_type),
        text_column(rows, |r| r.vendor),
        Arc::new(Float64Array::from_iter_values(rows.iter().map(|r| r.unit_price))),
        Arc::new(Float64Array::from_iter_values(
            rows.iter().map(|r| r.benchmark_price),
        )),
        text_column(rows, |r| r.deviation.as_str()),
        text_column(rows, |r| r.currency),
        text_column(rows, |r| r.gmp),
        text_column(rows, |r| r.tier),
        text_column(rows, |r| r.internal_external),
        text_column(rows, |r| r.specification),
        text_column(rows, |r| r.grade),
        text_column(rows, |r| r.portal),
        text_column(rows, |r| r.portal_status),
        text_column(rows, |r| r.form),
        Arc::new(TimestampSecondArray::from_iter_values(
            rows.iter().map(|r| r.timestamp.and_utc().timestamp()),
        )),
    ];

    RecordBatch::try_new(schema, columns).context("Failed to create RecordBatch")
}

fn main() -> Result<()> {
    let mut rng = SimpleRng::new(42);
    let start = NaiveDate::from_ymd_opt(2024, 1, 15)
        .and_then(|d| d.and_hms_opt(9, 0, 0))
        .context("invalid start date")?;

    let rows = generate(&mut rng, start);
    let batch = to_batch(&rows)?;

    let file = File::create(PARQUET_PATH)
        .with_context(|| format!("Failed to create {PARQUET_PATH}"))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None)?;
    writer.write(&batch)?;
    writer.close()?;

    let mut csv = csv::Writer::from_path(CSV_PATH)
        .with_context(|| format!("Failed to create {CSV_PATH}"))?;
    for row in &rows {
        csv.serialize(row)?;
    }
    csv.flush()?;

    println!("{}", pretty_format_batches(&[batch.slice(0, rows.len().min(5))])?);
    println!(
        "Wrote {} pricing records to {PARQUET_PATH} and {CSV_PATH}",
        rows.len()
    );
    Ok(())
}
