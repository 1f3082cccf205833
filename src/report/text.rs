use std::fmt;

use crate::data::aggregate::{
    CategoryCount, CrossCount, KpiSummary, PriceComparison, PriceDistribution, ProjectedTable,
    SpecGradeBreakdown, TimePoint, VendorCompliance,
};
use crate::data::filter::{options, FilterSelection, Selection};
use crate::data::model::{CellValue, Column, ColumnKind, PricingTable, TIMESTAMP_FORMAT};
use crate::state::{DashboardSnapshot, MaterialInsight};

const NOT_AVAILABLE: &str = "N/A";

// ---------------------------------------------------------------------------
// Number formatting
// ---------------------------------------------------------------------------

/// Insert thousands separators into the integer part of a formatted number.
fn group_thousands(formatted: &str) -> String {
    let (sign, rest) = formatted
        .strip_prefix('-')
        .map_or(("", formatted), |r| ("-", r));
    let (int, frac) = rest.split_once('.').map_or((rest, None), |(i, f)| (i, Some(f)));

    let mut grouped = String::with_capacity(int.len() + int.len() / 3);
    for (i, ch) in int.chars().enumerate() {
        if i > 0 && (int.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }
    match frac {
        Some(f) => format!("{sign}{grouped}.{f}"),
        None => format!("{sign}{grouped}"),
    }
}

/// `$1,234.56`, or `N/A` when absent.
pub fn money(value: Option<f64>) -> String {
    match value {
        Some(v) if v < 0.0 => format!("-${}", group_thousands(&format!("{:.2}", -v))),
        Some(v) => format!("${}", group_thousands(&format!("{v:.2}"))),
        None => NOT_AVAILABLE.to_string(),
    }
}

/// `12.34%`, or `N/A` when absent.
pub fn percent(value: Option<f64>, decimals: usize) -> String {
    value.map_or_else(|| NOT_AVAILABLE.to_string(), |v| format!("{v:.decimals$}%"))
}

fn cell(value: &CellValue, column: Column) -> String {
    match (value, column.kind()) {
        (CellValue::Null, _) => String::new(),
        (CellValue::Number(v), ColumnKind::Percent) => percent(Some(*v), 2),
        (CellValue::Number(v), _) => money(Some(*v)),
        (other, _) => other.to_string(),
    }
}

// ---------------------------------------------------------------------------
// TextTable – padded, left-aligned columns
// ---------------------------------------------------------------------------

pub struct TextTable {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl TextTable {
    pub fn new<S: Into<String>>(headers: impl IntoIterator<Item = S>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn row(&mut self, cells: Vec<String>) {
        self.rows.push(cells);
    }

    fn widths(&self) -> Vec<usize> {
        let mut widths: Vec<usize> = self.headers.iter().map(|h| h.chars().count()).collect();
        for row in &self.rows {
            for (w, c) in widths.iter_mut().zip(row) {
                *w = (*w).max(c.chars().count());
            }
        }
        widths
    }
}

fn write_row(f: &mut fmt::Formatter<'_>, cells: &[String], widths: &[usize]) -> fmt::Result {
    write!(f, " ")?;
    for (c, &w) in cells.iter().zip(widths) {
        write!(f, " {c:<w$}")?;
    }
    writeln!(f)
}

impl fmt::Display for TextTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.rows.is_empty() {
            return writeln!(f, "  (no data)");
        }
        let widths = self.widths();
        write_row(f, &self.headers, &widths)?;
        let rule: Vec<String> = widths.iter().map(|w| "-".repeat(*w)).collect();
        write_row(f, &rule, &widths)?;
        for row in &self.rows {
            write_row(f, row, &widths)?;
        }
        Ok(())
    }
}

fn section(f: &mut fmt::Formatter<'_>, title: &str) -> fmt::Result {
    writeln!(f)?;
    writeln!(f, "== {title} ==")
}

// ---------------------------------------------------------------------------
// Per-view tables
// ---------------------------------------------------------------------------

pub fn kpi_table(kpis: &KpiSummary) -> TextTable {
    let mut t = TextTable::new(["Metric", "Value"]);
    t.row(vec!["Total Materials".into(), kpis.distinct_materials.to_string()]);
    t.row(vec!["Average Price".into(), money(kpis.mean_unit_price)]);
    t.row(vec![
        "Avg Price Deviation".into(),
        percent(kpis.mean_price_deviation, 2),
    ]);
    t.row(vec![
        "GMP Compliant".into(),
        format!(
            "{}/{} ({})",
            kpis.gmp_compliant,
            kpis.total_rows,
            percent(kpis.gmp_compliance_pct, 1)
        ),
    ]);
    t
}

pub fn comparison_table(group_header: &str, rows: &[PriceComparison]) -> TextTable {
    let mut t = TextTable::new([group_header, "Rows", "Avg Price", "Avg Benchmark"]);
    for r in rows {
        t.row(vec![
            r.group.clone(),
            r.rows.to_string(),
            money(r.mean_unit_price),
            money(r.mean_benchmark_price),
        ]);
    }
    t
}

pub fn distribution_table(group_header: &str, rows: &[PriceDistribution]) -> TextTable {
    let mut t = TextTable::new([group_header, "N", "Min", "Q1", "Median", "Q3", "Max"]);
    for r in rows {
        t.row(vec![
            r.group.clone(),
            r.count.to_string(),
            money(Some(r.min)),
            money(Some(r.q1)),
            money(Some(r.median)),
            money(Some(r.q3)),
            money(Some(r.max)),
        ]);
    }
    t
}

pub fn compliance_table(rows: &[VendorCompliance]) -> TextTable {
    let mut t = TextTable::new(["Vendor", "Compliant", "Total", "Rate"]);
    for r in rows {
        t.row(vec![
            r.vendor.clone(),
            r.compliant.to_string(),
            r.total.to_string(),
            percent(r.rate_pct, 1),
        ]);
    }
    t
}

pub fn time_series_table(rows: &[TimePoint]) -> TextTable {
    let mut t = TextTable::new(["Timestamp", "Avg Price", "Rows"]);
    for r in rows {
        t.row(vec![
            r.timestamp.format(TIMESTAMP_FORMAT).to_string(),
            money(r.mean_unit_price),
            r.rows.to_string(),
        ]);
    }
    t
}

pub fn counts_table(value_header: &str, rows: &[CategoryCount]) -> TextTable {
    let mut t = TextTable::new([value_header, "Count"]);
    for r in rows {
        t.row(vec![r.value.clone(), r.count.to_string()]);
    }
    t
}

pub fn cross_table(primary: &str, secondary: &str, rows: &[CrossCount]) -> TextTable {
    let mut t = TextTable::new([primary, secondary, "Count"]);
    for r in rows {
        t.row(vec![r.primary.clone(), r.secondary.clone(), r.count.to_string()]);
    }
    t
}

pub fn spec_grade_table(rows: &[SpecGradeBreakdown]) -> TextTable {
    let mut t = TextTable::new(["Specification", "Grade", "Avg Price", "Vendors"]);
    for r in rows {
        t.row(vec![
            r.specification.clone(),
            r.material_grade.clone(),
            money(r.mean_unit_price),
            r.vendor_count.to_string(),
        ]);
    }
    t
}

pub fn projection_table(projected: &ProjectedTable) -> TextTable {
    let mut t = TextTable::new(projected.columns.iter().map(|c| c.header()));
    for row in &projected.rows {
        t.row(
            row.iter()
                .zip(&projected.columns)
                .map(|(v, &c)| cell(v, c))
                .collect(),
        );
    }
    t
}

// ---------------------------------------------------------------------------
// Whole reports
// ---------------------------------------------------------------------------

/// Every view of a snapshot, one section each.
pub struct SnapshotReport<'a>(pub &'a DashboardSnapshot);

impl fmt::Display for SnapshotReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = self.0;
        if s.active_filters.is_empty() {
            writeln!(f, "Active filters: none")?;
        } else {
            writeln!(f, "Active filters: {}", s.active_filters.join(", "))?;
        }

        section(f, "Key Performance Indicators")?;
        write!(f, "{}", kpi_table(&s.kpis))?;

        section(f, "Price Distribution by Material Type")?;
        write!(f, "{}", distribution_table("Material Type", &s.price_by_material_type))?;

        section(f, "Average Price vs Benchmark (first 20 materials)")?;
        write!(f, "{}", comparison_table("Material", &s.price_vs_benchmark))?;

        section(f, "Vendor Offerings by Material Type")?;
        write!(f, "{}", cross_table("Vendor", "Material Type", &s.vendor_offerings))?;

        section(f, "Average Price by Vendor (top 15)")?;
        write!(f, "{}", comparison_table("Vendor", &s.vendor_price_ranking))?;

        section(f, "GMP Compliance Rate by Vendor")?;
        write!(f, "{}", compliance_table(&s.vendor_compliance))?;

        section(f, "Price Trend over Time")?;
        write!(f, "{}", time_series_table(&s.price_time_series))?;

        section(f, "Price Distribution by Currency")?;
        write!(f, "{}", distribution_table("Currency", &s.price_by_currency))?;

        section(f, "Portal Validation Status")?;
        write!(f, "{}", counts_table("Status", &s.portal_validation))?;

        section(f, "Material Count by Supplier Portal")?;
        write!(f, "{}", counts_table("Portal", &s.supplier_portals))?;

        section(f, "Internal vs External Pricing")?;
        write!(f, "{}", comparison_table("Source", &s.internal_vs_external))?;

        section(f, "Average Price by Form")?;
        write!(f, "{}", comparison_table("Form", &s.price_by_form))
    }
}

pub struct MaterialReport<'a>(pub &'a MaterialInsight);

impl fmt::Display for MaterialReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let m = self.0;
        section(f, &format!("Price Distribution for {}", m.material))?;
        write!(f, "{}", distribution_table("Material", &m.price_distribution))?;
        section(f, &format!("Vendor Prices for {}", m.material))?;
        write!(f, "{}", comparison_table("Vendor", &m.vendor_prices))?;
        section(f, &format!("Specification and Grade Analysis for {}", m.material))?;
        write!(f, "{}", spec_grade_table(&m.spec_grade))
    }
}

/// Filter dimensions and the values each one offers, with the current
/// choice per dimension marked `*`.
pub struct OptionsReport<'a> {
    pub table: &'a PricingTable,
    pub selection: &'a FilterSelection,
}

impl fmt::Display for OptionsReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} records loaded", self.table.len())?;
        for column in Column::FILTER_DIMENSIONS {
            section(f, &format!("{} ({})", column.header(), column.key()))?;
            let current = self.selection.get(column);
            for opt in options(self.table, column) {
                let mark = if &opt == current { '*' } else { ' ' };
                match &opt {
                    Selection::All => writeln!(f, "{mark} All")?,
                    Selection::Only(v) => writeln!(f, "{mark} {v}")?,
                }
            }
        }
        if !self.table.degraded().is_empty() {
            section(f, "Unparseable values treated as absent")?;
            for (column, count) in self.table.degraded() {
                writeln!(f, "  {column}: {count}")?;
            }
        }
        Ok(())
    }
}
