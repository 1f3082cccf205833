//! Summary views over a [`FilteredView`].
//!
//! Every function here is pure: it reads the view, allocates its result and
//! keeps no state between calls. An empty view produces an empty result (or
//! `None` for scalar means) instead of an error or `NaN`.

use std::collections::{BTreeMap, BTreeSet};

use chrono::NaiveDateTime;
use serde::Serialize;

use super::filter::FilteredView;
use super::model::{serialize_timestamp, CellValue, Column, Record};

// ---------------------------------------------------------------------------
// Running mean that ignores absent values
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default)]
struct Mean {
    sum: f64,
    n: usize,
}

impl Mean {
    fn add(&mut self, value: Option<f64>) {
        if let Some(v) = value {
            self.sum += v;
            self.n += 1;
        }
    }

    fn value(&self) -> Option<f64> {
        (self.n > 0).then(|| self.sum / self.n as f64)
    }
}

fn percentage(part: usize, whole: usize) -> Option<f64> {
    (whole > 0).then(|| part as f64 / whole as f64 * 100.0)
}

/// Fold the view into per-key accumulators; records without a key are skipped.
fn group_by<'a, K, A, F, G>(view: &FilteredView<'a>, key: F, mut fold: G) -> BTreeMap<K, A>
where
    K: Ord,
    A: Default,
    F: Fn(&'a Record) -> Option<K>,
    G: FnMut(&mut A, &'a Record),
{
    let mut groups: BTreeMap<K, A> = BTreeMap::new();
    for rec in view.records() {
        if let Some(k) = key(rec) {
            fold(groups.entry(k).or_default(), rec);
        }
    }
    groups
}

// ---------------------------------------------------------------------------
// KPI summary
// ---------------------------------------------------------------------------

/// Headline figures for the current selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiSummary {
    pub distinct_materials: usize,
    pub mean_unit_price: Option<f64>,
    pub mean_price_deviation: Option<f64>,
    pub gmp_compliant: usize,
    pub total_rows: usize,
    /// `gmp_compliant / total_rows` as a percentage.
    pub gmp_compliance_pct: Option<f64>,
}

pub fn kpi_summary(view: &FilteredView<'_>) -> KpiSummary {
    let mut materials = BTreeSet::new();
    let mut price = Mean::default();
    let mut deviation = Mean::default();
    let mut compliant = 0;

    for rec in view.records() {
        if let Some(name) = rec.material_name.as_deref() {
            materials.insert(name);
        }
        price.add(rec.unit_price);
        deviation.add(rec.price_deviation);
        if rec.is_gmp_compliant() {
            compliant += 1;
        }
    }

    KpiSummary {
        distinct_materials: materials.len(),
        mean_unit_price: price.value(),
        mean_price_deviation: deviation.value(),
        gmp_compliant: compliant,
        total_rows: view.len(),
        gmp_compliance_pct: percentage(compliant, view.len()),
    }
}

// ---------------------------------------------------------------------------
// Price comparisons
// ---------------------------------------------------------------------------

/// Mean latest price against mean benchmark for one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceComparison {
    pub group: String,
    pub rows: usize,
    pub mean_unit_price: Option<f64>,
    pub mean_benchmark_price: Option<f64>,
}

/// Group by a categorical column, sorted by group key. Rows with no value
/// in `by` are left out.
pub fn grouped_price_comparison(view: &FilteredView<'_>, by: Column) -> Vec<PriceComparison> {
    #[derive(Default)]
    struct Acc {
        rows: usize,
        price: Mean,
        benchmark: Mean,
    }

    group_by(
        view,
        |rec| rec.text(by),
        |acc: &mut Acc, rec| {
            acc.rows += 1;
            acc.price.add(rec.unit_price);
            acc.benchmark.add(rec.benchmark_price);
        },
    )
    .into_iter()
    .map(|(group, acc)| PriceComparison {
        group: group.to_string(),
        rows: acc.rows,
        mean_unit_price: acc.price.value(),
        mean_benchmark_price: acc.benchmark.value(),
    })
    .collect()
}

/// Groups ordered by mean unit price, highest first, truncated to `limit`.
/// Groups without any price are dropped.
pub fn ranked_mean_price(view: &FilteredView<'_>, by: Column, limit: usize) -> Vec<PriceComparison> {
    let mut groups: Vec<PriceComparison> = grouped_price_comparison(view, by)
        .into_iter()
        .filter(|g| g.mean_unit_price.is_some())
        .collect();
    // stable sort keeps key order among equal means
    groups.sort_by(|a, b| {
        let (a, b) = (a.mean_unit_price.unwrap_or(0.0), b.mean_unit_price.unwrap_or(0.0));
        b.total_cmp(&a)
    });
    groups.truncate(limit);
    groups
}

// ---------------------------------------------------------------------------
// Compliance
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VendorCompliance {
    pub vendor: String,
    pub compliant: usize,
    pub total: usize,
    /// In `[0, 100]`; `None` only when `total` is zero.
    pub rate_pct: Option<f64>,
}

/// Share of "Yes" GMP rows per vendor, sorted by vendor.
pub fn compliance_by_vendor(view: &FilteredView<'_>) -> Vec<VendorCompliance> {
    group_by(
        view,
        |rec| rec.vendor_name.as_deref(),
        |acc: &mut (usize, usize), rec| {
            acc.1 += 1;
            if rec.is_gmp_compliant() {
                acc.0 += 1;
            }
        },
    )
    .into_iter()
    .map(|(vendor, (compliant, total))| VendorCompliance {
        vendor: vendor.to_string(),
        compliant,
        total,
        rate_pct: percentage(compliant, total),
    })
    .collect()
}

// ---------------------------------------------------------------------------
// Time series
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimePoint {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: NaiveDateTime,
    pub mean_unit_price: Option<f64>,
    pub rows: usize,
}

/// Mean price per exact price-source timestamp, oldest first. Rows without a
/// timestamp are left out.
pub fn price_time_series(view: &FilteredView<'_>) -> Vec<TimePoint> {
    group_by(
        view,
        |rec| rec.price_source_timestamp,
        |acc: &mut (Mean, usize), rec| {
            acc.0.add(rec.unit_price);
            acc.1 += 1;
        },
    )
    .into_iter()
    .map(|(timestamp, (price, rows))| TimePoint {
        timestamp,
        mean_unit_price: price.value(),
        rows,
    })
    .collect()
}

// ---------------------------------------------------------------------------
// Counts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CategoryCount {
    pub value: String,
    pub count: usize,
}

/// Frequency table of one column, most frequent first (ties by value).
/// Absent values are not counted.
pub fn category_counts(view: &FilteredView<'_>, column: Column) -> Vec<CategoryCount> {
    let mut counts: Vec<CategoryCount> =
        group_by(view, |rec| rec.text(column), |n: &mut usize, _| *n += 1)
            .into_iter()
            .map(|(value, count)| CategoryCount {
                value: value.to_string(),
                count,
            })
            .collect();
    counts.sort_by(|a, b| b.count.cmp(&a.count));
    counts
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossCount {
    pub primary: String,
    pub secondary: String,
    pub count: usize,
}

/// Row counts per `(primary, secondary)` pair, e.g. vendor offerings by
/// material type. Rows missing either value are left out.
pub fn cross_counts(view: &FilteredView<'_>, primary: Column, secondary: Column) -> Vec<CrossCount> {
    group_by(
        view,
        |rec| Some((rec.text(primary)?, rec.text(secondary)?)),
        |n: &mut usize, _| *n += 1,
    )
    .into_iter()
    .map(|((p, s), count)| CrossCount {
        primary: p.to_string(),
        secondary: s.to_string(),
        count,
    })
    .collect()
}

// ---------------------------------------------------------------------------
// Distributions
// ---------------------------------------------------------------------------

/// Five-number summary of unit price within one group.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceDistribution {
    pub group: String,
    pub count: usize,
    pub min: f64,
    pub q1: f64,
    pub median: f64,
    pub q3: f64,
    pub max: f64,
}

/// Linear-interpolated quantile of an ascending, non-empty slice.
fn quantile(sorted: &[f64], q: f64) -> f64 {
    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}

/// Unit price distribution per group of `by`. Groups with no prices are
/// dropped.
pub fn price_distribution(view: &FilteredView<'_>, by: Column) -> Vec<PriceDistribution> {
    group_by(
        view,
        |rec| rec.text(by),
        |prices: &mut Vec<f64>, rec| prices.extend(rec.unit_price),
    )
    .into_iter()
    .filter(|(_, prices)| !prices.is_empty())
    .map(|(group, mut prices)| {
        prices.sort_by(f64::total_cmp);
        PriceDistribution {
            group: group.to_string(),
            count: prices.len(),
            min: prices[0],
            q1: quantile(&prices, 0.25),
            median: quantile(&prices, 0.5),
            q3: quantile(&prices, 0.75),
            max: prices[prices.len() - 1],
        }
    })
    .collect()
}

// ---------------------------------------------------------------------------
// Specification / grade breakdown
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpecGradeBreakdown {
    pub specification: String,
    pub material_grade: String,
    pub mean_unit_price: Option<f64>,
    /// Rows carrying a vendor name.
    pub vendor_count: usize,
}

/// Mean price and vendor coverage per (specification, grade), normally run on
/// a view narrowed to a single material.
pub fn spec_grade_breakdown(view: &FilteredView<'_>) -> Vec<SpecGradeBreakdown> {
    group_by(
        view,
        |rec| {
            Some((
                rec.specification.as_deref()?,
                rec.material_grade.as_deref()?,
            ))
        },
        |acc: &mut (Mean, usize), rec| {
            acc.0.add(rec.unit_price);
            if rec.vendor_name.is_some() {
                acc.1 += 1;
            }
        },
    )
    .into_iter()
    .map(|((spec, grade), (price, vendors))| SpecGradeBreakdown {
        specification: spec.to_string(),
        material_grade: grade.to_string(),
        mean_unit_price: price.value(),
        vendor_count: vendors,
    })
    .collect()
}

// ---------------------------------------------------------------------------
// Projection
// ---------------------------------------------------------------------------

/// A column subset of the first rows of a view.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProjectedTable {
    pub columns: Vec<Column>,
    pub rows: Vec<Vec<CellValue>>,
    /// Rows in the view before `limit` was applied.
    pub total_rows: usize,
}

pub fn project(view: &FilteredView<'_>, columns: &[Column], limit: usize) -> ProjectedTable {
    ProjectedTable {
        columns: columns.to_vec(),
        rows: view
            .records()
            .take(limit)
            .map(|rec| columns.iter().map(|&c| rec.cell(c)).collect())
            .collect(),
        total_rows: view.len(),
    }
}

#[cfg(test)]
mod tests {
    use chrono::{NaiveDate, Timelike};

    use super::*;
    use crate::data::filter::apply;
    use crate::data::filter::FilterSelection;
    use crate::data::model::PricingTable;

    fn rec(vendor: &str, gmp: &str, price: f64) -> Record {
        Record {
            material_name: Some(format!("{vendor}-material")),
            vendor_name: Some(vendor.into()),
            gmp_compliance: Some(gmp.into()),
            unit_price: Some(price),
            ..Default::default()
        }
    }

    fn table(records: Vec<Record>) -> PricingTable {
        PricingTable::from_records(records, &Column::ALL)
    }

    fn at(day: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap()
    }

    #[test]
    fn vendor_compliance_and_price_example() {
        let t = table(vec![
            rec("V1", "Yes", 10.0),
            rec("V1", "No", 20.0),
            rec("V2", "Yes", 30.0),
        ]);
        let view = FilteredView::full(&t);

        let compliance = compliance_by_vendor(&view);
        assert_eq!(compliance.len(), 2);
        assert_eq!(compliance[0].vendor, "V1");
        assert_eq!(compliance[0].rate_pct, Some(50.0));
        assert_eq!(compliance[1].rate_pct, Some(100.0));

        let prices = grouped_price_comparison(&view, Column::VendorName);
        assert_eq!(prices[0].group, "V1");
        assert_eq!(prices[0].mean_unit_price, Some(15.0));
        assert_eq!(prices[0].mean_benchmark_price, None);
    }

    #[test]
    fn compliance_rate_stays_in_range() {
        let t = table(vec![
            rec("A", "Yes", 1.0),
            rec("A", "yes", 1.0),
            rec("B", "No", 1.0),
            rec("C", "Yes", 1.0),
        ]);
        for row in compliance_by_vendor(&FilteredView::full(&t)) {
            let rate = row.rate_pct.unwrap();
            assert!((0.0..=100.0).contains(&rate), "{rate}");
        }
    }

    #[test]
    fn kpis_on_empty_view_are_not_available() {
        let t = table(vec![rec("V1", "Yes", 10.0)]);
        let empty = apply(&t, &"vendor=nobody".parse::<FilterSelection>().unwrap());
        let kpi = kpi_summary(&empty);
        assert_eq!(
            kpi,
            KpiSummary {
                distinct_materials: 0,
                mean_unit_price: None,
                mean_price_deviation: None,
                gmp_compliant: 0,
                total_rows: 0,
                gmp_compliance_pct: None,
            }
        );
        assert!(grouped_price_comparison(&empty, Column::VendorName).is_empty());
        assert!(compliance_by_vendor(&empty).is_empty());
        assert!(price_time_series(&empty).is_empty());
        assert!(category_counts(&empty, Column::Currency).is_empty());
        assert!(price_distribution(&empty, Column::MaterialType).is_empty());
        assert!(project(&empty, &Column::DEFAULT_PROJECTION, 20).rows.is_empty());
    }

    #[test]
    fn kpis_ignore_absent_values() {
        let mut no_price = rec("V1", "No", 0.0);
        no_price.unit_price = None;
        no_price.price_deviation = Some(-4.0);
        let mut priced = rec("V1", "Yes", 9.0);
        priced.material_name = no_price.material_name.clone();
        let t = table(vec![no_price, priced]);

        let kpi = kpi_summary(&FilteredView::full(&t));
        assert_eq!(kpi.distinct_materials, 1);
        assert_eq!(kpi.mean_unit_price, Some(9.0));
        assert_eq!(kpi.mean_price_deviation, Some(-4.0));
        assert_eq!(kpi.gmp_compliant, 1);
        assert_eq!(kpi.gmp_compliance_pct, Some(50.0));
    }

    #[test]
    fn time_series_groups_exact_timestamps_in_order() {
        let mut records = vec![
            rec("A", "Yes", 10.0),
            rec("B", "Yes", 20.0),
            rec("C", "Yes", 5.0),
            rec("D", "Yes", 7.0),
        ];
        records[0].price_source_timestamp = Some(at(3));
        records[1].price_source_timestamp = Some(at(3));
        records[2].price_source_timestamp = Some(at(1));
        let t = table(records);

        let series = price_time_series(&FilteredView::full(&t));
        assert_eq!(
            series,
            vec![
                TimePoint {
                    timestamp: at(1),
                    mean_unit_price: Some(5.0),
                    rows: 1
                },
                TimePoint {
                    timestamp: at(3),
                    mean_unit_price: Some(15.0),
                    rows: 2
                },
            ]
        );
    }

    #[test]
    fn time_points_serialize_like_cells() {
        let point = TimePoint {
            timestamp: at(15).with_hour(10).unwrap(),
            mean_unit_price: Some(2.5),
            rows: 1,
        };
        let json = serde_json::to_value(&point).unwrap();
        assert_eq!(json["timestamp"], "2024-01-15 10:00:00");
        assert_eq!(
            json["timestamp"],
            serde_json::to_value(CellValue::Timestamp(point.timestamp)).unwrap()
        );
    }

    #[test]
    fn category_counts_descend_with_ties_by_value() {
        let mut records = vec![
            rec("A", "Yes", 1.0),
            rec("B", "Yes", 1.0),
            rec("C", "Yes", 1.0),
            rec("D", "Yes", 1.0),
        ];
        records[0].currency = Some("EUR".into());
        records[1].currency = Some("USD".into());
        records[2].currency = Some("USD".into());
        records[3].currency = Some("CHF".into());
        let t = table(records);

        let counts = category_counts(&FilteredView::full(&t), Column::Currency);
        let flat: Vec<_> = counts.iter().map(|c| (c.value.as_str(), c.count)).collect();
        assert_eq!(flat, vec![("USD", 2), ("CHF", 1), ("EUR", 1)]);
    }

    #[test]
    fn ranked_prices_descend_and_truncate() {
        let t = table(vec![
            rec("Cheap", "Yes", 1.0),
            rec("Mid", "Yes", 5.0),
            rec("Dear", "Yes", 9.0),
        ]);
        let ranked = ranked_mean_price(&FilteredView::full(&t), Column::VendorName, 2);
        let names: Vec<_> = ranked.iter().map(|r| r.group.as_str()).collect();
        assert_eq!(names, vec!["Dear", "Mid"]);
    }

    #[test]
    fn cross_counts_pair_vendor_and_type() {
        let mut records = vec![rec("M", "Yes", 1.0), rec("M", "Yes", 1.0), rec("S", "Yes", 1.0)];
        records[0].material_type = Some("API".into());
        records[1].material_type = Some("API".into());
        records[2].material_type = Some("Excipient".into());
        let t = table(records);

        let pairs = cross_counts(&FilteredView::full(&t), Column::VendorName, Column::MaterialType);
        assert_eq!(
            pairs,
            vec![
                CrossCount {
                    primary: "M".into(),
                    secondary: "API".into(),
                    count: 2
                },
                CrossCount {
                    primary: "S".into(),
                    secondary: "Excipient".into(),
                    count: 1
                },
            ]
        );
    }

    #[test]
    fn distribution_uses_linear_quantiles() {
        let t = table(
            [1.0, 2.0, 3.0, 4.0]
                .into_iter()
                .map(|p| rec("V", "Yes", p))
                .collect(),
        );
        let dist = price_distribution(&FilteredView::full(&t), Column::VendorName);
        assert_eq!(
            dist,
            vec![PriceDistribution {
                group: "V".into(),
                count: 4,
                min: 1.0,
                q1: 1.75,
                median: 2.5,
                q3: 3.25,
                max: 4.0,
            }]
        );
    }

    #[test]
    fn spec_grade_counts_rows_with_vendor() {
        let mut records = vec![rec("A", "Yes", 10.0), rec("B", "Yes", 20.0)];
        for r in &mut records {
            r.specification = Some("USP".into());
            r.material_grade = Some("Pharma".into());
        }
        records[1].vendor_name = None;
        let t = table(records);

        let rows = spec_grade_breakdown(&FilteredView::full(&t));
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].mean_unit_price, Some(15.0));
        assert_eq!(rows[0].vendor_count, 1);
    }

    #[test]
    fn projection_limits_rows_and_keeps_column_order() {
        let t = table(vec![rec("A", "Yes", 1.0), rec("B", "No", 2.0)]);
        let projected = project(
            &FilteredView::full(&t),
            &[Column::UnitPrice, Column::VendorName],
            1,
        );
        assert_eq!(projected.total_rows, 2);
        assert_eq!(
            projected.rows,
            vec![vec![CellValue::Number(1.0), CellValue::Text("A".into())]]
        );
    }
}
