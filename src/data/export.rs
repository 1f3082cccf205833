use std::io::Write;

use super::error::ExportError;
use super::filter::FilteredView;
use super::model::Column;

/// File name offered for downloads of the filtered records.
pub const DEFAULT_EXPORT_NAME: &str = "filtered_pharma_benchmarking_data.csv";

/// Write the view as CSV: a header row of source column names, then one
/// line per record. Only columns present in the loaded source are written.
pub fn write_csv<W: Write>(view: &FilteredView<'_>, out: W) -> Result<(), ExportError> {
    write_csv_columns(view, view.table().columns(), out)
}

/// As [`write_csv`] but with an explicit column list.
pub fn write_csv_columns<W: Write>(
    view: &FilteredView<'_>,
    columns: &[Column],
    out: W,
) -> Result<(), ExportError> {
    let mut writer = csv::Writer::from_writer(out);
    writer.write_record(columns.iter().map(|c| c.header()))?;

    for rec in view.records() {
        // Display gives the shortest round-tripping float and an empty
        // field for absent values.
        writer.write_record(columns.iter().map(|&c| rec.cell(c).to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

/// Serialise the view to CSV bytes.
pub fn to_csv_bytes(view: &FilteredView<'_>) -> Result<Vec<u8>, ExportError> {
    let mut buf = Vec::new();
    write_csv(view, &mut buf)?;
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDateTime;

    use super::*;
    use crate::data::filter::{apply, FilterSelection};
    use crate::data::loader::load_csv_reader;
    use crate::data::model::{PricingTable, Record};

    fn sample() -> PricingTable {
        let required: Vec<Column> = Column::ALL
            .into_iter()
            .filter(|c| c.is_required())
            .chain([Column::PriceSourceTimestamp, Column::Form])
            .collect();
        let base = Record {
            material_name: Some("Paracetamol, micronised".into()),
            material_type: Some("API".into()),
            vendor_name: Some("Merck".into()),
            unit_price: Some(0.1 + 0.2),
            benchmark_price: Some(1e-7),
            price_deviation: Some(-12.345),
            currency: Some("USD".into()),
            gmp_compliance: Some("Yes".into()),
            price_tier: Some("Standard".into()),
            internal_external: None,
            specification: Some("USP \"43\"".into()),
            material_grade: Some("Pharma".into()),
            supplier_portal_name: Some("SAP Ariba".into()),
            portal_validation_status: Some("Valid".into()),
            form: Some("Powder".into()),
            price_source_timestamp: NaiveDateTime::parse_from_str(
                "2024-02-29 13:45:10.250",
                "%Y-%m-%d %H:%M:%S%.f",
            )
            .ok(),
            ..Default::default()
        };
        let other = Record {
            vendor_name: Some("Sigma".into()),
            unit_price: None,
            price_source_timestamp: None,
            ..base.clone()
        };
        PricingTable::from_records(vec![base, other], &required)
    }

    #[test]
    fn export_round_trips_through_the_csv_loader() {
        let table = sample();
        let view = FilteredView::full(&table);
        let bytes = to_csv_bytes(&view).unwrap();

        let mut reader = csv::Reader::from_reader(bytes.as_slice());
        let reloaded = load_csv_reader(&mut reader).unwrap();

        assert_eq!(reloaded.columns(), table.columns());
        assert_eq!(reloaded.records(), table.records());
        assert!(reloaded.degraded().is_empty());
    }

    #[test]
    fn export_writes_header_and_only_filtered_rows() {
        let table = sample();
        let view = apply(&table, &"vendor=Sigma".parse::<FilterSelection>().unwrap());
        let text = String::from_utf8(to_csv_bytes(&view).unwrap()).unwrap();

        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Material_Name,Material_Type,Vendor_Name,"));
        assert!(lines[1].contains(",Sigma,"));
        assert!(!text.contains("Merck"));
    }

    #[test]
    fn empty_view_exports_header_only() {
        let table = sample();
        let view = apply(&table, &"vendor=None Such".parse::<FilterSelection>().unwrap());
        let text = String::from_utf8(to_csv_bytes(&view).unwrap()).unwrap();
        assert_eq!(text.lines().count(), 1);
    }
}
