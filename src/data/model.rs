use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use chrono::NaiveDateTime;
use serde::{Serialize, Serializer};

use super::error::SelectionError;

/// Canonical text form for timestamps (fraction only printed when non-zero).
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f";

// ---------------------------------------------------------------------------
// Column – the closed set of record attributes
// ---------------------------------------------------------------------------

/// How a column's raw cells are normalised on load.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    /// Free text / categorical.
    Text,
    /// Plain number (prices).
    Number,
    /// Percentage, possibly stored as `"12.5%"`.
    Percent,
    /// Point in time.
    Timestamp,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Column {
    MaterialName,
    MaterialType,
    VendorName,
    UnitPrice,
    BenchmarkPrice,
    PriceDeviation,
    Currency,
    GmpCompliance,
    PriceTier,
    InternalExternal,
    Specification,
    MaterialGrade,
    SupplierPortalName,
    PortalValidationStatus,
    Form,
    PortalLink,
    PortalPrice,
    PortalVsUnitDeviation,
    InternalInventoryPrice,
    InventoryVsLatest,
    InternalContractPrice,
    ContractVsLatest,
    PriceSourceTimestamp,
    InternalInventoryDate,
    InternalContractDate,
}

impl Column {
    /// Every column in source order.
    pub const ALL: [Column; 25] = [
        Column::MaterialName,
        Column::MaterialType,
        Column::VendorName,
        Column::UnitPrice,
        Column::BenchmarkPrice,
        Column::PriceDeviation,
        Column::Currency,
        Column::GmpCompliance,
        Column::PriceTier,
        Column::InternalExternal,
        Column::Specification,
        Column::MaterialGrade,
        Column::SupplierPortalName,
        Column::PortalValidationStatus,
        Column::Form,
        Column::PortalLink,
        Column::PortalPrice,
        Column::PortalVsUnitDeviation,
        Column::InternalInventoryPrice,
        Column::InventoryVsLatest,
        Column::InternalContractPrice,
        Column::ContractVsLatest,
        Column::PriceSourceTimestamp,
        Column::InternalInventoryDate,
        Column::InternalContractDate,
    ];

    /// Dimensions offered as dashboard filters.
    pub const FILTER_DIMENSIONS: [Column; 6] = [
        Column::MaterialType,
        Column::VendorName,
        Column::GmpCompliance,
        Column::PriceTier,
        Column::Currency,
        Column::InternalExternal,
    ];

    /// Columns shown by the detailed data table when none are requested.
    pub const DEFAULT_PROJECTION: [Column; 8] = [
        Column::MaterialName,
        Column::MaterialType,
        Column::VendorName,
        Column::UnitPrice,
        Column::BenchmarkPrice,
        Column::PriceDeviation,
        Column::Currency,
        Column::GmpCompliance,
    ];

    /// Header text as it appears in the source spreadsheet.
    pub fn header(self) -> &'static str {
        match self {
            Column::MaterialName => "Material_Name",
            Column::MaterialType => "Material_Type",
            Column::VendorName => "Vendor_Name",
            Column::UnitPrice => "Unit_Price_Latest",
            Column::BenchmarkPrice => "Benchmark_Price",
            Column::PriceDeviation => "Price_Deviation (%)",
            Column::Currency => "Currency",
            Column::GmpCompliance => "GMP_Compliance",
            Column::PriceTier => "Price_Tier",
            Column::InternalExternal => "Internal vs External",
            Column::Specification => "Specification",
            Column::MaterialGrade => "Material_Grade",
            Column::SupplierPortalName => "Supplier_Portal_Name",
            Column::PortalValidationStatus => "Portal_Validation_Status",
            Column::Form => "Form",
            Column::PortalLink => "Portal_Link",
            Column::PortalPrice => "Portal_Price",
            Column::PortalVsUnitDeviation => "Portal_vs_Unit_Deviation (%)",
            Column::InternalInventoryPrice => "Internal_Inventory_Price",
            Column::InventoryVsLatest => "Inventory_vs_Latest (%)",
            Column::InternalContractPrice => "Internal_Contract_Price",
            Column::ContractVsLatest => "Contract_vs_Latest (%)",
            Column::PriceSourceTimestamp => "Price_Source_Timestamp",
            Column::InternalInventoryDate => "Internal_Inventory_Date",
            Column::InternalContractDate => "Internal_Contract_Date",
        }
    }

    /// Short snake-case name accepted on the command line.
    pub fn key(self) -> &'static str {
        match self {
            Column::MaterialName => "material",
            Column::MaterialType => "material_type",
            Column::VendorName => "vendor",
            Column::UnitPrice => "unit_price",
            Column::BenchmarkPrice => "benchmark_price",
            Column::PriceDeviation => "price_deviation",
            Column::Currency => "currency",
            Column::GmpCompliance => "gmp",
            Column::PriceTier => "price_tier",
            Column::InternalExternal => "internal_external",
            Column::Specification => "specification",
            Column::MaterialGrade => "grade",
            Column::SupplierPortalName => "portal",
            Column::PortalValidationStatus => "portal_status",
            Column::Form => "form",
            Column::PortalLink => "portal_link",
            Column::PortalPrice => "portal_price",
            Column::PortalVsUnitDeviation => "portal_deviation",
            Column::InternalInventoryPrice => "inventory_price",
            Column::InventoryVsLatest => "inventory_vs_latest",
            Column::InternalContractPrice => "contract_price",
            Column::ContractVsLatest => "contract_vs_latest",
            Column::PriceSourceTimestamp => "price_timestamp",
            Column::InternalInventoryDate => "inventory_date",
            Column::InternalContractDate => "contract_date",
        }
    }

    pub fn kind(self) -> ColumnKind {
        match self {
            Column::UnitPrice
            | Column::BenchmarkPrice
            | Column::PortalPrice
            | Column::InternalInventoryPrice
            | Column::InternalContractPrice => ColumnKind::Number,
            Column::PriceDeviation
            | Column::PortalVsUnitDeviation
            | Column::InventoryVsLatest
            | Column::ContractVsLatest => ColumnKind::Percent,
            Column::PriceSourceTimestamp
            | Column::InternalInventoryDate
            | Column::InternalContractDate => ColumnKind::Timestamp,
            _ => ColumnKind::Text,
        }
    }

    /// Whether loading fails when the source lacks this column.
    pub fn is_required(self) -> bool {
        matches!(
            self,
            Column::MaterialName
                | Column::MaterialType
                | Column::VendorName
                | Column::UnitPrice
                | Column::BenchmarkPrice
                | Column::PriceDeviation
                | Column::Currency
                | Column::GmpCompliance
                | Column::PriceTier
                | Column::InternalExternal
                | Column::Specification
                | Column::MaterialGrade
                | Column::SupplierPortalName
                | Column::PortalValidationStatus
        )
    }

    pub fn is_categorical(self) -> bool {
        self.kind() == ColumnKind::Text
    }

    /// Resolve a source header (exact match, surrounding whitespace ignored).
    pub fn from_header(header: &str) -> Option<Column> {
        let header = header.trim();
        Column::ALL.into_iter().find(|c| c.header() == header)
    }
}

impl fmt::Display for Column {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.header())
    }
}

impl Serialize for Column {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.header())
    }
}

/// Accepts either the source header or the snake-case key, case-insensitively.
impl FromStr for Column {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim();
        Column::ALL
            .into_iter()
            .find(|c| {
                c.header().eq_ignore_ascii_case(wanted) || c.key().eq_ignore_ascii_case(wanted)
            })
            .ok_or_else(|| SelectionError::UnknownColumn(wanted.to_string()))
    }
}

/// Parse a comma-separated column list, validating every name.
pub fn parse_columns(list: &str) -> Result<Vec<Column>, SelectionError> {
    list.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(Column::from_str)
        .collect()
}

/// Serde helper writing a timestamp in [`TIMESTAMP_FORMAT`].
pub fn serialize_timestamp<S: Serializer>(
    ts: &NaiveDateTime,
    serializer: S,
) -> Result<S::Ok, S::Error> {
    serializer.collect_str(&ts.format(TIMESTAMP_FORMAT))
}

// ---------------------------------------------------------------------------
// CellValue – a single normalised cell
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    Text(String),
    Number(f64),
    Timestamp(NaiveDateTime),
    Null,
}

impl fmt::Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CellValue::Text(s) => write!(f, "{s}"),
            CellValue::Number(v) => write!(f, "{v}"),
            CellValue::Timestamp(ts) => write!(f, "{}", ts.format(TIMESTAMP_FORMAT)),
            CellValue::Null => Ok(()),
        }
    }
}

impl Serialize for CellValue {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            CellValue::Text(s) => serializer.serialize_str(s),
            CellValue::Number(v) => serializer.serialize_f64(*v),
            CellValue::Timestamp(ts) => serialize_timestamp(ts, serializer),
            CellValue::Null => serializer.serialize_none(),
        }
    }
}

// ---------------------------------------------------------------------------
// Record – one pricing observation
// ---------------------------------------------------------------------------

/// One row of the pricing sheet after normalisation.
///
/// Every attribute is optional: a blank cell (or an unparseable number or
/// timestamp) is stored as `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    pub material_name: Option<String>,
    pub material_type: Option<String>,
    pub vendor_name: Option<String>,
    pub unit_price: Option<f64>,
    pub benchmark_price: Option<f64>,
    pub price_deviation: Option<f64>,
    pub currency: Option<String>,
    pub gmp_compliance: Option<String>,
    pub price_tier: Option<String>,
    pub internal_external: Option<String>,
    pub specification: Option<String>,
    pub material_grade: Option<String>,
    pub supplier_portal_name: Option<String>,
    pub portal_validation_status: Option<String>,
    pub form: Option<String>,
    pub portal_link: Option<String>,
    pub portal_price: Option<f64>,
    pub portal_vs_unit_deviation: Option<f64>,
    pub internal_inventory_price: Option<f64>,
    pub inventory_vs_latest: Option<f64>,
    pub internal_contract_price: Option<f64>,
    pub contract_vs_latest: Option<f64>,
    pub price_source_timestamp: Option<NaiveDateTime>,
    pub internal_inventory_date: Option<NaiveDateTime>,
    pub internal_contract_date: Option<NaiveDateTime>,
}

impl Record {
    /// Text value of a categorical column; `None` for other kinds.
    pub fn text(&self, column: Column) -> Option<&str> {
        let slot = match column {
            Column::MaterialName => &self.material_name,
            Column::MaterialType => &self.material_type,
            Column::VendorName => &self.vendor_name,
            Column::Currency => &self.currency,
            Column::GmpCompliance => &self.gmp_compliance,
            Column::PriceTier => &self.price_tier,
            Column::InternalExternal => &self.internal_external,
            Column::Specification => &self.specification,
            Column::MaterialGrade => &self.material_grade,
            Column::SupplierPortalName => &self.supplier_portal_name,
            Column::PortalValidationStatus => &self.portal_validation_status,
            Column::Form => &self.form,
            Column::PortalLink => &self.portal_link,
            _ => return None,
        };
        slot.as_deref()
    }

    /// Numeric value of a number or percent column; `None` for other kinds.
    pub fn number(&self, column: Column) -> Option<f64> {
        match column {
            Column::UnitPrice => self.unit_price,
            Column::BenchmarkPrice => self.benchmark_price,
            Column::PriceDeviation => self.price_deviation,
            Column::PortalPrice => self.portal_price,
            Column::PortalVsUnitDeviation => self.portal_vs_unit_deviation,
            Column::InternalInventoryPrice => self.internal_inventory_price,
            Column::InventoryVsLatest => self.inventory_vs_latest,
            Column::InternalContractPrice => self.internal_contract_price,
            Column::ContractVsLatest => self.contract_vs_latest,
            _ => None,
        }
    }

    pub fn timestamp(&self, column: Column) -> Option<NaiveDateTime> {
        match column {
            Column::PriceSourceTimestamp => self.price_source_timestamp,
            Column::InternalInventoryDate => self.internal_inventory_date,
            Column::InternalContractDate => self.internal_contract_date,
            _ => None,
        }
    }

    /// The value of any column as a [`CellValue`].
    pub fn cell(&self, column: Column) -> CellValue {
        match column.kind() {
            ColumnKind::Text => self
                .text(column)
                .map_or(CellValue::Null, |s| CellValue::Text(s.to_string())),
            ColumnKind::Number | ColumnKind::Percent => {
                self.number(column).map_or(CellValue::Null, CellValue::Number)
            }
            ColumnKind::Timestamp => self
                .timestamp(column)
                .map_or(CellValue::Null, CellValue::Timestamp),
        }
    }

    /// Store a normalised value. A value whose variant doesn't match the
    /// column's kind is stored as absent.
    pub fn set(&mut self, column: Column, value: CellValue) {
        match column.kind() {
            ColumnKind::Text => {
                let text = match value {
                    CellValue::Text(s) => Some(s),
                    _ => None,
                };
                match column {
                    Column::MaterialName => self.material_name = text,
                    Column::MaterialType => self.material_type = text,
                    Column::VendorName => self.vendor_name = text,
                    Column::Currency => self.currency = text,
                    Column::GmpCompliance => self.gmp_compliance = text,
                    Column::PriceTier => self.price_tier = text,
                    Column::InternalExternal => self.internal_external = text,
                    Column::Specification => self.specification = text,
                    Column::MaterialGrade => self.material_grade = text,
                    Column::SupplierPortalName => self.supplier_portal_name = text,
                    Column::PortalValidationStatus => self.portal_validation_status = text,
                    Column::Form => self.form = text,
                    Column::PortalLink => self.portal_link = text,
                    _ => {}
                }
            }
            ColumnKind::Number | ColumnKind::Percent => {
                let number = match value {
                    CellValue::Number(v) if v.is_finite() => Some(v),
                    _ => None,
                };
                match column {
                    Column::UnitPrice => self.unit_price = number,
                    Column::BenchmarkPrice => self.benchmark_price = number,
                    Column::PriceDeviation => self.price_deviation = number,
                    Column::PortalPrice => self.portal_price = number,
                    Column::PortalVsUnitDeviation => self.portal_vs_unit_deviation = number,
                    Column::InternalInventoryPrice => self.internal_inventory_price = number,
                    Column::InventoryVsLatest => self.inventory_vs_latest = number,
                    Column::InternalContractPrice => self.internal_contract_price = number,
                    Column::ContractVsLatest => self.contract_vs_latest = number,
                    _ => {}
                }
            }
            ColumnKind::Timestamp => {
                let ts = match value {
                    CellValue::Timestamp(ts) => Some(ts),
                    _ => None,
                };
                match column {
                    Column::PriceSourceTimestamp => self.price_source_timestamp = ts,
                    Column::InternalInventoryDate => self.internal_inventory_date = ts,
                    Column::InternalContractDate => self.internal_contract_date = ts,
                    _ => {}
                }
            }
        }
    }

    /// GMP compliance is the literal "Yes".
    pub fn is_gmp_compliant(&self) -> bool {
        self.gmp_compliance.as_deref() == Some("Yes")
    }
}

// ---------------------------------------------------------------------------
// PricingTable – the complete loaded dataset
// ---------------------------------------------------------------------------

/// The full parsed dataset with pre-computed filter options.
///
/// Built once by the loader and never mutated afterwards; filtered views
/// borrow it.
#[derive(Debug, Clone)]
pub struct PricingTable {
    records: Vec<Record>,
    columns: Vec<Column>,
    unique_values: BTreeMap<Column, BTreeSet<String>>,
    degraded: BTreeMap<Column, usize>,
}

impl PricingTable {
    /// Build the option index from loaded records.
    ///
    /// `columns` are the columns present in the source; they are kept in
    /// [`Column::ALL`] order regardless of the order given.
    pub fn from_records(records: Vec<Record>, columns: &[Column]) -> Self {
        let columns: Vec<Column> = Column::ALL
            .into_iter()
            .filter(|c| columns.contains(c))
            .collect();

        let mut unique_values: BTreeMap<Column, BTreeSet<String>> = BTreeMap::new();
        for &col in columns.iter().filter(|c| c.is_categorical()) {
            let values = unique_values.entry(col).or_default();
            for rec in &records {
                if let Some(v) = rec.text(col) {
                    values.insert(v.to_string());
                }
            }
        }

        PricingTable {
            records,
            columns,
            unique_values,
            degraded: BTreeMap::new(),
        }
    }

    /// Attach per-column counts of cells that failed to parse.
    pub fn with_degraded(mut self, degraded: BTreeMap<Column, usize>) -> Self {
        self.degraded = degraded;
        self
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    /// Columns present in the source, in canonical order.
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn has_column(&self, column: Column) -> bool {
        self.columns.contains(&column)
    }

    /// Sorted distinct non-null values of a categorical column.
    pub fn unique_values(&self, column: Column) -> Option<&BTreeSet<String>> {
        self.unique_values.get(&column)
    }

    /// Cells per column that were present but unparseable.
    pub fn degraded(&self) -> &BTreeMap<Column, usize> {
        &self.degraded
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Whether the table is empty.
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_names_resolve_by_header_or_key() {
        assert_eq!("Vendor_Name".parse::<Column>(), Ok(Column::VendorName));
        assert_eq!("vendor".parse::<Column>(), Ok(Column::VendorName));
        assert_eq!(
            "price_deviation (%)".parse::<Column>(),
            Ok(Column::PriceDeviation)
        );
        assert_eq!(
            "Colour".parse::<Column>(),
            Err(SelectionError::UnknownColumn("Colour".into()))
        );
    }

    #[test]
    fn every_column_has_unique_header_and_key() {
        let headers: BTreeSet<_> = Column::ALL.iter().map(|c| c.header()).collect();
        let keys: BTreeSet<_> = Column::ALL.iter().map(|c| c.key()).collect();
        assert_eq!(headers.len(), Column::ALL.len());
        assert_eq!(keys.len(), Column::ALL.len());
    }

    #[test]
    fn parse_columns_rejects_unknown_names() {
        assert_eq!(
            parse_columns("material, vendor ,unit_price"),
            Ok(vec![Column::MaterialName, Column::VendorName, Column::UnitPrice])
        );
        assert!(parse_columns("material,nope").is_err());
    }

    #[test]
    fn set_and_read_back_every_kind() {
        let mut rec = Record::default();
        let ts = NaiveDateTime::parse_from_str("2024-03-01 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        rec.set(Column::VendorName, CellValue::Text("Merck".into()));
        rec.set(Column::UnitPrice, CellValue::Number(12.5));
        rec.set(Column::PriceDeviation, CellValue::Number(f64::NAN));
        rec.set(Column::PriceSourceTimestamp, CellValue::Timestamp(ts));

        assert_eq!(rec.text(Column::VendorName), Some("Merck"));
        assert_eq!(rec.number(Column::UnitPrice), Some(12.5));
        assert_eq!(rec.number(Column::PriceDeviation), None);
        assert_eq!(rec.timestamp(Column::PriceSourceTimestamp), Some(ts));
        assert_eq!(rec.cell(Column::Currency), CellValue::Null);
        // kind mismatch is absent rather than coerced
        rec.set(Column::UnitPrice, CellValue::Text("12".into()));
        assert_eq!(rec.unit_price, None);
    }

    #[test]
    fn unique_values_skip_nulls_and_non_categorical_columns() {
        let records = vec![
            Record {
                vendor_name: Some("B".into()),
                unit_price: Some(1.0),
                ..Default::default()
            },
            Record {
                vendor_name: Some("A".into()),
                ..Default::default()
            },
            Record::default(),
        ];
        let table = PricingTable::from_records(records, &[Column::UnitPrice, Column::VendorName]);

        assert_eq!(table.columns(), &[Column::VendorName, Column::UnitPrice]);
        let vendors: Vec<_> = table
            .unique_values(Column::VendorName)
            .unwrap()
            .iter()
            .cloned()
            .collect();
        assert_eq!(vendors, vec!["A", "B"]);
        assert!(table.unique_values(Column::UnitPrice).is_none());
    }

    #[test]
    fn timestamp_display_omits_zero_fraction() {
        let ts = NaiveDateTime::parse_from_str("2024-03-01 10:00:00", "%Y-%m-%d %H:%M:%S").unwrap();
        assert_eq!(CellValue::Timestamp(ts).to_string(), "2024-03-01 10:00:00");
    }
}
