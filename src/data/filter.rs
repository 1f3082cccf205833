use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use super::error::SelectionError;
use super::model::{Column, PricingTable, Record};

// ---------------------------------------------------------------------------
// Selection – one column's constraint
// ---------------------------------------------------------------------------

/// What a single filter dimension is set to.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Selection {
    /// No constraint on this column.
    All,
    /// Keep rows whose value equals this one exactly.
    Only(String),
}

impl Selection {
    pub fn matches(&self, value: Option<&str>) -> bool {
        match self {
            Selection::All => true,
            // absent values never satisfy a concrete selection
            Selection::Only(wanted) => value == Some(wanted.as_str()),
        }
    }
}

impl fmt::Display for Selection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selection::All => f.write_str("All"),
            Selection::Only(v) => f.write_str(v),
        }
    }
}

// ---------------------------------------------------------------------------
// FilterSelection – the full set of constraints for one interaction
// ---------------------------------------------------------------------------

/// Per-column selections. Columns not present impose no constraint.
///
/// Built with [`FilterSelection::with`] and not mutated afterwards; a new
/// interaction builds a new selection.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterSelection {
    entries: BTreeMap<Column, Selection>,
}

impl FilterSelection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a selection with `column` set. Only categorical columns can be
    /// filtered.
    pub fn with(mut self, column: Column, selection: Selection) -> Result<Self, SelectionError> {
        if !column.is_categorical() {
            return Err(SelectionError::NotCategorical(column));
        }
        match selection {
            Selection::All => {
                self.entries.remove(&column);
            }
            only => {
                self.entries.insert(column, only);
            }
        }
        Ok(self)
    }

    /// Return a selection with `column` unconstrained.
    pub fn without(mut self, column: Column) -> Self {
        self.entries.remove(&column);
        self
    }

    pub fn get(&self, column: Column) -> &Selection {
        static UNCONSTRAINED: Selection = Selection::All;
        self.entries.get(&column).unwrap_or(&UNCONSTRAINED)
    }

    /// Non-wildcard entries in column order.
    pub fn active(&self) -> impl Iterator<Item = (Column, &str)> + '_ {
        self.entries.iter().filter_map(|(col, sel)| match sel {
            Selection::Only(v) => Some((*col, v.as_str())),
            Selection::All => None,
        })
    }

    pub fn is_unconstrained(&self) -> bool {
        self.active().next().is_none()
    }

    pub fn matches(&self, record: &Record) -> bool {
        self.entries
            .iter()
            .all(|(col, sel)| sel.matches(record.text(*col)))
    }
}

/// Parses `column=value`. The value is taken verbatim after the first `=`.
impl FromStr for FilterSelection {
    type Err = SelectionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (column, value) = parse_filter_arg(s)?;
        FilterSelection::new().with(column, Selection::Only(value))
    }
}

/// Split a `column=value` argument.
pub fn parse_filter_arg(arg: &str) -> Result<(Column, String), SelectionError> {
    let (column, value) = arg
        .split_once('=')
        .ok_or_else(|| SelectionError::Malformed(arg.to_string()))?;
    if value.is_empty() {
        return Err(SelectionError::Malformed(arg.to_string()));
    }
    Ok((column.parse()?, value.to_string()))
}

/// The choices offered for one dimension: `All` followed by the sorted
/// distinct values seen in the table.
pub fn options(table: &PricingTable, column: Column) -> Vec<Selection> {
    std::iter::once(Selection::All)
        .chain(
            table
                .unique_values(column)
                .into_iter()
                .flatten()
                .cloned()
                .map(Selection::Only),
        )
        .collect()
}

// ---------------------------------------------------------------------------
// FilteredView – indices into the table that pass a selection
// ---------------------------------------------------------------------------

/// A borrowed subset of a [`PricingTable`], in table order.
#[derive(Debug, Clone)]
pub struct FilteredView<'a> {
    table: &'a PricingTable,
    indices: Vec<usize>,
}

impl<'a> FilteredView<'a> {
    /// The whole table.
    pub fn full(table: &'a PricingTable) -> Self {
        Self {
            table,
            indices: (0..table.len()).collect(),
        }
    }

    /// Build a view from precomputed indices; out-of-range indices are dropped.
    pub fn from_indices(table: &'a PricingTable, indices: &[usize]) -> Self {
        Self {
            table,
            indices: indices.iter().copied().filter(|&i| i < table.len()).collect(),
        }
    }

    /// Narrow this view further. Equivalent to applying the union of both
    /// selections to the table.
    pub fn refine(&self, selection: &FilterSelection) -> FilteredView<'a> {
        let records = self.table.records();
        FilteredView {
            table: self.table,
            indices: self
                .indices
                .iter()
                .copied()
                .filter(|&i| selection.matches(&records[i]))
                .collect(),
        }
    }

    pub fn table(&self) -> &'a PricingTable {
        self.table
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn records(&self) -> impl Iterator<Item = &'a Record> + '_ {
        let records = self.table.records();
        self.indices.iter().map(move |&i| &records[i])
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }
}

/// Return the rows of `table` that pass every active entry of `selection`.
///
/// A record passes a column filter when:
/// * the column is not in `selection`, or is `All` → passes (no constraint)
/// * the record's value equals the selected value → passes
/// * the record's value is absent → fails
pub fn apply<'a>(table: &'a PricingTable, selection: &FilterSelection) -> FilteredView<'a> {
    FilteredView::full(table).refine(selection)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(vendor: &str, material_type: &str, gmp: Option<&str>) -> Record {
        Record {
            vendor_name: Some(vendor.into()),
            material_type: Some(material_type.into()),
            gmp_compliance: gmp.map(Into::into),
            ..Default::default()
        }
    }

    fn table() -> PricingTable {
        PricingTable::from_records(
            vec![
                record("Merck", "API", Some("Yes")),
                record("Merck", "Excipient", Some("No")),
                record("Sigma", "API", None),
                record("BASF", "Solvent", Some("Yes")),
                record("Sigma", "Excipient", Some("Yes")),
            ],
            &[Column::VendorName, Column::MaterialType, Column::GmpCompliance],
        )
    }

    fn only(column: Column, value: &str) -> FilterSelection {
        FilterSelection::new()
            .with(column, Selection::Only(value.into()))
            .unwrap()
    }

    #[test]
    fn wildcard_selection_returns_full_table() {
        let t = table();
        let sel = FilterSelection::new()
            .with(Column::VendorName, Selection::All)
            .unwrap();
        assert!(sel.is_unconstrained());
        assert_eq!(apply(&t, &sel).indices(), &[0, 1, 2, 3, 4]);
    }

    #[test]
    fn filters_commute_and_intersect() {
        let t = table();
        let a = only(Column::VendorName, "Sigma");
        let b = only(Column::MaterialType, "Excipient");
        let both = a.clone().with(Column::MaterialType, Selection::Only("Excipient".into())).unwrap();

        let ab = apply(&t, &a).refine(&b);
        let ba = apply(&t, &b).refine(&a);
        let joint = apply(&t, &both);

        assert_eq!(ab.indices(), &[4]);
        assert_eq!(ab.indices(), ba.indices());
        assert_eq!(ab.indices(), joint.indices());
    }

    #[test]
    fn result_is_always_a_subset() {
        let t = table();
        for vendor in ["Merck", "Sigma", "BASF", "Nobody"] {
            let view = apply(&t, &only(Column::VendorName, vendor));
            assert!(view.records().all(|r| r.vendor_name.as_deref() == Some(vendor)));
            assert!(view.len() <= t.len());
        }
    }

    #[test]
    fn unknown_value_yields_empty_view() {
        let t = table();
        let view = apply(&t, &only(Column::VendorName, "merck"));
        assert!(view.is_empty());
    }

    #[test]
    fn absent_values_never_match() {
        let t = table();
        let view = apply(&t, &only(Column::GmpCompliance, "Yes"));
        assert_eq!(view.indices(), &[0, 3, 4]);
        let none = apply(&t, &only(Column::GmpCompliance, ""));
        assert!(none.is_empty());
    }

    #[test]
    fn numeric_columns_cannot_be_filtered() {
        assert_eq!(
            FilterSelection::new().with(Column::UnitPrice, Selection::Only("1".into())),
            Err(SelectionError::NotCategorical(Column::UnitPrice))
        );
    }

    #[test]
    fn setting_all_clears_a_previous_value() {
        let sel = only(Column::VendorName, "Merck")
            .with(Column::VendorName, Selection::All)
            .unwrap();
        assert_eq!(sel.get(Column::VendorName), &Selection::All);
        assert!(sel.is_unconstrained());
    }

    #[test]
    fn parses_filter_arguments() {
        assert_eq!(
            parse_filter_arg("vendor=Sigma Aldrich"),
            Ok((Column::VendorName, "Sigma Aldrich".into()))
        );
        assert_eq!(
            parse_filter_arg("Internal vs External=a=b"),
            Ok((Column::InternalExternal, "a=b".into()))
        );
        assert!(matches!(
            parse_filter_arg("vendor"),
            Err(SelectionError::Malformed(_))
        ));
        assert!(matches!(
            "unit_price=3".parse::<FilterSelection>(),
            Err(SelectionError::NotCategorical(Column::UnitPrice))
        ));
    }

    #[test]
    fn options_start_with_wildcard() {
        let t = table();
        assert_eq!(
            options(&t, Column::GmpCompliance),
            vec![
                Selection::All,
                Selection::Only("No".into()),
                Selection::Only("Yes".into())
            ]
        );
        assert_eq!(options(&t, Column::Currency), vec![Selection::All]);
    }
}
