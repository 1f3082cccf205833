use serde::Serialize;

use crate::data::aggregate::{
    self, CategoryCount, CrossCount, KpiSummary, PriceComparison, PriceDistribution,
    SpecGradeBreakdown, TimePoint, VendorCompliance,
};
use crate::data::error::SelectionError;
use crate::data::filter::{self, FilterSelection, FilteredView, Selection};
use crate::data::model::{Column, PricingTable};

/// Materials shown in the price-vs-benchmark comparison.
const TOP_MATERIALS: usize = 20;
/// Vendors shown in the price ranking.
const TOP_VENDORS: usize = 15;

// ---------------------------------------------------------------------------
// Dashboard state
// ---------------------------------------------------------------------------

/// The session state, independent of how results are shown.
///
/// Owns the table loaded at startup; every filter change swaps in a new
/// selection and recomputes the visible rows.
pub struct DashboardState {
    /// Loaded once, never mutated.
    table: PricingTable,

    /// Current per-column selections.
    selection: FilterSelection,

    /// Indices of records passing the current selection (cached).
    visible_indices: Vec<usize>,
}

impl DashboardState {
    /// Ingest a loaded table with every filter set to `All`.
    pub fn new(table: PricingTable) -> Self {
        let visible_indices = (0..table.len()).collect();
        Self {
            table,
            selection: FilterSelection::new(),
            visible_indices,
        }
    }

    pub fn table(&self) -> &PricingTable {
        &self.table
    }

    pub fn selection(&self) -> &FilterSelection {
        &self.selection
    }

    /// The records passing the current selection.
    pub fn view(&self) -> FilteredView<'_> {
        FilteredView::from_indices(&self.table, &self.visible_indices)
    }

    /// Replace the whole selection.
    pub fn set_selection(&mut self, selection: FilterSelection) {
        self.selection = selection;
        self.refilter();
    }

    /// Set one dimension, keeping the others.
    pub fn set_filter(&mut self, column: Column, selection: Selection) -> Result<(), SelectionError> {
        let next = self.selection.clone().with(column, selection)?;
        self.set_selection(next);
        Ok(())
    }

    pub fn clear_filter(&mut self, column: Column) {
        let next = self.selection.clone().without(column);
        self.set_selection(next);
    }

    /// Back to the full table.
    pub fn reset(&mut self) {
        self.set_selection(FilterSelection::new());
    }

    /// Human-readable list of the non-wildcard filters.
    pub fn active_filters(&self) -> Vec<String> {
        self.selection
            .active()
            .map(|(col, value)| format!("{col}: {value}"))
            .collect()
    }

    /// Recompute `visible_indices` after a selection change.
    fn refilter(&mut self) {
        self.visible_indices = filter::apply(&self.table, &self.selection)
            .indices()
            .to_vec();
        log::debug!(
            "Selection {:?} keeps {} of {} records",
            self.active_filters(),
            self.visible_indices.len(),
            self.table.len()
        );
    }

    /// Compute every view for the current selection.
    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot::build(&self.view(), self.active_filters())
    }
}

// ---------------------------------------------------------------------------
// Snapshot – all views for one selection
// ---------------------------------------------------------------------------

/// Plain-data bundle of every view for one selection, ready for any
/// renderer (or `serde_json`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub active_filters: Vec<String>,
    pub kpis: KpiSummary,
    pub price_by_material_type: Vec<PriceDistribution>,
    pub price_vs_benchmark: Vec<PriceComparison>,
    pub vendor_offerings: Vec<CrossCount>,
    pub vendor_price_ranking: Vec<PriceComparison>,
    pub vendor_compliance: Vec<VendorCompliance>,
    pub price_time_series: Vec<TimePoint>,
    pub price_by_currency: Vec<PriceDistribution>,
    pub portal_validation: Vec<CategoryCount>,
    pub supplier_portals: Vec<CategoryCount>,
    pub internal_vs_external: Vec<PriceComparison>,
    pub price_by_form: Vec<PriceComparison>,
}

impl DashboardSnapshot {
    pub fn build(view: &FilteredView<'_>, active_filters: Vec<String>) -> Self {
        let mut price_vs_benchmark =
            aggregate::grouped_price_comparison(view, Column::MaterialName);
        price_vs_benchmark.truncate(TOP_MATERIALS);

        Self {
            active_filters,
            kpis: aggregate::kpi_summary(view),
            price_by_material_type: aggregate::price_distribution(view, Column::MaterialType),
            price_vs_benchmark,
            vendor_offerings: aggregate::cross_counts(
                view,
                Column::VendorName,
                Column::MaterialType,
            ),
            vendor_price_ranking: aggregate::ranked_mean_price(
                view,
                Column::VendorName,
                TOP_VENDORS,
            ),
            vendor_compliance: aggregate::compliance_by_vendor(view),
            price_time_series: aggregate::price_time_series(view),
            price_by_currency: aggregate::price_distribution(view, Column::Currency),
            portal_validation: aggregate::category_counts(view, Column::PortalValidationStatus),
            supplier_portals: aggregate::category_counts(view, Column::SupplierPortalName),
            internal_vs_external: aggregate::grouped_price_comparison(
                view,
                Column::InternalExternal,
            ),
            price_by_form: aggregate::grouped_price_comparison(view, Column::Form),
        }
    }
}

/// Views for a single material, narrowed from the current selection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MaterialInsight {
    pub material: String,
    pub price_distribution: Vec<PriceDistribution>,
    pub vendor_prices: Vec<PriceComparison>,
    pub spec_grade: Vec<SpecGradeBreakdown>,
}

impl DashboardState {
    pub fn material_insight(&self, material: &str) -> Result<MaterialInsight, SelectionError> {
        let selection = FilterSelection::new()
            .with(Column::MaterialName, Selection::Only(material.to_string()))?;
        let view = self.view().refine(&selection);

        Ok(MaterialInsight {
            material: material.to_string(),
            price_distribution: aggregate::price_distribution(&view, Column::MaterialName),
            vendor_prices: aggregate::grouped_price_comparison(&view, Column::VendorName),
            spec_grade: aggregate::spec_grade_breakdown(&view),
        })
    }
}
