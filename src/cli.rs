use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum, ValueHint};

use crate::data::error::SelectionError;
use crate::data::export::DEFAULT_EXPORT_NAME;
use crate::data::filter::{parse_filter_arg, FilterSelection, Selection};
use crate::data::loader::DEFAULT_SHEET;
use crate::data::model::Column;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Pharmaceutical price benchmarking over a pricing spreadsheet",
    long_about = None
)]
pub struct Cli {
    /// Pricing data file (.xlsx, .xls, .ods, .csv, .parquet or .json)
    #[arg(short, long, env = "PHARMA_DATA", value_hint = ValueHint::FilePath)]
    pub data: PathBuf,

    /// Worksheet holding the records (workbooks only)
    #[arg(long, env = "PHARMA_SHEET", default_value = DEFAULT_SHEET)]
    pub sheet: String,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print every dashboard view for the selection
    Summary(SummaryArgs),
    /// List the filter dimensions and the values each offers
    Options,
    /// Print a single view
    View(ViewArgs),
    /// Show chosen columns of the filtered records
    Table(TableArgs),
    /// Write the filtered records as CSV
    Export(ExportArgs),
    /// Interactive session: change filters and inspect views line by line
    Explore,
}

#[derive(Args, Debug, Default)]
pub struct FilterArgs {
    /// Keep only rows where COLUMN equals VALUE (repeatable; column by header or key)
    #[arg(short, long = "filter", value_name = "COLUMN=VALUE", value_parser = parse_filter_arg)]
    pub filters: Vec<(Column, String)>,
}

impl FilterArgs {
    /// Fold the flags into one selection; a later flag for the same column wins.
    pub fn to_selection(&self) -> Result<FilterSelection, SelectionError> {
        self.filters
            .iter()
            .try_fold(FilterSelection::new(), |sel, (column, value)| {
                sel.with(*column, Selection::Only(value.clone()))
            })
    }
}

#[derive(Args, Debug)]
pub struct SummaryArgs {
    #[command(flatten)]
    pub filters: FilterArgs,

    /// Emit JSON instead of text tables
    #[arg(long)]
    pub json: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum ViewKind {
    /// Headline metrics
    Kpi,
    /// Mean price vs mean benchmark per group (--by, default material)
    Prices,
    /// Groups ranked by mean price (--by, default vendor)
    Ranking,
    /// GMP compliance rate per vendor
    Compliance,
    /// Mean price per price-source timestamp
    TimeSeries,
    /// Value frequencies of one column (--by, default portal status)
    Counts,
    /// Price five-number summary per group (--by, default material type)
    Distribution,
    /// Row counts per vendor and material type
    Offerings,
    /// Distribution, vendor prices and spec/grade for one material (--material)
    Material,
}

#[derive(Args, Debug)]
pub struct ViewArgs {
    #[arg(value_enum)]
    pub view: ViewKind,

    /// Grouping column for views that take one
    #[arg(long, value_name = "COLUMN")]
    pub by: Option<Column>,

    /// Material name for the material view
    #[arg(long, required_if_eq("view", "material"))]
    pub material: Option<String>,

    /// Maximum groups for the ranking view
    #[arg(long, default_value_t = 15)]
    pub limit: usize,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Emit JSON instead of a text table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct TableArgs {
    /// Comma-separated columns to show (defaults to the main pricing columns)
    #[arg(short, long, value_delimiter = ',', value_name = "COLUMNS")]
    pub columns: Vec<Column>,

    /// Number of rows to display
    #[arg(short, long, default_value_t = 20)]
    pub rows: usize,

    #[command(flatten)]
    pub filters: FilterArgs,

    /// Emit JSON instead of a text table
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug)]
pub struct ExportArgs {
    /// Output CSV path (`-` for stdout)
    #[arg(short, long, default_value = DEFAULT_EXPORT_NAME, value_hint = ValueHint::FilePath)]
    pub output: PathBuf,

    #[command(flatten)]
    pub filters: FilterArgs,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_filters_and_view_options() {
        let cli = Cli::try_parse_from([
            "pharma-benchmark",
            "--data",
            "prices.xlsx",
            "view",
            "ranking",
            "--by",
            "vendor",
            "-f",
            "currency=USD",
            "--filter",
            "Material_Type=API",
        ])
        .unwrap();

        assert_eq!(cli.sheet, "in");
        let Command::View(args) = cli.command else {
            panic!("expected view command");
        };
        assert_eq!(args.view, ViewKind::Ranking);
        assert_eq!(args.by, Some(Column::VendorName));
        let selection = args.filters.to_selection().unwrap();
        assert_eq!(selection.get(Column::Currency), &Selection::Only("USD".into()));
        assert_eq!(selection.get(Column::MaterialType), &Selection::Only("API".into()));
    }

    #[test]
    fn rejects_unknown_filter_columns() {
        let err = Cli::try_parse_from([
            "pharma-benchmark",
            "--data",
            "prices.csv",
            "summary",
            "-f",
            "colour=red",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn numeric_filter_columns_fail_when_folded() {
        let args = FilterArgs {
            filters: vec![(Column::UnitPrice, "3".into())],
        };
        assert_eq!(
            args.to_selection(),
            Err(SelectionError::NotCategorical(Column::UnitPrice))
        );
    }

    #[test]
    fn material_view_requires_a_material() {
        let err = Cli::try_parse_from([
            "pharma-benchmark",
            "--data",
            "prices.csv",
            "view",
            "material",
        ]);
        assert!(err.is_err());
    }

    #[test]
    fn table_columns_split_on_commas() {
        let cli = Cli::try_parse_from([
            "pharma-benchmark",
            "--data",
            "prices.csv",
            "table",
            "--columns",
            "material,unit_price,Currency",
            "--rows",
            "5",
        ])
        .unwrap();
        let Command::Table(args) = cli.command else {
            panic!("expected table command");
        };
        assert_eq!(
            args.columns,
            vec![Column::MaterialName, Column::UnitPrice, Column::Currency]
        );
        assert_eq!(args.rows, 5);
    }
}
