use std::fs::File;
use std::io::{self, BufRead, BufWriter, Write};
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Serialize;

use crate::cli::{Cli, Command, FilterArgs, TableArgs, ViewArgs, ViewKind};
use crate::data::aggregate;
use crate::data::export::{self, DEFAULT_EXPORT_NAME};
use crate::data::filter::{parse_filter_arg, Selection};
use crate::data::loader::{load_file, LoadOptions};
use crate::data::model::{parse_columns, Column, ColumnKind, PricingTable};
use crate::report::text::{
    comparison_table, compliance_table, counts_table, cross_table, distribution_table, kpi_table,
    projection_table, time_series_table, MaterialReport, OptionsReport, SnapshotReport,
};
use crate::report::to_json;
use crate::state::DashboardState;

/// Rows shown by the explore `table` command when no count is given.
const DEFAULT_TABLE_ROWS: usize = 20;

// ---------------------------------------------------------------------------
// Entry point
// ---------------------------------------------------------------------------

/// Load the data file once, then run the requested command against it.
pub fn run(cli: Cli) -> Result<()> {
    let options = LoadOptions {
        sheet: cli.sheet.clone(),
    };
    let table = load_file(&cli.data, &options)
        .with_context(|| format!("Failed to load {}", cli.data.display()))?;
    if table.is_empty() {
        log::warn!("{} contains no records", cli.data.display());
    }
    let mut state = DashboardState::new(table);

    let stdout = io::stdout();
    let mut out = stdout.lock();

    match cli.command {
        Command::Summary(args) => {
            apply_filters(&mut state, &args.filters)?;
            let snapshot = state.snapshot();
            emit(&mut out, args.json, &snapshot, |s| SnapshotReport(s).to_string())?;
        }
        Command::Options => {
            let report = OptionsReport {
                table: state.table(),
                selection: state.selection(),
            };
            write!(out, "{report}")?;
        }
        Command::View(args) => {
            apply_filters(&mut state, &args.filters)?;
            print_view(&state, &args, &mut out)?;
        }
        Command::Table(args) => {
            apply_filters(&mut state, &args.filters)?;
            print_table(&state, &args, &mut out)?;
        }
        Command::Export(args) => {
            apply_filters(&mut state, &args.filters)?;
            export_view(&state, &args.output, &mut out)?;
        }
        Command::Explore => {
            let stdin = io::stdin();
            explore(&mut state, stdin.lock(), &mut out)?;
        }
    }
    out.flush()?;
    Ok(())
}

fn apply_filters(state: &mut DashboardState, filters: &FilterArgs) -> Result<()> {
    state.set_selection(filters.to_selection()?);
    Ok(())
}

/// Write `data` as pretty JSON or through its text renderer.
fn emit<T: Serialize>(
    out: &mut impl Write,
    json: bool,
    data: &T,
    render: impl FnOnce(&T) -> String,
) -> Result<()> {
    if json {
        writeln!(out, "{}", to_json(data)?)?;
    } else {
        write!(out, "{}", render(data))?;
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Single views
// ---------------------------------------------------------------------------

fn grouping(args: &ViewArgs, default: Column) -> Result<Column> {
    let column = args.by.unwrap_or(default);
    if column.kind() != ColumnKind::Text {
        bail!("Cannot group by {column}: it is not a text column");
    }
    Ok(column)
}

fn print_view(state: &DashboardState, args: &ViewArgs, out: &mut impl Write) -> Result<()> {
    let view = state.view();
    let json = args.json;

    match args.view {
        ViewKind::Kpi => emit(out, json, &aggregate::kpi_summary(&view), |k| {
            kpi_table(k).to_string()
        }),
        ViewKind::Prices => {
            let by = grouping(args, Column::MaterialName)?;
            let rows = aggregate::grouped_price_comparison(&view, by);
            emit(out, json, &rows, |r| comparison_table(by.header(), r).to_string())
        }
        ViewKind::Ranking => {
            let by = grouping(args, Column::VendorName)?;
            let rows = aggregate::ranked_mean_price(&view, by, args.limit);
            emit(out, json, &rows, |r| comparison_table(by.header(), r).to_string())
        }
        ViewKind::Compliance => emit(out, json, &aggregate::compliance_by_vendor(&view), |r| {
            compliance_table(r).to_string()
        }),
        ViewKind::TimeSeries => emit(out, json, &aggregate::price_time_series(&view), |r| {
            time_series_table(r).to_string()
        }),
        ViewKind::Counts => {
            let by = grouping(args, Column::PortalValidationStatus)?;
            let rows = aggregate::category_counts(&view, by);
            emit(out, json, &rows, |r| counts_table(by.header(), r).to_string())
        }
        ViewKind::Distribution => {
            let by = grouping(args, Column::MaterialType)?;
            let rows = aggregate::price_distribution(&view, by);
            emit(out, json, &rows, |r| distribution_table(by.header(), r).to_string())
        }
        ViewKind::Offerings => {
            let rows = aggregate::cross_counts(&view, Column::VendorName, Column::MaterialType);
            emit(out, json, &rows, |r| {
                cross_table(
                    Column::VendorName.header(),
                    Column::MaterialType.header(),
                    r,
                )
                .to_string()
            })
        }
        ViewKind::Material => {
            let material = args
                .material
                .as_deref()
                .context("The material view needs --material")?;
            let insight = state.material_insight(material)?;
            emit(out, json, &insight, |m| MaterialReport(m).to_string())
        }
    }
}

/// Keep the requested columns the loaded file actually has.
fn present_columns(table: &PricingTable, requested: &[Column]) -> Vec<Column> {
    requested
        .iter()
        .copied()
        .filter(|&column| {
            let present = table.has_column(column);
            if !present {
                log::warn!("Column {column} is not in the loaded file; skipping");
            }
            present
        })
        .collect()
}

fn print_table(state: &DashboardState, args: &TableArgs, out: &mut impl Write) -> Result<()> {
    let requested = if args.columns.is_empty() {
        Column::DEFAULT_PROJECTION.to_vec()
    } else {
        args.columns.clone()
    };
    let columns = present_columns(state.table(), &requested);
    let projected = aggregate::project(&state.view(), &columns, args.rows);
    emit(out, args.json, &projected, |p| projection_table(p).to_string())
}

/// Write the current view as CSV to `output`, or to `out` when it is `-`.
fn export_view(state: &DashboardState, output: &Path, out: &mut impl Write) -> Result<()> {
    let view = state.view();
    if output == Path::new("-") {
        out.write_all(&export::to_csv_bytes(&view)?)?;
        return Ok(());
    }

    let file = File::create(output)
        .with_context(|| format!("Failed to create {}", output.display()))?;
    export::write_csv(&view, BufWriter::new(file))
        .with_context(|| format!("Failed to write {}", output.display()))?;
    log::info!("Exported {} records to {}", view.len(), output.display());
    writeln!(out, "Wrote {} records to {}", view.len(), output.display())?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Interactive session
// ---------------------------------------------------------------------------

const EXPLORE_HELP: &str = "\
Commands:
  set COLUMN=VALUE        narrow one filter dimension
  clear COLUMN            set one dimension back to All
  reset                   clear every filter
  filters                 show the current selection
  options                 list the values each dimension offers
  kpi                     headline metrics
  show                    every view for the selection
  material NAME           views for a single material
  table [ROWS] [COLUMNS]  first rows of the selection (COLUMNS comma-separated)
  export [PATH]           write the selection as CSV
  help                    this text
  quit                    leave
";

enum Flow {
    Continue,
    Quit,
}

/// Read commands line by line until `quit` or end of input. A failing
/// command is reported and leaves the state as it was.
pub fn explore<R: BufRead, W: Write>(
    state: &mut DashboardState,
    input: R,
    mut out: W,
) -> Result<()> {
    writeln!(
        out,
        "{} records loaded. Type `help` for commands.",
        state.table().len()
    )?;
    prompt(&mut out)?;

    for line in input.lines() {
        let line = line?;
        match explore_command(state, line.trim(), &mut out) {
            Ok(Flow::Continue) => {}
            Ok(Flow::Quit) => break,
            Err(e) => {
                log::debug!("Command {line:?} failed: {e:#}");
                writeln!(out, "Error: {e:#}")?;
            }
        }
        prompt(&mut out)?;
    }
    Ok(())
}

fn prompt(out: &mut impl Write) -> Result<()> {
    write!(out, "> ")?;
    out.flush()?;
    Ok(())
}

fn explore_command(state: &mut DashboardState, line: &str, out: &mut impl Write) -> Result<Flow> {
    let (command, rest) = line
        .split_once(char::is_whitespace)
        .map_or((line, ""), |(c, r)| (c, r.trim()));

    match command {
        "" => {}
        "set" => {
            let (column, value) = parse_filter_arg(rest)?;
            state.set_filter(column, Selection::Only(value))?;
            write_selection(state, out)?;
        }
        "clear" => {
            let column: Column = rest.parse()?;
            state.clear_filter(column);
            write_selection(state, out)?;
        }
        "reset" => {
            state.reset();
            write_selection(state, out)?;
        }
        "filters" => write_selection(state, out)?,
        "options" => {
            let report = OptionsReport {
                table: state.table(),
                selection: state.selection(),
            };
            write!(out, "{report}")?;
        }
        "kpi" => write!(out, "{}", kpi_table(&aggregate::kpi_summary(&state.view())))?,
        "show" => write!(out, "{}", SnapshotReport(&state.snapshot()))?,
        "material" => {
            if rest.is_empty() {
                bail!("Usage: material NAME");
            }
            write!(out, "{}", MaterialReport(&state.material_insight(rest)?))?;
        }
        "table" => {
            let mut parts = rest.split_whitespace();
            let rows = parts
                .next()
                .map(str::parse::<usize>)
                .transpose()
                .context("Row count must be a whole number")?
                .unwrap_or(DEFAULT_TABLE_ROWS);
            let requested = match parts.next() {
                Some(list) => parse_columns(list)?,
                None => Column::DEFAULT_PROJECTION.to_vec(),
            };
            let columns = present_columns(state.table(), &requested);
            let projected = aggregate::project(&state.view(), &columns, rows);
            write!(out, "{}", projection_table(&projected))?;
        }
        "export" => {
            let path = if rest.is_empty() { DEFAULT_EXPORT_NAME } else { rest };
            export_view(state, Path::new(path), out)?;
        }
        "help" => write!(out, "{EXPLORE_HELP}")?,
        "quit" | "exit" => return Ok(Flow::Quit),
        other => bail!("Unknown command `{other}`; type `help` for the list"),
    }
    Ok(Flow::Continue)
}

fn write_selection(state: &DashboardState, out: &mut impl Write) -> Result<()> {
    if state.selection().is_unconstrained() {
        writeln!(out, "Active filters: none")?;
    } else {
        writeln!(out, "Active filters: {}", state.active_filters().join(", "))?;
    }

    let view = state.view();
    if view.is_empty() {
        writeln!(out, "No records match the current filters")?;
    } else {
        writeln!(out, "{} of {} records match", view.len(), state.table().len())?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::data::model::Record;

    fn record(material: &str, vendor: &str, price: f64) -> Record {
        Record {
            material_name: Some(material.into()),
            material_type: Some("Excipient".into()),
            vendor_name: Some(vendor.into()),
            unit_price: Some(price),
            benchmark_price: Some(price + 1.0),
            gmp_compliance: Some("Yes".into()),
            currency: Some("USD".into()),
            ..Default::default()
        }
    }

    fn state() -> DashboardState {
        DashboardState::new(PricingTable::from_records(
            vec![
                record("Lactose", "V1", 10.0),
                record("Starch", "V2", 20.0),
                record("Lactose", "V2", 30.0),
            ],
            &Column::ALL,
        ))
    }

    fn session(state: &mut DashboardState, script: &str) -> String {
        let mut out = Vec::new();
        explore(state, Cursor::new(script), &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    fn view_args(view: ViewKind, by: Option<Column>) -> ViewArgs {
        ViewArgs {
            view,
            by,
            material: None,
            limit: 15,
            filters: FilterArgs::default(),
            json: true,
        }
    }

    #[test]
    fn explore_applies_and_clears_filters() {
        let mut s = state();
        let out = session(&mut s, "set vendor=V2\nclear vendor\nset material=Lactose\n");
        assert!(out.contains("Active filters: Vendor_Name: V2"));
        assert!(out.contains("2 of 3 records match"));
        assert!(out.contains("Active filters: none"));
        assert_eq!(s.active_filters(), vec!["Material_Name: Lactose"]);
    }

    #[test]
    fn explore_reports_errors_and_keeps_going() {
        let mut s = state();
        let out = session(&mut s, "bogus\nset unit_price=3\nset vendor=nobody\n");
        assert!(out.contains("Error: Unknown command `bogus`"));
        assert_eq!(out.matches("Error:").count(), 2);
        assert!(out.contains("No records match the current filters"));
    }

    #[test]
    fn explore_stops_at_quit() {
        let mut s = state();
        let out = session(&mut s, "kpi\nquit\nshow\n");
        assert!(out.contains("Average Price"));
        assert!(!out.contains("Key Performance Indicators"));
    }

    #[test]
    fn explore_exports_the_selection() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        let mut s = state();
        session(
            &mut s,
            &format!("set vendor=V1\nexport {}\n", path.display()),
        );

        let written = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("Material_Name,"));
        assert!(lines[1].starts_with("Lactose,"));
    }

    #[test]
    fn kpi_view_as_json() {
        let s = state();
        let mut out = Vec::new();
        print_view(&s, &view_args(ViewKind::Kpi, None), &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value["total_rows"], 3);
        assert_eq!(value["distinct_materials"], 2);
        assert_eq!(value["mean_unit_price"], 20.0);
    }

    #[test]
    fn ranking_view_respects_grouping() {
        let s = state();
        let mut out = Vec::new();
        print_view(&s, &view_args(ViewKind::Ranking, None), &mut out).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value[0]["group"], "V2");
        assert_eq!(value[0]["mean_unit_price"], 25.0);

        let err = print_view(&s, &view_args(ViewKind::Ranking, Some(Column::UnitPrice)), &mut out);
        assert!(err.is_err());
    }

    #[test]
    fn stdout_export_writes_csv() {
        let s = state();
        let mut out = Vec::new();
        export_view(&s, Path::new("-"), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 4);
    }
}
