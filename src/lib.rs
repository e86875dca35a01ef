use chrono::prelude::*;
use log::{debug, info, warn};
use std::fs::File;
use std::io::Read;
use std::path::Path;
pub mod book;
pub mod error;
pub mod event;
pub mod metrics;
pub mod plot;
pub mod render;
pub mod simulate;

pub use error::{MetricsError, Result};

pub const VERSION: Option<&str> = option_env!("CARGO_PKG_VERSION");

pub const COL_TIMESTAMP_RAW: &str = "TimestampRaw";
pub const COL_MID_PRICE: &str = "MidPrice";
pub const COL_SPREAD: &str = "Spread";
pub const COL_OFI_TOP: &str = "OFI_Top";
pub const COL_OFI_DEPTH: &str = "OFI_Depth";

pub const REQUIRED_COLUMNS: [&str; 5] = [
    COL_TIMESTAMP_RAW,
    COL_MID_PRICE,
    COL_SPREAD,
    COL_OFI_TOP,
    COL_OFI_DEPTH,
];

pub const PAISE_PER_RUPEE: f64 = 100.;

pub const DEFAULT_CSVIN: &str = "Output/metrics_output.csv";
pub const DEFAULT_PNGOUT: &str = "Output/lob_metrics_vs_rawtimestamp.png";
pub const DEFAULT_DPI: u32 = 150;

/// IST is UTC+05:30
pub const IST_OFFSET_SECS: i32 = 5 * 3600 + 30 * 60;
pub const IST_FORMAT: &str = "%H:%M:%S%.6f";

/// cells read as missing (NAN) rather than as text, the usual dataframe NA markers
pub const MISSING_TOKENS: [&str; 19] = [
    "", "NA", "N/A", "n/a", "#NA", "#N/A", "#N/A N/A", "<NA>", "NaN", "-NaN", "nan", "-nan",
    "null", "NULL", "None", "1.#QNAN", "-1.#QNAN", "1.#IND", "-1.#IND",
];

/// Values of one column, numeric when every cell parsed as a number or a missing token.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnValues {
    Numeric(Vec<f64>),
    Text(Vec<String>),
}

impl ColumnValues {
    pub fn len(&self) -> usize {
        match self {
            ColumnValues::Numeric(v) => v.len(),
            ColumnValues::Text(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: ColumnValues,
}

impl Column {
    /// keeps the raw strings when at least one cell is not a number
    fn infer(name: &str, cells: Vec<String>) -> Column {
        let parsed: Option<Vec<f64>> = cells.iter().map(|c| parse_numeric(c)).collect();
        let values = match parsed {
            Some(v) => ColumnValues::Numeric(v),
            None => ColumnValues::Text(cells),
        };
        Column {
            name: name.to_string(),
            values,
        }
    }
}

/// The main struct for the order book metrics,
/// a rectangular table stored column by column in header order.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsTable {
    columns: Vec<Column>,
}

impl MetricsTable {
    /// Init a MetricsTable from csv,
    /// failing if the file cannot be opened or is not a rectangular csv with a header.
    pub fn from_csv<P: AsRef<Path>>(fin: P) -> Result<MetricsTable> {
        let path = fin.as_ref();
        let file = File::open(path).map_err(|source| MetricsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let table = MetricsTable::from_reader(file)?;
        debug!(
            "loaded {} rows and {} columns from {}",
            table.len(),
            table.columns.len(),
            path.display()
        );
        Ok(table)
    }

    pub fn from_reader<R: Read>(rdr: R) -> Result<MetricsTable> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_reader(rdr);
        let headers = reader.headers()?.clone();
        if headers.is_empty() {
            return Err(MetricsError::EmptyHeader);
        }
        let mut cells: Vec<Vec<String>> = vec![Vec::new(); headers.len()];
        for record in reader.records() {
            let record = record?;
            for (column, field) in cells.iter_mut().zip(record.iter()) {
                column.push(field.to_string());
            }
        }
        let columns = headers
            .iter()
            .zip(cells)
            .map(|(name, column)| Column::infer(name, column))
            .collect();
        Ok(MetricsTable { columns })
    }

    /// number of rows
    pub fn len(&self) -> usize {
        self.columns.first().map_or(0, |c| c.values.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.columns.iter().map(|c| c.name.as_str())
    }

    pub fn column(&self, name: &str) -> Result<&Column> {
        self.columns
            .iter()
            .find(|c| c.name == name)
            .ok_or_else(|| MetricsError::ColumnNotFound(name.to_string()))
    }

    fn column_mut(&mut self, name: &str) -> Result<&mut Column> {
        self.columns
            .iter_mut()
            .find(|c| c.name == name)
            .ok_or_else(|| MetricsError::ColumnNotFound(name.to_string()))
    }

    /// the values of a numeric column, NAN marks missing values
    pub fn numeric(&self, name: &str) -> Result<&[f64]> {
        match &self.column(name)?.values {
            ColumnValues::Numeric(v) => Ok(&v[..]),
            ColumnValues::Text(_) => Err(MetricsError::NotNumeric(name.to_string())),
        }
    }

    /// fails on the first of the names that is not a column
    pub fn require_columns(&self, names: &[&str]) -> Result<()> {
        for name in names {
            self.column(name)?;
        }
        Ok(())
    }

    /// divides every value of a numeric column by divisor,
    /// takes a mutable reference to modify the MetricsTable in-place
    pub fn scale_column(&mut self, name: &str, divisor: f64) -> Result<()> {
        match &mut self.column_mut(name)?.values {
            ColumnValues::Numeric(v) => {
                for x in v.iter_mut() {
                    *x /= divisor;
                }
                Ok(())
            }
            ColumnValues::Text(_) => Err(MetricsError::NotNumeric(name.to_string())),
        }
    }

    /// reinterprets a column as numbers, setting the unparsable cells to NAN;
    /// values are f64, so integers above 2^53 (epoch nanoseconds) keep only
    /// their leading 15-16 digits;
    /// returns how many cells could not be parsed
    pub fn coerce_numeric(&mut self, name: &str) -> Result<usize> {
        let column = self.column_mut(name)?;
        let parsed: Vec<Option<f64>> = match &column.values {
            ColumnValues::Numeric(_) => return Ok(0),
            ColumnValues::Text(cells) => cells.iter().map(|c| parse_numeric(c)).collect(),
        };
        let unparsable = parsed.iter().filter(|v| v.is_none()).count();
        column.values = ColumnValues::Numeric(
            parsed
                .into_iter()
                .map(|v| v.unwrap_or(f64::NAN))
                .collect(),
        );
        Ok(unparsable)
    }
}

impl std::fmt::Display for MetricsTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.column_names().collect();
        writeln!(f, "{}", names.join(","))?;
        for i in 0..self.len() {
            let row: Vec<String> = self
                .columns
                .iter()
                .map(|c| match &c.values {
                    ColumnValues::Numeric(v) => v[i].to_string(),
                    ColumnValues::Text(v) => v[i].clone(),
                })
                .collect();
            writeln!(f, "{}", row.join(","))?;
        }
        Ok(())
    }
}

/// Some(NAN) for the missing tokens, None for anything that is not a number
pub fn parse_numeric(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if MISSING_TOKENS.contains(&cell) {
        return Some(f64::NAN);
    }
    cell.parse::<f64>().ok()
}

/// paise to rupees for the prices, numeric raw timestamps;
/// the other columns are left as they are
pub fn transform(table: &mut MetricsTable) -> Result<()> {
    table.scale_column(COL_MID_PRICE, PAISE_PER_RUPEE)?;
    table.scale_column(COL_SPREAD, PAISE_PER_RUPEE)?;
    let unparsable = table.coerce_numeric(COL_TIMESTAMP_RAW)?;
    if unparsable > 0 {
        warn!(
            "{} {} values are not numbers, they will be gaps in the plots",
            unparsable, COL_TIMESTAMP_RAW
        );
    }
    Ok(())
}

/// load, transform and plot in a single pass
pub fn run(config: &plot::PlotConfig) -> Result<()> {
    info!(
        "read data from {} and plot to {}",
        config.csvin.display(),
        config.pngout.display()
    );
    let mut table = MetricsTable::from_csv(&config.csvin)?;
    table.require_columns(&REQUIRED_COLUMNS)?;
    transform(&mut table)?;
    log_summary(&table)?;
    let style = render::FigureStyle::new(config.dpi, config.x_labels);
    render::plot_metrics(&table, &config.pngout, &style)?;
    info!("saved figure to {}", config.pngout.display());
    if config.show {
        plot::show_figure(&config.pngout);
    }
    Ok(())
}

/// replays the order and trade events through the book in time order
/// and writes one metrics row per event; returns the number of events
pub fn simulate(config: &simulate::SimulateConfig) -> Result<usize> {
    info!(
        "read orders from {} and trades from {}, save metrics to {}",
        config.orders.display(),
        config.trades.display(),
        config.csvout.display()
    );
    let mut events = event::load_events(&config.orders, event::EventSource::Orders)?;
    events.extend(event::load_events(&config.trades, event::EventSource::Trades)?);
    info!("loaded {} total events, sorting", events.len());
    events.sort_by_key(|e| e.timestamp);

    if let Some(dir) = config.csvout.parent() {
        if !dir.as_os_str().is_empty() {
            std::fs::create_dir_all(dir).map_err(|source| MetricsError::Io {
                path: dir.to_path_buf(),
                source,
            })?;
        }
    }
    let mut writer = metrics::MetricsWriter::create(&config.csvout, config.levels)?;
    let mut book = book::OrderBook::new();
    for (i, e) in events.iter().enumerate() {
        book.process_event(e);
        let m = book.metrics(e.timestamp, config.levels, config.decay);
        let snapshot = i % config.snapshot_every.max(1) == 0;
        if snapshot {
            debug!(
                "event at {}\n{}",
                m.timestamp_formatted,
                book::format_depth(
                    &book.depth(book::Side::Buy, book::DISPLAY_LEVELS),
                    &book.depth(book::Side::Sell, book::DISPLAY_LEVELS)
                )
            );
            debug!(
                "mid price {:.4} | spread {:.4} | OFI_Top {:.4} | OFI_Depth {:.4}",
                m.mid_price / PAISE_PER_RUPEE,
                m.spread as f64 / PAISE_PER_RUPEE,
                m.ofi_top,
                m.ofi_depth
            );
        }
        writer.write(&m)?;
        if snapshot {
            book.take_snapshot(e.timestamp);
        }
    }
    writer.flush()?;
    info!(
        "simulation finished, {} rows saved to {}, {} book snapshots retained",
        events.len(),
        config.csvout.display(),
        book.snapshots().len()
    );
    Ok(events.len())
}

fn log_summary(table: &MetricsTable) -> Result<()> {
    let timestamps = table.numeric(COL_TIMESTAMP_RAW)?;
    match min_and_max(timestamps) {
        Some((first, last)) if first >= 0. => info!(
            "{} rows from {} to {} IST",
            table.len(),
            format_timestamp_ist(first as u64),
            format_timestamp_ist(last as u64)
        ),
        _ => info!("{} rows, no valid timestamps", table.len()),
    }
    Ok(())
}

/// nanoseconds since the epoch as IST clock time, e.g. 09:15:00.000125
pub fn format_timestamp_ist(nanos: u64) -> String {
    let secs = (nanos / 1_000_000_000) as i64;
    let subsec = (nanos % 1_000_000_000) as u32;
    match (
        Utc.timestamp_opt(secs, subsec).single(),
        FixedOffset::east_opt(IST_OFFSET_SECS),
    ) {
        (Some(dt), Some(ist)) => dt.with_timezone(&ist).format(IST_FORMAT).to_string(),
        _ => nanos.to_string(),
    }
}

/// min and max of the finite values, None if there are none
pub fn min_and_max(s: &[f64]) -> Option<(f64, f64)> {
    let mut finite = s.iter().filter(|v| v.is_finite());
    let (mut min, mut max) = match finite.next() {
        Some(v) => (*v, *v),
        None => return None,
    };
    for es in finite {
        if *es > max {
            max = *es
        }
        if *es < min {
            min = *es
        }
    }
    Some((min, max))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CSV: &str = "\
Timestamp,TimestampRaw,MidPrice,Spread,OFI_Top,OFI_Depth,BidLvl1,AskLvl1
09:15:00.000001,1000,45000,50,0.1,0.2,10,20
09:15:00.000002,not_a_number,45100,100,-0.5,,30,40
";

    fn table() -> MetricsTable {
        MetricsTable::from_reader(CSV.as_bytes()).unwrap()
    }

    #[test]
    fn test_infers_column_types() {
        let t = table();
        assert_eq!(t.len(), 2);
        assert!(matches!(
            t.column("Timestamp").unwrap().values,
            ColumnValues::Text(_)
        ));
        assert!(matches!(
            t.column(COL_TIMESTAMP_RAW).unwrap().values,
            ColumnValues::Text(_)
        ));
        assert_eq!(t.numeric(COL_MID_PRICE).unwrap(), &[45000., 45100.]);
        let depth = t.numeric(COL_OFI_DEPTH).unwrap();
        assert_eq!(depth[0], 0.2);
        assert!(depth[1].is_nan());
    }

    #[test]
    fn test_transform_scales_prices_and_coerces_timestamps() {
        let mut t = table();
        transform(&mut t).unwrap();
        assert_eq!(t.numeric(COL_MID_PRICE).unwrap(), &[450., 451.]);
        assert_eq!(t.numeric(COL_SPREAD).unwrap(), &[0.5, 1.]);
        let ts = t.numeric(COL_TIMESTAMP_RAW).unwrap();
        assert_eq!(ts[0], 1000.);
        assert!(ts[1].is_nan());
        assert_eq!(t.numeric(COL_OFI_TOP).unwrap(), &[0.1, -0.5]);
        assert_eq!(t.numeric("BidLvl1").unwrap(), &[10., 30.]);
    }

    #[test]
    fn test_single_row_example() {
        let csv = "TimestampRaw,MidPrice,Spread,OFI_Top,OFI_Depth\n1000,45000,50,0.1,0.2\n";
        let mut t = MetricsTable::from_reader(csv.as_bytes()).unwrap();
        transform(&mut t).unwrap();
        assert_eq!(t.numeric(COL_TIMESTAMP_RAW).unwrap(), &[1000.]);
        assert_eq!(t.numeric(COL_MID_PRICE).unwrap(), &[450.]);
        assert_eq!(t.numeric(COL_SPREAD).unwrap(), &[0.5]);
        assert_eq!(t.numeric(COL_OFI_TOP).unwrap(), &[0.1]);
        assert_eq!(t.numeric(COL_OFI_DEPTH).unwrap(), &[0.2]);
    }

    #[test]
    fn test_coerce_counts_unparsable() {
        let mut t = table();
        assert_eq!(t.coerce_numeric(COL_TIMESTAMP_RAW).unwrap(), 1);
        // already numeric
        assert_eq!(t.coerce_numeric(COL_TIMESTAMP_RAW).unwrap(), 0);
        assert_eq!(t.coerce_numeric(COL_MID_PRICE).unwrap(), 0);
    }

    #[test]
    fn test_scale_text_column_fails() {
        let mut t = table();
        match t.scale_column("Timestamp", 100.) {
            Err(MetricsError::NotNumeric(name)) => assert_eq!(name, "Timestamp"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_missing_column() {
        let csv = "TimestampRaw,MidPrice,Spread,OFI_Top\n1000,45000,50,0.1\n";
        let t = MetricsTable::from_reader(csv.as_bytes()).unwrap();
        match t.require_columns(&REQUIRED_COLUMNS) {
            Err(MetricsError::ColumnNotFound(name)) => assert_eq!(name, COL_OFI_DEPTH),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_ragged_rows_are_malformed() {
        let csv = "TimestampRaw,MidPrice\n1000,45000\n2000\n";
        assert!(matches!(
            MetricsTable::from_reader(csv.as_bytes()),
            Err(MetricsError::Csv(_))
        ));
    }

    #[test]
    fn test_empty_input() {
        assert!(matches!(
            MetricsTable::from_reader("".as_bytes()),
            Err(MetricsError::EmptyHeader)
        ));
    }

    #[test]
    fn test_parse_numeric() {
        assert_eq!(parse_numeric(" 12.5 "), Some(12.5));
        assert_eq!(parse_numeric("1e3"), Some(1000.));
        assert!(parse_numeric("").unwrap().is_nan());
        assert!(parse_numeric("NA").unwrap().is_nan());
        assert_eq!(parse_numeric("09:15:00"), None);
    }

    #[test]
    fn test_dataframe_missing_markers() {
        let markers = ["n/a", "-nan", "-NaN", "#NA", "#N/A N/A", "None", "1.#QNAN", "-1.#IND"];
        for token in markers.iter() {
            assert!(parse_numeric(token).unwrap().is_nan(), "{}", token);
        }
        let csv = "OFI_Top,OFI_Depth\n0.1,None\n#N/A N/A,0.2\n";
        let t = MetricsTable::from_reader(csv.as_bytes()).unwrap();
        assert!(t.numeric(COL_OFI_TOP).unwrap()[1].is_nan());
        assert!(t.numeric(COL_OFI_DEPTH).unwrap()[0].is_nan());
    }

    #[test]
    fn test_nanosecond_timestamps_round_to_f64() {
        let csv = "TimestampRaw\n1609472700000000001\nbad\n";
        let mut t = MetricsTable::from_reader(csv.as_bytes()).unwrap();
        t.coerce_numeric(COL_TIMESTAMP_RAW).unwrap();
        let ts = t.numeric(COL_TIMESTAMP_RAW).unwrap();
        assert_eq!(ts[0], 1_609_472_700_000_000_000.);
        assert!(ts[1].is_nan());
    }

    #[test]
    fn test_display_as_csv() {
        let csv = "TimestampRaw,MidPrice\n1000,45000\n";
        let t = MetricsTable::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(t.to_string(), csv);
    }

    #[test]
    fn test_min_and_max_skips_nan() {
        assert_eq!(min_and_max(&[3., f64::NAN, -1., 2.]), Some((-1., 3.)));
        assert_eq!(min_and_max(&[f64::NAN]), None);
        assert_eq!(min_and_max(&[]), None);
    }

    #[test]
    fn test_format_timestamp_ist() {
        assert_eq!(format_timestamp_ist(0), "05:30:00.000000");
        // 2021-01-01 03:45:00.000123456 UTC
        assert_eq!(
            format_timestamp_ist(1_609_472_700_000_123_456),
            "09:15:00.000123"
        );
    }
}
