use super::metrics::{DEFAULT_DECAY, DEFAULT_LEVELS};
use super::{DEFAULT_CSVIN, VERSION};
use clap::{App, Arg};
use std::ffi::OsString;
use std::path::PathBuf;

pub const DEFAULT_ORDERS: &str = "Data/nse_orders_data.csv";
pub const DEFAULT_TRADES: &str = "Data/nse_trades_data.csv";
pub const DEFAULT_SNAPSHOT_EVERY: usize = 1000;

/// Inputs, output and metric parameters of the order book replay.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulateConfig {
    pub orders: PathBuf,
    pub trades: PathBuf,
    /// the metrics csv, input of the plot
    pub csvout: PathBuf,
    /// depth levels written per side and used by OFI_Depth
    pub levels: usize,
    /// lambda of the (1 - lambda)^i level weights
    pub decay: f64,
    /// print the book and keep a snapshot every this many events
    pub snapshot_every: usize,
    pub verbose: bool,
}

impl Default for SimulateConfig {
    fn default() -> Self {
        SimulateConfig {
            orders: PathBuf::from(DEFAULT_ORDERS),
            trades: PathBuf::from(DEFAULT_TRADES),
            csvout: PathBuf::from(DEFAULT_CSVIN),
            levels: DEFAULT_LEVELS,
            decay: DEFAULT_DECAY,
            snapshot_every: DEFAULT_SNAPSHOT_EVERY,
            verbose: false,
        }
    }
}

fn is_positive_int(v: String) -> Result<(), String> {
    match v.parse::<usize>() {
        Ok(n) if n > 0 => Ok(()),
        _ => Err(format!("{} is not a positive integer", v)),
    }
}

fn is_unit_fraction(v: String) -> Result<(), String> {
    match v.parse::<f64>() {
        Ok(d) if (0. ..=1.).contains(&d) => Ok(()),
        _ => Err(format!("{} is not a number between 0 and 1", v)),
    }
}

/// Takes the CLI arguments of the order book replay,
/// exits with the clap message on invalid arguments.
pub fn parse_cli() -> SimulateConfig {
    config_from_args(std::env::args_os()).unwrap_or_else(|e| e.exit())
}

pub fn config_from_args<I, T>(args: I) -> Result<SimulateConfig, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let levels_default = DEFAULT_LEVELS.to_string();
    let decay_default = DEFAULT_DECAY.to_string();
    let snapshot_default = DEFAULT_SNAPSHOT_EVERY.to_string();
    let arg_orders = Arg::with_name("orders")
        .help("csv dump of the order events")
        .long("orders")
        .takes_value(true)
        .default_value(DEFAULT_ORDERS);
    let arg_trades = Arg::with_name("trades")
        .help("csv dump of the trade events")
        .long("trades")
        .takes_value(true)
        .default_value(DEFAULT_TRADES);
    let arg_csvout = Arg::with_name("output_csvfile")
        .help("name of the output csv file with the order book metrics")
        .short("o")
        .long("csvfile")
        .takes_value(true)
        .default_value(DEFAULT_CSVIN);
    let arg_levels = Arg::with_name("levels")
        .help("number of price levels per side in the depth columns and OFI_Depth")
        .long("levels")
        .takes_value(true)
        .validator(is_positive_int)
        .default_value(&levels_default);
    let arg_decay = Arg::with_name("decay")
        .help("decay lambda of the OFI_Depth level weights, between 0 and 1")
        .long("decay")
        .takes_value(true)
        .validator(is_unit_fraction)
        .default_value(&decay_default);
    let arg_snapshot = Arg::with_name("snapshot_every")
        .help("print the book and keep a snapshot every this many events")
        .long("snapshot-every")
        .takes_value(true)
        .validator(is_positive_int)
        .default_value(&snapshot_default);
    let arg_verbose = Arg::with_name("verbose")
        .help("print verbose information, including the periodic book depth")
        .short("v")
        .long("verbose")
        .takes_value(false);
    let cli_args = App::new("lob_metrics")
        .version(VERSION.unwrap_or("unknown"))
        .about("cli app to replay order and trade events through a limit order book and save its metrics")
        .arg(arg_orders)
        .arg(arg_trades)
        .arg(arg_csvout)
        .arg(arg_levels)
        .arg(arg_decay)
        .arg(arg_snapshot)
        .arg(arg_verbose)
        .get_matches_from_safe(args)?;

    let path = |name: &str, default: &str| {
        PathBuf::from(cli_args.value_of(name).unwrap_or(default))
    };
    let levels = cli_args
        .value_of("levels")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_LEVELS);
    let decay = cli_args
        .value_of("decay")
        .and_then(|v| v.parse::<f64>().ok())
        .unwrap_or(DEFAULT_DECAY);
    let snapshot_every = cli_args
        .value_of("snapshot_every")
        .and_then(|v| v.parse::<usize>().ok())
        .unwrap_or(DEFAULT_SNAPSHOT_EVERY);
    Ok(SimulateConfig {
        orders: path("orders", DEFAULT_ORDERS),
        trades: path("trades", DEFAULT_TRADES),
        csvout: path("output_csvfile", DEFAULT_CSVIN),
        levels,
        decay,
        snapshot_every,
        verbose: cli_args.is_present("verbose"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = config_from_args(vec!["lob_metrics"]).unwrap();
        assert_eq!(config, SimulateConfig::default());
        assert_eq!(config.csvout, PathBuf::from("Output/metrics_output.csv"));
        assert_eq!((config.levels, config.decay), (5, 0.5));
    }

    #[test]
    fn test_all_flags() {
        let config = config_from_args(vec![
            "lob_metrics",
            "--orders",
            "o.csv",
            "--trades",
            "t.csv",
            "-o",
            "out/m.csv",
            "--levels",
            "10",
            "--decay",
            "0.25",
            "--snapshot-every",
            "1",
            "-v",
        ])
        .unwrap();
        assert_eq!(config.orders, PathBuf::from("o.csv"));
        assert_eq!(config.trades, PathBuf::from("t.csv"));
        assert_eq!(config.csvout, PathBuf::from("out/m.csv"));
        assert_eq!(config.levels, 10);
        assert_eq!(config.decay, 0.25);
        assert_eq!(config.snapshot_every, 1);
        assert!(config.verbose);
    }

    #[test]
    fn test_invalid_values() {
        assert!(config_from_args(vec!["lob_metrics", "--levels", "0"]).is_err());
        assert!(config_from_args(vec!["lob_metrics", "--decay", "1.5"]).is_err());
        assert!(config_from_args(vec!["lob_metrics", "--decay", "-0.1"]).is_err());
        assert!(config_from_args(vec!["lob_metrics", "--snapshot-every", "x"]).is_err());
    }
}
