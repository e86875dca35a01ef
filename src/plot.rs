use super::{DEFAULT_CSVIN, DEFAULT_DPI, DEFAULT_PNGOUT, VERSION};
use crate::render::XLabels;
use clap::{App, Arg};
use log::{debug, info, warn};
use std::env;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

/// Where to read, where to write and how to draw.
#[derive(Debug, Clone, PartialEq)]
pub struct PlotConfig {
    pub csvin: PathBuf,
    pub pngout: PathBuf,
    pub dpi: u32,
    pub x_labels: XLabels,
    /// open the saved png in the system viewer when there is a display
    pub show: bool,
    pub verbose: bool,
}

impl Default for PlotConfig {
    fn default() -> Self {
        PlotConfig {
            csvin: PathBuf::from(DEFAULT_CSVIN),
            pngout: PathBuf::from(DEFAULT_PNGOUT),
            dpi: DEFAULT_DPI,
            x_labels: XLabels::RawNanos,
            show: true,
            verbose: false,
        }
    }
}

fn is_positive_int(v: String) -> Result<(), String> {
    match v.parse::<u32>() {
        Ok(d) if d > 0 => Ok(()),
        _ => Err(format!("{} is not a positive integer", v)),
    }
}

/// Takes the CLI arguments that control the plotting of the order book metrics,
/// exits with the clap message on invalid arguments.
pub fn parse_cli() -> PlotConfig {
    config_from_args(std::env::args_os()).unwrap_or_else(|e| e.exit())
}

pub fn config_from_args<I, T>(args: I) -> Result<PlotConfig, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<OsString> + Clone,
{
    let arg_csvin = Arg::with_name("input_csvfile")
        .help("name of the csv file with the order book metrics")
        .short("f")
        .long("csvfile")
        .takes_value(true)
        .default_value(DEFAULT_CSVIN);
    let arg_pngout = Arg::with_name("output_pngfile")
        .help("name of the output png file")
        .short("o")
        .long("pngfile")
        .takes_value(true)
        .default_value(DEFAULT_PNGOUT);
    let arg_dpi = Arg::with_name("dpi")
        .help("resolution of the png, the figure is 12 x 10 inches")
        .long("dpi")
        .takes_value(true)
        .validator(is_positive_int)
        .default_value("150");
    let arg_clock = Arg::with_name("clock_labels")
        .help("label the x axis with the IST clock time instead of the raw nanoseconds")
        .long("clock-labels")
        .takes_value(false);
    let arg_no_show = Arg::with_name("no_show")
        .help("only save the png, do not open it in the image viewer")
        .long("no-show")
        .takes_value(false);
    let arg_verbose = Arg::with_name("verbose")
        .help("print verbose information")
        .short("v")
        .long("verbose")
        .takes_value(false);
    let cli_args = App::new("lob_plot")
        .version(VERSION.unwrap_or("unknown"))
        .about("cli app to plot mid price, spread and order flow imbalance against the raw timestamp")
        .arg(arg_csvin)
        .arg(arg_pngout)
        .arg(arg_dpi)
        .arg(arg_clock)
        .arg(arg_no_show)
        .arg(arg_verbose)
        .get_matches_from_safe(args)?;

    let csvin = PathBuf::from(cli_args.value_of("input_csvfile").unwrap_or(DEFAULT_CSVIN));
    let pngout = PathBuf::from(cli_args.value_of("output_pngfile").unwrap_or(DEFAULT_PNGOUT));
    let dpi = cli_args
        .value_of("dpi")
        .and_then(|d| d.parse::<u32>().ok())
        .unwrap_or(DEFAULT_DPI);
    let x_labels = if cli_args.is_present("clock_labels") {
        XLabels::IstClock
    } else {
        XLabels::RawNanos
    };
    Ok(PlotConfig {
        csvin,
        pngout,
        dpi,
        x_labels,
        show: !cli_args.is_present("no_show"),
        verbose: cli_args.is_present("verbose"),
    })
}

/// macOS and Windows always have a desktop, elsewhere an X11 or Wayland
/// display must be set.
pub fn display_available(
    target_os: &str,
    display: Option<OsString>,
    wayland_display: Option<OsString>,
) -> bool {
    match target_os {
        "macos" | "windows" => true,
        _ => [display, wayland_display]
            .iter()
            .any(|d| d.as_ref().map_or(false, |d| !d.is_empty())),
    }
}

/// Opens the saved figure in the platform image viewer when a display is available.
/// Failures are only reported, the png is already on disk.
pub fn show_figure(path: &Path) {
    let display = display_available(
        env::consts::OS,
        env::var_os("DISPLAY"),
        env::var_os("WAYLAND_DISPLAY"),
    );
    if !display {
        debug!("no display available, not opening {}", path.display());
        return;
    }
    match opener::open(path) {
        Ok(()) => info!("opened {} in the image viewer", path.display()),
        Err(e) => warn!("could not open {}: {}", path.display(), e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_fixed_paths() {
        let config = config_from_args(vec!["lob_plot"]).unwrap();
        assert_eq!(config, PlotConfig::default());
        assert_eq!(config.dpi, 150);
        assert!(config.show);
    }

    #[test]
    fn test_all_flags() {
        let config = config_from_args(vec![
            "lob_plot",
            "-f",
            "in.csv",
            "-o",
            "out/fig.png",
            "--dpi",
            "300",
            "--clock-labels",
            "--no-show",
            "-v",
        ])
        .unwrap();
        assert_eq!(config.csvin, PathBuf::from("in.csv"));
        assert_eq!(config.pngout, PathBuf::from("out/fig.png"));
        assert_eq!(config.dpi, 300);
        assert_eq!(config.x_labels, XLabels::IstClock);
        assert!(!config.show);
        assert!(config.verbose);
    }

    #[test]
    fn test_invalid_dpi() {
        assert!(config_from_args(vec!["lob_plot", "--dpi", "zero"]).is_err());
        assert!(config_from_args(vec!["lob_plot", "--dpi", "0"]).is_err());
    }

    #[test]
    fn test_display_available() {
        let x11 = Some(OsString::from(":0"));
        let wayland = Some(OsString::from("wayland-0"));
        let empty = Some(OsString::new());
        assert!(display_available("linux", x11.clone(), None));
        assert!(display_available("linux", None, wayland));
        assert!(display_available("freebsd", empty.clone(), x11));
        assert!(!display_available("linux", None, None));
        assert!(!display_available("linux", empty.clone(), empty));
        assert!(display_available("macos", None, None));
        assert!(display_available("windows", None, None));
    }
}
