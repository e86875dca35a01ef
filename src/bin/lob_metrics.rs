use lob_plot::simulate::parse_cli;
use log::{error, LevelFilter};

fn main() {
    let config = parse_cli();
    let level = if config.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
    if let Err(e) = lob_plot::simulate(&config) {
        error!("{}", e);
        std::process::exit(1);
    }
}
