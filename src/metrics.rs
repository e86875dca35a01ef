//! Order book metrics per event: mid price, spread, top of book and
//! depth weighted order flow imbalance, and their csv rows.

use crate::error::{MetricsError, Result};
use crate::{
    format_timestamp_ist, COL_MID_PRICE, COL_OFI_DEPTH, COL_OFI_TOP, COL_SPREAD,
    COL_TIMESTAMP_RAW,
};
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub const COL_TIMESTAMP: &str = "Timestamp";
pub const DEFAULT_LEVELS: usize = 5;
pub const DEFAULT_DECAY: f64 = 0.5;

#[derive(Debug, Clone, PartialEq)]
pub struct LobMetrics {
    pub timestamp_raw: u64,
    /// IST clock time
    pub timestamp_formatted: String,
    /// paise, 0 when a side is empty
    pub mid_price: f64,
    /// paise, 0 when a side is empty
    pub spread: i32,
    pub ofi_top: f64,
    pub ofi_depth: f64,
    /// quantity per level, padded with 0 up to the requested depth
    pub depth_bids: Vec<f64>,
    pub depth_asks: Vec<f64>,
}

/// Metrics from the (price, quantity) levels of each side, best first.
///
/// `ofi_top` is (bid - ask) / (bid + ask) on the best level.
/// `ofi_depth` weights level i by (1 - decay_lambda)^i over `depth_levels` levels:
/// (sum w_i bid_i - sum w_i ask_i) / sum w_i.
pub fn calculate(
    timestamp_raw: u64,
    bids: &[(i32, i32)],
    asks: &[(i32, i32)],
    depth_levels: usize,
    decay_lambda: f64,
) -> LobMetrics {
    let best_bid = bids.first().map_or(0, |l| l.0);
    let best_ask = asks.first().map_or(0, |l| l.0);
    let (mid_price, spread) = if best_bid > 0 && best_ask > 0 {
        ((best_bid as f64 + best_ask as f64) / 2., best_ask - best_bid)
    } else {
        (0., 0)
    };

    let mut depth_bids = vec![0.; depth_levels];
    let mut depth_asks = vec![0.; depth_levels];
    for (d, l) in depth_bids.iter_mut().zip(bids) {
        *d = l.1 as f64;
    }
    for (d, l) in depth_asks.iter_mut().zip(asks) {
        *d = l.1 as f64;
    }

    let vol_bid = depth_bids.first().copied().unwrap_or(0.);
    let vol_ask = depth_asks.first().copied().unwrap_or(0.);
    let ofi_top = if vol_bid + vol_ask > 0. {
        (vol_bid - vol_ask) / (vol_bid + vol_ask)
    } else {
        0.
    };

    let mut weight_sum = 0.;
    let mut weighted_bid = 0.;
    let mut weighted_ask = 0.;
    let mut decay = 1.;
    for (b, a) in depth_bids.iter().zip(depth_asks.iter()) {
        if *b > 0. {
            weighted_bid += b * decay;
        }
        if *a > 0. {
            weighted_ask += a * decay;
        }
        weight_sum += decay;
        decay *= 1. - decay_lambda;
    }
    let ofi_depth = if weight_sum > 0. {
        (weighted_bid - weighted_ask) / weight_sum
    } else {
        0.
    };

    LobMetrics {
        timestamp_raw,
        timestamp_formatted: format_timestamp_ist(timestamp_raw),
        mid_price,
        spread,
        ofi_top,
        ofi_depth,
        depth_bids,
        depth_asks,
    }
}

/// Timestamp,TimestampRaw,MidPrice,Spread,OFI_Top,OFI_Depth,BidLvl1,AskLvl1,...
pub fn metrics_header(levels: usize) -> Vec<String> {
    let mut header: Vec<String> = [
        COL_TIMESTAMP,
        COL_TIMESTAMP_RAW,
        COL_MID_PRICE,
        COL_SPREAD,
        COL_OFI_TOP,
        COL_OFI_DEPTH,
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    for lvl in 1..=levels {
        header.push(format!("BidLvl{}", lvl));
        header.push(format!("AskLvl{}", lvl));
    }
    header
}

impl LobMetrics {
    pub fn to_record(&self, levels: usize) -> Vec<String> {
        let mut record = vec![
            self.timestamp_formatted.clone(),
            self.timestamp_raw.to_string(),
            self.mid_price.to_string(),
            self.spread.to_string(),
            self.ofi_top.to_string(),
            self.ofi_depth.to_string(),
        ];
        for lvl in 0..levels {
            record.push(self.depth_bids.get(lvl).copied().unwrap_or(0.).to_string());
            record.push(self.depth_asks.get(lvl).copied().unwrap_or(0.).to_string());
        }
        record
    }
}

/// Writes the metrics csv, header first, one row per event.
pub struct MetricsWriter<W: Write> {
    writer: csv::Writer<W>,
    levels: usize,
}

impl MetricsWriter<File> {
    pub fn create<P: AsRef<Path>>(fout: P, levels: usize) -> Result<MetricsWriter<File>> {
        let path = fout.as_ref();
        let file = File::create(path).map_err(|source| MetricsError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        MetricsWriter::from_writer(file, levels)
    }
}

impl<W: Write> MetricsWriter<W> {
    pub fn from_writer(w: W, levels: usize) -> Result<MetricsWriter<W>> {
        let mut writer = csv::Writer::from_writer(w);
        writer.write_record(metrics_header(levels))?;
        Ok(MetricsWriter { writer, levels })
    }

    pub fn write(&mut self, metrics: &LobMetrics) -> Result<()> {
        self.writer.write_record(metrics.to_record(self.levels))?;
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    pub fn into_inner(self) -> Result<W> {
        self.writer.into_inner().map_err(|e| {
            MetricsError::Write(std::io::Error::new(e.error().kind(), e.to_string()))
        })
    }
}
