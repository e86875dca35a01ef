//! Order and trade events from the exchange csv dumps.

use crate::book::Side;
use crate::error::{MetricsError, Result};
use csv::StringRecord;
use log::{debug, warn};
use std::fs::File;
use std::path::Path;
use std::str::FromStr;

/// both dumps carry at least this many fields per line
pub const MIN_FIELDS: usize = 12;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    New,
    Modify,
    Cancel,
    Trade,
}

/// which dump a line comes from, the field layout differs
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventSource {
    Orders,
    Trades,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// nanoseconds
    pub timestamp: u64,
    pub kind: EventKind,
    pub order_id: u64,
    /// paise
    pub price: i32,
    pub quantity: i32,
    pub side: Side,
    pub token: u64,
    /// 0 when unknown, only non-zero users are checked for self trades
    pub user_id: u64,
    pub buy_order_id: u64,
    pub sell_order_id: u64,
}

impl Event {
    pub fn new(
        timestamp: u64,
        kind: EventKind,
        order_id: u64,
        side: Side,
        price: i32,
        quantity: i32,
    ) -> Event {
        Event {
            timestamp,
            kind,
            order_id,
            price,
            quantity,
            side,
            token: 0,
            user_id: 0,
            buy_order_id: 0,
            sell_order_id: 0,
        }
    }

    /// Parses one line of the order or trade dump.
    /// The timestamp is field 1 (microseconds) * 1000 + field 6 (nanoseconds);
    /// orders: 5 type (N, M, X, T), 7 order id, 8 token, 9 side (B or S), 10 price, 11 quantity;
    /// trades: 7 buy order id, 8 sell order id, 9 token, 10 price, 11 quantity.
    pub fn from_record(record: &StringRecord, source: EventSource) -> Result<Event> {
        if record.len() < MIN_FIELDS {
            return Err(MetricsError::Event(format!(
                "expected {} fields, found {}",
                MIN_FIELDS,
                record.len()
            )));
        }
        let micros: u64 = field(record, 1, "time")?;
        let nanos: u64 = field(record, 6, "nanoseconds")?;
        let timestamp = micros
            .checked_mul(1000)
            .and_then(|t| t.checked_add(nanos))
            .ok_or_else(|| MetricsError::Event(format!("timestamp overflow, {} us", micros)))?;
        let price: i32 = field(record, 10, "price")?;
        let quantity: i32 = field(record, 11, "quantity")?;
        match source {
            EventSource::Trades => {
                let mut e = Event::new(timestamp, EventKind::Trade, 0, Side::Buy, price, quantity);
                e.buy_order_id = field(record, 7, "buy order id")?;
                e.sell_order_id = field(record, 8, "sell order id")?;
                e.token = field(record, 9, "token")?;
                Ok(e)
            }
            EventSource::Orders => {
                let kind = match record.get(5).and_then(|s| s.chars().next()) {
                    Some('N') => EventKind::New,
                    Some('M') => EventKind::Modify,
                    Some('X') => EventKind::Cancel,
                    Some('T') => EventKind::Trade,
                    other => {
                        return Err(MetricsError::Event(format!(
                            "unknown order type {:?}",
                            other
                        )))
                    }
                };
                let side = if record.get(9) == Some("B") {
                    Side::Buy
                } else {
                    Side::Sell
                };
                let order_id = field(record, 7, "order id")?;
                let mut e = Event::new(timestamp, kind, order_id, side, price, quantity);
                e.token = field(record, 8, "token")?;
                Ok(e)
            }
        }
    }
}

fn field<T: FromStr>(record: &StringRecord, i: usize, name: &str) -> Result<T> {
    let raw = record.get(i).unwrap_or("");
    raw.parse::<T>()
        .map_err(|_| MetricsError::Event(format!("invalid {} {:?}", name, raw)))
}

/// Reads all the events of a dump, skipping the header.
/// Corrupt lines and events without a timestamp are reported and skipped,
/// a missing file is fatal.
pub fn load_events<P: AsRef<Path>>(fin: P, source: EventSource) -> Result<Vec<Event>> {
    let path = fin.as_ref();
    let file = File::open(path).map_err(|source| MetricsError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(file);
    let mut events = Vec::new();
    let mut skipped = 0;
    for (i, record) in reader.records().enumerate() {
        // line numbers count the header
        let line = i + 2;
        let parsed = record
            .map_err(MetricsError::from)
            .and_then(|r| Event::from_record(&r, source));
        match parsed {
            Ok(e) if e.timestamp > 0 => events.push(e),
            Ok(_) => skipped += 1,
            Err(e) => {
                warn!("{} line {}: {}", path.display(), line, e);
                skipped += 1;
            }
        }
    }
    debug!(
        "{} events read from {}, {} skipped",
        events.len(),
        path.display(),
        skipped
    );
    Ok(events)
}
