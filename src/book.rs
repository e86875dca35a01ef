//! Price-time priority limit order book rebuilt from the event stream.

use crate::event::{Event, EventKind};
use crate::metrics::{calculate, LobMetrics};
use log::warn;
use std::collections::{BTreeMap, HashMap, VecDeque};

/// levels kept per side in a snapshot and printed in the depth table
pub const DISPLAY_LEVELS: usize = 10;
pub const MAX_SNAPSHOTS: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Side {
    Buy,
    Sell,
}

/// A resting order, quantity is what is left after partial fills.
#[derive(Debug, Clone, PartialEq)]
pub struct Order {
    pub order_id: u64,
    pub price: i32,
    pub quantity: i32,
    pub side: Side,
    pub user_id: u64,
}

/// (price, total quantity) per level, best first
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub timestamp: u64,
    pub bid_levels: Vec<(i32, i32)>,
    pub ask_levels: Vec<(i32, i32)>,
}

type Levels = BTreeMap<i32, VecDeque<Order>>;

#[derive(Debug, Default)]
pub struct OrderBook {
    bids: Levels,
    asks: Levels,
    /// order id -> (price, side) of the resting order
    locations: HashMap<u64, (i32, Side)>,
    snapshots: VecDeque<Snapshot>,
}

impl OrderBook {
    pub fn new() -> OrderBook {
        OrderBook::default()
    }

    /// applies one event; trades only confirm matches the book already made
    pub fn process_event(&mut self, event: &Event) {
        if event.kind == EventKind::New && self.would_self_trade(event) {
            warn!(
                "self trade detected, order_id {}; ignored",
                event.order_id
            );
            return;
        }
        match event.kind {
            EventKind::New => self.add_order(event),
            EventKind::Modify => {
                self.cancel_order(event.order_id);
                self.add_order(event);
            }
            EventKind::Cancel => self.cancel_order(event.order_id),
            EventKind::Trade => {}
        }
    }

    fn levels_mut(&mut self, side: Side) -> &mut Levels {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    /// best level of the side opposite to `side`
    fn best_opposite(&mut self, side: Side) -> Option<(i32, &mut VecDeque<Order>)> {
        match side {
            Side::Buy => self.asks.iter_mut().next().map(|(p, l)| (*p, l)),
            Side::Sell => self.bids.iter_mut().next_back().map(|(p, l)| (*p, l)),
        }
    }

    fn crosses(side: Side, price: i32, opposite: i32) -> bool {
        match side {
            Side::Buy => price >= opposite,
            Side::Sell => price <= opposite,
        }
    }

    /// matches against the opposite side, the remainder rests at its limit price
    fn add_order(&mut self, event: &Event) {
        if event.quantity <= 0 || event.price <= 0 {
            warn!(
                "invalid order, price and quantity must be > 0 (order_id={})",
                event.order_id
            );
            return;
        }
        let mut remaining = event.quantity;
        while remaining > 0 {
            let (best, level) = match self.best_opposite(event.side) {
                Some(b) => b,
                None => break,
            };
            if !OrderBook::crosses(event.side, event.price, best) {
                break;
            }
            let front = match level.front_mut() {
                Some(o) => o,
                None => break,
            };
            if event.user_id != 0 && front.user_id == event.user_id {
                warn!(
                    "prevented self trade on match (order_id={})",
                    event.order_id
                );
                break;
            }
            if remaining >= front.quantity {
                remaining -= front.quantity;
                let filled = front.order_id;
                self.cancel_order(filled);
            } else {
                front.quantity -= remaining;
                remaining = 0;
            }
        }
        if remaining > 0 {
            let order = Order {
                order_id: event.order_id,
                price: event.price,
                quantity: remaining,
                side: event.side,
                user_id: event.user_id,
            };
            self.levels_mut(event.side)
                .entry(event.price)
                .or_default()
                .push_back(order);
            self.locations
                .insert(event.order_id, (event.price, event.side));
        }
    }

    /// unknown ids are ignored
    pub fn cancel_order(&mut self, order_id: u64) {
        let (price, side) = match self.locations.remove(&order_id) {
            Some(loc) => loc,
            None => return,
        };
        let levels = self.levels_mut(side);
        if let Some(level) = levels.get_mut(&price) {
            level.retain(|o| o.order_id != order_id);
            if level.is_empty() {
                levels.remove(&price);
            }
        }
    }

    /// (best bid, best ask), 0 for an empty side
    pub fn best_bid_ask(&self) -> (i32, i32) {
        let bid = self.bids.keys().next_back().copied().unwrap_or(0);
        let ask = self.asks.keys().next().copied().unwrap_or(0);
        (bid, ask)
    }

    pub fn volume_at_price(&self, price: i32, side: Side) -> i32 {
        let levels = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        levels
            .get(&price)
            .map_or(0, |l| l.iter().map(|o| o.quantity).sum())
    }

    /// (price, total quantity) of the best `levels` levels, best first
    pub fn depth(&self, side: Side, levels: usize) -> Vec<(i32, i32)> {
        let total = |(p, l): (&i32, &VecDeque<Order>)| -> (i32, i32) {
            (*p, l.iter().map(|o| o.quantity).sum())
        };
        match side {
            Side::Buy => self.bids.iter().rev().take(levels).map(total).collect(),
            Side::Sell => self.asks.iter().take(levels).map(total).collect(),
        }
    }

    pub fn order_count(&self, side: Side) -> usize {
        let levels = match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        };
        levels.values().map(|l| l.len()).sum()
    }

    /// true if a new order of a known user would cross one of its own resting orders
    pub fn would_self_trade(&self, event: &Event) -> bool {
        if event.user_id == 0 {
            return false;
        }
        let own = |l: &VecDeque<Order>| l.iter().any(|o| o.user_id == event.user_id);
        match event.side {
            Side::Buy => self
                .asks
                .range(..=event.price)
                .any(|(_, l)| own(l)),
            Side::Sell => self
                .bids
                .range(event.price..)
                .any(|(_, l)| own(l)),
        }
    }

    pub fn metrics(
        &self,
        timestamp_raw: u64,
        depth_levels: usize,
        decay_lambda: f64,
    ) -> LobMetrics {
        calculate(
            timestamp_raw,
            &self.depth(Side::Buy, depth_levels),
            &self.depth(Side::Sell, depth_levels),
            depth_levels,
            decay_lambda,
        )
    }

    /// keeps the last MAX_SNAPSHOTS snapshots
    pub fn take_snapshot(&mut self, timestamp: u64) {
        let snapshot = Snapshot {
            timestamp,
            bid_levels: self.depth(Side::Buy, DISPLAY_LEVELS),
            ask_levels: self.depth(Side::Sell, DISPLAY_LEVELS),
        };
        self.snapshots.push_back(snapshot);
        self.expire_old_snapshots(MAX_SNAPSHOTS);
    }

    pub fn expire_old_snapshots(&mut self, max_snapshots: usize) {
        while self.snapshots.len() > max_snapshots {
            self.snapshots.pop_front();
        }
    }

    pub fn snapshots(&self) -> &VecDeque<Snapshot> {
        &self.snapshots
    }
}

/// side by side bid and ask table, prices in rupees
pub fn format_depth(bids: &[(i32, i32)], asks: &[(i32, i32)]) -> String {
    let mut out = String::from("BIDS (Price/Qty)           | ASKS (Price/Qty)\n");
    out.push_str("-------------------------- | -------------------------\n");
    for i in 0..bids.len().max(asks.len()) {
        match bids.get(i) {
            Some((p, q)) => out.push_str(&format!("{:>10.2}/{:>12} | ", *p as f64 / 100., q)),
            None => out.push_str(&format!("{:26}| ", "")),
        }
        if let Some((p, q)) = asks.get(i) {
            out.push_str(&format!("{:>10.2}/{:>12}", *p as f64 / 100., q));
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new(id: u64, side: Side, price: i32, quantity: i32) -> Event {
        Event::new(id, EventKind::New, id, side, price, quantity)
    }

    fn book() -> OrderBook {
        let mut book = OrderBook::new();
        book.process_event(&new(1, Side::Buy, 100, 10));
        book.process_event(&new(2, Side::Buy, 99, 20));
        book.process_event(&new(3, Side::Buy, 100, 5));
        book.process_event(&new(4, Side::Sell, 102, 30));
        book.process_event(&new(5, Side::Sell, 103, 5));
        book
    }

    #[test]
    fn test_resting_orders() {
        let b = book();
        assert_eq!(b.best_bid_ask(), (100, 102));
        assert_eq!(b.depth(Side::Buy, 5), vec![(100, 15), (99, 20)]);
        assert_eq!(b.depth(Side::Sell, 1), vec![(102, 30)]);
        assert_eq!(b.volume_at_price(100, Side::Buy), 15);
        assert_eq!(b.order_count(Side::Buy), 3);
        assert_eq!(OrderBook::new().best_bid_ask(), (0, 0));
    }

    #[test]
    fn test_crossing_order_fills_in_time_priority() {
        let mut b = book();
        // takes order 1 fully and 2 of order 3
        b.process_event(&new(6, Side::Sell, 100, 12));
        assert_eq!(b.depth(Side::Buy, 5), vec![(100, 3), (99, 20)]);
        assert_eq!(b.order_count(Side::Buy), 2);
        // sweeps the ask side and rests the remainder
        b.process_event(&new(7, Side::Buy, 103, 40));
        assert!(b.depth(Side::Sell, 5).is_empty());
        assert_eq!(b.depth(Side::Buy, 1), vec![(103, 5)]);
    }

    #[test]
    fn test_cancel_and_modify() {
        let mut b = book();
        b.process_event(&Event::new(10, EventKind::Cancel, 4, Side::Sell, 0, 0));
        assert_eq!(b.best_bid_ask(), (100, 103));
        // unknown id
        b.process_event(&Event::new(11, EventKind::Cancel, 99, Side::Sell, 0, 0));
        b.process_event(&Event::new(12, EventKind::Modify, 2, Side::Buy, 101, 7));
        assert_eq!(b.depth(Side::Buy, 5), vec![(101, 7), (100, 15)]);
        // trades do not change the book
        b.process_event(&Event::new(13, EventKind::Trade, 0, Side::Buy, 101, 7));
        assert_eq!(b.order_count(Side::Buy), 3);
    }

    #[test]
    fn test_invalid_orders_are_ignored() {
        let mut b = OrderBook::new();
        b.process_event(&new(1, Side::Buy, 0, 10));
        b.process_event(&new(2, Side::Sell, 100, -1));
        assert_eq!(b.order_count(Side::Buy) + b.order_count(Side::Sell), 0);
    }

    #[test]
    fn test_self_trade_prevention() {
        let mut b = OrderBook::new();
        let mut ask = new(1, Side::Sell, 100, 10);
        ask.user_id = 9;
        b.process_event(&ask);
        let mut bid = new(2, Side::Buy, 101, 5);
        bid.user_id = 9;
        assert!(b.would_self_trade(&bid));
        b.process_event(&bid);
        assert_eq!(b.depth(Side::Sell, 1), vec![(100, 10)]);
        assert_eq!(b.order_count(Side::Buy), 0);
        bid.user_id = 8;
        assert!(!b.would_self_trade(&bid));
    }

    #[test]
    fn test_snapshots_are_capped() {
        let mut b = book();
        for t in 0..(MAX_SNAPSHOTS as u64 + 5) {
            b.take_snapshot(t);
        }
        assert_eq!(b.snapshots().len(), MAX_SNAPSHOTS);
        assert_eq!(b.snapshots()[0].timestamp, 5);
        assert_eq!(b.snapshots()[0].bid_levels, vec![(100, 15), (99, 20)]);
    }

    #[test]
    fn test_format_depth() {
        let table = format_depth(&[(45000, 10)], &[(45010, 3), (45020, 4)]);
        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines.len(), 4);
        assert_eq!(lines[2], "    450.00/          10 |     450.10/           3");
        assert!(lines[3].ends_with("|     450.20/           4"));
    }
}
