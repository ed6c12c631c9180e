//! Exchange identity plus a subscribable trade channel.
//!
//! Subscribers are called synchronously, lowest priority number first, in the
//! thread that publishes. Callbacks must not publish to the same datasource.

use crate::domain::trade::Trade;
use std::fmt;
use std::sync::Mutex;

pub type TradeCallback = Box<dyn FnMut(&Trade) + Send>;

struct Subscriber {
    priority: i32,
    seq: u64,
    callback: TradeCallback,
}

pub struct Datasource {
    exchange_id: u32,
    name: String,
    start_ts: Option<f64>,
    subscribers: Mutex<Vec<Subscriber>>,
}

impl Datasource {
    pub fn new(exchange_id: u32, name: impl Into<String>) -> Self {
        Self {
            exchange_id,
            name: name.into(),
            start_ts: None,
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Historical sources know when their events begin.
    pub fn with_start_ts(mut self, ts: f64) -> Self {
        self.start_ts = Some(ts);
        self
    }

    pub fn exchange_id(&self) -> u32 {
        self.exchange_id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// `None` for live sources, meaning "the present".
    pub fn start_ts(&self) -> Option<f64> {
        self.start_ts
    }

    pub fn subscribe(&self, priority: i32, callback: TradeCallback) {
        let mut subs = self.lock();
        let seq = subs.len() as u64;
        subs.push(Subscriber {
            priority,
            seq,
            callback,
        });
        subs.sort_by_key(|s| (s.priority, s.seq));
    }

    pub fn subscriber_count(&self) -> usize {
        self.lock().len()
    }

    pub fn publish(&self, trade: &Trade) {
        let mut subs = self.lock();
        for sub in subs.iter_mut() {
            (sub.callback)(trade);
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<Subscriber>> {
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl fmt::Debug for Datasource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Datasource")
            .field("exchange_id", &self.exchange_id)
            .field("name", &self.name)
            .field("start_ts", &self.start_ts)
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn publishes_in_priority_order() {
        let ds = Datasource::new(1, "test");
        let seen = Arc::new(Mutex::new(Vec::new()));
        for (priority, label) in [(500, "boss"), (10, "store"), (500, "late"), (100, "bot")] {
            let seen = seen.clone();
            ds.subscribe(
                priority,
                Box::new(move |t: &Trade| seen.lock().unwrap().push((label, t.trade_id))),
            );
        }
        let trade = Trade::new(1, 42, 100.0, 1.0, 0.0, 0.0).unwrap();
        ds.publish(&trade);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![("store", 42), ("bot", 42), ("boss", 42), ("late", 42)]
        );
    }

    #[test]
    fn start_ts() {
        assert_eq!(Datasource::new(1, "live").start_ts(), None);
        assert_eq!(Datasource::new(1, "file").with_start_ts(5.0).start_ts(), Some(5.0));
    }
}
