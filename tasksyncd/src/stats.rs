//! Service counters and the statistics report.
//!
//! Counters live for the lifetime of the process and reset on restart.

use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tasksync_types::message::Message;

#[derive(Debug, Default)]
struct Counters {
    transactions: u64,
    errors: u64,
    bytes_in: u64,
    bytes_out: u64,
    busy: Duration,
    max_time: Duration,
}

#[derive(Debug)]
pub struct Metrics {
    start: Instant,
    counters: Mutex<Counters>,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
            counters: Mutex::new(Counters::default()),
        }
    }

    /// Claim the next transaction sequence number.
    pub fn next_transaction(&self) -> u64 {
        let mut counters = self.counters.lock();
        counters.transactions += 1;
        counters.transactions
    }

    pub fn record_error(&self) {
        self.counters.lock().errors += 1;
    }

    pub fn record_traffic(&self, bytes_in: u64, bytes_out: u64) {
        let mut counters = self.counters.lock();
        counters.bytes_in += bytes_in;
        counters.bytes_out += bytes_out;
    }

    /// Account a successfully serviced turn, tracking the high-water mark.
    pub fn record_service_time(&self, elapsed: Duration) {
        let mut counters = self.counters.lock();
        counters.busy += elapsed;
        if elapsed > counters.max_time {
            counters.max_time = elapsed;
        }
    }

    /// Render the current counters into response headers.
    pub fn report(&self, response: &mut Message) {
        let uptime = self.start.elapsed().as_secs();
        let counters = self.counters.lock();

        let idle = if uptime != 0 {
            1.0 - counters.busy.as_secs_f64() / uptime as f64
        } else {
            0.0
        };

        let mut average_req = 0;
        let mut average_resp = 0;
        let mut average_resp_time = 0.0;
        let mut tps = 0.0;
        if counters.transactions != 0 {
            average_req = counters.bytes_in / counters.transactions;
            average_resp = counters.bytes_out / counters.transactions;
            average_resp_time = counters.busy.as_secs_f64() / counters.transactions as f64;

            // tps is meaningless until response times are non-trivial.
            if average_resp_time > 0.000_001 {
                tps = 1.0 / average_resp_time;
            }
        }

        response.set("uptime", uptime.to_string());
        response.set("transactions", counters.transactions.to_string());
        response.set("errors", counters.errors.to_string());
        response.set("idle", format!("{idle:.6}"));
        response.set("total bytes in", counters.bytes_in.to_string());
        response.set("total bytes out", counters.bytes_out.to_string());
        response.set("average request bytes", average_req.to_string());
        response.set("average response bytes", average_resp.to_string());
        response.set("average response time", format!("{average_resp_time:.6}"));
        response.set(
            "maximum response time",
            format!("{:.6}", counters.max_time.as_secs_f64()),
        );
        response.set("tps", format!("{tps:.6}"));
    }
}
