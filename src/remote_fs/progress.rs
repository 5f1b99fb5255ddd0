//! Transfer progress throttling for stream reads/writes.

use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TransferProgress {
    pub transferred: u64,
    pub total: Option<u64>,
    pub speed_bps: f64,
    pub eta_seconds: Option<u64>,
}

/// Wraps a progress callback with a minimum-interval gate so a stream with
/// many small reads doesn't flood the caller. The final call (`transferred
/// == total`) always passes through regardless of timing.
pub struct TransferProgressSink<F: FnMut(TransferProgress)> {
    callback: F,
    total: Option<u64>,
    started_at: Instant,
    last_emit: Option<Instant>,
    min_interval: Duration,
}

impl<F: FnMut(TransferProgress)> TransferProgressSink<F> {
    pub fn new(total: Option<u64>, callback: F) -> Self {
        Self {
            callback,
            total,
            started_at: Instant::now(),
            last_emit: None,
            min_interval: Duration::from_millis(500),
        }
    }

    /// Reports `transferred` bytes so far. Emits through the callback only
    /// if the minimum interval elapsed since the last emit, or the transfer
    /// just completed.
    pub fn report(&mut self, transferred: u64) {
        let done = self.total.is_some_and(|t| transferred >= t);
        let due = self
            .last_emit
            .is_none_or(|last| last.elapsed() >= self.min_interval);
        if !done && !due {
            return;
        }
        self.last_emit = Some(Instant::now());

        let elapsed = self.started_at.elapsed().as_secs_f64();
        let speed_bps = if elapsed > 0.0 {
            transferred as f64 / elapsed
        } else {
            0.0
        };
        let eta_seconds = self.total.and_then(|total| {
            if speed_bps <= 0.0 || transferred >= total {
                None
            } else {
                let remaining = (total - transferred) as f64;
                Some((remaining / speed_bps).round() as u64)
            }
        });

        (self.callback)(TransferProgress {
            transferred,
            total: self.total,
            speed_bps,
            eta_seconds,
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[test]
    fn final_report_always_emits_even_within_interval() {
        let emitted = RefCell::new(Vec::new());
        let mut sink = TransferProgressSink::new(Some(100), |p| emitted.borrow_mut().push(p.transferred));
        sink.report(50);
        sink.report(100);
        assert_eq!(*emitted.borrow().last().unwrap(), 100);
    }

    #[test]
    fn eta_is_none_when_already_complete() {
        let emitted = RefCell::new(None);
        let mut sink = TransferProgressSink::new(Some(100), |p| *emitted.borrow_mut() = Some(p));
        sink.report(100);
        assert_eq!(emitted.borrow().unwrap().eta_seconds, None);
    }
}
