//! Deterministic stand-ins for the clock and the network.
//!
//! Used by this crate's tests and by host layers that want to exercise the
//! client without real time or real I/O.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{DateTime, Local, TimeDelta, Utc};
use mockable::Clock;
use parking_lot::Mutex;

use crate::http::{HttpRequest, HttpResponse, Transport, TransportError};

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    now: Mutex<DateTime<Utc>>,
}

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(start),
        }
    }

    pub fn advance(&self, by: TimeDelta) {
        let mut now = self.now.lock();
        *now += by;
    }

    pub fn advance_secs(&self, secs: i64) {
        self.advance(TimeDelta::seconds(secs));
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::<Utc>::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn local(&self) -> DateTime<Local> {
        self.utc().with_timezone(&Local)
    }

    fn utc(&self) -> DateTime<Utc> {
        *self.now.lock()
    }
}

/// Replays queued responses in order and records every request it sees.
///
/// Once the queue is drained the fallback response, if any, is returned for
/// every further call; without one the call fails with a `TransportError`.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    queue: Mutex<VecDeque<Result<HttpResponse, TransportError>>>,
    fallback: Option<HttpResponse>,
    requests: Mutex<Vec<HttpRequest>>,
    calls: AtomicUsize,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer every call with the same response.
    pub fn always(status: u16, body: impl Into<String>) -> Self {
        Self {
            fallback: Some(HttpResponse::new(status, body)),
            ..Self::default()
        }
    }

    pub fn push_response(&self, status: u16, body: impl Into<String>) -> &Self {
        self.queue
            .lock()
            .push_back(Ok(HttpResponse::new(status, body)));
        self
    }

    pub fn push_error(&self, message: impl Into<String>) -> &Self {
        self.queue
            .lock()
            .push_back(Err(TransportError::new(message)));
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<HttpRequest> {
        self.requests.lock().clone()
    }
}

impl Transport for ScriptedTransport {
    fn send(&self, request: &HttpRequest) -> Result<HttpResponse, TransportError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().push(request.clone());
        if let Some(next) = self.queue.lock().pop_front() {
            return next;
        }
        self.fallback
            .clone()
            .ok_or_else(|| TransportError::new("no scripted response left"))
    }
}
