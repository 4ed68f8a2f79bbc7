use std::sync::{Arc, Mutex};

use chrono::{DateTime, TimeZone, Utc};
use serde_json::Value;
use tokio::sync::watch;

use crate::adapters::central_http::{CentralTransport, FetchError};
use crate::app::scheduler::Clock;

#[derive(Debug, Clone)]
enum Scripted {
    Body(Value),
    Status(u16),
    Transport,
    Undecodable,
}

/// In-memory central: answers by URL path suffix and records every request.
/// While held, requests are recorded and then wait until `release`.
#[derive(Clone)]
pub struct ScriptedTransport {
    routes: Arc<Mutex<Vec<(String, Scripted)>>>,
    calls: Arc<Mutex<Vec<String>>>,
    open: Arc<watch::Sender<bool>>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        let (open, _) = watch::channel(true);
        Self {
            routes: Arc::new(Mutex::new(Vec::new())),
            calls: Arc::new(Mutex::new(Vec::new())),
            open: Arc::new(open),
        }
    }

    pub fn respond(self, path: &str, body: Value) -> Self {
        self.script(path, Scripted::Body(body))
    }

    pub fn fail_status(self, path: &str, status: u16) -> Self {
        self.script(path, Scripted::Status(status))
    }

    pub fn fail_transport(self, path: &str) -> Self {
        self.script(path, Scripted::Transport)
    }

    /// 2xx answer whose body is not JSON.
    pub fn fail_decode(self, path: &str) -> Self {
        self.script(path, Scripted::Undecodable)
    }

    pub fn hold(&self) {
        self.open.send_replace(false);
    }

    pub fn release(&self) {
        self.open.send_replace(true);
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().expect("calls lock").clone()
    }

    pub fn calls_to(&self, path: &str) -> usize {
        self.calls()
            .iter()
            .filter(|url| url.ends_with(path))
            .count()
    }

    fn script(self, path: &str, response: Scripted) -> Self {
        self.routes
            .lock()
            .expect("routes lock")
            .push((path.to_string(), response));
        self
    }

    fn lookup(&self, url: &str) -> Option<Scripted> {
        self.routes
            .lock()
            .expect("routes lock")
            .iter()
            .find(|(path, _)| url.ends_with(path.as_str()))
            .map(|(_, response)| response.clone())
    }
}

impl CentralTransport for ScriptedTransport {
    async fn get_json(&self, url: &str) -> Result<Value, FetchError> {
        self.calls.lock().expect("calls lock").push(url.to_string());

        let mut open = self.open.subscribe();
        if open.wait_for(|open| *open).await.is_err() {
            return Err(FetchError::Transport {
                url: url.to_string(),
                message: "transport gate dropped".to_string(),
            });
        }

        match self.lookup(url) {
            Some(Scripted::Body(body)) => Ok(body),
            Some(Scripted::Status(status)) => Err(FetchError::HttpStatus {
                url: url.to_string(),
                status,
            }),
            Some(Scripted::Undecodable) => Err(FetchError::Decode {
                url: url.to_string(),
                message: "expected value at line 1 column 1".to_string(),
            }),
            Some(Scripted::Transport) | None => Err(FetchError::Transport {
                url: url.to_string(),
                message: "connection refused".to_string(),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    pub fn at_ymd_hms(year: i32, month: u32, day: u32, hour: u32, min: u32, sec: u32) -> Self {
        Self(
            Utc.with_ymd_and_hms(year, month, day, hour, min, sec)
                .single()
                .expect("valid fixture timestamp"),
        )
    }
}

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}
