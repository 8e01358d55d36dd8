//! Per-host request throttling

use crate::error::{Result, ScanError};
use reqwest::Url;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{Mutex as AsyncMutex, OwnedSemaphorePermit, Semaphore};
use tokio::time::{sleep_until, Instant};

/// Caps in-flight requests per upstream host and spaces out request starts
pub struct HostThrottle {
    max_in_flight: usize,
    spacing: Duration,
    hosts: Mutex<HashMap<String, Arc<HostSlot>>>,
}

struct HostSlot {
    permits: Arc<Semaphore>,
    next_start: AsyncMutex<Instant>,
}

impl HostThrottle {
    pub fn new(max_in_flight: usize, spacing: Duration) -> Self {
        Self {
            max_in_flight: max_in_flight.max(1),
            spacing,
            hosts: Mutex::new(HashMap::new()),
        }
    }

    /// Wait for a slot on the host of `url`. The slot is released when the
    /// returned permit is dropped.
    pub async fn acquire(&self, url: &str) -> Result<OwnedSemaphorePermit> {
        let slot = self.slot(&host_key(url))?;

        let permit = Arc::clone(&slot.permits)
            .acquire_owned()
            .await
            .map_err(|e| ScanError::transport(format!("throttle closed: {}", e)))?;

        let mut next_start = slot.next_start.lock().await;
        let now = Instant::now();
        if *next_start > now {
            sleep_until(*next_start).await;
        }
        *next_start = Instant::now() + self.spacing;

        Ok(permit)
    }

    fn slot(&self, host: &str) -> Result<Arc<HostSlot>> {
        let mut hosts = self
            .hosts
            .lock()
            .map_err(|_| ScanError::transport("throttle lock poisoned"))?;
        let slot = hosts.entry(host.to_string()).or_insert_with(|| {
            Arc::new(HostSlot {
                permits: Arc::new(Semaphore::new(self.max_in_flight)),
                next_start: AsyncMutex::new(Instant::now()),
            })
        });
        Ok(Arc::clone(slot))
    }
}

fn host_key(url: &str) -> String {
    match Url::parse(url) {
        Ok(parsed) => match (parsed.host_str(), parsed.port_or_known_default()) {
            (Some(host), Some(port)) => format!("{}:{}", host, port),
            (Some(host), None) => host.to_string(),
            _ => url.to_string(),
        },
        Err(_) => url.to_string(),
    }
}
