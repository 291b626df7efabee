//! Prometheus-compatible metrics endpoint
//!
//! Exposes world server counters in Prometheus format.
//! Default endpoint: http://localhost:9090/metrics

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use parking_lot::RwLock;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tracing::{debug, info};

/// Number of fan-out sizes kept for percentile calculation
const FANOUT_HISTORY_LEN: usize = 1000;

/// Metrics registry for the world server
#[derive(Debug)]
pub struct Metrics {
    // World state
    pub entities_online: AtomicU64,

    // Transitions
    pub moves_total: AtomicU64,
    pub cell_transitions_total: AtomicU64,
    pub chat_messages_total: AtomicU64,

    // Fan-out
    pub notifications_sent: AtomicU64,
    pub notifications_dropped: AtomicU64,
    pub fanout_p95: AtomicU64,
    pub fanout_max: AtomicU64,

    // Network stats
    pub connections_active: AtomicU64,
    pub connections_rejected: AtomicU64,
    pub messages_received: AtomicU64,
    pub bytes_sent: AtomicU64,
    pub bytes_received: AtomicU64,

    start_time: Instant,

    // Rolling fan-out sizes (VecDeque for O(1) pop_front)
    fanout_history: RwLock<VecDeque<u64>>,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            entities_online: AtomicU64::new(0),
            moves_total: AtomicU64::new(0),
            cell_transitions_total: AtomicU64::new(0),
            chat_messages_total: AtomicU64::new(0),
            notifications_sent: AtomicU64::new(0),
            notifications_dropped: AtomicU64::new(0),
            fanout_p95: AtomicU64::new(0),
            fanout_max: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            messages_received: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            start_time: Instant::now(),
            fanout_history: RwLock::new(VecDeque::with_capacity(FANOUT_HISTORY_LEN)),
        }
    }

    /// Record one delivered fan-out: how many notifications were planned and how many went out
    pub fn record_fanout(&self, planned: usize, sent: usize) {
        self.notifications_sent.fetch_add(sent as u64, Ordering::Relaxed);
        self.notifications_dropped
            .fetch_add(planned.saturating_sub(sent) as u64, Ordering::Relaxed);

        let mut history = self.fanout_history.write();
        history.push_back(planned as u64);
        while history.len() > FANOUT_HISTORY_LEN {
            history.pop_front();
        }

        if history.len() >= 10 {
            let mut sorted: Vec<u64> = history.iter().copied().collect();
            sorted.sort_unstable();

            let p95_idx = (sorted.len() as f32 * 0.95) as usize;
            self.fanout_p95.store(sorted[p95_idx.min(sorted.len() - 1)], Ordering::Relaxed);
            self.fanout_max.store(sorted.last().copied().unwrap_or(0), Ordering::Relaxed);
        }
    }

    /// Get uptime in seconds
    pub fn uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }

    /// Generate Prometheus-format metrics output
    pub fn to_prometheus(&self) -> String {
        let mut output = String::with_capacity(2048);

        macro_rules! metric {
            ($name:expr, $help:expr, $type:expr, $value:expr) => {
                output.push_str(&format!(
                    "# HELP {} {}\n# TYPE {} {}\n{} {}\n",
                    $name, $help, $name, $type, $name, $value
                ));
            };
        }

        metric!("aoi_entities_online", "Entities currently registered", "gauge",
            self.entities_online.load(Ordering::Relaxed));

        metric!("aoi_moves_total", "Position updates processed", "counter",
            self.moves_total.load(Ordering::Relaxed));
        metric!("aoi_cell_transitions_total", "Position updates that changed cell", "counter",
            self.cell_transitions_total.load(Ordering::Relaxed));
        metric!("aoi_chat_messages_total", "Chat messages routed", "counter",
            self.chat_messages_total.load(Ordering::Relaxed));

        metric!("aoi_notifications_sent_total", "Notifications handed to outbound channels", "counter",
            self.notifications_sent.load(Ordering::Relaxed));
        metric!("aoi_notifications_dropped_total", "Notifications whose channel was closed", "counter",
            self.notifications_dropped.load(Ordering::Relaxed));
        metric!("aoi_fanout_size_p95", "95th percentile notifications per operation", "gauge",
            self.fanout_p95.load(Ordering::Relaxed));
        metric!("aoi_fanout_size_max", "Largest recent fan-out", "gauge",
            self.fanout_max.load(Ordering::Relaxed));

        metric!("aoi_connections_active", "Active TCP connections", "gauge",
            self.connections_active.load(Ordering::Relaxed));
        metric!("aoi_connections_rejected_total", "Connections refused at capacity", "counter",
            self.connections_rejected.load(Ordering::Relaxed));
        metric!("aoi_messages_received_total", "Client frames received", "counter",
            self.messages_received.load(Ordering::Relaxed));
        metric!("aoi_bytes_sent_total", "Total bytes sent", "counter",
            self.bytes_sent.load(Ordering::Relaxed));
        metric!("aoi_bytes_received_total", "Total bytes received", "counter",
            self.bytes_received.load(Ordering::Relaxed));

        metric!("aoi_uptime_seconds", "Server uptime in seconds", "counter",
            self.uptime_seconds());

        output
    }

    /// Generate JSON format metrics (alternative for direct API access)
    pub fn to_json(&self) -> String {
        format!(r#"{{
  "world": {{
    "entities_online": {},
    "moves": {},
    "cell_transitions": {},
    "chat_messages": {}
  }},
  "fanout": {{
    "sent": {},
    "dropped": {},
    "p95": {},
    "max": {}
  }},
  "network": {{
    "connections": {},
    "rejected": {},
    "messages_received": {},
    "bytes_sent": {},
    "bytes_received": {}
  }},
  "uptime_seconds": {}
}}"#,
            self.entities_online.load(Ordering::Relaxed),
            self.moves_total.load(Ordering::Relaxed),
            self.cell_transitions_total.load(Ordering::Relaxed),
            self.chat_messages_total.load(Ordering::Relaxed),
            self.notifications_sent.load(Ordering::Relaxed),
            self.notifications_dropped.load(Ordering::Relaxed),
            self.fanout_p95.load(Ordering::Relaxed),
            self.fanout_max.load(Ordering::Relaxed),
            self.connections_active.load(Ordering::Relaxed),
            self.connections_rejected.load(Ordering::Relaxed),
            self.messages_received.load(Ordering::Relaxed),
            self.bytes_sent.load(Ordering::Relaxed),
            self.bytes_received.load(Ordering::Relaxed),
            self.uptime_seconds(),
        )
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Start the metrics HTTP server
pub async fn start_metrics_server(metrics: Arc<Metrics>, port: u16) -> anyhow::Result<()> {
    let addr = format!("0.0.0.0:{}", port);
    let listener = TcpListener::bind(&addr).await?;

    info!("Metrics server listening on http://{}/metrics", addr);

    loop {
        let (mut socket, peer) = listener.accept().await?;
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let mut buffer = [0u8; 1024];

            match socket.read(&mut buffer).await {
                Ok(n) if n > 0 => {
                    let request = String::from_utf8_lossy(&buffer[..n]);

                    // /metrics/json must be matched before /metrics
                    let response = if request.starts_with("GET /metrics/json") || request.starts_with("GET /json") {
                        let body = metrics.to_json();
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else if request.starts_with("GET /metrics") {
                        let body = metrics.to_prometheus();
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain; version=0.0.4\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else if request.starts_with("GET /health") || request.starts_with("GET / ") {
                        let body = "OK";
                        format!(
                            "HTTP/1.1 200 OK\r\nContent-Type: text/plain\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                            body.len(),
                            body
                        )
                    } else {
                        "HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n".to_string()
                    };

                    if let Err(e) = socket.write_all(response.as_bytes()).await {
                        debug!("Failed to write metrics response to {}: {}", peer, e);
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    debug!("Failed to read from metrics socket {}: {}", peer, e);
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metrics_new() {
        let metrics = Metrics::new();
        assert_eq!(metrics.entities_online.load(Ordering::Relaxed), 0);
        assert_eq!(metrics.notifications_sent.load(Ordering::Relaxed), 0);
    }

    #[test]
    fn test_record_fanout() {
        let metrics = Metrics::new();

        for i in 0..100 {
            metrics.record_fanout(i, i);
        }
        metrics.record_fanout(10, 7);

        assert_eq!(metrics.notifications_dropped.load(Ordering::Relaxed), 3);
        assert_eq!(metrics.fanout_max.load(Ordering::Relaxed), 99);
        assert!(metrics.fanout_p95.load(Ordering::Relaxed) >= 90);
    }

    #[test]
    fn test_prometheus_format() {
        let metrics = Metrics::new();
        metrics.entities_online.store(50, Ordering::Relaxed);
        metrics.cell_transitions_total.store(7, Ordering::Relaxed);

        let output = metrics.to_prometheus();

        assert!(output.contains("aoi_entities_online 50"));
        assert!(output.contains("aoi_cell_transitions_total 7"));
        assert!(output.contains("# HELP"));
        assert!(output.contains("# TYPE"));
    }

    #[test]
    fn test_json_format() {
        let metrics = Metrics::new();
        metrics.entities_online.store(100, Ordering::Relaxed);

        let output = metrics.to_json();

        assert!(output.contains("\"entities_online\": 100"));
        assert!(output.contains("\"fanout\":"));
    }
}
