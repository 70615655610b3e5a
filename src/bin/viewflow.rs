//! viewflow: replay a point stream through event-counting views
//!
//! Reads newline-delimited JSON points from stdin, routes each to the view
//! instance named by its `view`/`id` fields, and prints the committed views
//! and stop records once the stream ends.
//!
//! ## Input
//! ```text
//! {"view": "orders", "id": "42", "position": 1, "event_type": "order_placed", "payload": {}}
//! ```
//! Event type `rejected` fails the view at that point; `completed` marks it
//! done.
//!
//! ## Configuration
//! - First argument: optional config file path
//! - VIEWFLOW_CONFIG: config file path
//! - VIEWFLOW_LOG: log filter (default: info)

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, warn};

use viewflow::config::Config;
use viewflow::exchange::ChannelExchange;
use viewflow::timeline::InMemoryTimeline;
use viewflow::utils::bootstrap::init_tracing;
use viewflow::{ApplyError, Flow, FlowContext, FlowKey, HostError, Point, ViewHost};

/// Number of points seen per event type.
#[derive(Debug, Default, Serialize, Deserialize)]
struct EventCounts {
    #[serde(default)]
    context: FlowContext,
    #[serde(default)]
    counts: BTreeMap<String, u64>,
}

#[async_trait]
impl Flow for EventCounts {
    fn create(_key: &FlowKey) -> Self {
        Self::default()
    }

    fn context(&self) -> &FlowContext {
        &self.context
    }

    fn context_mut(&mut self) -> &mut FlowContext {
        &mut self.context
    }

    async fn when(&mut self, point: &Point) -> Result<(), ApplyError> {
        match point.event_type.as_str() {
            "rejected" => {
                let reason = point
                    .payload
                    .get("reason")
                    .and_then(|r| r.as_str())
                    .unwrap_or("rejected by input");
                return Err(ApplyError::Rejected(reason.to_string()));
            }
            "completed" => self.context.set_done(),
            _ => {}
        }

        *self.counts.entry(point.event_type.clone()).or_insert(0) += 1;
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct InputPoint {
    view: String,
    #[serde(default)]
    id: Option<String>,
    #[serde(flatten)]
    point: Point,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    let config_path = std::env::args().nth(1);
    let config = Config::load(config_path.as_deref()).map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!("Starting viewflow");

    let timeline = Arc::new(InMemoryTimeline::new());
    let exchange = Arc::new(ChannelExchange::with_capacity(
        config.exchange.channel_capacity,
    ));
    let mut host: ViewHost<EventCounts> = ViewHost::new(timeline.clone(), exchange, &config);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let input: InputPoint = match serde_json::from_str(&line) {
            Ok(input) => input,
            Err(e) => {
                warn!(error = %e, "Skipping malformed point");
                continue;
            }
        };

        let key = match input.id {
            Some(id) => FlowKey::instance(input.view, id),
            None => FlowKey::singleton(input.view),
        };

        match host.deliver(key, Arc::new(input.point)).await {
            Ok(()) => {}
            Err(e @ (HostError::Stopped { .. } | HostError::Finished { .. })) => {
                debug!(error = %e, "Point not delivered");
            }
            Err(e) => return Err(e.into()),
        }
    }

    for (key, result) in host.shutdown().await {
        match result {
            Ok(outcome) => info!(view = %key, outcome = ?outcome, "View finished"),
            Err(e) => warn!(view = %key, error = %e, "View failed"),
        }
    }

    let report = serde_json::json!({
        "views": timeline.views().await,
        "stopped": timeline.stops().await,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);

    Ok(())
}
