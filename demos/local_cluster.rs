//! Mines a small customer/order schema on a local cluster.
//!
//! This demo shows:
//! - Building in-memory input sources
//! - Running a coordinator with a pool of workers
//! - Forcing the chunked transport with a tiny frame limit
//! - Reading the dispatch trace afterwards

use ind_miner::prelude::*;
use std::sync::Arc;
use std::time::Duration;

// ============================================================================
// Input Data
// ============================================================================

fn customers() -> MemorySource {
    MemorySource::from_columns(
        "customers.csv",
        vec![
            ("customer_id", vec!["1", "2", "3", "4"]),
            ("name", vec!["Ada", "Grace", "Edsger", "Barbara"]),
            ("country", vec!["UK", "US", "NL", "US"]),
        ],
    )
}

fn orders() -> MemorySource {
    MemorySource::from_columns(
        "orders.csv",
        vec![
            ("order_id", vec!["10", "11", "12"]),
            ("ordered_by", vec!["1", "3", "3"]),
            ("ship_to", vec!["UK", "NL", "NL"]),
        ],
    )
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), MinerError> {
    println!("=== ind-miner Local Cluster Demo ===\n");

    // 256-byte frames make every task message span several frames
    let config = MinerConfig::new().with_transport(
        TransportConfig::default()
            .with_max_frame_bytes(256)
            .with_reassembly_timeout(Duration::from_secs(5))
            .with_sweep_interval(Duration::from_millis(500)),
    );

    let telemetry = Arc::new(MemoryTelemetry::new());
    let report = LocalCluster::new(config)
        .with_workers(3)
        .with_source(customers())
        .with_source(orders())
        .with_telemetry(telemetry.clone())
        .run()
        .await?;

    println!("Inclusion dependencies:");
    for ind in &report.dependencies {
        println!("  {}", ind);
    }

    println!(
        "\n{} of {} tasks completed by {} workers in {:?}",
        report.tasks_completed, report.tasks_total, report.workers_seen, report.elapsed
    );
    let dispatched = telemetry
        .get_traces()
        .iter()
        .filter(|t| t.kind == TraceKind::Dispatched)
        .count();
    println!("{} dispatches, {} requeued", dispatched, report.tasks_requeued);

    Ok(())
}
