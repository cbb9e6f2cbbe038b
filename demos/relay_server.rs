//! gNPSI relay example with one in-process subscriber
//!
//! Run with: cargo run --example relay_server [UDP_PORT] [MAX_CLIENTS]
//!
//! Examples:
//!   cargo run --example relay_server              # reads [::1]:6343, 10 clients
//!   cargo run --example relay_server 16343 2      # reads [::1]:16343, 2 clients
//!
//! Send a datagram to it with:
//!   echo -n sample | nc -6 -u -w0 ::1 6343
//!
//! Press Ctrl-C to drain subscribers and exit.

use std::time::Duration;

use gnpsi_relay::{ChannelStream, RelayConfig, RelayServer};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let mut args = std::env::args().skip(1);
    let mut config = RelayConfig::default();
    if let Some(port) = args.next() {
        config = config.udp_port(port.parse()?);
    }
    if let Some(max) = args.next() {
        config = config.max_clients(max.parse()?);
    }

    println!("Relaying samples from {}", config.loopback_addr());
    println!("Max subscribers: {}", config.max_clients);

    let server = RelayServer::new(config);

    // Local subscriber that prints every sample it receives
    let service = server.service();
    let (stream, mut subscription) = ChannelStream::new("ipv6:[::1]:50051", 256);
    let handler = tokio::spawn(async move { service.subscribe(Some(Box::new(stream))).await });

    tokio::spawn(async move {
        if !subscription.started().await {
            println!("Subscriber was rejected");
            return;
        }
        while let Some(sample) = subscription.recv().await {
            println!(
                "sample: {} bytes, timestamp={} version={:?}",
                sample.packet.len(),
                sample.timestamp,
                sample.sflow_metadata.version
            );
        }
        println!("Subscriber stream closed");
    });

    // Periodic stats dump
    let broker = server.broker().clone();
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(Duration::from_secs(10));
        loop {
            ticker.tick().await;
            for stats in broker.stats().await {
                println!(
                    "collector {}:{} datagrams={} bytes={} errors={}",
                    stats.collector_ip,
                    stats.collector_port,
                    stats.datagram_count,
                    stats.bytes_sampled,
                    stats.error_count
                );
            }
        }
    });

    let result = server
        .run_until(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    // A failed relay leaves subscribers open; release them before exiting
    if result.is_err() {
        server.broker().drain().await;
    }

    if let Err(status) = handler.await? {
        println!("Subscriber ended with {}", status);
    }

    result?;
    Ok(())
}
