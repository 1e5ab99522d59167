use std::{
    error::Error,
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::{Duration, Instant},
};

use clap::Parser;
use log::info;
use riak_transport::{
    Cluster, ClusterConfig, NodeConfig,
    command::{Ping, ServerInfo},
};

#[derive(Debug, Parser)]
#[command(version, about = "Ping Riak nodes over the protocol buffers API", long_about = None)]
struct Cli {
    /// Node addresses, `host:port`
    #[arg(required = true)]
    nodes: Vec<String>,
    /// Number of requests to send
    #[arg(short, long, default_value_t = 1)]
    count: u32,
    /// Pause between requests
    #[arg(short, long, default_value_t = 1000)]
    interval_ms: u64,
    /// Ask for server info instead of pinging
    #[arg(long)]
    server_info: bool,
}

fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let cli = Cli::parse();
    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        ctrlc::set_handler(move || stop.store(true, Ordering::SeqCst))?;
    }

    let config = ClusterConfig::new(cli.nodes.iter().map(NodeConfig::new).collect());
    let cluster = Cluster::new(config)?;
    info!("cluster of {} node(s) ready", cluster.nodes().len());

    let mut failures = 0;
    for seq in 1..=cli.count {
        if stop.load(Ordering::SeqCst) {
            break;
        }

        let started = Instant::now();
        let result = if cli.server_info {
            let mut info = ServerInfo::new();
            cluster.execute(&mut info).map(|_| {
                format!(
                    "node={} version={}",
                    info.node().unwrap_or("?"),
                    info.server_version().unwrap_or("?")
                )
            })
        } else {
            cluster.execute(&mut Ping::new()).map(|_| "pong".to_string())
        };

        match result {
            Ok(reply) => println!("seq={seq} {reply} time={:?}", started.elapsed()),
            Err(e) => {
                failures += 1;
                eprintln!("seq={seq} error: {e}");
            }
        }

        if seq < cli.count {
            thread::sleep(Duration::from_millis(cli.interval_ms));
        }
    }

    cluster.shutdown();
    if failures > 0 {
        return Err(format!("{failures} request(s) failed").into());
    }
    Ok(())
}
