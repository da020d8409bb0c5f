use std::{cell::RefCell, rc::Rc, time::Instant};

use swarm_dht::{Bytes, MutableItem, SigningKey, StorageItem, Testnet};

use clap::Parser;

use tracing::Level;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Value to distribute
    value: String,
    /// Number of simulated nodes
    #[arg(short, long, default_value_t = 20)]
    nodes: usize,
}

fn main() {
    tracing_subscriber::fmt().with_max_level(Level::INFO).init();

    let cli = Cli::parse();

    let start = Instant::now();
    let mut testnet = Testnet::new(cli.nodes.max(2), start);
    let (now, _) = testnet.pulse_until(start, 1000, |_| false);

    let signer = SigningKey::from_bytes(&rand::random());
    let item: StorageItem = MutableItem::new(&signer, Bytes::from(cli.value), 1, None).into();
    let target = *item.target();

    let finished = Rc::new(RefCell::new(false));
    let done = finished.clone();

    testnet.nodes[0].distribute(item, move |result| {
        match result {
            Ok(report) => println!(
                "Stored {:?} at {} of {} nodes",
                report.target, report.stored, report.attempted
            ),
            Err(error) => println!("Distribute failed: {error}"),
        }
        *done.borrow_mut() = true;
    });

    testnet.pulse_until(now, 1000, |_| *finished.borrow());

    let holders = testnet
        .nodes
        .iter()
        .filter(|node| node.storage_lookup(&target).is_some())
        .count();

    println!("{holders} nodes hold {target}");
}
