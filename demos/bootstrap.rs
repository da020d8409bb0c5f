use std::time::{Duration, Instant};

use swarm_dht::{AddressFamily, Config, Dht, UdpTransport};

use tracing::Level;

const BOOTSTRAP: [&str; 2] = ["67.215.246.10:6881", "87.98.162.88:6881"];

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_max_level(Level::DEBUG)
        .init();

    let bootstrap = BOOTSTRAP
        .iter()
        .map(|address| address.parse())
        .collect::<Result<Vec<_>, _>>()?;

    let mut dht = Dht::new(Config {
        bootstrap,
        ..Default::default()
    });
    dht.bind(UdpTransport::bind("0.0.0.0:0")?);

    let start = Instant::now();

    while start.elapsed() < Duration::from_secs(30) {
        dht.pulse(Instant::now());

        if dht.routing_table(AddressFamily::V4).size() >= 8 {
            break;
        }

        std::thread::sleep(Duration::from_millis(10));
    }

    println!("{:?}", dht.info());

    Ok(())
}
