#![deny(unsafe_code)]

use std::process;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use structopt::StructOpt;

use automqtt::client::Connection;
use automqtt::conf::{Options, Settings};
use automqtt::dispatcher::Dispatcher;
use automqtt::fs::RoutingTree;
use automqtt::logger::{config_logger, logger_init};

mod wiring;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        eprintln!("automqtt failed to start, {:?}", e);
        process::exit(1);
    }
}

async fn run() -> Result<()> {
    //init config
    let settings = Settings::init(Options::from_args())?;

    //init log
    logger_init(config_logger(&settings.log)?, settings.log.level)?;

    Settings::logs()?;

    //build the routing table
    let tree = RoutingTree::new(wiring::routing_table(&settings.devices));
    log::info!("routing table ready, {:?}", tree);
    let dispatcher = Arc::new(Dispatcher::new(tree));

    let conn = Connection::new(settings.mqtt.clone(), dispatcher.clone());
    tokio::select! {
        _ = conn.run() => {}
        res = tokio::signal::ctrl_c() => {
            res?;
            log::info!("Ctrl-C received, exiting");
        }
    }

    log::info!("dispatcher stats: {}", dispatcher.stats().to_json());
    if let Some(cache) = dispatcher.tree().cache() {
        log::info!("classification cache: {}", cache.to_json());
    }
    //let the async logger drain
    tokio::time::sleep(Duration::from_millis(200)).await;
    Ok(())
}
