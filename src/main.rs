use clap::Parser;
use log::info;
use std::sync::mpsc;

use fixture_server::logger;
use fixture_server::{ServerConfig, ServerError, serve_directory};

fn main() -> Result<(), ServerError> {
    logger::init();

    let config = ServerConfig::parse();
    info!("starting file server with config: {:?}", config);

    let (mut server, base_url) = serve_directory(&config)?;
    info!(
        "serving {} at {}",
        server.document_root().display(),
        base_url
    );

    let (interrupt_tx, interrupt_rx) = mpsc::channel();
    ctrlc::set_handler(move || {
        let _ = interrupt_tx.send(());
    })
    .expect("failed to install interrupt handler");

    let _ = interrupt_rx.recv();
    info!("interrupt received, shutting down");
    server.stop();

    Ok(())
}
