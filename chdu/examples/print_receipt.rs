//! Store and print a receipt, then read it back

use std::time::Duration;

use chdu::{BlockContent, CancellationToken, Chdu, DrawerPin, StreamTransport};
use tokio::net::TcpStream;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> chdu::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("chdu=debug".parse().unwrap()))
        .init();

    let addr = std::env::var("DEVICE_ADDR").unwrap_or_else(|_| "192.168.1.50:4001".to_string());

    let connect_addr = addr.clone();
    let transport = StreamTransport::new(addr, move || TcpStream::connect(connect_addr.clone()))
        .with_read_timeout(Duration::from_secs(2));
    let device = Chdu::new(transport);

    // give up after 10 seconds
    let cancel = CancellationToken::new();
    let timer = cancel.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(10)).await;
        timer.cancel();
    });

    let status = device.status(&cancel).await?;
    if status.is_read_only() {
        println!("Storage is read-only, nothing to do");
        return Ok(());
    }

    let receipt = BlockContent::new("SHOP #12\nCoffee    2.50\nTOTAL    2.50\n")?;
    let written = device.write_and_print_block(&receipt, &cancel).await?;
    println!("Receipt stored at block {}", written.address);

    let block = device.read_block(written.address, &cancel).await?;
    println!(
        "Read back {} bytes ({:?}): {}",
        block.content().len(),
        block.validity,
        String::from_utf8_lossy(block.content())
    );

    device.open_drawer(DrawerPin::A, &cancel).await?;

    Ok(())
}
