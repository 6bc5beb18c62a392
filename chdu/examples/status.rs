//! Device status example

use chdu::{CancellationToken, Chdu, StreamTransport};
use tokio::net::TcpStream;

#[tokio::main]
async fn main() -> chdu::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let addr = std::env::var("DEVICE_ADDR").unwrap_or_else(|_| "192.168.1.50:4001".to_string());

    let connect_addr = addr.clone();
    let transport = StreamTransport::new(addr, move || TcpStream::connect(connect_addr.clone()));
    let device = Chdu::new(transport);
    let cancel = CancellationToken::new();

    let status = device.status(&cancel).await?;
    println!("Status: {}", status);
    println!("Serial number: {}", status.serial_number());

    match (status.used_blocks(), status.total_blocks()) {
        (Ok(used), Ok(total)) => println!("Blocks: {} used / {} total", used, total),
        (Err(e), _) | (_, Err(e)) => println!("Storage not available: {}", e),
    }

    let volume = device.volume_info(&cancel).await?;
    println!("Volume: {}", volume);

    let firmware = device.firmware_version_description(&cancel).await?;
    println!("Firmware: {}", firmware);

    Ok(())
}
