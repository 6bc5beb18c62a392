//! High-level device interface

use tokio::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use chdu_core::{
    constants::DEFAULT_MAX_BLOCKS_PER_REQUEST,
    request::{
        ActivateLock, GetFirmwareVersion, GetStatus, GetVolumeInfo, OpenDrawer, ReadBlocks,
        RequestLock, WriteBlock,
    },
    ConnectionState, Request,
};
use chdu_transport::Transport;
use chdu_types::{
    Block, BlockAddress, BlockContent, BlockWriteResult, DeviceStatus, DrawerPin,
    OffsetBlockContent, VolumeInfo, WriteMode,
};

use crate::{
    engine::CommandTransport,
    error::{Error, Result},
    initializer::Initializer,
};

/// CHDU Lite device
///
/// High-level interface for a CHDU Lite fiscal storage device. Operations
/// are serialized: the link is half-duplex and carries one command at a
/// time. The first operation, and the first one after a disconnect,
/// initializes the connection.
///
/// # Examples
///
/// ```no_run
/// use chdu::{Chdu, StreamTransport};
/// use tokio::net::TcpStream;
/// use tokio_util::sync::CancellationToken;
///
/// #[tokio::main]
/// async fn main() -> chdu::Result<()> {
///     let transport = StreamTransport::new("192.168.1.50:4001", || {
///         TcpStream::connect("192.168.1.50:4001")
///     });
///     let device = Chdu::new(transport);
///     let cancel = CancellationToken::new();
///
///     let status = device.status(&cancel).await?;
///     println!("{}", status);
///     Ok(())
/// }
/// ```
pub struct Chdu {
    link: Mutex<Link>,
    max_blocks_per_request: Option<u32>,
}

struct Link {
    engine: CommandTransport,
    initializer: Initializer,
}

impl Link {
    /// Apply what happened to the link since the last operation
    fn sync(&mut self) -> ConnectionState {
        // an operation dropped mid-exchange leaves the framing unknown
        self.engine.recover();
        self.initializer.sync()
    }
}

impl Chdu {
    /// Create a new device on top of `transport`
    pub fn new(transport: impl Transport + 'static) -> Self {
        let engine = CommandTransport::new(Box::new(transport));
        let initializer = Initializer::new(&engine);

        Self {
            link: Mutex::new(Link {
                engine,
                initializer,
            }),
            max_blocks_per_request: Some(DEFAULT_MAX_BLOCKS_PER_REQUEST),
        }
    }

    /// Set the number of blocks requested per bulk read command
    pub fn with_max_blocks_per_request(mut self, max: u32) -> Self {
        self.max_blocks_per_request = Some(max.max(1));
        self
    }

    /// Request all blocks of a bulk read with a single command
    pub fn without_request_limit(mut self) -> Self {
        self.max_blocks_per_request = None;
        self
    }

    /// Current connection state, after applying transport notifications
    pub async fn connection_state(&self) -> ConnectionState {
        self.link.lock().await.sync()
    }

    /// Get device status
    pub async fn status(&self, cancel: &CancellationToken) -> Result<DeviceStatus> {
        self.execute(&GetStatus, cancel).await
    }

    /// Get logical volume information
    pub async fn volume_info(&self, cancel: &CancellationToken) -> Result<VolumeInfo> {
        self.execute(&GetVolumeInfo, cancel).await
    }

    /// Get the full firmware version description
    pub async fn firmware_version_description(&self, cancel: &CancellationToken) -> Result<String> {
        self.execute(&GetFirmwareVersion, cancel).await
    }

    /// Read the block at `address`
    pub async fn read_block(&self, address: BlockAddress, cancel: &CancellationToken) -> Result<Block> {
        self.read_blocks(address, 1, cancel)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::UnexpectedResponse(format!("no block at {}", address)))
    }

    /// Read `count` consecutive blocks starting at `address`
    ///
    /// Large reads are split into several commands; the device stays
    /// locked for the whole read.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidArgument`] if `count` is zero or the range
    /// leaves the address space.
    pub async fn read_blocks(
        &self,
        address: BlockAddress,
        count: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<Block>> {
        let chunks = chunk_requests(address, count, self.max_blocks_per_request)?;

        let mut link = self.acquire(cancel).await?;
        let mut blocks = Vec::new();

        for (start, len) in chunks {
            debug!(%start, len, "Reading blocks");

            let request = ReadBlocks::new(start, len);
            blocks.extend(link.engine.execute(&request, cancel).await?);
        }

        Ok(blocks)
    }

    /// Store a block
    pub async fn write_block(
        &self,
        content: &BlockContent,
        cancel: &CancellationToken,
    ) -> Result<BlockWriteResult> {
        self.execute(&WriteBlock::new(content, WriteMode::Save), cancel).await
    }

    /// Store and print a block
    pub async fn write_and_print_block(
        &self,
        content: &BlockContent,
        cancel: &CancellationToken,
    ) -> Result<BlockWriteResult> {
        self.execute(&WriteBlock::new(content, WriteMode::SaveAndPrint), cancel).await
    }

    /// Store a block and print it starting at its print offset
    pub async fn write_and_print_block_with_offset(
        &self,
        content: &OffsetBlockContent,
        cancel: &CancellationToken,
    ) -> Result<BlockWriteResult> {
        self.execute(&WriteBlock::with_offset(content), cancel).await
    }

    /// Open the cash drawer connected to `pin`
    pub async fn open_drawer(&self, pin: DrawerPin, cancel: &CancellationToken) -> Result<()> {
        self.execute(&OpenDrawer(pin), cancel).await
    }

    /// Lock the storage permanently
    ///
    /// After locking, the device rejects all writes. This cannot be undone.
    pub async fn lock_memory(&self, magic: u32, cancel: &CancellationToken) -> Result<()> {
        let mut link = self.acquire(cancel).await?;

        let auth_code = link.engine.execute(&RequestLock { magic }, cancel).await?;
        link.engine
            .execute(&ActivateLock { magic, auth_code }, cancel)
            .await
    }

    async fn execute<R: Request>(&self, request: &R, cancel: &CancellationToken) -> Result<R::Response> {
        let mut link = self.acquire(cancel).await?;
        link.engine.execute(request, cancel).await
    }

    /// Take exclusive access to the link, initializing it if needed
    async fn acquire(&self, cancel: &CancellationToken) -> Result<MutexGuard<'_, Link>> {
        let mut link = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Error::Cancelled),
            link = self.link.lock() => link,
        };

        if link.sync() == ConnectionState::Pending {
            let Link {
                engine,
                initializer,
            } = &mut *link;
            initializer.initialize(engine, cancel).await?;
        }

        Ok(link)
    }
}

/// Split a bulk read into per-command windows
///
/// Returns `(start, count)` pairs in address order. `max_per_request` of
/// `None` means a single command.
pub fn chunk_requests(
    address: BlockAddress,
    count: u32,
    max_per_request: Option<u32>,
) -> Result<Vec<(BlockAddress, u32)>> {
    if count == 0 {
        return Err(Error::InvalidArgument("block count must be at least 1".into()));
    }

    let out_of_range = || {
        Error::InvalidArgument(format!(
            "{} blocks from {} exceed the address space",
            count, address
        ))
    };

    address.checked_add(count - 1).ok_or_else(out_of_range)?;

    let window = max_per_request.unwrap_or(count).max(1);
    let mut chunks = Vec::new();
    let mut done = 0;

    while done < count {
        let len = (count - done).min(window);
        let start = address.checked_add(done).ok_or_else(out_of_range)?;

        chunks.push((start, len));
        done += len;
    }

    Ok(chunks)
}
