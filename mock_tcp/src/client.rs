use log::{info, warn};
use rand::Rng;
use std::io;
use std::net::SocketAddr;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::time::sleep;

/// Line sent by the send-and-drop behavior.
pub const HELLO: &str = "Hello from client!\n";

/// Wait before retrying a failed connect.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Wait between two connections.
pub const RECONNECT_DELAY: Duration = Duration::from_millis(200);

/// What the client does with one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClientBehavior {
    /// Close right after connecting (1 in 10)
    ImmediateDrop,
    /// Write one line, then close (1 in 10)
    SendAndDrop,
    /// Wait for the server's greeting, then close (8 in 10)
    DropAfterAck,
}

impl ClientBehavior {
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        match rng.gen_range(0..10) {
            0 => ClientBehavior::ImmediateDrop,
            1 => ClientBehavior::SendAndDrop,
            _ => ClientBehavior::DropAfterAck,
        }
    }
}

/// Run one connection with `behavior` on an open stream.
///
/// Returns the server's greeting for [`ClientBehavior::DropAfterAck`].
pub async fn exchange(
    mut stream: TcpStream,
    behavior: ClientBehavior,
) -> io::Result<Option<String>> {
    match behavior {
        ClientBehavior::ImmediateDrop => Ok(None),
        ClientBehavior::SendAndDrop => {
            stream.write_all(HELLO.as_bytes()).await?;
            stream.flush().await?;
            Ok(None)
        }
        ClientBehavior::DropAfterAck => {
            let mut reader = BufReader::new(stream);
            let mut line = String::new();
            reader.read_line(&mut line).await?;
            Ok(Some(line))
        }
    }
}

/// Connect to `addr` and run one connection.
pub async fn connect_once(
    addr: SocketAddr,
    behavior: ClientBehavior,
) -> io::Result<Option<String>> {
    let stream = TcpStream::connect(addr).await?;
    exchange(stream, behavior).await
}

/// Reconnect forever. Only successful connects are counted.
pub async fn run_client<R: Rng>(addr: SocketAddr, mut rng: R) {
    let mut count: u64 = 0;
    loop {
        let stream = match TcpStream::connect(addr).await {
            Ok(stream) => stream,
            Err(e) => {
                warn!("{} Error connecting to server: {}", count, e);
                sleep(RETRY_DELAY).await;
                continue;
            }
        };
        count += 1;

        let behavior = ClientBehavior::random(&mut rng);
        info!("{} {:?}", count, behavior);
        if let Err(e) = exchange(stream, behavior).await {
            warn!("{} Error talking to server: {}", count, e);
        }

        sleep(RECONNECT_DELAY).await;
    }
}
