use log::{debug, info, warn};
use std::io;
use tokio::io::AsyncWriteExt;
use tokio::net::{TcpListener, TcpStream};

/// Greeting sent on every accepted connection.
pub const WELCOME: &str = "Welcome to the server!\n";

/// Accepted connections between two progress lines.
pub const PROGRESS_EVERY: u64 = 1000;

async fn greet(mut stream: TcpStream) {
    if let Err(e) = stream.write_all(WELCOME.as_bytes()).await {
        if log::log_enabled!(log::Level::Debug) {
            debug!("Error sending welcome message: {}", e);
        }
        return;
    }
    // The client's messages are never read
    let _ = stream.shutdown().await;
}

/// Accept forever, greeting each client on its own task.
///
/// Accept errors are logged and do not stop the server.
pub async fn serve(listener: TcpListener) -> io::Result<()> {
    info!("Server listening on {}", listener.local_addr()?);

    let mut accepted: u64 = 0;
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                tokio::spawn(greet(stream));
                accepted += 1;
                if accepted % PROGRESS_EVERY == 0 {
                    info!("{} connections accepted", accepted);
                }
            }
            Err(e) => warn!("Error accepting connection: {}", e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::AsyncReadExt;

    #[tokio::test]
    async fn test_server_greets_and_closes() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let server = tokio::spawn(serve(listener));

        for _ in 0..3 {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            let mut received = String::new();
            // read_to_string only returns once the server closed its side
            stream.read_to_string(&mut received).await.unwrap();
            assert_eq!(received, WELCOME);
        }

        server.abort();
    }
}
