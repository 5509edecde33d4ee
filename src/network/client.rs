//! Network Client
//!
//! Opens one fresh TCP connection per request.

use std::time::Duration;
use tokio::net::TcpStream;
use tokio::time::timeout;

use super::{read_message, write_message, Reply, Request};
use crate::error::{Error, Result};

/// Replies larger than this are refused by the client
const MAX_REPLY_BYTES: usize = 64 * 1024 * 1024;

/// Network client for talking to master and replica nodes
#[derive(Debug, Clone)]
pub struct NetworkClient {
    /// Connection timeout
    connect_timeout: Duration,
    /// Bound on writing a request and, for `send`, reading the reply
    request_timeout: Duration,
}

impl NetworkClient {
    /// Create a new network client
    pub fn new(connect_timeout: Duration, request_timeout: Duration) -> Self {
        Self {
            connect_timeout,
            request_timeout,
        }
    }

    /// Send a request and wait for its reply
    pub async fn send(&self, address: &str, request: &Request) -> Result<Reply> {
        let mut stream = self.connect(address).await?;

        let result = timeout(self.request_timeout, async {
            let (mut reader, mut writer) = stream.split();
            write_message(&mut writer, request).await?;
            read_message(&mut reader, MAX_REPLY_BYTES).await
        })
        .await;

        match result {
            Ok(inner) => inner,
            Err(_) => Err(Error::ConnectionTimeout(address.to_string())),
        }
    }

    /// Send without waiting for a reply; the connection is closed afterwards
    pub async fn send_oneway(&self, address: &str, request: &Request) -> Result<()> {
        let mut stream = self.connect(address).await?;

        match timeout(self.request_timeout, write_message(&mut stream, request)).await {
            Ok(inner) => inner,
            Err(_) => Err(Error::ConnectionTimeout(address.to_string())),
        }
    }

    /// Connect to an address
    async fn connect(&self, address: &str) -> Result<TcpStream> {
        let result = timeout(self.connect_timeout, TcpStream::connect(address)).await;

        match result {
            Ok(Ok(stream)) => {
                stream.set_nodelay(true)?;
                Ok(stream)
            }
            Ok(Err(e)) => Err(Error::ConnectionFailed {
                address: address.to_string(),
                reason: e.to_string(),
            }),
            Err(_) => Err(Error::ConnectionTimeout(address.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::operation::Operation;
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn test_connection_failure() {
        let client = NetworkClient::new(Duration::from_millis(100), Duration::from_millis(500));

        // Bind then drop to obtain a port nobody listens on
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        drop(listener);

        let request = Request::Client {
            operation: Operation::create_database("d"),
        };
        let result = client.send(&address, &request).await;
        assert!(matches!(
            result,
            Err(Error::ConnectionFailed { .. }) | Err(Error::ConnectionTimeout(_))
        ));
    }

    #[tokio::test]
    async fn test_silent_peer_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let address = listener.local_addr().unwrap().to_string();
        let _accept = tokio::spawn(async move {
            let (socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(socket);
        });

        let client = NetworkClient::new(Duration::from_millis(500), Duration::from_millis(100));
        let request = Request::Client {
            operation: Operation::create_database("d"),
        };
        let result = client.send(&address, &request).await;
        assert!(matches!(result, Err(Error::ConnectionTimeout(_))));
    }
}
