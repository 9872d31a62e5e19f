//! Plain TCP open-check and banner capture

use std::net::{IpAddr, SocketAddr};
use std::time::Duration;

use tokio::io::AsyncReadExt;
use tokio::net::TcpStream;
use tokio::time::timeout;

/// Upper bound on a single banner read.
pub(crate) const MAX_BANNER: usize = 1024;

/// How long the open-check lingers for an unsolicited banner.
const BANNER_GRACE: Duration = Duration::from_millis(500);

pub(crate) async fn connect(addr: IpAddr, port: u16, limit: Duration) -> std::io::Result<TcpStream> {
    let sockaddr = SocketAddr::new(addr, port);
    match timeout(limit, TcpStream::connect(sockaddr)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(e),
        Err(_) => Err(std::io::Error::new(
            std::io::ErrorKind::TimedOut,
            "connect timed out",
        )),
    }
}

/// One bounded read with a fresh deadline. Errors and timeouts read as an
/// empty banner.
pub(crate) async fn read_banner(stream: &mut TcpStream, limit: Duration) -> Vec<u8> {
    let mut buf = [0u8; MAX_BANNER];
    match timeout(limit, stream.read(&mut buf)).await {
        Ok(Ok(n)) => buf[..n].to_vec(),
        _ => Vec::new(),
    }
}

/// Open-check with an opportunistic banner grab. An open port whose service
/// stays silent yields `(true, "")`; a refused or timed-out connect yields
/// `(false, "")`. The socket is closed before returning.
pub async fn scan_tcp(addr: IpAddr, port: u16, limit: Duration) -> (bool, String) {
    let mut stream = match connect(addr, port, limit).await {
        Ok(stream) => stream,
        Err(_) => return (false, String::new()),
    };
    let banner = read_banner(&mut stream, BANNER_GRACE).await;
    (true, String::from_utf8_lossy(&banner).into_owned())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use tokio::io::AsyncWriteExt;
    use tokio::net::TcpListener;

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    #[tokio::test]
    async fn closed_port_reports_not_open() {
        // Bind then drop to get a port that refuses connections.
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        let (open, banner) = scan_tcp(LOCALHOST, port, Duration::from_millis(500)).await;
        assert!(!open);
        assert!(banner.is_empty());
    }

    #[tokio::test]
    async fn open_port_with_banner() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            socket.write_all(b"220 fixture ready\r\n").await.unwrap();
        });

        let (open, banner) = scan_tcp(LOCALHOST, port, Duration::from_secs(1)).await;
        assert!(open);
        assert!(banner.starts_with("220"));
    }

    #[tokio::test]
    async fn silent_open_port_yields_empty_banner() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            let (_socket, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(2)).await;
        });

        let (open, banner) = scan_tcp(LOCALHOST, port, Duration::from_secs(1)).await;
        assert!(open);
        assert!(banner.is_empty());
    }
}
