use super::transport_err;
use hushdns_domain::ResolveError;
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

const MAX_TCP_MESSAGE_SIZE: usize = 65535;

/// One connect-send-receive round trip with 2-byte length framing; used for
/// the truncation retry of the UDP transport.
pub(crate) async fn exchange(
    addr: SocketAddr,
    server: &str,
    message_bytes: &[u8],
) -> Result<Vec<u8>, ResolveError> {
    let mut stream = TcpStream::connect(addr)
        .await
        .map_err(|e| transport_err(server, format_args!("TCP connection failed: {}", e)))?;

    send_with_length_prefix(&mut stream, server, message_bytes).await?;

    debug!(server = %server, message_len = message_bytes.len(), "TCP query sent");

    let response = read_with_length_prefix(&mut stream, server).await?;

    debug!(server = %server, response_len = response.len(), "TCP response received");

    Ok(response)
}

pub(crate) async fn send_with_length_prefix<S>(
    stream: &mut S,
    server: &str,
    message_bytes: &[u8],
) -> Result<(), ResolveError>
where
    S: AsyncWriteExt + Unpin,
{
    let length = message_bytes.len() as u16;
    let length_bytes = length.to_be_bytes();

    stream
        .write_all(&length_bytes)
        .await
        .map_err(|e| transport_err(server, format_args!("failed to write length prefix: {}", e)))?;
    stream
        .write_all(message_bytes)
        .await
        .map_err(|e| transport_err(server, format_args!("failed to write DNS message: {}", e)))?;
    stream
        .flush()
        .await
        .map_err(|e| transport_err(server, format_args!("failed to flush stream: {}", e)))?;

    Ok(())
}

pub(crate) async fn read_with_length_prefix<S>(
    stream: &mut S,
    server: &str,
) -> Result<Vec<u8>, ResolveError>
where
    S: AsyncReadExt + Unpin,
{
    let mut len_buf = [0u8; 2];
    stream
        .read_exact(&mut len_buf)
        .await
        .map_err(|e| transport_err(server, format_args!("failed to read response length: {}", e)))?;

    let response_len = u16::from_be_bytes(len_buf) as usize;

    if response_len > MAX_TCP_MESSAGE_SIZE {
        return Err(transport_err(
            server,
            format_args!(
                "response too large: {} bytes (max {})",
                response_len, MAX_TCP_MESSAGE_SIZE
            ),
        ));
    }

    let mut response = vec![0u8; response_len];
    stream
        .read_exact(&mut response)
        .await
        .map_err(|e| transport_err(server, format_args!("failed to read response body: {}", e)))?;

    Ok(response)
}

#[cfg(test)]
mod tests {
    #[test]
    fn length_prefix_encoding() {
        let len: u16 = 300;
        let bytes = len.to_be_bytes();
        assert_eq!(bytes[0], 1);
        assert_eq!(bytes[1], 44);
        assert_eq!(u16::from_be_bytes(bytes), 300);
    }
}
