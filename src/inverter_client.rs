use crate::error::TransportError;
use crate::frame_decoder::MAX_FRAME_LEN;
use async_trait::async_trait;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::timeout;

/// One request/response round trip with the inverter.
#[async_trait]
pub trait InverterTransport: Send {
    /// Sends `request` and returns whatever the inverter answered in a single read.
    async fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError>;
}

/// Opens a fresh TCP connection for every exchange and drops it before returning.
pub struct TcpInverterTransport {
    endpoint: String,
    timeout: Duration,
}

impl TcpInverterTransport {
    pub fn new(host: &str, port: u16, timeout: Duration) -> Self {
        Self {
            endpoint: format!("{host}:{port}"),
            timeout,
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    async fn connect(&self) -> Result<TcpStream, TransportError> {
        match timeout(self.timeout, TcpStream::connect(&self.endpoint)).await {
            Ok(Ok(stream)) => Ok(stream),
            Ok(Err(source)) => Err(TransportError::Connect {
                endpoint: self.endpoint.clone(),
                source,
            }),
            Err(_) => Err(TransportError::ConnectTimeout {
                endpoint: self.endpoint.clone(),
            }),
        }
    }
}

#[async_trait]
impl InverterTransport for TcpInverterTransport {
    async fn exchange(&mut self, request: &[u8]) -> Result<Vec<u8>, TransportError> {
        let mut stream = self.connect().await?;
        exchange_on(&mut stream, request, self.timeout).await
    }
}

/// Writes the request and performs one read of at most [`MAX_FRAME_LEN`] bytes.
pub async fn exchange_on<S>(
    stream: &mut S,
    request: &[u8],
    read_timeout: Duration,
) -> Result<Vec<u8>, TransportError>
where
    S: AsyncRead + AsyncWrite + Unpin + Send,
{
    stream
        .write_all(request)
        .await
        .map_err(TransportError::Send)?;

    let mut buffer = vec![0u8; MAX_FRAME_LEN];
    let received = match timeout(read_timeout, stream.read(&mut buffer)).await {
        Ok(Ok(received)) => received,
        Ok(Err(e)) => return Err(TransportError::Receive(e)),
        Err(_) => return Err(TransportError::ReceiveTimeout),
    };
    buffer.truncate(received);
    Ok(buffer)
}
