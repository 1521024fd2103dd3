use tokio::time::Duration;
use tonic::transport::{Channel, Endpoint};

#[derive(Debug, thiserror::Error)]
pub enum RpcError {
    #[error("Invalid address '{0}'")]
    InvalidAddress(String),
    #[error("Failed to connect: {0}")]
    Connect(String),
    #[error("Un-modeled failure from RPC call: {0}")]
    Status(#[from] tonic::Status),
    #[error("Malformed reply: {0}")]
    MalformedReply(String),
    #[error("Value does not fit the int32 wire format: {0}")]
    OutOfRange(String),
}

/// Builds a channel that connects on first use, so a peer that is down when we boot only fails
/// the calls made while it is down.
pub(super) fn lazy_channel(addr: &str, rpc_timeout: Duration) -> Result<Channel, RpcError> {
    let url = if addr.contains("://") {
        addr.to_string()
    } else {
        format!("http://{}", addr)
    };

    let endpoint = Endpoint::from_shared(url).map_err(|_| RpcError::InvalidAddress(addr.to_string()))?;

    endpoint
        .timeout(rpc_timeout)
        .connect_lazy()
        .map_err(|e| RpcError::Connect(e.to_string()))
}
