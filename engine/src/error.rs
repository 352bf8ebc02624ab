/// Failures talking to the daemon.
#[derive(Debug)]
pub enum RpcError {
    /// The connection could not be made, or broke down mid-request.
    Transport(std::io::Error),
    /// The daemon answered with something that is not a valid response.
    Protocol(String),
    /// The daemon rejected the call.
    Fault { code: i64, message: String },
    /// The item disappeared, or never existed.
    HashNotFound(String),
}

impl RpcError {
    pub fn protocol(message: impl Into<String>) -> Self {
        RpcError::Protocol(message.into())
    }
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::Transport(e) => write!(f, "Transport error: {}", e),
            RpcError::Protocol(message) => write!(f, "Protocol error: {}", message),
            RpcError::Fault { code, message } => {
                write!(f, "RPC fault {}: {}", code, message)
            }
            RpcError::HashNotFound(message) => write!(f, "Info-hash not found: {}", message),
        }
    }
}

impl std::error::Error for RpcError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            RpcError::Transport(e) => Some(e),
            _ => None,
        }
    }
}

impl From<std::io::Error> for RpcError {
    fn from(error: std::io::Error) -> Self {
        RpcError::Transport(error)
    }
}

impl From<serde_json::Error> for RpcError {
    fn from(error: serde_json::Error) -> Self {
        RpcError::Protocol(format!("invalid JSON: {}", error))
    }
}
