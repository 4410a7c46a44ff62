/// Network stage a transaction is in, as reported by `Transaction::load_state`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoadState {
    #[default]
    Idle,
    /// Queued behind earlier requests on a pipelined connection.
    WaitingForAvailableSocket,
    ResolvingHost,
    Connecting,
    /// CONNECT exchange with the proxy.
    EstablishingProxyTunnel,
    SslHandshake,
    /// Suspended until the application calls `resume()` or `pause()`.
    WaitingForCertificateDecision,
    SendingRequest,
    WaitingForResponse,
    ReadingResponse,
}

impl LoadState {
    pub fn is_active(&self) -> bool {
        *self != LoadState::Idle
    }
}
