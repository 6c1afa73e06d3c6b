use thiserror::Error;

/// Errors surfaced by the start and readiness sequences.
///
/// Per-request failures are answered with HTTP error responses and never
/// reach the caller of `start`.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Binding the requested address failed.
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    /// Every candidate port in the range was already taken.
    #[error("no free address on {host} in ports {start}-{end}")]
    NoFreeAddress { host: String, start: u16, end: u16 },

    /// The server never answered a probe within the attempt budget.
    #[error("server at {base_url} not ready after {attempts} probes")]
    ReadinessTimeout { base_url: String, attempts: u32 },

    /// Socket or thread setup failure after a successful bind.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
