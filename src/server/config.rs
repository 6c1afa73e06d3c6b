use clap::Parser;
use std::fmt;
use std::ops::RangeInclusive;
use std::path::PathBuf;
use std::str::FromStr;

/// Inclusive range of candidate ports, tried in ascending order.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    pub fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn iter(&self) -> RangeInclusive<u16> {
        self.start..=self.end
    }
}

impl FromStr for PortRange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once('-')
            .ok_or_else(|| format!("expected START-END, got {s:?}"))?;
        let start: u16 = start
            .trim()
            .parse()
            .map_err(|e| format!("bad start port: {e}"))?;
        let end: u16 = end.trim().parse().map_err(|e| format!("bad end port: {e}"))?;
        if start > end {
            return Err(format!("start port {start} is above end port {end}"));
        }
        Ok(Self { start, end })
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.start, self.end)
    }
}

#[derive(Parser, Debug, Clone)]
#[command(author, version, about, long_about = None)]
pub struct ServerConfig {
    /// Hostname to bind the listening socket on
    #[arg(long, default_value = "localhost")]
    pub host: String,

    /// Port to listen on (0 asks the OS for an ephemeral port)
    #[arg(short, long, default_value_t = 0)]
    pub port: u16,

    /// Candidate ports tried in ascending order, e.g. 8000-8009
    #[arg(long, conflicts_with = "port")]
    pub port_range: Option<PortRange>,

    /// Root directory with the files to serve
    #[arg(short, long, default_value = "./static")]
    pub document_root: PathBuf,

    /// Idle sleep of the accept loop in milliseconds; bounds how long a
    /// shutdown request can go unnoticed
    #[arg(long, default_value_t = 500)]
    pub poll_interval_ms: u64,

    /// Socket timeout per served connection and per readiness probe, in seconds
    #[arg(long, default_value_t = 2)]
    pub request_timeout: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 0,
            port_range: None,
            document_root: PathBuf::from("./static"),
            poll_interval_ms: 500,
            request_timeout: 2,
        }
    }
}
