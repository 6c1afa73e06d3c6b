//! Ephemeral HTTP file server for test scaffolding.
//!
//! Serves a directory's files over HTTP on a background thread so test code
//! can fetch fixtures (a fake debug-symbol server, for instance) without
//! spawning an external process. The caller gets a [`FileServer`] handle and
//! a base URL; dropping or stopping the handle releases the socket.
//!
//! ```no_run
//! use fixture_server::{serve_directory, ServerConfig};
//!
//! let config = ServerConfig {
//!     document_root: "/tmp/fixtures".into(),
//!     ..ServerConfig::default()
//! };
//! let (mut server, base_url) = serve_directory(&config)?;
//! // fetch {base_url}/a.txt ...
//! server.stop();
//! # Ok::<(), fixture_server::ServerError>(())
//! ```

pub mod logger;
pub mod server;

pub use server::config::{PortRange, ServerConfig};
pub use server::error::ServerError;
pub use server::{FileServer, serve_directory};
