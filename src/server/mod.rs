pub mod config;
pub mod error;
mod handler;
pub mod http_status;
mod readiness;

use log::{debug, error, info, warn};
use std::net::{TcpListener, TcpStream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use config::{PortRange, ServerConfig};
use error::ServerError;

/// Handle to a file server running on a background thread.
///
/// The worker never has to be joined for the owning process to exit; an
/// un-stopped server does not block process termination. Dropping the handle
/// stops the server and releases the listening socket.
pub struct FileServer {
    host: String,
    port: u16,
    document_root: PathBuf,
    shutdown: Arc<AtomicBool>,
    probes_done: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
    probe_timeout: Duration,
}

impl FileServer {
    /// Binds per the config's port policy and launches the serve loop.
    ///
    /// A missing document root is not an error here; requests against it
    /// fail individually with 404.
    pub fn start(config: &ServerConfig) -> Result<Self, ServerError> {
        let listener = match config.port_range {
            Some(range) => Self::bind_range(&config.host, range)?,
            None => Self::bind_single(&config.host, config.port)?,
        };
        let port = listener.local_addr()?.port();
        listener.set_nonblocking(true)?;

        info!(
            "serving {} on http://{}:{}",
            config.document_root.display(),
            config.host,
            port
        );

        let shutdown = Arc::new(AtomicBool::new(false));
        let probes_done = Arc::new(AtomicBool::new(true));

        let serve_loop = ServeLoop {
            listener,
            document_root: config.document_root.clone(),
            shutdown: Arc::clone(&shutdown),
            probes_done: Arc::clone(&probes_done),
            poll_interval: Duration::from_millis(config.poll_interval_ms),
            request_timeout: Duration::from_secs(config.request_timeout),
        };

        let worker = thread::Builder::new()
            .name(format!("httpd-{port}"))
            .spawn(move || serve_loop.run())?;

        Ok(Self {
            host: config.host.clone(),
            port,
            document_root: config.document_root.clone(),
            shutdown,
            probes_done,
            worker: Some(worker),
            probe_timeout: Duration::from_secs(config.request_timeout),
        })
    }

    fn bind_single(host: &str, port: u16) -> Result<TcpListener, ServerError> {
        TcpListener::bind((host, port)).map_err(|source| ServerError::Bind {
            addr: format!("{host}:{port}"),
            source,
        })
    }

    fn bind_range(host: &str, range: PortRange) -> Result<TcpListener, ServerError> {
        info!("trying candidate ports {} on {}", range, host);
        for port in range.iter() {
            match TcpListener::bind((host, port)) {
                Ok(listener) => {
                    info!("bound {}:{}", host, port);
                    return Ok(listener);
                }
                Err(e) => warn!("address {}:{} unavailable: {}", host, port, e),
            }
        }
        Err(ServerError::NoFreeAddress {
            host: host.to_string(),
            start: range.start,
            end: range.end,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Port the socket actually bound, read back after binding.
    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn document_root(&self) -> &Path {
        &self.document_root
    }

    pub fn base_url(&self) -> String {
        format!("http://{}:{}", self.host, self.port)
    }

    /// True until `stop` has reaped the worker.
    pub fn is_running(&self) -> bool {
        self.worker.is_some() && !self.shutdown.load(Ordering::Relaxed)
    }

    /// Blocks until the server answers a `GET /` with status 200.
    ///
    /// Probes back off exponentially between attempts. While the wait is in
    /// progress the worker demotes transient socket errors to debug level;
    /// normal logging resumes once the first probe succeeds. Exhausting
    /// `max_attempts` stops the server before the error is returned.
    pub fn wait_until_ready(&mut self, max_attempts: u32) -> Result<(), ServerError> {
        self.probes_done.store(false, Ordering::Relaxed);
        let ready = readiness::wait_for_ok(&self.host, self.port, max_attempts, self.probe_timeout);
        self.probes_done.store(true, Ordering::Relaxed);

        if ready {
            Ok(())
        } else {
            let base_url = self.base_url();
            self.stop();
            Err(ServerError::ReadinessTimeout {
                base_url,
                attempts: max_attempts,
            })
        }
    }

    /// Signals the serve loop to exit and waits for it to release the
    /// listening socket. The loop observes the signal within one poll
    /// interval. Stopping an already stopped server is a no-op.
    pub fn stop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(worker) = self.worker.take() {
            debug!("waiting for {:?} to exit", worker.thread().name());
            if worker.join().is_err() {
                error!("server worker panicked");
            }
        }
    }
}

impl Drop for FileServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Starts a server for `config` and hands back the handle together with its
/// base URL, e.g. `http://localhost:34567`.
pub fn serve_directory(config: &ServerConfig) -> Result<(FileServer, String), ServerError> {
    let server = FileServer::start(config)?;
    let base_url = server.base_url();
    Ok((server, base_url))
}

/// State owned by the worker thread. Requests are served one at a time;
/// dropping the loop (on exit) closes the listener.
struct ServeLoop {
    listener: TcpListener,
    document_root: PathBuf,
    shutdown: Arc<AtomicBool>,
    probes_done: Arc<AtomicBool>,
    poll_interval: Duration,
    request_timeout: Duration,
}

impl ServeLoop {
    // Consecutive accept failures before the listener counts as unusable.
    const MAX_ACCEPT_FAILURES: u32 = 10;

    fn run(self) {
        debug!("entering request loop");
        let mut accept_failures = 0u32;
        while !self.shutdown.load(Ordering::Relaxed) {
            match self.listener.accept() {
                Ok((stream, addr)) => {
                    accept_failures = 0;
                    debug!("connection from {}", addr);
                    self.serve_connection(stream);
                }
                Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    accept_failures = 0;
                    thread::sleep(self.poll_interval);
                }
                Err(e) => {
                    accept_failures += 1;
                    if accept_failures >= Self::MAX_ACCEPT_FAILURES {
                        error!("listening socket unusable, giving up: {}", e);
                        break;
                    }
                    if self.probes_done.load(Ordering::Relaxed) {
                        error!("error accepting connection: {}", e);
                    } else {
                        debug!("accept failed during startup probing: {}", e);
                    }
                    thread::sleep(self.poll_interval);
                }
            }
        }
        debug!("left request loop");
    }

    fn serve_connection(&self, stream: TcpStream) {
        // The listener is non-blocking; the accepted socket must not be.
        let setup = stream
            .set_nonblocking(false)
            .and_then(|()| stream.set_read_timeout(Some(self.request_timeout)))
            .and_then(|()| stream.set_write_timeout(Some(self.request_timeout)));
        if let Err(e) = setup {
            error!("failed to prepare accepted socket: {}", e);
            return;
        }

        handler::handle_client(stream, &self.document_root, &self.probes_done);
    }
}
