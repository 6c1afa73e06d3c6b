use log::{debug, error, info, warn};
use std::fs;
use std::io::{BufReader, BufWriter, Read, Write};
use std::net::TcpStream;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use super::http_status::HttpStatus;

static MIME_TYPES: &[(&str, &str)] = &[
    ("html", "text/html"),
    ("css", "text/css"),
    ("js", "application/javascript"),
    ("json", "application/json"),
    ("txt", "text/plain"),
    ("png", "image/png"),
    ("svg", "image/svg+xml"),
    ("pdf", "application/pdf"),
];

/// Serves exactly one request on `stream` and closes the connection.
pub(crate) fn handle_client(mut stream: TcpStream, document_root: &Path, probes_done: &AtomicBool) {
    let peer_addr = match stream.peer_addr() {
        Ok(addr) => addr.to_string(),
        Err(_) => "unknown".to_string(),
    };

    debug!("handling request from {}", peer_addr);

    let mut buffer = [0u8; 8192];
    let bytes_read = match stream.read(&mut buffer) {
        Ok(0) => {
            debug!("connection closed by client {}", peer_addr);
            return;
        }
        Ok(n) => n,
        Err(e) => {
            transient_error(
                probes_done,
                &format!("error reading from {}: {}", peer_addr, e),
            );
            return;
        }
    };

    let request = String::from_utf8_lossy(&buffer[..bytes_read]);
    let Some((method, path)) = parse_request_line(&request) else {
        debug!("malformed request line from {}", peer_addr);
        send_error(&mut stream, HttpStatus::BadRequest);
        return;
    };

    if path.contains("..") {
        warn!("path traversal attempt from {}: {}", peer_addr, path);
        send_error(&mut stream, HttpStatus::Forbidden);
        return;
    }

    match method {
        "GET" | "HEAD" => serve_path(
            &mut stream,
            document_root,
            path,
            method == "HEAD",
            &peer_addr,
            probes_done,
        ),
        _ => {
            warn!("unsupported method from {}: {}", peer_addr, method);
            send_error(&mut stream, HttpStatus::MethodNotAllowed);
        }
    }
}

fn parse_request_line(request: &str) -> Option<(&str, &str)> {
    let first_line = request.lines().next()?;
    let mut parts = first_line.split_whitespace();
    let method = parts.next()?;
    let target = parts.next()?;
    // Query strings and fragments play no part in file resolution.
    let path = match target.find(['?', '#']) {
        Some(idx) => &target[..idx],
        None => target,
    };
    Some((method, path))
}

fn serve_path(
    stream: &mut TcpStream,
    document_root: &Path,
    path: &str,
    is_head: bool,
    peer_addr: &str,
    probes_done: &AtomicBool,
) {
    let mut file_path = document_root.join(path.trim_start_matches('/'));

    if file_path.is_dir() {
        let index = file_path.join("index.html");
        if index.is_file() {
            file_path = index;
        } else {
            serve_listing(stream, &file_path, path, is_head, peer_addr);
            return;
        }
    }

    if !file_path.exists() {
        info!("file not found for {}: {:?}", peer_addr, file_path);
        send_error(stream, HttpStatus::NotFound);
        return;
    }

    if !file_path.is_file() {
        warn!(
            "refusing non-regular file for {}: {:?}",
            peer_addr, file_path
        );
        send_error(stream, HttpStatus::Forbidden);
        return;
    }

    let metadata = match fs::metadata(&file_path) {
        Ok(meta) => meta,
        Err(e) => {
            error!("error getting metadata for {:?}: {}", file_path, e);
            send_error(stream, HttpStatus::InternalServerError);
            return;
        }
    };

    let headers = format!(
        "{}Content-Type: {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        HttpStatus::Ok.as_response_line(),
        content_type_for(&file_path),
        metadata.len()
    );

    if is_head {
        if let Err(e) = stream.write_all(headers.as_bytes()) {
            transient_error(
                probes_done,
                &format!("error sending HEAD response to {}: {}", peer_addr, e),
            );
        }
        return;
    }

    let file = match fs::File::open(&file_path) {
        Ok(file) => file,
        Err(e) => {
            error!("error opening file {:?} for {}: {}", file_path, peer_addr, e);
            send_error(stream, HttpStatus::InternalServerError);
            return;
        }
    };

    let mut reader = BufReader::new(file);
    let mut writer = BufWriter::new(stream);

    if let Err(e) = writer.write_all(headers.as_bytes()) {
        transient_error(
            probes_done,
            &format!("error sending headers to {}: {}", peer_addr, e),
        );
        return;
    }

    let mut chunk = [0u8; 8192];
    loop {
        match reader.read(&mut chunk) {
            Ok(0) => break,
            Ok(n) => {
                if let Err(e) = writer.write_all(&chunk[..n]) {
                    transient_error(
                        probes_done,
                        &format!("error sending file data to {}: {}", peer_addr, e),
                    );
                    return;
                }
            }
            Err(e) => {
                error!("error reading file {:?}: {}", file_path, e);
                return;
            }
        }
    }

    if let Err(e) = writer.flush() {
        transient_error(
            probes_done,
            &format!("error flushing stream for {}: {}", peer_addr, e),
        );
        return;
    }

    info!(
        "served {:?} to {} ({} bytes)",
        file_path,
        peer_addr,
        metadata.len()
    );
}

fn serve_listing(
    stream: &mut TcpStream,
    dir: &Path,
    request_path: &str,
    is_head: bool,
    peer_addr: &str,
) {
    let body = match render_listing(dir, request_path) {
        Ok(body) => body,
        Err(e) => {
            error!("error listing {:?} for {}: {}", dir, peer_addr, e);
            send_error(stream, HttpStatus::InternalServerError);
            return;
        }
    };

    let head = format!(
        "{}Content-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        HttpStatus::Ok.as_response_line(),
        body.len()
    );

    let result = if is_head {
        stream.write_all(head.as_bytes())
    } else {
        stream
            .write_all(head.as_bytes())
            .and_then(|()| stream.write_all(body.as_bytes()))
    };

    match result {
        Ok(()) => info!("served listing of {:?} to {}", dir, peer_addr),
        Err(e) => error!("error sending listing to {}: {}", peer_addr, e),
    }
}

fn render_listing(dir: &Path, request_path: &str) -> std::io::Result<String> {
    let mut names = Vec::new();
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let mut name = entry.file_name().to_string_lossy().into_owned();
        if entry.file_type()?.is_dir() {
            name.push('/');
        }
        names.push(name);
    }
    names.sort();

    let items: String = names
        .iter()
        .map(|name| format!("<li><a href=\"{name}\">{name}</a></li>\n"))
        .collect();

    Ok(format!(
        "<!DOCTYPE html>\n<html>\n<head><title>Directory listing for {p}</title></head>\n\
         <body>\n<h1>Directory listing for {p}</h1>\n<ul>\n{items}</ul>\n</body>\n</html>\n",
        p = request_path,
    ))
}

fn content_type_for(file_path: &Path) -> &'static str {
    let ext = file_path
        .extension()
        .and_then(|s| s.to_str())
        .unwrap_or("")
        .to_lowercase();

    MIME_TYPES
        .iter()
        .find(|(e, _)| *e == ext)
        .map(|(_, mime)| *mime)
        .unwrap_or("application/octet-stream")
}

fn send_error(stream: &mut TcpStream, status: HttpStatus) {
    let body = format!(
        "<html><body><h1>{} {}</h1></body></html>",
        status.code(),
        status.text()
    );
    let response = format!(
        "{}Content-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status.as_response_line(),
        body.len(),
        body
    );

    if let Err(e) = stream.write_all(response.as_bytes()) {
        debug!("error sending {} response: {}", status.code(), e);
    }
}

// Socket errors raised while the caller is still readiness-probing are
// expected; keep them out of the error log until the first probe lands.
fn transient_error(probes_done: &AtomicBool, message: &str) {
    if probes_done.load(Ordering::Relaxed) {
        error!("{}", message);
    } else {
        debug!("{}", message);
    }
}
