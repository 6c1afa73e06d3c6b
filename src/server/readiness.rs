use log::{debug, info};
use rand::Rng;
use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::thread;
use std::time::Duration;

/// Upper bound on the delay between two probes.
const BACKOFF_CAP: Duration = Duration::from_secs(32);

/// Spread added to each delay so concurrent waiters do not probe in lockstep.
const JITTER_RANGE_MS: u64 = 250;

/// Probes `host:port` with real `GET /` requests until one answers 200,
/// backing off exponentially between attempts. Returns false once the
/// attempt budget is exhausted.
pub(crate) fn wait_for_ok(
    host: &str,
    port: u16,
    max_attempts: u32,
    probe_timeout: Duration,
) -> bool {
    let mut rng = rand::thread_rng();

    for attempt in 1..=max_attempts {
        let delay = backoff_delay(attempt, rng.gen_range(0..JITTER_RANGE_MS));
        if !delay.is_zero() {
            debug!(
                "waiting {:?} before probe {}/{}",
                delay, attempt, max_attempts
            );
            thread::sleep(delay);
        }

        match probe_once(host, port, probe_timeout) {
            Ok(200) => {
                info!(
                    "server on {}:{} answered probe {} with 200",
                    host, port, attempt
                );
                return true;
            }
            Ok(status) => debug!("probe {}/{} answered {}", attempt, max_attempts, status),
            Err(e) => debug!("probe {}/{} failed: {}", attempt, max_attempts, e),
        }
    }

    false
}

/// Delay inserted before probe `attempt`. The first probe fires immediately,
/// later ones wait `2^n` seconds plus jitter, capped at 32 seconds.
fn backoff_delay(attempt: u32, jitter_ms: u64) -> Duration {
    if attempt < 2 {
        return Duration::ZERO;
    }
    // 2^6 seconds already exceeds the cap.
    let exp = attempt.min(6);
    let delay = Duration::from_secs(1u64 << exp) + Duration::from_millis(jitter_ms);
    delay.min(BACKOFF_CAP)
}

fn probe_once(host: &str, port: u16, timeout: Duration) -> io::Result<u16> {
    let mut stream = TcpStream::connect((host, port))?;
    stream.set_read_timeout(Some(timeout))?;
    stream.set_write_timeout(Some(timeout))?;

    let request = format!("GET / HTTP/1.1\r\nHost: {host}:{port}\r\nConnection: close\r\n\r\n");
    stream.write_all(request.as_bytes())?;

    let mut response = Vec::new();
    stream.read_to_end(&mut response)?;

    status_of(&String::from_utf8_lossy(&response))
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidData, "malformed status line"))
}

fn status_of(response: &str) -> Option<u16> {
    response.lines().next()?.split_whitespace().nth(1)?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_probe_has_no_delay() {
        assert_eq!(backoff_delay(1, 0), Duration::ZERO);
    }

    #[test]
    fn delays_increase_until_the_cap() {
        let mut previous = backoff_delay(2, 0);
        assert_eq!(previous, Duration::from_secs(4));
        for attempt in 3..=5 {
            let delay = backoff_delay(attempt, 0);
            assert!(delay > previous, "attempt {attempt} did not back off");
            previous = delay;
        }
        assert_eq!(backoff_delay(6, 0), BACKOFF_CAP);
        assert_eq!(backoff_delay(60, 0), BACKOFF_CAP);
    }

    #[test]
    fn jitter_never_pushes_past_the_cap() {
        assert_eq!(backoff_delay(5, JITTER_RANGE_MS), BACKOFF_CAP);
        assert!(backoff_delay(2, JITTER_RANGE_MS) < backoff_delay(3, 0));
    }

    #[test]
    fn status_line_parsing() {
        assert_eq!(status_of("HTTP/1.1 200 OK\r\n\r\nbody"), Some(200));
        assert_eq!(status_of("HTTP/1.1 404 Not Found\r\n"), Some(404));
        assert_eq!(status_of("garbage"), None);
        assert_eq!(status_of(""), None);
    }
}
