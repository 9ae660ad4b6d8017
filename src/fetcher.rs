//! HTTP access to the watch page, the player API and caption tracks.
//!
//! The pipeline only sees the [`PageFetcher`] and [`TrackFetcher`] traits;
//! [`HttpFetcher`] is the minreq-backed implementation of both.

use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, Select, Sender, TryRecvError, bounded, never};
use regex::Regex;
use serde_json::json;
use tracing::{debug, warn};

use crate::config::FetchConfig;
use crate::error::{ConsentError, FetchError, TranscriptError};
use crate::models::ConsentCookie;

pub const YOUTUBE_BASE_URL: &str = "https://www.youtube.com";
const YOUTUBE_REFERER: &str = "https://www.youtube.com/";
const INNERTUBE_CLIENT_NAME: &str = "ANDROID";
const INNERTUBE_CLIENT_VERSION: &str = "20.10.38";

pub fn watch_url(video_id: &str) -> String {
    format!("{}/watch?v={}", YOUTUBE_BASE_URL, video_id)
}

/// Time budget and cancellation signal shared by every request of one call.
///
/// Cancellation is signalled by dropping the matching [`Canceller`]; every
/// clone of the deadline observes it at once.
#[derive(Clone)]
pub struct Deadline {
    at: Option<Instant>,
    signals: Vec<Receiver<()>>,
}

/// Dropping this (or calling [`Canceller::cancel`]) cancels its deadline.
pub struct Canceller {
    _tx: Sender<()>,
}

impl Canceller {
    pub fn cancel(self) {}
}

impl Deadline {
    /// No time limit and nothing can cancel it.
    pub fn none() -> Self {
        Self {
            at: None,
            signals: vec![never()],
        }
    }

    pub fn after(timeout: Duration) -> Self {
        Self {
            at: Some(Instant::now() + timeout),
            signals: vec![never()],
        }
    }

    pub fn from_timeout(timeout: Option<Duration>) -> Self {
        timeout.map(Self::after).unwrap_or_else(Self::none)
    }

    /// A deadline with the same time limit that can additionally be
    /// cancelled through the returned handle.
    pub fn child(&self) -> (Deadline, Canceller) {
        let (tx, rx) = bounded(0);
        let mut signals = self.signals.clone();
        signals.push(rx);
        (Deadline { at: self.at, signals }, Canceller { _tx: tx })
    }

    pub fn at(&self) -> Option<Instant> {
        self.at
    }

    /// Time left, `None` if there is no limit.
    pub fn remaining(&self) -> Option<Duration> {
        self.at.map(|at| at.saturating_duration_since(Instant::now()))
    }

    pub fn is_cancelled(&self) -> bool {
        self.signals
            .iter()
            .any(|rx| matches!(rx.try_recv(), Err(TryRecvError::Disconnected)))
            || self.remaining() == Some(Duration::ZERO)
    }

    /// Waits `dur`, waking early on cancellation or when the deadline
    /// passes. Returns `false` if the wait was cut short.
    pub fn sleep(&self, dur: Duration) -> bool {
        let wait = match self.remaining() {
            Some(left) if left < dur => left,
            _ => dur,
        };
        let mut sel = Select::new();
        for rx in &self.signals {
            sel.recv(rx);
        }
        if sel.ready_timeout(wait).is_ok() {
            return false;
        }
        wait == dur && !self.is_cancelled()
    }
}

/// Fetches watch pages and player data.
pub trait PageFetcher: Send + Sync {
    /// GET `url`, optionally with the consent cookie attached.
    fn fetch(
        &self,
        url: &str,
        cookie: Option<&ConsentCookie>,
        deadline: &Deadline,
    ) -> Result<String, FetchError>;

    /// POST to the internal player endpoint and return its JSON response.
    fn fetch_player_data(
        &self,
        video_id: &str,
        api_key: &str,
        deadline: &Deadline,
    ) -> Result<serde_json::Value, FetchError>;
}

/// Fetches one caption track payload.
pub trait TrackFetcher: Send + Sync {
    fn fetch_track(&self, url: &str, deadline: &Deadline) -> Result<String, FetchError>;
}

/// Detects the consent interstitial and scrapes the token it carries.
pub struct ConsentWall {
    form: Regex,
    token: Regex,
}

impl ConsentWall {
    pub fn new() -> Result<Self, regex::Error> {
        Ok(Self {
            form: Regex::new(r#"action="https://consent\.youtube\.com/s"#)?,
            token: Regex::new(r#"name="v" value="(.*?)""#)?,
        })
    }

    pub fn is_present(&self, body: &str) -> bool {
        self.form.is_match(body)
    }

    pub fn token<'a>(&self, body: &'a str) -> Option<&'a str> {
        self.token
            .captures(body)
            .and_then(|caps| caps.get(1))
            .map(|m| m.as_str())
    }
}

/// Fetches the watch page of `video_id`, getting past the consent wall if
/// the platform puts one up.
pub fn fetch_video_page(
    fetcher: &dyn PageFetcher,
    wall: &ConsentWall,
    video_id: &str,
    deadline: &Deadline,
) -> Result<String, TranscriptError> {
    let url = watch_url(video_id);
    let body = fetcher.fetch(&url, None, deadline).map_err(TranscriptError::Page)?;
    if !wall.is_present(&body) {
        return Ok(body);
    }

    debug!(%url, "consent required, retrying with cookie");
    let page = fetcher
        .fetch(&url, None, deadline)
        .map_err(ConsentError::Fetch)?;
    let token = wall.token(&page).ok_or(ConsentError::TokenNotFound)?;
    let cookie = ConsentCookie::new(token);

    fetcher
        .fetch(&url, Some(&cookie), deadline)
        .map_err(TranscriptError::Page)
}

/// minreq-backed fetcher with bounded retry.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    config: FetchConfig,
    base_url: String,
}

impl Default for HttpFetcher {
    fn default() -> Self {
        Self::new(FetchConfig::default())
    }
}

impl HttpFetcher {
    pub fn new(config: FetchConfig) -> Self {
        Self {
            config,
            base_url: YOUTUBE_BASE_URL.to_string(),
        }
    }

    /// Points the player API at another host.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn get_once(
        &self,
        url: &str,
        cookie: Option<&ConsentCookie>,
        deadline: &Deadline,
    ) -> Result<String, FetchError> {
        let mut req = minreq::get(url)
            .with_header("Accept-Language", self.config.accept_language.as_str())
            .with_header("User-Agent", self.config.user_agent.as_str());
        if let Some(cookie) = cookie {
            req = req.with_header("Cookie", cookie.header_value());
        }
        if let Some(secs) = timeout_secs(deadline)? {
            req = req.with_timeout(secs);
        }

        let response = req.send()?;
        if !(200..300).contains(&response.status_code) {
            return Err(FetchError::Status {
                status: response.status_code,
            });
        }
        let body = String::from_utf8_lossy(response.as_bytes()).into_owned();
        if body.is_empty() {
            return Err(FetchError::EmptyBody);
        }
        Ok(body)
    }

    fn get_with_retry(
        &self,
        url: &str,
        cookie: Option<&ConsentCookie>,
        deadline: &Deadline,
    ) -> Result<String, FetchError> {
        let attempts = self.config.attempts.max(1);
        let mut last = FetchError::EmptyBody;

        for attempt in 1..=attempts {
            if deadline.is_cancelled() {
                return Err(FetchError::Cancelled);
            }
            debug!(%url, attempt, "GET");
            match self.get_once(url, cookie, deadline) {
                Ok(body) => return Ok(body),
                Err(FetchError::Cancelled) => return Err(FetchError::Cancelled),
                Err(e) => {
                    warn!(%url, attempt, error = %e, "fetch attempt failed");
                    last = e;
                }
            }
            if attempt < attempts && !deadline.sleep(self.config.backoff) {
                return Err(FetchError::Cancelled);
            }
        }

        Err(FetchError::Exhausted {
            url: url.to_string(),
            attempts,
            last: Box::new(last),
        })
    }
}

/// Per-request timeout derived from the deadline, rounded up to whole
/// seconds since that is what minreq takes.
fn timeout_secs(deadline: &Deadline) -> Result<Option<u64>, FetchError> {
    match deadline.remaining() {
        None => Ok(None),
        Some(left) if left.is_zero() => Err(FetchError::Cancelled),
        Some(left) => Ok(Some(left.as_secs() + u64::from(left.subsec_nanos() > 0))),
    }
}

impl PageFetcher for HttpFetcher {
    fn fetch(
        &self,
        url: &str,
        cookie: Option<&ConsentCookie>,
        deadline: &Deadline,
    ) -> Result<String, FetchError> {
        self.get_with_retry(url, cookie, deadline)
    }

    fn fetch_player_data(
        &self,
        video_id: &str,
        api_key: &str,
        deadline: &Deadline,
    ) -> Result<serde_json::Value, FetchError> {
        let player_url = format!("{}/youtubei/v1/player?key={}", self.base_url, api_key);
        debug!(video_id, "POST player API");

        let mut req = minreq::post(player_url)
            .with_header("Content-Type", "application/json")
            .with_header("User-Agent", self.config.user_agent.as_str())
            .with_header("Referer", YOUTUBE_REFERER)
            .with_json(&json!({
                "context": {
                    "client": {
                        "clientName": INNERTUBE_CLIENT_NAME,
                        "clientVersion": INNERTUBE_CLIENT_VERSION
                    }
                },
                "videoId": video_id
            }))?;
        if let Some(secs) = timeout_secs(deadline)? {
            req = req.with_timeout(secs);
        }

        let response = req.send()?;
        if !(200..300).contains(&response.status_code) {
            return Err(FetchError::Status {
                status: response.status_code,
            });
        }
        Ok(response.json::<serde_json::Value>()?)
    }
}

impl TrackFetcher for HttpFetcher {
    fn fetch_track(&self, url: &str, deadline: &Deadline) -> Result<String, FetchError> {
        self.get_with_retry(url, None, deadline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use std::net::{TcpListener, TcpStream};
    use std::sync::Mutex;
    use std::thread;

    /// Serves one canned response per connection and hands back the raw
    /// requests it saw.
    fn serve(responses: Vec<(&'static str, &'static str)>) -> (String, thread::JoinHandle<Vec<String>>) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = format!("http://{}", listener.local_addr().unwrap());
        let handle = thread::spawn(move || {
            let mut seen = Vec::new();
            for (status, body) in responses {
                let (mut stream, _) = listener.accept().unwrap();
                seen.push(read_request(&mut stream));
                write_response(&mut stream, status, body);
            }
            seen
        });
        (addr, handle)
    }

    fn read_request(stream: &mut TcpStream) -> String {
        let mut buffer = Vec::new();
        let mut chunk = [0; 256];
        let body_start = loop {
            let n = stream.read(&mut chunk).unwrap();
            buffer.extend_from_slice(&chunk[..n]);
            if let Some(pos) = buffer.windows(4).position(|w| w == b"\r\n\r\n") {
                break pos + 4;
            }
            if n == 0 {
                break buffer.len();
            }
        };
        let head = String::from_utf8_lossy(&buffer[..body_start]).into_owned();
        let content_length = head
            .lines()
            .find(|l| l.to_ascii_lowercase().starts_with("content-length:"))
            .and_then(|l| l.split(':').nth(1))
            .and_then(|v| v.trim().parse::<usize>().ok())
            .unwrap_or(0);
        while buffer.len() < body_start + content_length {
            let n = stream.read(&mut chunk).unwrap();
            if n == 0 {
                break;
            }
            buffer.extend_from_slice(&chunk[..n]);
        }
        String::from_utf8_lossy(&buffer).into_owned()
    }

    fn write_response(stream: &mut TcpStream, status: &str, body: &str) {
        let head = format!(
            "HTTP/1.1 {}\r\nContent-Type: text/html\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
            status,
            body.len()
        );
        stream.write_all(head.as_bytes()).unwrap();
        stream.write_all(body.as_bytes()).unwrap();
        stream.flush().unwrap();
    }

    fn fast_fetcher(attempts: u32) -> HttpFetcher {
        HttpFetcher::new(FetchConfig {
            attempts,
            backoff: Duration::ZERO,
            ..FetchConfig::default()
        })
    }

    #[test]
    fn retries_until_success() {
        let (addr, server) = serve(vec![
            ("500 Internal Server Error", "oops"),
            ("200 OK", ""),
            ("200 OK", "<html>page</html>"),
        ]);
        let body = fast_fetcher(3)
            .fetch(&format!("{addr}/watch?v=abc"), None, &Deadline::none())
            .unwrap();
        assert_eq!(body, "<html>page</html>");

        let requests = server.join().unwrap();
        assert_eq!(requests.len(), 3);
        assert!(requests[0].starts_with("GET /watch?v=abc"));
        assert!(requests[0].contains("Accept-Language: en-US"));
    }

    #[test]
    fn gives_up_after_attempts() {
        let (addr, server) = serve(vec![("503 Service Unavailable", "busy"), ("404 Not Found", "nope")]);
        let err = fast_fetcher(2)
            .fetch_track(&format!("{addr}/api/timedtext"), &Deadline::none())
            .unwrap_err();
        match err {
            FetchError::Exhausted { attempts, last, .. } => {
                assert_eq!(attempts, 2);
                assert!(matches!(*last, FetchError::Status { status: 404 }));
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(server.join().unwrap().len(), 2);
    }

    #[test]
    fn sends_consent_cookie() {
        let (addr, server) = serve(vec![("200 OK", "ok")]);
        let cookie = ConsentCookie::new("abc");
        fast_fetcher(1)
            .fetch(&format!("{addr}/watch?v=x"), Some(&cookie), &Deadline::none())
            .unwrap();
        let requests = server.join().unwrap();
        assert!(requests[0].contains("Cookie: CONSENT=YES+abc"));
    }

    #[test]
    fn player_api_posts_context() {
        let (addr, server) = serve(vec![(
            "200 OK",
            r#"{"captions":{"playerCaptionsTracklistRenderer":{"captionTracks":[]}}}"#,
        )]);
        let data = fast_fetcher(1)
            .with_base_url(addr)
            .fetch_player_data("vid123", "KEY", &Deadline::none())
            .unwrap();
        assert!(data.get("captions").is_some());

        let requests = server.join().unwrap();
        assert!(requests[0].starts_with("POST /youtubei/v1/player?key=KEY"));
        assert!(requests[0].contains(r#""videoId":"vid123""#));
        assert!(requests[0].contains(r#""clientName":"ANDROID""#));
    }

    #[test]
    fn cancelled_deadline_skips_request() {
        let (deadline, canceller) = Deadline::none().child();
        canceller.cancel();
        assert!(deadline.is_cancelled());
        let err = fast_fetcher(3)
            .fetch_track("http://127.0.0.1:9/never", &deadline)
            .unwrap_err();
        assert!(matches!(err, FetchError::Cancelled));
    }

    #[test]
    fn sleep_wakes_on_cancel() {
        let (deadline, canceller) = Deadline::none().child();
        let start = Instant::now();
        let waiter = thread::spawn(move || deadline.sleep(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(20));
        drop(canceller);
        assert!(!waiter.join().unwrap());
        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn sleep_stops_at_deadline() {
        let deadline = Deadline::after(Duration::from_millis(30));
        assert!(!deadline.sleep(Duration::from_secs(10)));
        thread::sleep(Duration::from_millis(5));
        assert!(deadline.is_cancelled());
        assert!(Deadline::none().sleep(Duration::from_millis(1)));
    }

    struct ScriptedPages {
        pages: Mutex<Vec<&'static str>>,
        cookies: Mutex<Vec<Option<ConsentCookie>>>,
    }

    impl ScriptedPages {
        fn new(mut pages: Vec<&'static str>) -> Self {
            pages.reverse();
            Self {
                pages: Mutex::new(pages),
                cookies: Mutex::new(Vec::new()),
            }
        }
    }

    impl PageFetcher for ScriptedPages {
        fn fetch(
            &self,
            _url: &str,
            cookie: Option<&ConsentCookie>,
            _deadline: &Deadline,
        ) -> Result<String, FetchError> {
            self.cookies.lock().unwrap().push(cookie.cloned());
            self.pages
                .lock()
                .unwrap()
                .pop()
                .map(str::to_string)
                .ok_or(FetchError::EmptyBody)
        }

        fn fetch_player_data(
            &self,
            _video_id: &str,
            _api_key: &str,
            _deadline: &Deadline,
        ) -> Result<serde_json::Value, FetchError> {
            unreachable!()
        }
    }

    const CONSENT_PAGE: &str = r#"<form action="https://consent.youtube.com/s" method="POST"><input type="hidden" name="v" value="cb.123"></form>"#;

    #[test]
    fn plain_page_needs_one_fetch() {
        let wall = ConsentWall::new().unwrap();
        let fetcher = ScriptedPages::new(vec!["<html>video</html>"]);
        let body = fetch_video_page(&fetcher, &wall, "abc", &Deadline::none()).unwrap();
        assert_eq!(body, "<html>video</html>");
        assert_eq!(fetcher.cookies.lock().unwrap().len(), 1);
    }

    #[test]
    fn consent_wall_refetches_with_cookie() {
        let wall = ConsentWall::new().unwrap();
        let fetcher = ScriptedPages::new(vec![CONSENT_PAGE, CONSENT_PAGE, "<html>video</html>"]);
        let body = fetch_video_page(&fetcher, &wall, "abc", &Deadline::none()).unwrap();
        assert_eq!(body, "<html>video</html>");

        let cookies = fetcher.cookies.lock().unwrap();
        assert_eq!(cookies.len(), 3);
        assert!(cookies[0].is_none() && cookies[1].is_none());
        assert_eq!(cookies[2].as_ref().unwrap().value, "YES+cb.123");
    }

    #[test]
    fn consent_token_missing_is_an_error() {
        let wall = ConsentWall::new().unwrap();
        let fetcher = ScriptedPages::new(vec![
            CONSENT_PAGE,
            r#"<form action="https://consent.youtube.com/s"></form>"#,
        ]);
        let err = fetch_video_page(&fetcher, &wall, "abc", &Deadline::none()).unwrap_err();
        assert!(matches!(err, TranscriptError::Consent(ConsentError::TokenNotFound)));
    }

    #[test]
    fn consent_cookie_fetch_failure_is_an_error() {
        let wall = ConsentWall::new().unwrap();
        let fetcher = ScriptedPages::new(vec![CONSENT_PAGE, CONSENT_PAGE]);
        let err = fetch_video_page(&fetcher, &wall, "abc", &Deadline::none()).unwrap_err();
        assert!(matches!(err, TranscriptError::Page(FetchError::EmptyBody)));
    }
}
