use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tiny_http::{Header, Method, Request, Response, Server};
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::errors::AppError;

const OVERLAY_HTML: &str = include_str!("overlay.html");
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Local HTTP endpoint for browser sources.
///
/// `GET /` serves a transparent overlay page, `GET /heartrate` the latest BPM
/// as a bare JSON number.
#[derive(Clone)]
pub struct HttpSink {
    server: Arc<Server>,
}

impl HttpSink {
    pub fn bind(host_ip: &str, port: u16) -> Result<Self, AppError> {
        let addr = format!("{host_ip}:{port}");
        let server = Server::http(&addr).map_err(|e| AppError::HttpBind {
            addr: addr.clone(),
            reason: e.to_string(),
        })?;
        info!("HTTP overlay listening on http://{addr}");
        Ok(Self {
            server: Arc::new(server),
        })
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.server.server_addr().to_ip()
    }
}

enum Route {
    Overlay,
    HeartRate,
    NotFound,
}

fn route(method: &Method, url: &str) -> Route {
    let path = url.split('?').next().unwrap_or_default();
    match (method, path) {
        (Method::Get, "/") => Route::Overlay,
        (Method::Get, "/heartrate") => Route::HeartRate,
        _ => Route::NotFound,
    }
}

fn respond(request: Request, bpm: u16) {
    let (body, kind, status): (String, &str, u16) = match route(request.method(), request.url()) {
        Route::Overlay => (OVERLAY_HTML.to_owned(), "text/html; charset=utf-8", 200),
        Route::HeartRate => {
            let body = serde_json::to_string(&bpm).unwrap_or_else(|_| bpm.to_string());
            (body, "application/json", 200)
        }
        Route::NotFound => ("Not Found".to_owned(), "text/plain", 404),
    };
    let mut response = Response::from_string(body).with_status_code(status);
    if let Ok(header) = Header::from_bytes(&b"Content-Type"[..], kind.as_bytes()) {
        response.add_header(header);
    }
    if let Err(e) = request.respond(response) {
        warn!("Failed to send HTTP response: {e}");
    }
}

/// Serves requests until cancelled. Blocking, run it with `spawn_blocking`.
pub fn http_thread(sink: HttpSink, bpm_rx: watch::Receiver<u16>, cancel_token: CancellationToken) {
    info!("HTTP thread started!");
    while !cancel_token.is_cancelled() {
        match sink.server.recv_timeout(POLL_INTERVAL) {
            Ok(Some(request)) => {
                debug!("{} {}", request.method(), request.url());
                let bpm = *bpm_rx.borrow();
                respond(request, bpm);
            }
            Ok(None) => {}
            Err(e) => {
                error!("HTTP server error: {e}");
                break;
            }
        }
    }
    info!("Shutting down HTTP thread!");
}
