use bytes::Bytes;
use futures::StreamExt;
use http_body_util::{combinators::UnsyncBoxBody, BodyExt, Full, StreamBody};
use hyper::{
    body::{Frame, Incoming},
    header::{HeaderValue, CACHE_CONTROL, CONNECTION, CONTENT_TYPE},
    server::conn::http1,
    service::service_fn,
    Method, Request, Response, StatusCode,
};
use hyper_util::rt::TokioIo;
use serde_json::json;
use std::{convert::Infallible, future::Future, io, sync::Arc, time::Duration};
use tokio::net::TcpListener;
use tracing::{debug, error, info};

use crate::{
    dispatcher::{Reply, RequestDispatcher},
    live::LiveFeed,
    store::SnapshotStore,
};

type Body = UnsyncBoxBody<Bytes, Infallible>;

const API_PREFIX: &str = "/api/";
const ADMIN_PREFIX: &str = "/api/admin/";

/// Pause after a failed accept, e.g. while the process is out of file descriptors.
const ACCEPT_RETRY_DELAY: Duration = Duration::from_millis(100);

#[derive(Clone)]
pub struct ApiState {
    pub dispatcher: Arc<RequestDispatcher>,
    pub store: Arc<SnapshotStore>,
    pub staleness_threshold_secs: u64,
}

pub async fn run_http_server(address: String, state: ApiState) -> io::Result<()> {
    let listener = TcpListener::bind(&address).await?;
    info!("🌐 Portal API listening on http://{}", address);
    serve(listener, state).await;
    Ok(())
}

/// Accept connections on an already bound listener, one task per connection.
///
/// Never returns: a failed accept only costs the connection being accepted.
pub async fn serve(listener: TcpListener, state: ApiState) {
    loop {
        let (stream, peer) = accept_retrying(|| listener.accept()).await;
        debug!("Accepted connection from {}", peer);
        let io = TokioIo::new(stream);
        let state = state.clone();

        tokio::task::spawn(async move {
            let service = service_fn(move |req| {
                let state = state.clone();
                async move { handle_request(req, state).await }
            });

            if let Err(err) = http1::Builder::new()
                .keep_alive(true)
                .serve_connection(io, service)
                .await
            {
                error!("Error serving connection: {:?}", err);
            }
        });
    }
}

/// Run `accept` until it succeeds, logging each failure and backing off
/// before the next attempt.
async fn accept_retrying<T, F, Fut>(mut accept: F) -> T
where
    F: FnMut() -> Fut,
    Fut: Future<Output = io::Result<T>>,
{
    loop {
        match accept().await {
            Ok(accepted) => return accepted,
            Err(e) => {
                error!("Failed to accept connection: {}", e);
                tokio::time::sleep(ACCEPT_RETRY_DELAY).await;
            }
        }
    }
}

async fn handle_request(
    req: Request<Incoming>,
    state: ApiState,
) -> Result<Response<Body>, Infallible> {
    let path = req.uri().path().to_string();
    let query = req.uri().query().map(str::to_string);

    let response = match (req.method().clone(), path.as_str()) {
        (Method::GET, "/health") => serve_health(&state),
        (Method::GET, path) if path.starts_with(ADMIN_PREFIX) => {
            let method = &path[ADMIN_PREFIX.len()..];
            match state.dispatcher.handle_admin(method) {
                Some(reply) => reply_response(reply),
                None => not_found(),
            }
        }
        (Method::GET, path) if path.starts_with(API_PREFIX) => {
            let method = &path[API_PREFIX.len()..];
            match state.dispatcher.handle(method, query.as_deref()).await {
                Ok(Some(reply)) => reply_response(reply),
                Ok(None) => not_found(),
                Err(e) => {
                    error!("Error handling API method {}: {}", method, e);
                    json_response(
                        StatusCode::INTERNAL_SERVER_ERROR,
                        json!({ "result": "error", "message": "Internal server error" }).to_string(),
                    )
                }
            }
        }
        _ => not_found(),
    };

    Ok(response)
}

fn reply_response(reply: Reply) -> Response<Body> {
    match reply {
        Reply::Json(body) => json_response(StatusCode::OK, body),
        Reply::EventStream(feed) => event_stream_response(feed),
    }
}

fn json_response(status: StatusCode, body: String) -> Response<Body> {
    let mut response = Response::new(Full::new(Bytes::from(body)).boxed_unsync());
    *response.status_mut() = status;
    response
        .headers_mut()
        .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
    response
}

fn event_stream_response(feed: LiveFeed) -> Response<Body> {
    debug!("Streaming live stats to subscriber {}", feed.id());
    let body = StreamBody::new(feed.map(|chunk| Ok::<_, Infallible>(Frame::data(chunk))));

    let mut response = Response::new(body.boxed_unsync());
    let headers = response.headers_mut();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(CONNECTION, HeaderValue::from_static("keep-alive"));
    response
}

fn not_found() -> Response<Body> {
    let mut response = Response::new(Full::new(Bytes::from("Not Found")).boxed_unsync());
    *response.status_mut() = StatusCode::NOT_FOUND;
    response
}

fn serve_health(state: &ApiState) -> Response<Body> {
    let stale = state.store.is_stale(state.staleness_threshold_secs);
    let status_code = if stale {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    let json_response_body = json!({
        "healthy": !stale,
        "stale": stale
    });
    json_response(status_code, json_response_body.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_accept_retries_after_errors() {
        let mut attempts = 0;
        let accepted = accept_retrying(|| {
            attempts += 1;
            let attempt = attempts;
            async move {
                if attempt < 3 {
                    Err(io::Error::new(io::ErrorKind::Other, "Too many open files"))
                } else {
                    Ok(attempt)
                }
            }
        })
        .await;

        assert_eq!(accepted, 3);
    }

    #[tokio::test]
    async fn test_accept_returns_first_success() {
        let accepted = accept_retrying(|| async { Ok::<_, io::Error>("conn") }).await;
        assert_eq!(accepted, "conn");
    }
}
