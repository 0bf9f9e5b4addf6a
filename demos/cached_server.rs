//! A tiny HTTP endpoint wired through the output cache.
//!
//! Routes:
//!
//! | Route               | Policy     | Behavior                                  |
//! |---------------------|------------|-------------------------------------------|
//! | `GET /`             | base       | 10 s TTL, no vary                         |
//! | `GET /public`       | `Vary30`   | 30 s TTL, varies on `varyOnThis`          |
//! | `GET /tagged`       | `Tagged20` | 20 s TTL, grouped under `tag-expire`      |
//! | `GET /volatile`     | `Volatile` | `no-store` — rendered on every request    |
//! | `POST /purge/<tag>` | —          | evicts every entry grouped under `<tag>`  |
//!
//! Run with `cargo run --example cached_server`, then e.g.:
//!
//! ```text
//! curl -v http://127.0.0.1:8080/tagged
//! curl -X POST http://127.0.0.1:8080/purge/tag-expire
//! ```

use std::convert::Infallible;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use bytes::BytesMut;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info, warn};

use outcache::cache::{OutputCache, ProducedResponse};
use outcache::http::request::RequestError;
use outcache::http::{Method, Request, Response, StatusCode};
use outcache::policy::{CachePolicy, PolicyRegistry};

struct App {
    cache: OutputCache,
    base: Arc<CachePolicy>,
    vary30: Arc<CachePolicy>,
    tagged20: Arc<CachePolicy>,
    volatile: Arc<CachePolicy>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,outcache=debug".into()),
        )
        .init();

    // All policy validation happens here; a bad combination aborts startup.
    let mut registry = PolicyRegistry::new();
    registry.register(CachePolicy::base().ttl(Duration::from_secs(10)))?;
    registry.register(
        CachePolicy::named("Vary30")
            .ttl(Duration::from_secs(30))
            .vary_on(["varyOnThis"])
            .public(),
    )?;
    registry.register(
        CachePolicy::named("Tagged20")
            .ttl(Duration::from_secs(20))
            .tag("tag-expire")
            .public(),
    )?;
    registry.register(CachePolicy::named("Volatile").no_store())?;

    // Each route resolves its policy once, at startup.
    let app = Arc::new(App {
        cache: OutputCache::new(),
        base: registry.resolve(None)?,
        vary30: registry.resolve(Some("Vary30"))?,
        tagged20: registry.resolve(Some("Tagged20"))?,
        volatile: registry.resolve(Some("Volatile"))?,
    });

    let listener = TcpListener::bind("127.0.0.1:8080").await?;
    info!(address = "127.0.0.1:8080", "cached_server listening");

    loop {
        let (stream, peer) = listener.accept().await?;
        debug!(peer = %peer, "connection accepted");
        let app = Arc::clone(&app);
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, app).await {
                warn!(peer = %peer, error = %e, "connection closed with error");
            }
        });
    }
}

/// One request per iteration until the peer closes or sends `Connection: close`.
async fn handle_connection(mut stream: TcpStream, app: Arc<App>) -> std::io::Result<()> {
    let mut buf = BytesMut::with_capacity(4096);

    loop {
        if stream.read_buf(&mut buf).await? == 0 {
            break;
        }

        let (request, body_offset) = match Request::parse(&buf) {
            Ok(pair) => pair,
            Err(RequestError::Incomplete) => continue,
            Err(e) => {
                warn!(error = %e, "bad request");
                let response = Response::new(StatusCode::BadRequest)
                    .body(format!("Bad Request: {e}"))
                    .keep_alive(false);
                stream.write_all(&response.into_bytes()).await?;
                break;
            }
        };

        let total_needed = body_offset + request.content_length().unwrap_or(0);
        if buf.len() < total_needed {
            continue;
        }

        let keep_alive = request.is_keep_alive();
        let response = dispatch(&app, &request).await;
        stream.write_all(&response.into_bytes()).await?;
        stream.flush().await?;

        let _ = buf.split_to(total_needed);
        if !keep_alive {
            break;
        }
    }

    Ok(())
}

async fn dispatch(app: &App, request: &Request) -> Response {
    match (request.method(), request.path()) {
        (Method::Get, "/") => serve(app, &app.base, request, "Home").await,
        (Method::Get, "/public") => serve(app, &app.vary30, request, "Public").await,
        (Method::Get, "/tagged") => serve(app, &app.tagged20, request, "Tagged").await,
        (Method::Get, "/volatile") => serve(app, &app.volatile, request, "Volatile").await,
        (Method::Post, path) if path.starts_with("/purge/") => {
            let tag = &path["/purge/".len()..];
            app.cache.evict_by_tag(tag).await;
            Response::new(StatusCode::NoContent)
        }
        _ => Response::new(StatusCode::NotFound).body("Not Found"),
    }
}

async fn serve(app: &App, policy: &CachePolicy, request: &Request, title: &str) -> Response {
    let result = app
        .cache
        .handle(policy, request, || async {
            Ok::<_, Infallible>(render(title, request))
        })
        .await;
    match result {
        Ok(response) => response,
        Err(e) => match e {},
    }
}

/// The "expensive" render step — watch the log to see when it actually runs.
fn render(title: &str, request: &Request) -> ProducedResponse {
    info!(path = request.path(), "rendering fresh page");
    let rendered_at = httpdate::fmt_http_date(SystemTime::now());
    let vary = request.query_param("varyOnThis").unwrap_or("-");
    ProducedResponse::html(format!(
        "<!DOCTYPE html>\n<html><body>\n<h1>{title}</h1>\n\
         <p>rendered at {rendered_at}</p>\n<p>varyOnThis = {vary}</p>\n\
         </body></html>\n"
    ))
}
