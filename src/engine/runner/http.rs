use std::net::{SocketAddr, TcpListener};
use std::sync::Arc;
use std::thread;

use axum::Router;
use axum::body::Body;
use axum::extract::{Request, State};
use axum::http::{StatusCode, header};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use camino::Utf8PathBuf;
use console::style;
use tower_http::services::ServeDir;
use tracing::info;

/// Starts the preview server over `root` on its own thread. Binding happens
/// before the thread starts, so a taken port is reported right away.
pub fn start(
    root: Utf8PathBuf,
    port: u16,
    reload_port: u16,
) -> std::io::Result<(SocketAddr, thread::JoinHandle<Result<(), anyhow::Error>>)> {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], port)))?;
    listener.set_nonblocking(true)?;
    let address = listener.local_addr()?;

    info!(url = %style(format!("http://localhost:{}/", address.port())).yellow(), "starting a HTTP server");

    let script: Arc<str> = super::reload::client_script(reload_port).into();

    let handle = thread::spawn(move || {
        tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()?
            .block_on(serve(listener, router(root, script)))
    });

    Ok((address, handle))
}

fn router(root: Utf8PathBuf, script: Arc<str>) -> Router {
    Router::new()
        .fallback_service(ServeDir::new(root))
        .layer(middleware::from_fn_with_state(script, inject))
}

async fn serve(listener: TcpListener, router: Router) -> Result<(), anyhow::Error> {
    let listener = tokio::net::TcpListener::from_std(listener)?;
    axum::serve(listener, router).await?;

    Ok(())
}

/// Adds the reload client to every HTML response.
async fn inject(State(script): State<Arc<str>>, request: Request, next: Next) -> Response {
    let response = next.run(request).await;

    let is_html = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|value| value.starts_with("text/html"));

    if !is_html {
        return response;
    }

    let (mut parts, body) = response.into_parts();
    let bytes = match axum::body::to_bytes(body, usize::MAX).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!("couldn't read response body: {e}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let html = insert_before_body_end(&String::from_utf8_lossy(&bytes), &script);
    parts.headers.remove(header::CONTENT_LENGTH);

    Response::from_parts(parts, Body::from(html))
}

/// Places `snippet` right before the last `</body>`, or at the end of
/// documents without one.
fn insert_before_body_end(html: &str, snippet: &str) -> String {
    let position = html.to_ascii_lowercase().rfind("</body>");
    let mut out = String::with_capacity(html.len() + snippet.len());

    match position {
        Some(i) => {
            out.push_str(&html[..i]);
            out.push_str(snippet);
            out.push_str(&html[i..]);
        }
        None => {
            out.push_str(html);
            out.push_str(snippet);
        }
    }

    out
}
