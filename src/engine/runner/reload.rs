//! Reload notifications for open browser tabs.
//!
//! One thread accepts WebSocket connections, another one broadcasts every
//! [`Reload`] it receives to all connected clients. Pages learn about the
//! socket through the script returned by [`client_script`], which the
//! development server injects into HTML.

use std::fmt::Display;
use std::net::{TcpListener, TcpStream};
use std::sync::mpsc::{Sender, channel};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use camino::Utf8PathBuf;
use tungstenite::WebSocket;

/// Connections kept open at most, older ones are closed first.
const MAX_CLIENTS: usize = 10;

/// What connected pages should do after a rebuild.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Reload {
    /// Reload the whole page.
    Full,
    /// Swap a single stylesheet, given by its path relative to the root.
    Css(Utf8PathBuf),
}

impl Display for Reload {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reload::Full => f.write_str("reload"),
            Reload::Css(path) => write!(f, "css:{path}"),
        }
    }
}

type Clients = Arc<Mutex<Vec<WebSocket<TcpStream>>>>;

pub(crate) struct ReloadServer {
    pub port: u16,
    sender: Sender<Reload>,
    clients: Clients,
    _threads: [JoinHandle<()>; 2],
}

impl ReloadServer {
    /// Binds `preferred`, or any free port when it is taken.
    pub fn start(preferred: u16) -> std::io::Result<Self> {
        let (tcp, port) = reserve_port(preferred)?;
        let clients = Clients::default();

        let incoming = new_thread_ws_incoming(tcp, clients.clone());
        let (sender, broadcast) = new_thread_ws_reload(clients.clone());

        tracing::debug!("reload socket listening on port {port}");

        Ok(Self {
            port,
            sender,
            clients,
            _threads: [incoming, broadcast],
        })
    }

    pub fn send(&self, reload: Reload) {
        if self.sender.send(reload).is_err() {
            tracing::error!("reload thread is gone");
        }
    }

    pub fn clients(&self) -> usize {
        self.clients.lock().map(|c| c.len()).unwrap_or_default()
    }
}

fn reserve_port(preferred: u16) -> std::io::Result<(TcpListener, u16)> {
    let listener = match TcpListener::bind(("127.0.0.1", preferred)) {
        Ok(sock) => sock,
        Err(_) => TcpListener::bind("127.0.0.1:0")?,
    };

    let addr = listener.local_addr()?;
    let port = addr.port();
    Ok((listener, port))
}

fn new_thread_ws_incoming(server: TcpListener, clients: Clients) -> JoinHandle<()> {
    std::thread::spawn(move || {
        for stream in server.incoming() {
            let stream = match stream {
                Ok(stream) => stream,
                Err(e) => {
                    tracing::warn!("reload connection failed: {e}");
                    continue;
                }
            };

            let socket = match tungstenite::accept(stream) {
                Ok(socket) => socket,
                Err(e) => {
                    tracing::warn!("rejected reload client: {e}");
                    continue;
                }
            };

            match clients.lock() {
                Ok(mut clients) => clients.push(socket),
                Err(_) => return,
            }
        }
    })
}

fn new_thread_ws_reload(clients: Clients) -> (Sender<Reload>, JoinHandle<()>) {
    let (tx, rx) = channel::<Reload>();

    let thread = std::thread::spawn(move || {
        while let Ok(reload) = rx.recv() {
            let Ok(mut clients) = clients.lock() else {
                return;
            };
            let message = reload.to_string();
            let mut broken = vec![];

            for (i, socket) in clients.iter_mut().enumerate() {
                match socket.send(message.as_str().into()) {
                    Ok(_) => {}
                    Err(tungstenite::error::Error::Io(e)) => {
                        if e.kind() == std::io::ErrorKind::BrokenPipe {
                            broken.push(i);
                        }
                    }
                    Err(
                        tungstenite::error::Error::ConnectionClosed
                        | tungstenite::error::Error::AlreadyClosed,
                    ) => broken.push(i),
                    Err(e) => {
                        tracing::error!("Error: {e:?}");
                    }
                }
            }

            for i in broken.into_iter().rev() {
                clients.remove(i);
            }

            let len = clients.len();
            if len > MAX_CLIENTS {
                for mut socket in clients.drain(0..len - MAX_CLIENTS) {
                    socket.close(None).ok();
                }
            }
        }
    });

    (tx, thread)
}

/// The `<script>` element connecting a page to the reload socket.
pub(crate) fn client_script(port: u16) -> String {
    format!(
        r#"<script>
(function () {{
  const socket = new WebSocket("ws://" + (location.hostname || "localhost") + ":{port}");
  socket.addEventListener("message", event => {{
    const message = String(event.data);
    if (message.startsWith("css:")) {{
      const path = message.slice(4);
      let swapped = false;
      for (const link of document.querySelectorAll('link[rel="stylesheet"]')) {{
        const url = new URL(link.href);
        if (url.pathname.endsWith(path)) {{
          url.searchParams.set("t", Date.now());
          link.href = url.toString();
          swapped = true;
        }}
      }}
      if (swapped) return;
    }}
    window.location.reload();
  }});
}})();
</script>"#
    )
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    #[test]
    fn test_messages() {
        assert_eq!(Reload::Full.to_string(), "reload");
        assert_eq!(Reload::Css("css/main.css".into()).to_string(), "css:css/main.css");
    }

    #[test]
    fn test_client_script_uses_port() {
        let script = client_script(4242);
        assert!(script.starts_with("<script>"));
        assert!(script.contains(":4242\""));
        assert!(script.trim_end().ends_with("</script>"));
    }

    #[test]
    fn test_taken_port_falls_back() {
        let taken = TcpListener::bind("127.0.0.1:0").unwrap();
        let port = taken.local_addr().unwrap().port();

        let (_listener, other) = reserve_port(port).unwrap();
        assert_ne!(port, other);
    }

    #[test]
    fn test_broadcast_reaches_client() {
        let server = ReloadServer::start(0).unwrap();
        let (mut socket, _) = tungstenite::connect(format!("ws://127.0.0.1:{}", server.port)).unwrap();

        let deadline = Instant::now() + Duration::from_secs(5);
        while server.clients() == 0 && Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(10));
        }

        server.send(Reload::Css("css/main.css".into()));

        let message = socket.read().unwrap();
        assert_eq!(message.to_text().unwrap(), "css:css/main.css");
    }
}
