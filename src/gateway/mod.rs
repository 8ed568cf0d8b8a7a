//! The persistent connection endpoint: accepts a WebSocket upgrade per
//! client, authenticates it, and hands it off to [`connection::run`] for
//! the rest of its lifecycle. One task per live socket, per §5's
//! scheduling model.

mod connection;
mod dispatch;

use crate::state::Hub;
use tokio::net::TcpListener;
use tracing::{error, info, instrument};

pub struct Gateway {
    listener: TcpListener,
    hub: Hub,
}

impl Gateway {
    pub async fn bind(addr: &str, hub: Hub) -> std::io::Result<Self> {
        let listener = TcpListener::bind(addr).await?;
        info!(%addr, "gateway listening");
        Ok(Self { listener, hub })
    }

    #[instrument(skip(self), name = "gateway")]
    pub async fn run(self) -> std::io::Result<()> {
        loop {
            let (stream, addr) = match self.listener.accept().await {
                Ok(pair) => pair,
                Err(e) => {
                    error!(error = %e, "failed to accept connection");
                    continue;
                }
            };

            let hub = self.hub.clone();
            tokio::spawn(async move {
                if let Err(e) = connection::run(hub, stream, addr).await {
                    error!(%addr, error = %e, "connection ended with error");
                }
            });
        }
    }
}
