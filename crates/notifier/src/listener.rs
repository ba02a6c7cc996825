use std::net::SocketAddr;
use std::time::Duration;

use fleetota_protocol::UPDATE_AVAILABLE;
use fleetota_protocol::wire::read_control;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::NotifyError;

/// Deadline for a notifier to deliver its message after connecting.
const READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Accepts update notifications and forwards the sender's address.
pub struct NotificationListener {
    cancel: CancellationToken,
}

impl NotificationListener {
    pub fn new(cancel: CancellationToken) -> Self {
        Self { cancel }
    }

    /// Binds `0.0.0.0:port` (0 = OS-assigned).
    pub async fn bind(port: u16) -> Result<TcpListener, NotifyError> {
        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        let listener = TcpListener::bind(addr).await?;
        info!(addr = %listener.local_addr()?, "notification listener bound");
        Ok(listener)
    }

    /// Accepts connections until cancelled or until `events` is closed.
    pub async fn run(
        &self,
        listener: TcpListener,
        events: mpsc::Sender<SocketAddr>,
    ) -> Result<(), NotifyError> {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => {
                    info!("notification listener shutting down");
                    return Ok(());
                }
                _ = events.closed() => {
                    debug!("notification receiver dropped");
                    return Ok(());
                }
                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => {
                            let events = events.clone();
                            tokio::spawn(async move {
                                match read_notification(stream).await {
                                    Ok(true) => {
                                        info!(%peer_addr, "update notification received");
                                        let _ = events.send(peer_addr).await;
                                    }
                                    Ok(false) => {}
                                    Err(e) => warn!(%peer_addr, "bad notification: {e}"),
                                }
                            });
                        }
                        Err(e) => warn!("accept error: {e}"),
                    }
                }
            }
        }
    }
}

/// Returns `true` if the connection carried `UPDATE_AVAILABLE`.
async fn read_notification(mut stream: TcpStream) -> Result<bool, NotifyError> {
    let message = tokio::time::timeout(READ_TIMEOUT, read_control(&mut stream))
        .await
        .map_err(|_| NotifyError::Timeout)??;
    if message != UPDATE_AVAILABLE {
        warn!(%message, "ignoring unknown notification");
        return Ok(false);
    }
    Ok(true)
}
