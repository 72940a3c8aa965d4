use tokio::sync::watch;

/// Fan-out of Ctrl-C to every long-running task.
///
/// `ctrl_c()` only registers its handler when first polled, so a single
/// listener is spawned up front and the HTTP server and poll loop each wait
/// on a receiver.
#[derive(Clone)]
pub struct Shutdown {
    rx: watch::Receiver<bool>,
}

impl Shutdown {
    pub fn on_ctrl_c() -> Self {
        let (tx, rx) = watch::channel(false);
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!(event = "shutdown_requested");
                    let _ = tx.send(true);
                }
                Err(e) => {
                    tracing::error!(event = "signal_handler_failed", error = %e);
                    // keep the sender alive so receivers never see a closed channel
                    std::future::pending::<()>().await;
                }
            }
        });
        Self { rx }
    }

    /// A handle whose trigger is driven by the caller instead of a signal.
    pub fn manual() -> (watch::Sender<bool>, Self) {
        let (tx, rx) = watch::channel(false);
        (tx, Self { rx })
    }

    pub async fn wait(mut self) {
        if self.rx.wait_for(|stop| *stop).await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}
