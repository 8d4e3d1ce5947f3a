use crate::events::CaptureEvent;
use crate::guard::{CaptureLease, CaptureLock};
use crate::{CaptureConfig, CaptureSurface, CompositeImage, EncodedImage, Error, MaskPolicy, Result, Stitcher};
use std::sync::mpsc::{self, Sender};
use std::thread;
use tokio::sync::{mpsc as tokio_mpsc, oneshot};

enum Command {
    FullPage(CaptureConfig, CaptureLease, oneshot::Sender<Result<CompositeImage>>),
    Viewport(CaptureLease, oneshot::Sender<Result<EncodedImage>>),
    Close(oneshot::Sender<Result<()>>),
}

/// An async-friendly capturer backed by a dedicated worker thread.
///
/// The worker thread owns the surface and its [`Stitcher`], so the surface
/// does not have to be `Send`. The capture lease is taken on the calling
/// side: a request made while another one is running fails immediately with
/// [`Error::CaptureInProgress`] instead of queueing behind it.
#[derive(Clone)]
pub struct Capturer {
    cmd_tx: Sender<Command>,
    lock: CaptureLock,
}

/// Lifecycle events of every capture made through a [`Capturer`].
pub type EventStream = tokio_mpsc::UnboundedReceiver<CaptureEvent>;

impl Capturer {
    /// Spawn the worker thread and build the surface on it with `factory`.
    pub async fn new<S, F>(factory: F) -> Result<(Self, EventStream)>
    where
        S: CaptureSurface + 'static,
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        Self::with_policy(factory, MaskPolicy::default()).await
    }

    pub async fn with_policy<S, F>(factory: F, policy: MaskPolicy) -> Result<(Self, EventStream)>
    where
        S: CaptureSurface + 'static,
        F: FnOnce() -> Result<S> + Send + 'static,
    {
        let lock = CaptureLock::new();
        let worker_lock = lock.clone();
        let (cmd_tx, cmd_rx) = mpsc::channel::<Command>();
        let (event_tx, event_rx) = tokio_mpsc::unbounded_channel();
        let (init_tx, init_rx): (oneshot::Sender<Result<()>>, oneshot::Receiver<Result<()>>) =
            oneshot::channel();

        thread::spawn(move || {
            // Build the surface on the worker thread
            let surface = match factory() {
                Ok(s) => s,
                Err(err) => {
                    let _ = init_tx.send(Err(err));
                    return;
                }
            };
            let mut stitcher = Stitcher::new(surface)
                .with_lock(worker_lock)
                .with_policy(policy)
                .with_observer(event_tx);

            let _ = init_tx.send(Ok(()));

            // Command loop
            while let Ok(cmd) = cmd_rx.recv() {
                match cmd {
                    Command::FullPage(config, lease, resp) => {
                        let res = stitcher.capture_full_page_leased(lease, &config);
                        let _ = resp.send(res);
                    }
                    Command::Viewport(lease, resp) => {
                        let res = stitcher.capture_viewport_leased(lease);
                        let _ = resp.send(res);
                    }
                    Command::Close(resp) => {
                        let _ = resp.send(Ok(()));
                        break;
                    }
                }
            }
        });

        // Wait for the worker to report initialization success or failure
        let init_res = init_rx
            .await
            .map_err(|e| Error::Other(format!("Worker init canceled: {}", e)))?;
        init_res?;

        Ok((Self { cmd_tx, lock }, event_rx))
    }

    /// Whether a capture is currently running.
    pub fn is_busy(&self) -> bool {
        self.lock.is_busy()
    }

    /// Stitch the full page.
    pub async fn capture_full_page(&self, config: CaptureConfig) -> Result<CompositeImage> {
        let lease = self.lock.try_acquire()?;
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::FullPage(config, lease, tx))
            .map_err(|_| Error::Other("Capture worker has stopped".into()))?;
        rx.await
            .map_err(|e| Error::Other(format!("Full-page capture canceled: {}", e)))?
    }

    /// Capture the current viewport.
    pub async fn capture_viewport(&self) -> Result<EncodedImage> {
        let lease = self.lock.try_acquire()?;
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(Command::Viewport(lease, tx))
            .map_err(|_| Error::Other("Capture worker has stopped".into()))?;
        rx.await
            .map_err(|e| Error::Other(format!("Viewport capture canceled: {}", e)))?
    }

    /// Shut down the worker thread.
    pub async fn close(self) -> Result<()> {
        let (tx, rx) = oneshot::channel();
        let _ = self.cmd_tx.send(Command::Close(tx));
        rx.await
            .map_err(|e| Error::Other(format!("Close canceled: {}", e)))?
    }
}
