use facematch_core::{scan_database, ScanError, ScanReport, Verifier};
use std::path::PathBuf;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Scan(#[from] ScanError),
    #[error("failed to spawn engine thread: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("engine thread exited")]
    ChannelClosed,
}

/// Messages sent from HTTP handlers to the engine thread.
enum EngineRequest {
    Scan {
        database: PathBuf,
        probe: PathBuf,
        reply: oneshot::Sender<Result<ScanReport, ScanError>>,
    },
}

/// Clone-safe handle to the engine thread.
#[derive(Clone)]
pub struct EngineHandle {
    tx: mpsc::Sender<EngineRequest>,
}

impl EngineHandle {
    /// Scan `database` for the first image matching `probe`.
    pub async fn scan(&self, database: PathBuf, probe: PathBuf) -> Result<ScanReport, EngineError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(EngineRequest::Scan {
                database,
                probe,
                reply: reply_tx,
            })
            .await
            .map_err(|_| EngineError::ChannelClosed)?;
        Ok(reply_rx.await.map_err(|_| EngineError::ChannelClosed)??)
    }
}

/// Run `verifier` on a dedicated OS thread.
///
/// ONNX sessions need exclusive access, so every scan is serialized through
/// this one thread; handlers queue requests and await the reply.
pub fn spawn_engine<V>(mut verifier: V) -> Result<EngineHandle, EngineError>
where
    V: Verifier + Send + 'static,
{
    let (tx, mut rx) = mpsc::channel::<EngineRequest>(4);

    std::thread::Builder::new()
        .name("facematch-engine".into())
        .spawn(move || {
            tracing::info!("engine thread started");
            while let Some(req) = rx.blocking_recv() {
                match req {
                    EngineRequest::Scan {
                        database,
                        probe,
                        reply,
                    } => {
                        let result = scan_database(&database, &probe, &mut verifier);
                        let _ = reply.send(result);
                    }
                }
            }
            tracing::info!("engine thread exiting");
        })
        .map_err(EngineError::Spawn)?;

    Ok(EngineHandle { tx })
}
