//! Serial link lifecycle
//!
//! ```text
//! Disconnected --connect ok--> Connected --breaker trip / reconnect / disconnect--> Disconnected
//! ```
//!
//! Each connect attempt gets a generation number and its own cancellation
//! token. A reconnect cancels the previous reader and waits for its thread to
//! finish before the new port is opened, all under one async mutex, so two
//! readers never run at once and concurrent connect requests queue up.

use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::acquisition::{
    run_reader, AcquisitionError, ConnectRequest, FrameDecoder, PortOpener, ReaderExit,
    SerialEvent, WallClock,
};
use crate::types::{LinkStatus, StatusMessage};

/// Decoder settings applied to every connection.
#[derive(Debug, Clone, Copy)]
pub struct LinkSettings {
    pub resync_gap_secs: u64,
    pub max_consecutive_errors: u32,
}

struct ActiveReader {
    generation: u64,
    request: ConnectRequest,
    cancel: CancellationToken,
    handle: JoinHandle<ReaderExit>,
}

/// Current link view for the control surface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LinkState {
    pub status: LinkStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub port_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub baud_rate: Option<u32>,
    /// Generation of the most recent connect attempt (0 = never connected)
    pub generation: u64,
}

/// Owner of the active serial reader.
pub struct SerialLink {
    opener: Arc<dyn PortOpener>,
    clock: Arc<dyn WallClock>,
    events: mpsc::Sender<SerialEvent>,
    settings: LinkSettings,
    shutdown: CancellationToken,
    generation: AtomicU64,
    active: Mutex<Option<ActiveReader>>,
}

impl SerialLink {
    pub fn new(
        opener: Arc<dyn PortOpener>,
        clock: Arc<dyn WallClock>,
        events: mpsc::Sender<SerialEvent>,
        settings: LinkSettings,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            opener,
            clock,
            events,
            settings,
            shutdown,
            generation: AtomicU64::new(0),
            active: Mutex::new(None),
        }
    }

    /// Stop any running reader, open `request` and start reading from it.
    ///
    /// Returns the new generation. A failed open publishes an error status
    /// and leaves the link disconnected.
    pub async fn connect(&self, request: ConnectRequest) -> Result<u64, AcquisitionError> {
        let mut active = self.active.lock().await;
        self.stop_reader(&mut active).await;

        info!(port = %request.port_name, baud = request.baud_rate, "Opening serial port");
        let opener = Arc::clone(&self.opener);
        let open_request = request.clone();
        let opened = tokio::task::spawn_blocking(move || opener.open(&open_request))
            .await
            .map_err(|e| AcquisitionError::Open {
                port: request.port_name.clone(),
                reason: e.to_string(),
            })
            .and_then(|result| result);

        let source = match opened {
            Ok(source) => source,
            Err(e) => {
                warn!(port = %request.port_name, error = %e, "Failed to open serial port");
                self.emit(StatusMessage::error(e.to_string())).await;
                return Err(e);
            }
        };

        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let cancel = self.shutdown.child_token();
        let decoder = FrameDecoder::new(
            source,
            Arc::clone(&self.clock),
            self.settings.resync_gap_secs,
            self.settings.max_consecutive_errors,
        );

        // Connected must precede the reader's first reading
        self.emit(StatusMessage::connected()).await;

        let tx = self.events.clone();
        let reader_cancel = cancel.clone();
        let handle = tokio::task::spawn_blocking(move || {
            run_reader(decoder, &tx, &reader_cancel, generation)
        });

        info!(port = %request.port_name, generation, "Serial link connected");
        *active = Some(ActiveReader { generation, request, cancel, handle });
        Ok(generation)
    }

    /// Stop the active reader, if any. Returns whether one was running.
    pub async fn disconnect(&self) -> bool {
        let mut active = self.active.lock().await;
        let was_active = active.is_some();
        self.stop_reader(&mut active).await;
        was_active
    }

    /// Link status as seen by the control surface.
    ///
    /// A reader whose thread has exited (breaker trip) reports disconnected.
    pub async fn state(&self) -> LinkState {
        let active = self.active.lock().await;
        let generation = self.generation.load(Ordering::SeqCst);
        match active.as_ref() {
            Some(reader) if !reader.handle.is_finished() => LinkState {
                status: LinkStatus::Connected,
                port_name: Some(reader.request.port_name.clone()),
                baud_rate: Some(reader.request.baud_rate),
                generation,
            },
            _ => LinkState { status: LinkStatus::Disconnected, port_name: None, baud_rate: None, generation },
        }
    }

    /// Port names the opener can serve.
    pub async fn available_ports(&self) -> Result<Vec<String>, AcquisitionError> {
        let opener = Arc::clone(&self.opener);
        tokio::task::spawn_blocking(move || opener.available_ports())
            .await
            .map_err(|e| AcquisitionError::Open { port: "*".to_string(), reason: e.to_string() })?
    }

    /// Cancel and join the reader held in `active`.
    async fn stop_reader(&self, active: &mut Option<ActiveReader>) {
        let Some(reader) = active.take() else {
            return;
        };

        reader.cancel.cancel();
        let exit = match reader.handle.await {
            Ok(exit) => exit,
            Err(e) => {
                warn!(generation = reader.generation, error = %e, "Serial reader task failed");
                ReaderExit::Cancelled
            }
        };
        info!(generation = reader.generation, ?exit, "Previous serial reader stopped");

        // A tripped reader already announced its own disconnect
        if exit != ReaderExit::CircuitOpen {
            self.emit(StatusMessage::disconnected()).await;
        }
    }

    async fn emit(&self, status: StatusMessage) {
        let send = self.events.send(SerialEvent::Status(status));
        match tokio::time::timeout(Duration::from_secs(5), send).await {
            Ok(Ok(())) => {}
            Ok(Err(_)) => warn!("Coordinator gone, link status not delivered"),
            Err(_) => warn!("Timed out delivering link status"),
        }
    }
}
