//! QR Scanner Session
//!
//! Glue between the external QR decoder (camera) and server ingestion.
//! Decoding itself happens elsewhere; the session only consumes decoded text
//! and a start/stop capability.
//!
//! # Modes
//!
//! - **Camera**: decoded text arrives on a channel. The decoder is stopped
//!   after the first result.
//! - **Manual**: free text typed by the user. Entered automatically when the
//!   camera cannot start, with a [`Notice::CameraUnavailable`] shown instead
//!   of a validation error. In that case there is no way back to camera mode.

use crate::ingest::IngestError;
use crate::service::{IngestReceipt, ServiceError, VpnHandle};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Which camera to use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraFacing {
    /// Rear camera
    Environment,
    /// Front camera
    User,
}

/// Decoder start parameters
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScanConfig {
    pub facing: CameraFacing,
    /// Frames decoded per second
    pub fps: u32,
    /// Scan box size in pixels (width, height)
    pub scan_box: (u32, u32),
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            facing: CameraFacing::Environment,
            fps: 10,
            scan_box: (220, 220),
        }
    }
}

/// External QR decoding capability
pub trait QrDecoder: Send {
    /// Start decoding; each decoded QR payload is sent on the channel
    fn start(&mut self, config: &ScanConfig) -> Result<mpsc::Receiver<String>, ScanError>;

    /// Stop decoding; must be safe to call when not running
    fn stop(&mut self);
}

/// Decoder for hosts without a camera
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableDecoder;

impl QrDecoder for UnavailableDecoder {
    fn start(&mut self, _config: &ScanConfig) -> Result<mpsc::Receiver<String>, ScanError> {
        Err(ScanError::CameraUnavailable("no camera on this host".into()))
    }

    fn stop(&mut self) {}
}

/// Input mode of the scanner screen
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanMode {
    Camera,
    Manual,
}

/// Informational message, not an error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Notice {
    /// Camera could not start; enter data manually
    CameraUnavailable,
}

impl Notice {
    pub fn message(&self) -> &'static str {
        match self {
            Notice::CameraUnavailable => "Camera unavailable. Enter server data manually.",
        }
    }
}

/// What the screen should do after a submission
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Server added; close the scanner
    Dismiss(IngestReceipt),
    /// Data rejected; keep the scanner open and show the error
    Retry(IngestError),
}

/// One open scanner screen
pub struct ScanSession<D: QrDecoder> {
    decoder: D,
    config: ScanConfig,
    decoded: Option<mpsc::Receiver<String>>,
    mode: ScanMode,
    notice: Option<Notice>,
    error: Option<IngestError>,
}

impl<D: QrDecoder> ScanSession<D> {
    /// Open the scanner and try to start the camera
    pub fn open(decoder: D, config: ScanConfig) -> Self {
        let mut session = Self {
            decoder,
            config,
            decoded: None,
            mode: ScanMode::Camera,
            notice: None,
            error: None,
        };
        session.start_camera();
        session
    }

    fn start_camera(&mut self) {
        match self.decoder.start(&self.config) {
            Ok(rx) => {
                debug!("QR decoder started ({} fps)", self.config.fps);
                self.decoded = Some(rx);
                self.mode = ScanMode::Camera;
            }
            Err(e) => {
                warn!("QR decoder failed to start: {}", e);
                self.decoded = None;
                self.mode = ScanMode::Manual;
                self.notice = Some(Notice::CameraUnavailable);
            }
        }
    }

    fn stop_camera(&mut self) {
        if self.decoded.take().is_some() {
            self.decoder.stop();
            debug!("QR decoder stopped");
        }
    }

    pub fn mode(&self) -> ScanMode {
        self.mode
    }

    pub fn notice(&self) -> Option<Notice> {
        self.notice
    }

    /// Last validation error
    pub fn error(&self) -> Option<&IngestError> {
        self.error.as_ref()
    }

    /// Whether the camera is delivering results
    pub fn is_scanning(&self) -> bool {
        self.decoded.is_some()
    }

    /// Clear the validation error (user edited the text)
    pub fn clear_error(&mut self) {
        self.error = None;
    }

    /// Switch to manual entry
    pub fn switch_to_manual(&mut self) {
        self.stop_camera();
        self.mode = ScanMode::Manual;
    }

    /// Go back to the camera; refused once the camera was found unavailable
    pub fn return_to_camera(&mut self) -> Result<(), ScanError> {
        if self.notice == Some(Notice::CameraUnavailable) {
            return Err(ScanError::CameraUnavailable(
                "camera failed to start earlier".into(),
            ));
        }

        self.error = None;
        self.start_camera();
        match self.mode {
            ScanMode::Camera => Ok(()),
            ScanMode::Manual => Err(ScanError::CameraUnavailable(
                "camera failed to start".into(),
            )),
        }
    }

    /// Wait for the next decoded payload
    ///
    /// Returns `None` when not scanning or the decoder went away. The decoder
    /// is stopped once a payload arrives.
    pub async fn next_decoded(&mut self) -> Option<String> {
        let text = self.decoded.as_mut()?.recv().await;
        self.stop_camera();
        text
    }

    /// Feed text (decoded or typed) through ingestion
    pub async fn submit(
        &mut self,
        vpn: &VpnHandle,
        text: &str,
    ) -> Result<ScanOutcome, ServiceError> {
        match vpn.ingest_server_data(text).await {
            Ok(receipt) => {
                info!("Server {} added from scanner", receipt.server.id);
                self.error = None;
                self.stop_camera();
                Ok(ScanOutcome::Dismiss(receipt))
            }
            Err(ServiceError::Ingest(e)) => {
                debug!("Scanner input rejected: {}", e);
                self.error = Some(e.clone());
                if !self.is_scanning() {
                    self.mode = ScanMode::Manual;
                }
                Ok(ScanOutcome::Retry(e))
            }
            Err(e) => Err(e),
        }
    }

    /// Close the screen and release the camera
    pub fn close(mut self) {
        self.stop_camera();
    }
}

impl<D: QrDecoder> Drop for ScanSession<D> {
    fn drop(&mut self) {
        self.stop_camera();
    }
}

/// Scanner errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ScanError {
    #[error("Camera unavailable: {0}")]
    CameraUnavailable(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ServiceConfig;
    use crate::service::VpnService;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    /// Decoder backed by a test channel
    struct FakeDecoder {
        payloads: Option<mpsc::Receiver<String>>,
        stops: Arc<AtomicUsize>,
    }

    impl QrDecoder for FakeDecoder {
        fn start(&mut self, _config: &ScanConfig) -> Result<mpsc::Receiver<String>, ScanError> {
            self.payloads
                .take()
                .ok_or_else(|| ScanError::CameraUnavailable("already started".into()))
        }

        fn stop(&mut self) {
            self.stops.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fake() -> (FakeDecoder, mpsc::Sender<String>, Arc<AtomicUsize>) {
        let (tx, rx) = mpsc::channel(4);
        let stops = Arc::new(AtomicUsize::new(0));
        let decoder = FakeDecoder {
            payloads: Some(rx),
            stops: stops.clone(),
        };
        (decoder, tx, stops)
    }

    #[test]
    fn test_scan_config_defaults() {
        let config = ScanConfig::default();
        assert_eq!(config.facing, CameraFacing::Environment);
        assert_eq!(config.fps, 10);
        assert_eq!(config.scan_box, (220, 220));
    }

    #[test]
    fn test_camera_unavailable_falls_back_to_manual() {
        let mut session = ScanSession::open(UnavailableDecoder, ScanConfig::default());

        assert_eq!(session.mode(), ScanMode::Manual);
        assert_eq!(session.notice(), Some(Notice::CameraUnavailable));
        assert!(session.error().is_none());
        assert!(session.return_to_camera().is_err());
        assert_eq!(session.mode(), ScanMode::Manual);
    }

    #[tokio::test]
    async fn test_camera_scan_adds_server() {
        let vpn = VpnService::spawn(&ServiceConfig::default()).unwrap();
        let (decoder, tx, stops) = fake();
        let mut session = ScanSession::open(decoder, ScanConfig::default());
        assert_eq!(session.mode(), ScanMode::Camera);

        tx.send(r#"{"country":"Польша","city":"Варшава"}"#.to_string())
            .await
            .unwrap();
        let text = session.next_decoded().await.unwrap();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert!(!session.is_scanning());

        let outcome = session.submit(&vpn, &text).await.unwrap();
        let ScanOutcome::Dismiss(receipt) = outcome else {
            panic!("expected dismiss");
        };
        assert_eq!(receipt.server.city, "Варшава");
        assert_eq!(vpn.snapshot().selected.id, receipt.server.id);

        session.close();
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_manual_entry_error_then_success() {
        let vpn = VpnService::spawn(&ServiceConfig::default()).unwrap();
        let mut session = ScanSession::open(UnavailableDecoder, ScanConfig::default());

        let outcome = session.submit(&vpn, "not valid data").await.unwrap();
        assert_eq!(outcome, ScanOutcome::Retry(IngestError::MalformedServerData));
        assert_eq!(session.error(), Some(&IngestError::MalformedServerData));
        // The camera notice stays distinct from the validation error
        assert_eq!(session.notice(), Some(Notice::CameraUnavailable));
        assert_eq!(vpn.snapshot().servers.len(), 10);

        session.clear_error();
        let outcome = session.submit(&vpn, "vpn://example.com/path").await.unwrap();
        assert!(matches!(outcome, ScanOutcome::Dismiss(_)));
        assert!(session.error().is_none());
    }

    #[test]
    fn test_manual_switch_and_drop_stop_decoder() {
        let (decoder, _tx, stops) = fake();
        let mut session = ScanSession::open(decoder, ScanConfig::default());

        session.switch_to_manual();
        assert_eq!(session.mode(), ScanMode::Manual);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
        assert_eq!(session.notice(), None);

        drop(session);
        assert_eq!(stops.load(Ordering::SeqCst), 1);

        let (decoder, _tx, stops) = fake();
        let session = ScanSession::open(decoder, ScanConfig::default());
        drop(session);
        assert_eq!(stops.load(Ordering::SeqCst), 1);
    }
}
