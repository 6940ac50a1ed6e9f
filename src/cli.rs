// SPDX-License-Identifier: GPL-3.0-only

//! CLI commands
//!
//! - Running a headless live session with commands read from stdin
//! - Listing capture devices
//! - Showing a device's formats

use capture_preview::Config;
use capture_preview::backends::audio::cpal_host::CpalAudio;
use capture_preview::backends::camera::v4l2::V4l2Backend;
use capture_preview::backends::camera::{
    FrameSink, PreviewFormat, Resolution, SurfaceRef, UvcBackend,
};
use capture_preview::backends::usb::sysfs::{SysfsUsbHost, scan_capture_devices};
use capture_preview::backends::usb::{ControlHandle, DeviceId};
use capture_preview::session::dispatcher;
use capture_preview::session::{
    Command, DevicePip, DispatchEvent, FormatNegotiator, PipController, SessionFacade,
    SessionOptions, SessionParts, SessionStatus, SystemPermissions,
};
use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Overrides for `run` on top of the config file
#[derive(Debug, Default)]
pub struct RunOptions {
    pub no_audio: bool,
    pub resolution: Option<Resolution>,
    pub pip: Option<PathBuf>,
}

/// Headless surface: counts frames instead of drawing them
struct FrameCounter {
    label: &'static str,
    frames: AtomicU64,
}

impl FrameCounter {
    fn new(label: &'static str) -> Self {
        Self {
            label,
            frames: AtomicU64::new(0),
        }
    }

    fn frames(&self) -> u64 {
        self.frames.load(Ordering::Relaxed)
    }
}

impl FrameSink for FrameCounter {
    fn on_frame(&self, data: &[u8], format: &PreviewFormat) {
        let count = self.frames.fetch_add(1, Ordering::Relaxed) + 1;
        if count % 300 == 0 {
            debug!(surface = self.label, frames = count, bytes = data.len(), format = %format, "Frames received");
        }
    }
}

/// Run a live session until Ctrl+C or `quit`
pub fn run_session(mut config: Config, options: RunOptions) -> Result<(), Box<dyn std::error::Error>> {
    if options.no_audio {
        config.audio_loopback = false;
    }
    if options.resolution.is_some() {
        config.preferred_resolution = options.resolution;
    }
    if let Some(pip) = &options.pip {
        config.pip_device = Some(pip.display().to_string());
        config.pip_enabled = true;
    }

    let (dispatch_tx, dispatch_rx) = tokio::sync::mpsc::unbounded_channel();
    let (status_tx, mut status_rx) = tokio::sync::mpsc::unbounded_channel();

    let preview = Arc::new(FrameCounter::new("preview"));
    let pip = config.pip_device.as_ref().map(|path| {
        let surface = SurfaceRef::new(Arc::new(FrameCounter::new("pip")));
        Box::new(DevicePip::new(
            path,
            Box::new(V4l2Backend::new()),
            FormatNegotiator::default(),
            surface,
        )) as Box<dyn PipController>
    });

    let parts = SessionParts {
        host: Box::new(SysfsUsbHost::new()),
        backend: Box::new(V4l2Backend::new()),
        audio: Box::new(CpalAudio::new()),
        permissions: Box::new(SystemPermissions::new(dispatch_tx.clone())),
        pip,
    };
    let mut facade = SessionFacade::new(
        parts,
        SessionOptions::from(&config),
        status_tx,
        dispatch_tx.clone(),
    );
    facade.set_preferred_resolution(config.preferred_resolution);

    let _ = dispatch_tx.send(Command::SurfaceAvailable(SurfaceRef::new(preview.clone())).into());

    let ctrlc_tx = dispatch_tx.clone();
    ctrlc::set_handler(move || {
        let _ = ctrlc_tx.send(DispatchEvent::Shutdown);
    })?;

    spawn_command_reader(dispatch_tx);

    println!("Capture preview running (commands: open, close, pip on|off, res WxH, quit)");

    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let facade = rt.block_on(async {
        let printer = tokio::spawn(async move {
            while let Some(status) = status_rx.recv().await {
                print_status(&status);
            }
        });
        let result = dispatcher::run(facade, dispatch_rx).await;
        printer.abort();
        result
    })?;

    println!("Frames received: {}", preview.frames());

    config.preferred_resolution = facade.preferred_resolution();
    config.pip_enabled = facade.pip_enabled();
    drop(facade);
    if let Err(e) = config.save() {
        warn!(error = %e, "Failed to save config");
    }

    Ok(())
}

/// Forward stdin lines into the dispatch queue
fn spawn_command_reader(dispatch: UnboundedSender<DispatchEvent>) {
    let spawned = std::thread::Builder::new()
        .name("stdin-commands".into())
        .spawn(move || {
            for line in std::io::stdin().lock().lines() {
                let Ok(line) = line else { break };
                let event = match parse_command(&line) {
                    Ok(Some(event)) => event,
                    Ok(None) => continue,
                    Err(e) => {
                        eprintln!("{}", e);
                        continue;
                    }
                };
                let quit = matches!(event, DispatchEvent::Shutdown);
                if dispatch.send(event).is_err() || quit {
                    break;
                }
            }
        });
    if let Err(e) = spawned {
        warn!(error = %e, "Failed to start command reader");
    }
}

fn parse_command(line: &str) -> Result<Option<DispatchEvent>, String> {
    let mut words = line.split_whitespace();
    let Some(verb) = words.next() else {
        return Ok(None);
    };
    let event = match (verb, words.next()) {
        ("open", None) => Command::Open.into(),
        ("close", None) => Command::Close.into(),
        ("pip", Some("on")) => Command::SetPip(true).into(),
        ("pip", Some("off")) => Command::SetPip(false).into(),
        ("res", Some(size)) => Command::SelectResolution(size.parse()?).into(),
        ("quit" | "exit", None) => DispatchEvent::Shutdown,
        _ => return Err(format!("Unknown command: {}", line.trim())),
    };
    Ok(Some(event))
}

fn print_status(status: &SessionStatus) {
    match status {
        SessionStatus::DeviceAttached(id) => println!("Device attached: {}", id),
        SessionStatus::WaitingForDevice => println!("Waiting for a capture device..."),
        SessionStatus::PreviewRunning(format) => println!("Preview running: {}", format),
        SessionStatus::PreviewStopped => println!("Preview stopped"),
        SessionStatus::CameraOpenFailed(e) => println!("Camera open failed: {}", e),
        SessionStatus::AudioPermissionDenied => println!("Audio permission denied"),
        SessionStatus::UsbPermissionDenied(id) => println!("USB permission denied: {}", id),
        SessionStatus::AudioStartFailed(e) => println!("Audio loopback failed: {}", e),
        SessionStatus::PipStartFailed(e) => println!("Picture-in-picture failed: {}", e),
        SessionStatus::ResolutionOptions(sizes) => {
            let sizes: Vec<String> = sizes.iter().map(|s| s.to_string()).collect();
            println!("Available sizes: {}", sizes.join(", "));
        }
        SessionStatus::PreviewTransform(transform) => {
            debug!(?transform, "Preview transform")
        }
    }
}

/// List all attached capture devices
pub fn list_devices() -> Result<(), Box<dyn std::error::Error>> {
    let devices = scan_capture_devices();

    if devices.is_empty() {
        println!("No capture devices found.");
        return Ok(());
    }

    println!("Capture devices:");
    println!();
    for device in &devices {
        println!("  {}  {}", device.path.display(), device.name);
        println!("      USB ID: {:04x}:{:04x}", device.vendor_id, device.product_id);
    }

    Ok(())
}

/// Print the size options and negotiated format of a device
pub fn show_formats(config: &Config, device: Option<PathBuf>) -> Result<(), Box<dyn std::error::Error>> {
    let path = match device {
        Some(path) => path,
        None => scan_capture_devices()
            .into_iter()
            .next()
            .map(|d| d.path)
            .ok_or("No capture devices found")?,
    };
    println!("Device: {}", path.display());

    let control = ControlHandle::open(DeviceId::new(path.display().to_string()), &path)?;
    let mut camera = V4l2Backend::new().open(control)?;
    let negotiator = FormatNegotiator::default();
    let preferred = camera.capabilities(negotiator.preferred_codec());
    let fallback = camera.capabilities(negotiator.fallback_codec());

    let options = negotiator.resolution_options(preferred.as_ref(), fallback.as_ref());
    if options.is_empty() {
        println!("No {} or {} sizes offered.", negotiator.preferred_codec(), negotiator.fallback_codec());
    }
    for option in &options {
        println!("  {}", option);
    }

    let chosen = negotiator.negotiate_with_selection(
        preferred.as_ref(),
        fallback.as_ref(),
        config.preferred_resolution,
    );
    camera.close()?;

    match chosen {
        Ok(format) => println!("Preview format: {}", format),
        Err(e) => println!("Negotiation failed: {}", e),
    }

    Ok(())
}
