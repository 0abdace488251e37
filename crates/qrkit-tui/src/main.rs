//! qrkit - a terminal QR toolkit: generate, scan and decode QR codes.

mod action;
mod app;
mod camera;
mod clipboard;
mod event;
mod log_buffer;
mod theme;
mod tui;
mod ui;

use action::{Action, CameraGrant};
use app::{App, StatusLevel};
use clap::{Parser, Subcommand, ValueEnum};
use color_eyre::Result;
use color_eyre::eyre::eyre;
use event::{Event, EventHandler};
use log_buffer::{LogBuffer, LogBufferLayer};
use qrkit_core::config::{self, AppConfig, ConfigError, ThemeConfig};
use qrkit_core::display;
use qrkit_core::{
    CameraProvider, Capabilities, DecodeAdapter, DragData, EncodeAdapter, ErrorCorrection,
    GenerationRequest, GenerationTrigger, HttpImageFetcher, ImageAcquirer, QrError, ScanController,
    ScanOutcome,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tui::Tui;

/// Timeout for fetching remote images.
const FETCH_TIMEOUT: Duration = Duration::from_secs(15);

/// Terminal QR toolkit. Runs the interactive UI unless a subcommand is given.
#[derive(Parser, Debug)]
#[command(name = "qrkit")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Config file to use instead of the platform default
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Camera device index used for scanning
    #[arg(long, global = true, default_value = "0")]
    camera_index: u32,

    /// Colour theme (overrides the config file)
    #[arg(long, value_enum)]
    theme: Option<ThemeArg>,

    /// Quiet period before regenerating, in milliseconds
    #[arg(long)]
    debounce_ms: Option<u64>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Encode text into a PNG QR code
    Encode {
        /// Text to encode
        text: String,

        /// Output file (defaults to a timestamped file in the download directory)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Image edge length in pixels
        #[arg(long)]
        size: Option<u32>,

        /// Error-correction level: L, M, Q or H
        #[arg(long)]
        ec: Option<ErrorCorrection>,

        /// Quiet zone in modules
        #[arg(long)]
        margin: Option<u32>,
    },
    /// Decode a QR code from a file path, URL or data URL
    Decode {
        /// Image source
        source: String,
    },
    /// Scan a QR code with the camera and print its contents
    Scan {
        /// Give up after this many seconds
        #[arg(long)]
        timeout: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ThemeArg {
    System,
    Light,
    Dark,
}

impl From<ThemeArg> for ThemeConfig {
    fn from(arg: ThemeArg) -> Self {
        match arg {
            ThemeArg::System => ThemeConfig::System,
            ThemeArg::Light => ThemeConfig::Light,
            ThemeArg::Dark => ThemeConfig::Dark,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    color_eyre::install()?;

    let log_buffer = LogBuffer::default();

    let env_filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive("qrkit=info".parse()?)
        .add_directive("qrkit_core=info".parse()?);

    if args.command.is_some() {
        // Headless: log to stderr, keep stdout for results
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(LogBufferLayer::new(log_buffer.clone()))
            .init();
    }

    let config_path = match &args.config {
        Some(path) => path.clone(),
        None => config::get_config_path()?,
    };
    let mut app_config = load_config_or_default(&config_path);
    if let Some(theme) = args.theme {
        app_config.theme = theme.into();
    }
    if let Some(ms) = args.debounce_ms {
        app_config.debounce_ms = ms;
    }

    match args.command {
        Some(Command::Encode {
            text,
            output,
            size,
            ec,
            margin,
        }) => run_encode(&app_config, text, output, size, ec, margin),
        Some(Command::Decode { source }) => run_decode(&source).await,
        Some(Command::Scan { timeout }) => {
            run_scan(&app_config, args.camera_index, timeout.map(Duration::from_secs)).await
        }
        None => run_tui(app_config, &config_path, args.camera_index, log_buffer).await,
    }
}

/// Load the config, falling back to defaults. A file that fails to parse is
/// backed up so the next save does not silently discard it.
fn load_config_or_default(path: &Path) -> AppConfig {
    match config::load_config_from(path) {
        Ok(config) => config,
        Err(ConfigError::Json(e)) => {
            tracing::warn!("Config file {} is invalid: {}", path.display(), e);
            match config::backup_corrupted_config(path) {
                Ok(backup) => tracing::warn!("Backed up invalid config to {}", backup.display()),
                Err(e) => tracing::warn!("Failed to back up invalid config: {}", e),
            }
            AppConfig::default()
        }
        Err(e) => {
            tracing::warn!("Failed to load config: {}, using defaults", e);
            AppConfig::default()
        }
    }
}

fn run_encode(
    config: &AppConfig,
    text: String,
    output: Option<PathBuf>,
    size: Option<u32>,
    ec: Option<ErrorCorrection>,
    margin: Option<u32>,
) -> Result<()> {
    let mut options = config.render_options();
    if let Some(size) = size {
        options.size = size;
    }
    if let Some(margin) = margin {
        options.margin = margin;
    }
    let request =
        GenerationRequest::with_options(text, ec.unwrap_or(config.error_correction), options)?;

    let encoder = EncodeAdapter::new(Capabilities::detect().encoder);
    let encoded = encoder.encode(&request)?;

    let path = match output {
        Some(path) => {
            std::fs::write(&path, encoded.to_png()?)?;
            tracing::info!("Wrote {}", path.display());
            path
        }
        None => display::save_png(&encoded, &config.resolve_download_dir())?,
    };
    println!("{}", path.display());
    Ok(())
}

async fn run_decode(source: &str) -> Result<()> {
    let acquirer = ImageAcquirer::new(HttpImageFetcher::new(FETCH_TIMEOUT)?);
    let decoder = DecodeAdapter::new(Capabilities::detect().decoder);
    let text = decode_drop(&acquirer, &decoder, DragData::from_text(source)).await?;
    println!("{}", text);
    Ok(())
}

async fn run_scan(config: &AppConfig, camera_index: u32, timeout: Option<Duration>) -> Result<()> {
    let provider = camera::detect(camera_index);
    let decoder = DecodeAdapter::new(Capabilities::detect().decoder);

    let cancel = CancellationToken::new();
    let stop = cancel.clone();
    tokio::spawn(async move {
        match timeout {
            Some(limit) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {}
                    _ = tokio::time::sleep(limit) => tracing::warn!("Scan timed out"),
                }
            }
            None => {
                let _ = tokio::signal::ctrl_c().await;
            }
        }
        stop.cancel();
    });

    let text = scan_once(provider.as_ref(), decoder, config.scan_refresh(), &cancel).await?;
    println!("{}", text);
    Ok(())
}

/// Open the camera and sample frames until one decodes or `cancel` fires.
async fn scan_once(
    provider: &dyn CameraProvider,
    decoder: DecodeAdapter,
    refresh: Duration,
    cancel: &CancellationToken,
) -> Result<String> {
    let mut scanner = ScanController::new(decoder);
    scanner.start(provider).await?;
    tracing::info!("Scanning, hold a QR code up to the camera");

    match scanner.run(refresh, cancel).await {
        ScanOutcome::Decoded(text) => Ok(text),
        ScanOutcome::Failed(err) => Err(err.into()),
        ScanOutcome::Stopped => Err(eyre!("scan stopped before a QR code was found")),
    }
}

/// Resolve, read and decode a drop payload. Decoding runs on the blocking pool.
async fn decode_drop(
    acquirer: &ImageAcquirer<HttpImageFetcher>,
    decoder: &DecodeAdapter,
    data: DragData,
) -> std::result::Result<String, QrError> {
    let buffer = acquirer.from_drop(&data).await?;
    let decoder = decoder.clone();
    tokio::task::spawn_blocking(move || decoder.decode(&buffer)?.into_text())
        .await
        .map_err(QrError::image_load)?
}

/// Queue an action from the main loop itself. The loop is the only receiver,
/// so this must never wait for capacity.
fn queue_action(tx: &mpsc::Sender<Action>, action: Action) {
    if let Err(e) = tx.try_send(action) {
        tracing::warn!("Dropping action, queue unavailable: {}", e);
    }
}

async fn run_tui(
    mut app_config: AppConfig,
    config_path: &Path,
    camera_index: u32,
    log_buffer: LogBuffer,
) -> Result<()> {
    // Capabilities are resolved once; everything below shares the handles.
    let capabilities = Capabilities::detect();
    let camera: Arc<dyn CameraProvider> = camera::detect(camera_index);
    let acquirer = Arc::new(ImageAcquirer::new(HttpImageFetcher::new(FETCH_TIMEOUT)?));
    let decoder = DecodeAdapter::new(capabilities.decoder.clone());

    const ACTION_CHANNEL_CAPACITY: usize = 100;
    let (action_tx, mut action_rx) = mpsc::channel::<Action>(ACTION_CHANNEL_CAPACITY);
    let (generation_tx, mut generation_rx) = mpsc::unbounded_channel();

    let generator = GenerationTrigger::new(
        app_config.debounce(),
        EncodeAdapter::new(capabilities.encoder.clone()),
        generation_tx,
    );

    // Detect terminal theme (must be done before entering raw mode)
    let theme = theme::Theme::resolve(app_config.theme);
    let initial_theme = theme;

    let mut app = App::new(&app_config, theme, generator, decoder.clone(), log_buffer);

    let mut tui = Tui::new()?;
    tui.enter()?;

    // The tick doubles as the scan refresh.
    let mut events = EventHandler::new(app_config.scan_refresh());

    loop {
        tui.draw(|frame| ui::render(frame, &mut app))?;

        tokio::select! {
            event = events.next() => {
                let action = match event? {
                    Event::Tick => {
                        app.tick();
                        None
                    }
                    Event::Key(key) => app.handle_key(key),
                    Event::Paste(text) => app.handle_paste(text),
                    Event::Resize(_, _) => None,
                };
                if let Some(action) = action {
                    queue_action(&action_tx, action);
                }
            }
            Some(action) = action_rx.recv() => {
                match action {
                    Action::Quit => app.should_quit = true,
                    Action::RequestCamera(token) => {
                        let camera = camera.clone();
                        let facing = app.scan.facing();
                        let tx = action_tx.clone();
                        tokio::spawn(async move {
                            let grant = camera.request(facing).await;
                            let _ = tx.send(Action::CameraResponse(token, CameraGrant(grant))).await;
                        });
                    }
                    Action::CameraResponse(token, grant) => app.on_camera_response(token, grant),
                    Action::Decode { id, data } => {
                        let acquirer = acquirer.clone();
                        let decoder = decoder.clone();
                        let tx = action_tx.clone();
                        tokio::spawn(async move {
                            let result = decode_drop(&acquirer, &decoder, data).await;
                            let _ = tx.send(Action::DecodeFinished { id, result }).await;
                        });
                    }
                    Action::PasteImage { id } => {
                        let decoder = decoder.clone();
                        let tx = action_tx.clone();
                        tokio::spawn(async move {
                            let result = tokio::task::spawn_blocking(move || {
                                let buffer = clipboard::paste_image()?;
                                decoder.decode(&buffer)?.into_text()
                            })
                            .await
                            .map_err(QrError::image_load)
                            .and_then(|r| r);
                            let _ = tx.send(Action::DecodeFinished { id, result }).await;
                        });
                    }
                    Action::DecodeFinished { id, result } => app.on_decode_finished(id, result),
                    Action::CopyText(text) => {
                        let result = clipboard::copy_text(&text).map(|()| "Copied to clipboard".to_string());
                        app.report(result);
                    }
                    Action::CopyImage => {
                        let result = match app.generation_view().image() {
                            Some(image) => clipboard::copy_image(&image.image)
                                .map(|()| "Copied image to clipboard".to_string()),
                            None => Err("No image to copy".to_string()),
                        };
                        app.report(result);
                    }
                    Action::OpenLink(url) => {
                        let result = clipboard::open_link(&url).map(|()| format!("Opened {}", url));
                        app.report(result);
                    }
                    Action::SavePng => {
                        let result = match app.generation_view().image() {
                            Some(image) => display::save_png(image, &app_config.resolve_download_dir())
                                .map(|path| format!("Saved {}", path.display()))
                                .map_err(|e| e.to_string()),
                            None => Err("No image to save".to_string()),
                        };
                        app.report(result);
                    }
                }
            }
            Some(outcome) = generation_rx.recv() => {
                if app.generator.accept(outcome)
                    && let qrkit_core::GenerationView::Failed(err) = app.generation_view()
                {
                    let message = err.to_string();
                    app.set_status(StatusLevel::Error, message);
                }
            }
        }

        if app.should_quit {
            break;
        }
    }

    app.scan.stop();
    tui.exit()?;

    if app.theme != initial_theme {
        app_config.theme = match app.theme {
            theme::Theme::Dark => ThemeConfig::Dark,
            theme::Theme::Light => ThemeConfig::Light,
        };
        if let Err(e) = config::save_config_to(&app_config, config_path) {
            tracing::warn!("Failed to save config: {}", e);
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use qrkit_core::{FacingMode, MediaStream, PixelBuffer};

    struct StillFrame(PixelBuffer);

    impl MediaStream for StillFrame {
        fn resolution(&self) -> (u32, u32) {
            (self.0.width(), self.0.height())
        }
        fn is_ready(&self) -> bool {
            true
        }
        fn sample(&mut self) -> qrkit_core::Result<PixelBuffer> {
            Ok(self.0.clone())
        }
        fn release(&mut self) {}
    }

    struct StillCamera(PixelBuffer);

    #[async_trait::async_trait]
    impl CameraProvider for StillCamera {
        async fn request(&self, _facing: FacingMode) -> qrkit_core::Result<Box<dyn MediaStream>> {
            Ok(Box::new(StillFrame(self.0.clone())))
        }
    }

    fn decoder() -> DecodeAdapter {
        DecodeAdapter::new(Capabilities::detect().decoder)
    }

    #[tokio::test]
    async fn test_scan_once_prints_decoded_text() {
        let request = GenerationRequest::new("HELLO", ErrorCorrection::M, 256).unwrap();
        let encoded = EncodeAdapter::new(Capabilities::detect().encoder)
            .encode(&request)
            .unwrap();
        let camera = StillCamera(encoded.image);
        let cancel = CancellationToken::new();

        let text = scan_once(&camera, decoder(), Duration::from_millis(5), &cancel)
            .await
            .unwrap();
        assert_eq!(text, "HELLO");
    }

    #[tokio::test]
    async fn test_scan_once_without_camera_fails() {
        let cancel = CancellationToken::new();
        let err = scan_once(&camera::NoCamera, decoder(), Duration::from_millis(5), &cancel)
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<QrError>(),
            Some(QrError::CameraUnavailable(_))
        ));
    }

    #[tokio::test]
    async fn test_scan_once_cancelled() {
        let blank = PixelBuffer::new(4, 4, vec![255; 64]).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = scan_once(&StillCamera(blank), decoder(), Duration::from_millis(5), &cancel).await;
        assert!(result.is_err());
    }

    #[test]
    fn test_queue_action_drops_when_full() {
        let (tx, mut rx) = mpsc::channel::<Action>(1);
        queue_action(&tx, Action::CopyText("first".to_string()));
        // Full queue: returns immediately instead of waiting on ourselves.
        queue_action(&tx, Action::CopyText("second".to_string()));

        assert!(matches!(rx.try_recv(), Ok(Action::CopyText(text)) if text == "first"));
        assert!(rx.try_recv().is_err());
    }
}
