//! Animated GIF encoder over a worker-pool renderer.
//!
//! Frames are buffered until `stop`, which starts an asynchronous render.
//! Completion is announced with a `finished` event; a `save` issued before
//! then is delivered when that event fires.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use bytes::Bytes;
use ::image::imageops::FilterType;
use ::image::RgbaImage;
use parking_lot::Mutex;
use tracing::{debug, error, info, instrument, trace};

use framecap_capture::Frame;
use framecap_ipc::{EncoderEvent, EventKind};

use crate::events::EventBus;
use crate::{Artifact, Encoder, EncoderError, EncoderResult, EncoderSettings, SaveCallback};

/// Size the renderer is configured with until the first frame arrives.
const PLACEHOLDER_SIZE: u32 = 1;

/// Renderer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GifOptions {
    /// Worker threads quantizing frames.
    pub workers: usize,

    /// Location of worker scripts, unused by the thread pool.
    pub workers_path: String,

    /// Quantization effort on a 0 - 100 scale where higher is worse.
    pub quality: u8,

    /// Output width.
    pub width: u32,

    /// Output height.
    pub height: u32,
}

impl GifOptions {
    /// Options for `settings`, inverting the 0 - 100 "higher is better"
    /// quality and using a placeholder size.
    pub fn from_settings(settings: &EncoderSettings) -> Self {
        Self {
            workers: settings.workers.max(1),
            workers_path: settings.workers_path.clone(),
            quality: 100 - settings.quality.min(100),
            width: PLACEHOLDER_SIZE,
            height: PLACEHOLDER_SIZE,
        }
    }

    /// Quantizer speed for the `gif` crate (1 = best, 30 = fastest).
    pub fn speed(&self) -> i32 {
        1 + i32::from(self.quality.min(100)) * 29 / 100
    }
}

/// Callbacks a render reports through.
pub struct RenderCallbacks {
    /// Fractional progress, called from the render thread.
    pub progress: Box<dyn Fn(f32) + Send + Sync>,

    /// Called once with the encoded GIF or the failure.
    pub finished: Box<dyn FnOnce(EncoderResult<Bytes>) + Send>,
}

/// A GIF renderer accepting frames and rendering them asynchronously.
pub trait GifBackend: Send {
    /// Apply worker count, quality and size.
    fn configure(&mut self, options: GifOptions);

    /// Fix the output size.
    fn resize(&mut self, width: u32, height: u32);

    /// Buffer a copy of `frame`, shown for `delay_cs` hundredths of a second.
    fn add_frame(&mut self, frame: &Frame, delay_cs: u16);

    /// Start rendering every buffered frame.
    fn render(&mut self, callbacks: RenderCallbacks);

    /// Cancel an in-flight render and drop buffered frames.
    fn abort(&mut self);
}

/// Creates a fresh renderer per recording.
pub type GifBackendFactory = Arc<dyn Fn() -> Box<dyn GifBackend> + Send + Sync>;

/// Display time of one frame at `rate` frames per second, in centiseconds.
pub fn frame_delay_cs(rate: u32) -> u16 {
    let delay = (100.0 / f64::from(rate.max(1))).round();
    (delay.min(f64::from(u16::MAX)) as u16).max(1)
}

/// Renderer quantizing frames on a pool of threads with the `gif` crate.
pub struct WorkerPoolGif {
    options: GifOptions,
    frames: Vec<(Frame, u16)>,
    aborted: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
}

impl WorkerPoolGif {
    /// Create a renderer with default options.
    pub fn new() -> Self {
        Self {
            options: GifOptions::from_settings(&EncoderSettings::default()),
            frames: Vec::new(),
            aborted: Arc::new(AtomicBool::new(false)),
            handle: None,
        }
    }

    /// Factory producing worker-pool renderers.
    pub fn factory() -> GifBackendFactory {
        Arc::new(|| Box::new(WorkerPoolGif::new()) as Box<dyn GifBackend>)
    }
}

impl Default for WorkerPoolGif {
    fn default() -> Self {
        Self::new()
    }
}

impl GifBackend for WorkerPoolGif {
    fn configure(&mut self, options: GifOptions) {
        debug!(
            workers = options.workers,
            speed = options.speed(),
            workers_path = %options.workers_path,
            "Configured GIF worker pool"
        );
        self.options = options;
    }

    fn resize(&mut self, width: u32, height: u32) {
        self.options.width = width;
        self.options.height = height;
    }

    fn add_frame(&mut self, frame: &Frame, delay_cs: u16) {
        self.frames.push((frame.clone(), delay_cs));
    }

    #[instrument(name = "gif_render", skip_all, fields(frames = self.frames.len()))]
    fn render(&mut self, callbacks: RenderCallbacks) {
        let frames = std::mem::take(&mut self.frames);
        let options = self.options.clone();
        let aborted = Arc::new(AtomicBool::new(false));
        self.aborted = Arc::clone(&aborted);

        let RenderCallbacks { progress, finished } = callbacks;
        let finished = Arc::new(Mutex::new(Some(finished)));
        let thread_finished = Arc::clone(&finished);

        let spawned = thread::Builder::new()
            .name("gif-render".to_string())
            .spawn(move || {
                let result = render_frames(&frames, &options, &aborted, progress.as_ref());
                if aborted.load(Ordering::SeqCst) {
                    debug!("GIF render aborted");
                    return;
                }
                if let Some(finished) = thread_finished.lock().take() {
                    finished(result);
                }
            });

        match spawned {
            Ok(handle) => self.handle = Some(handle),
            Err(e) => {
                error!("Failed to spawn GIF render thread: {}", e);
                if let Some(finished) = finished.lock().take() {
                    finished(Err(EncoderError::Render(format!(
                        "failed to spawn render thread: {e}"
                    ))));
                }
            }
        }
    }

    fn abort(&mut self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.frames.clear();
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                error!("GIF render thread panicked");
            }
        }
    }
}

impl Drop for WorkerPoolGif {
    fn drop(&mut self) {
        self.aborted.store(true, Ordering::SeqCst);
    }
}

/// Quantize every frame on the pool, then write them in order.
fn render_frames(
    frames: &[(Frame, u16)],
    options: &GifOptions,
    aborted: &AtomicBool,
    progress: &(dyn Fn(f32) + Send + Sync),
) -> EncoderResult<Bytes> {
    if frames.is_empty() {
        return Err(EncoderError::NoData("no frames to render".to_string()));
    }

    let width = u16::try_from(options.width)
        .map_err(|_| EncoderError::InvalidInput(format!("width {} exceeds GIF limit", options.width)))?;
    let height = u16::try_from(options.height).map_err(|_| {
        EncoderError::InvalidInput(format!("height {} exceeds GIF limit", options.height))
    })?;

    let total = frames.len();
    let workers = options.workers.clamp(1, total);
    let next = AtomicUsize::new(0);
    let (tx, rx) = crossbeam_channel::bounded(total);
    let mut quantized: Vec<Option<::gif::Frame<'static>>> = (0..total).map(|_| None).collect();

    thread::scope(|scope| -> EncoderResult<()> {
        for _ in 0..workers {
            let tx = tx.clone();
            let next = &next;
            scope.spawn(move || loop {
                if aborted.load(Ordering::SeqCst) {
                    break;
                }
                let index = next.fetch_add(1, Ordering::SeqCst);
                let Some((frame, delay)) = frames.get(index) else {
                    break;
                };
                let result = quantize(frame, options, width, height, *delay);
                if tx.send((index, result)).is_err() {
                    break;
                }
            });
        }
        drop(tx);

        for (done, (index, result)) in rx.iter().enumerate() {
            quantized[index] = Some(result?);
            progress((done + 1) as f32 / total as f32);
        }
        Ok(())
    })?;

    if aborted.load(Ordering::SeqCst) {
        return Err(EncoderError::Disposed);
    }

    let render_error = |e: ::gif::EncodingError| EncoderError::Render(e.to_string());
    let mut output = Vec::new();
    {
        let mut encoder = ::gif::Encoder::new(&mut output, width, height, &[]).map_err(render_error)?;
        encoder
            .set_repeat(::gif::Repeat::Infinite)
            .map_err(render_error)?;
        for frame in quantized.into_iter().flatten() {
            encoder.write_frame(&frame).map_err(render_error)?;
        }
    }

    trace!(size = output.len(), "GIF written");
    Ok(Bytes::from(output))
}

/// Scale `frame` to the output size if needed and reduce it to a palette.
fn quantize(
    frame: &Frame,
    options: &GifOptions,
    width: u16,
    height: u16,
    delay: u16,
) -> EncoderResult<::gif::Frame<'static>> {
    if !frame.is_valid() {
        return Err(EncoderError::InvalidInput(format!(
            "frame {} has {} bytes for {}x{}",
            frame.sequence,
            frame.data.len(),
            frame.width,
            frame.height
        )));
    }

    let mut rgba = if frame.dimensions() == (options.width, options.height) {
        frame.data.to_vec()
    } else {
        let image = RgbaImage::from_raw(frame.width, frame.height, frame.data.to_vec())
            .ok_or_else(|| EncoderError::InvalidInput("invalid frame buffer".to_string()))?;
        ::image::imageops::resize(&image, options.width, options.height, FilterType::Triangle)
            .into_raw()
    };

    let mut out = ::gif::Frame::from_rgba_speed(width, height, &mut rgba, options.speed());
    out.delay = delay;
    Ok(out)
}

#[derive(Default)]
struct RenderState {
    /// Bumped on start and dispose so late completions are discarded.
    generation: u64,
    rendering: bool,
    artifact: Option<Artifact>,
}

/// Encoder producing one animated GIF per recording.
pub struct GifEncoder {
    settings: EncoderSettings,
    factory: GifBackendFactory,
    backend: Option<Box<dyn GifBackend>>,
    render: Arc<Mutex<RenderState>>,
    delay_cs: u16,
    sized: bool,
    frames: u64,
    bus: EventBus,
}

impl GifEncoder {
    /// Create the encoder. Fails when no GIF renderer is available.
    pub fn new(settings: EncoderSettings, factory: Option<GifBackendFactory>) -> EncoderResult<Self> {
        let factory = factory.ok_or_else(|| {
            EncoderError::LibraryUnavailable("no GIF renderer registered".to_string())
        })?;
        let delay_cs = frame_delay_cs(settings.rate);

        Ok(Self {
            settings,
            factory,
            backend: None,
            render: Arc::new(Mutex::new(RenderState::default())),
            delay_cs,
            sized: false,
            frames: 0,
            bus: EventBus::new(),
        })
    }

    /// Delay between frames in centiseconds.
    pub fn delay_cs(&self) -> u16 {
        self.delay_cs
    }

    /// Returns true while a render is in flight.
    pub fn is_rendering(&self) -> bool {
        self.render.lock().rendering
    }

    fn release(&mut self) {
        if let Some(mut backend) = self.backend.take() {
            backend.abort();
        }
        let mut render = self.render.lock();
        render.generation += 1;
        render.rendering = false;
        render.artifact = None;
        drop(render);
        self.sized = false;
        self.frames = 0;
    }
}

impl Encoder for GifEncoder {
    #[instrument(name = "gif_start", skip(self), fields(delay_cs = self.delay_cs))]
    fn start(&mut self) {
        self.release();
        let mut backend = (self.factory)();
        backend.configure(GifOptions::from_settings(&self.settings));
        self.backend = Some(backend);
        self.bus.emit(EncoderEvent::Start);
    }

    fn add(&mut self, frame: &Frame) {
        let Some(backend) = self.backend.as_mut() else {
            self.bus.error(EncoderError::NotStarted.to_string());
            return;
        };
        {
            let render = self.render.lock();
            if render.rendering || render.artifact.is_some() {
                trace!("GIF already rendering, ignoring frame");
                return;
            }
        }

        if !self.sized {
            backend.resize(frame.width, frame.height);
            self.sized = true;
            debug!(width = frame.width, height = frame.height, "GIF size fixed");
        }

        backend.add_frame(frame, self.delay_cs);
        self.frames += 1;
        self.bus.step();
    }

    #[instrument(name = "gif_stop", skip(self), fields(frames = self.frames))]
    fn stop(&mut self) {
        self.bus.emit(EncoderEvent::Stop);

        let Some(backend) = self.backend.as_mut() else {
            return;
        };
        let generation = {
            let mut render = self.render.lock();
            if render.rendering || render.artifact.is_some() {
                return;
            }
            render.rendering = true;
            render.generation
        };

        info!("Rendering GIF");
        let progress_bus = self.bus.clone();
        let finished_bus = self.bus.clone();
        let state = Arc::clone(&self.render);
        let format = self.settings.format;
        let name = self.settings.name.clone();

        backend.render(RenderCallbacks {
            progress: Box::new(move |fraction| progress_bus.progress(fraction)),
            finished: Box::new(move |result| {
                let mut render = state.lock();
                if render.generation != generation {
                    return;
                }
                render.rendering = false;
                match result {
                    Ok(data) => {
                        let size = data.len();
                        render.artifact = Some(Artifact::new(data, format, name));
                        drop(render);
                        info!(size, "GIF rendered");
                        finished_bus.emit(EncoderEvent::Finished { size });
                    }
                    Err(e) => {
                        drop(render);
                        finished_bus.error(e.to_string());
                    }
                }
            }),
        });
    }

    fn save(&mut self, callback: SaveCallback) {
        let render = self.render.lock();
        if let Some(artifact) = render.artifact.clone() {
            drop(render);
            callback(artifact);
            return;
        }

        if !render.rendering {
            drop(render);
            self.bus
                .error("GIF has not been rendered; call stop() before save()");
            return;
        }

        // Subscribed while the render state is locked, so completion
        // cannot slip between the check and the subscription. The handler
        // only accepts the render it was registered against.
        let generation = render.generation;
        let pending = Mutex::new(Some(callback));
        let state = Arc::clone(&self.render);
        self.bus.on(EventKind::Finished, move |_| {
            let Some(callback) = pending.lock().take() else {
                return;
            };
            let artifact = {
                let render = state.lock();
                if render.generation != generation {
                    debug!(generation, "Recording restarted, dropping deferred save");
                    return;
                }
                render.artifact.clone()
            };
            if let Some(artifact) = artifact {
                callback(artifact);
            }
        });
        drop(render);
        debug!("Save deferred until render finishes");
    }

    fn dispose(&mut self) {
        self.release();
        self.bus.dispose();
    }

    fn events(&self) -> &EventBus {
        &self.bus
    }

    fn frames(&self) -> u64 {
        self.frames
    }

    fn name(&self) -> &'static str {
        "gif"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use framecap_ipc::CaptureFormat;
    use std::time::Duration;

    #[derive(Default)]
    struct FakeLog {
        options: Option<GifOptions>,
        size: Option<(u32, u32)>,
        delays: Vec<u16>,
        callbacks: Option<RenderCallbacks>,
        renders: usize,
        aborted: bool,
    }

    /// Renderer that holds its callbacks until the test completes them.
    struct FakeGif {
        log: Arc<Mutex<FakeLog>>,
    }

    impl GifBackend for FakeGif {
        fn configure(&mut self, options: GifOptions) {
            self.log.lock().options = Some(options);
        }

        fn resize(&mut self, width: u32, height: u32) {
            self.log.lock().size = Some((width, height));
        }

        fn add_frame(&mut self, _frame: &Frame, delay_cs: u16) {
            self.log.lock().delays.push(delay_cs);
        }

        fn render(&mut self, callbacks: RenderCallbacks) {
            let mut log = self.log.lock();
            log.renders += 1;
            log.callbacks = Some(callbacks);
        }

        fn abort(&mut self) {
            self.log.lock().aborted = true;
        }
    }

    fn fake_factory() -> (GifBackendFactory, Arc<Mutex<FakeLog>>) {
        let log = Arc::new(Mutex::new(FakeLog::default()));
        let factory_log = Arc::clone(&log);
        let factory: GifBackendFactory = Arc::new(move || {
            Box::new(FakeGif {
                log: Arc::clone(&factory_log),
            }) as Box<dyn GifBackend>
        });
        (factory, log)
    }

    fn complete(log: &Arc<Mutex<FakeLog>>, data: &'static [u8]) {
        let callbacks = log.lock().callbacks.take().unwrap();
        (callbacks.progress)(1.0);
        (callbacks.finished)(Ok(Bytes::from_static(data)));
    }

    fn counting_callback(count: &Arc<Mutex<Vec<Artifact>>>) -> SaveCallback {
        let count = Arc::clone(count);
        Box::new(move |artifact| count.lock().push(artifact))
    }

    fn settings(rate: u32) -> EncoderSettings {
        EncoderSettings {
            rate,
            quality: 80,
            workers: 2,
            ..EncoderSettings::for_format(CaptureFormat::Gif)
        }
    }

    #[test]
    fn test_frame_delay() {
        assert_eq!(frame_delay_cs(10), 10);
        assert_eq!(frame_delay_cs(30), 3);
        assert_eq!(frame_delay_cs(60), 2);
        assert_eq!(frame_delay_cs(1000), 1);
        assert_eq!(frame_delay_cs(0), 100);
    }

    #[test]
    fn test_options_invert_quality() {
        let options = GifOptions::from_settings(&settings(30));
        assert_eq!(options.quality, 20);
        assert_eq!(options.workers, 2);
        assert_eq!((options.width, options.height), (1, 1));

        let best = GifOptions { quality: 0, ..options.clone() };
        let worst = GifOptions { quality: 100, ..options };
        assert_eq!(best.speed(), 1);
        assert_eq!(worst.speed(), 30);
    }

    #[test]
    fn test_missing_library_is_fatal() {
        let result = GifEncoder::new(settings(30), None);
        assert!(matches!(result, Err(EncoderError::LibraryUnavailable(_))));
    }

    #[test]
    fn test_save_before_render_completes_delivers_once() {
        let (factory, log) = fake_factory();
        let mut encoder = GifEncoder::new(settings(30), Some(factory)).unwrap();
        encoder.start();
        for _ in 0..5 {
            encoder.add(&Frame::solid(8, 6, [255, 0, 0, 255]));
        }
        encoder.stop();
        assert!(encoder.is_rendering());

        let saved = Arc::new(Mutex::new(Vec::new()));
        encoder.save(counting_callback(&saved));
        assert!(saved.lock().is_empty());

        complete(&log, b"GIF89a");
        assert_eq!(saved.lock().len(), 1);
        assert_eq!(saved.lock()[0].file_name(), "capture.gif");

        // A repeated stop neither re-renders nor re-delivers.
        encoder.stop();
        assert_eq!(log.lock().renders, 1);
        assert_eq!(saved.lock().len(), 1);

        let log = log.lock();
        assert_eq!(log.size, Some((8, 6)));
        assert_eq!(log.delays, vec![3; 5]);
    }

    #[test]
    fn test_save_after_render_is_immediate() {
        let (factory, log) = fake_factory();
        let mut encoder = GifEncoder::new(settings(10), Some(factory)).unwrap();
        let finished = Arc::new(Mutex::new(None));
        let finished_clone = Arc::clone(&finished);
        encoder.on(
            EventKind::Finished,
            Arc::new(move |event: &EncoderEvent| *finished_clone.lock() = Some(event.clone())),
        );

        encoder.start();
        encoder.add(&Frame::solid(2, 2, [0; 4]));
        encoder.stop();
        complete(&log, b"GIF89a;");
        assert_eq!(*finished.lock(), Some(EncoderEvent::Finished { size: 7 }));

        let saved = Arc::new(Mutex::new(Vec::new()));
        encoder.save(counting_callback(&saved));
        assert_eq!(saved.lock().len(), 1);
        assert_eq!(saved.lock()[0].data.as_ref(), b"GIF89a;");
    }

    #[test]
    fn test_save_without_render_is_error() {
        let (factory, _log) = fake_factory();
        let mut encoder = GifEncoder::new(settings(10), Some(factory)).unwrap();
        let errors = Arc::new(Mutex::new(0));
        let errors_clone = Arc::clone(&errors);
        encoder.on(
            EventKind::Error,
            Arc::new(move |_: &EncoderEvent| *errors_clone.lock() += 1),
        );

        encoder.start();
        encoder.save(Box::new(|_| panic!("nothing rendered")));
        assert_eq!(*errors.lock(), 1);
    }

    #[test]
    fn test_restart_drops_deferred_save() {
        let (factory, log) = fake_factory();
        let mut encoder = GifEncoder::new(settings(10), Some(factory)).unwrap();
        encoder.start();
        encoder.add(&Frame::solid(2, 2, [0; 4]));
        encoder.stop();
        let first = Arc::new(Mutex::new(Vec::new()));
        encoder.save(counting_callback(&first));

        encoder.start();
        encoder.add(&Frame::solid(2, 2, [1; 4]));
        encoder.stop();
        let second = Arc::new(Mutex::new(Vec::new()));
        encoder.save(counting_callback(&second));

        complete(&log, b"SECOND");
        assert!(first.lock().is_empty());
        assert_eq!(second.lock().len(), 1);
        assert_eq!(second.lock()[0].data.as_ref(), b"SECOND");
    }

    #[test]
    fn test_dispose_aborts_and_discards_late_completion() {
        let (factory, log) = fake_factory();
        let mut encoder = GifEncoder::new(settings(10), Some(factory)).unwrap();
        encoder.start();
        encoder.add(&Frame::solid(2, 2, [0; 4]));
        encoder.stop();

        let saved = Arc::new(Mutex::new(Vec::new()));
        encoder.save(counting_callback(&saved));
        encoder.dispose();
        assert!(log.lock().aborted);

        complete(&log, b"late");
        assert!(saved.lock().is_empty());
        assert_eq!(encoder.frames(), 0);
    }

    #[test]
    fn test_worker_pool_renders_decodable_gif() {
        let mut backend = WorkerPoolGif::new();
        backend.configure(GifOptions {
            workers: 3,
            workers_path: String::new(),
            quality: 50,
            width: 4,
            height: 4,
        });
        for (i, color) in [[255, 0, 0, 255], [0, 255, 0, 255], [0, 0, 255, 255]]
            .into_iter()
            .enumerate()
        {
            backend.add_frame(&Frame::solid(4, 4, color).stamped(i as u64, 0.0), 5);
        }
        // Mismatched frames are scaled to the output size.
        backend.add_frame(&Frame::solid(8, 2, [9, 9, 9, 255]), 5);

        let (tx, rx) = crossbeam_channel::bounded(1);
        let progress = Arc::new(Mutex::new(Vec::new()));
        let progress_clone = Arc::clone(&progress);
        backend.render(RenderCallbacks {
            progress: Box::new(move |p| progress_clone.lock().push(p)),
            finished: Box::new(move |result| {
                let _ = tx.send(result);
            }),
        });

        let data = rx
            .recv_timeout(Duration::from_secs(30))
            .unwrap()
            .unwrap();
        assert_eq!(&data[..6], b"GIF89a");

        let mut decoder = ::gif::DecodeOptions::new().read_info(data.as_ref()).unwrap();
        assert_eq!((decoder.width(), decoder.height()), (4, 4));
        let mut delays = Vec::new();
        while let Some(frame) = decoder.read_next_frame().unwrap() {
            delays.push(frame.delay);
        }
        assert_eq!(delays, vec![5, 5, 5, 5]);
        assert_eq!(progress.lock().last().copied(), Some(1.0));
    }

    #[test]
    fn test_worker_pool_rejects_empty_render() {
        let mut backend = WorkerPoolGif::new();
        let (tx, rx) = crossbeam_channel::bounded(1);
        backend.render(RenderCallbacks {
            progress: Box::new(|_| {}),
            finished: Box::new(move |result| {
                let _ = tx.send(result);
            }),
        });

        let result = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert!(matches!(result, Err(EncoderError::NoData(_))));
    }
}
