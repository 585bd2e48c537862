//! Audio level metering
//!
//! Samples a local stream's audio tap at display refresh cadence and
//! reduces a windowed spectrum to a single 0-100 level for UI meters.

use std::f32::consts::PI;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use rustfft::{num_complex::Complex, Fft, FftPlanner};
use tokio::task::JoinHandle;
use tracing::debug;

use crate::media::stream::LocalStream;

/// Analysis frame size in samples
const FFT_SIZE: usize = 1024;

/// Quietest bin magnitude represented on the byte scale (dB)
const MIN_DB: f32 = -100.0;

/// Loudest bin magnitude represented on the byte scale (dB)
const MAX_DB: f32 = -30.0;

/// Gain applied to the mean byte magnitude
const LEVEL_GAIN: f32 = 1.5;

/// Offset subtracted after gain, suppresses noise-floor flicker
const LEVEL_OFFSET: f32 = 20.0;

/// Sampling cadence, one display refresh at 60 Hz
const SAMPLE_INTERVAL: Duration = Duration::from_millis(16);

struct MeterInner {
    /// Latest level as f32 bits, readable without locking
    level_bits: AtomicU32,
    sampling: AtomicBool,
    task: Mutex<Option<JoinHandle<()>>>,
}

/// Handle to a running (or idle) level sampler
///
/// Clones share the same sampler; stopping any clone stops them all.
#[derive(Clone)]
pub struct MeterHandle {
    inner: Arc<MeterInner>,
}

impl MeterHandle {
    fn idle() -> Self {
        Self {
            inner: Arc::new(MeterInner {
                level_bits: AtomicU32::new(0.0f32.to_bits()),
                sampling: AtomicBool::new(false),
                task: Mutex::new(None),
            }),
        }
    }

    /// Current level in the range 0.0 to 100.0
    pub fn level(&self) -> f32 {
        f32::from_bits(self.inner.level_bits.load(Ordering::SeqCst))
    }

    /// Whether a sampling task is active
    pub fn is_sampling(&self) -> bool {
        self.inner.sampling.load(Ordering::SeqCst)
    }

    /// Stop sampling
    ///
    /// Idempotent; safe to call on an idle handle or after the task
    /// has already finished.
    pub fn stop(&self) {
        self.inner.sampling.store(false, Ordering::SeqCst);
        if let Some(task) = self.inner.task.lock().take() {
            task.abort();
        }
    }
}

impl std::fmt::Debug for MeterHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MeterHandle")
            .field("level", &self.level())
            .field("sampling", &self.is_sampling())
            .finish()
    }
}

/// Periodic level sampler over a stream's audio tap
#[derive(Default)]
pub struct AudioLevelMeter {
    current: Option<MeterHandle>,
}

impl AudioLevelMeter {
    /// Create a meter with no active sampler
    pub fn new() -> Self {
        Self::default()
    }

    /// Start sampling the stream's audio track
    ///
    /// Any previously started sampler is stopped first. A stream with
    /// no audio track, or with its audio track disabled, yields an
    /// idle handle that reads 0 and runs no task.
    pub fn start(&mut self, stream: &LocalStream) -> MeterHandle {
        if let Some(previous) = self.current.take() {
            previous.stop();
        }

        let track = match stream.audio_track() {
            Some(track) if track.is_enabled() => track,
            _ => {
                debug!(stream_id = %stream.id(), "No enabled audio track, meter idle");
                let handle = MeterHandle::idle();
                self.current = Some(handle.clone());
                return handle;
            }
        };

        let inner = Arc::new(MeterInner {
            level_bits: AtomicU32::new(0.0f32.to_bits()),
            sampling: AtomicBool::new(true),
            task: Mutex::new(None),
        });

        let task_inner = Arc::clone(&inner);
        let task = tokio::spawn(async move {
            let analyzer = SpectrumAnalyzer::new();
            let mut interval = tokio::time::interval(SAMPLE_INTERVAL);

            loop {
                interval.tick().await;
                if !task_inner.sampling.load(Ordering::SeqCst) {
                    break;
                }

                let level = match track.latest_pcm() {
                    Some(frame) => analyzer.level(&frame),
                    None => 0.0,
                };
                task_inner.level_bits.store(level.to_bits(), Ordering::SeqCst);
            }
        });

        *inner.task.lock() = Some(task);
        debug!(stream_id = %stream.id(), "Level meter started");

        let handle = MeterHandle { inner };
        self.current = Some(handle.clone());
        handle
    }
}

/// Reduces PCM frames to a 0-100 level
///
/// Owns the FFT plan; one instance per sampling task.
pub struct SpectrumAnalyzer {
    fft: Arc<dyn Fft<f32>>,
}

impl SpectrumAnalyzer {
    /// Plan the analysis FFT
    pub fn new() -> Self {
        let mut planner = FftPlanner::new();
        Self {
            fft: planner.plan_fft_forward(FFT_SIZE),
        }
    }

    /// Reduce one PCM frame to a 0-100 level
    ///
    /// Hamming-windows the frame (zero-padded to the analysis size),
    /// takes the magnitude spectrum, maps each bin to a byte scale
    /// over the fixed [`MIN_DB`]..[`MAX_DB`] range, then applies the
    /// meter calibration to the mean byte magnitude.
    pub fn level(&self, samples: &[f32]) -> f32 {
        let mut buffer: Vec<Complex<f32>> = (0..FFT_SIZE)
            .map(|i| {
                let sample = samples.get(i).copied().unwrap_or(0.0);
                let window =
                    0.54 - 0.46 * (2.0 * PI * i as f32 / (FFT_SIZE - 1) as f32).cos();
                Complex::new(sample * window, 0.0)
            })
            .collect();

        self.fft.process(&mut buffer);

        // Only the first half carries information for real input
        let byte_sum: f32 = buffer
            .iter()
            .take(FFT_SIZE / 2)
            .map(|c| {
                let magnitude = c.norm() / FFT_SIZE as f32;
                if magnitude <= 0.0 {
                    return 0.0;
                }
                let db = 20.0 * magnitude.log10();
                ((db - MIN_DB) / (MAX_DB - MIN_DB) * 255.0).clamp(0.0, 255.0)
            })
            .sum();

        let mean = byte_sum / (FFT_SIZE / 2) as f32;
        (mean * LEVEL_GAIN - LEVEL_OFFSET).clamp(0.0, 100.0)
    }
}

impl Default for SpectrumAnalyzer {
    fn default() -> Self {
        Self::new()
    }
}
