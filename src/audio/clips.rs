use std::path::Path;
use std::sync::Arc;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Producer, Split},
};
use tracing::{error, info};

use crate::{Error, Result};

const MAX_VOICES: usize = 32;
const QUEUE_LEN: usize = 64;

/// Something that can play one of a fixed set of short sound clips.
pub trait ClipPort {
    fn variants(&self) -> usize;
    fn play(&mut self, variant: usize) -> Result<()>;
}

/// One mono clip rendered at several playback speeds.
pub struct PitchedClips {
    variants: Vec<Arc<[f32]>>,
}

impl PitchedClips {
    pub fn from_wav(path: &Path, factors: &[f32], output_rate: u32) -> Result<Self> {
        let (samples, source_rate) = read_wav(path)?;
        Ok(Self::from_samples(&samples, source_rate, factors, output_rate))
    }

    /// A factor above 1 plays faster and higher.
    pub fn from_samples(samples: &[f32], source_rate: u32, factors: &[f32], output_rate: u32) -> Self {
        let rate_step = source_rate as f32 / output_rate.max(1) as f32;
        let variants = factors
            .iter()
            .map(|factor| Arc::from(resample(samples, factor * rate_step)))
            .collect();
        Self { variants }
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }

    pub fn variant(&self, index: usize) -> Option<&Arc<[f32]>> {
        self.variants.get(index)
    }
}

/// Linear-interpolation resampling that advances `step` input samples per
/// output sample.
pub fn resample(samples: &[f32], step: f32) -> Vec<f32> {
    if samples.is_empty() || !(step > 0.0) {
        return Vec::new();
    }
    let new_len = (samples.len() as f32 / step) as usize;
    (0..new_len)
        .map(|i| {
            let pos = i as f32 * step;
            let idx = (pos.floor() as usize).min(samples.len() - 1);
            let frac = pos - idx as f32;
            let a = samples[idx];
            let b = samples.get(idx + 1).copied().unwrap_or(a);
            a + (b - a) * frac
        })
        .collect()
}

/// First channel of a WAV file as floats in [-1, 1].
fn read_wav(path: &Path) -> Result<(Vec<f32>, u32)> {
    let wav_err = |e: hound::Error| Error::Audio(format!("{}: {e}", path.display()));
    let mut reader = hound::WavReader::open(path).map_err(wav_err)?;
    let spec = reader.spec();
    let channels = spec.channels.max(1) as usize;

    let samples = match spec.sample_format {
        hound::SampleFormat::Float => reader
            .samples::<f32>()
            .step_by(channels)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(wav_err)?,
        hound::SampleFormat::Int => {
            let scale = 1.0 / (1u64 << (spec.bits_per_sample.saturating_sub(1))) as f32;
            reader
                .samples::<i32>()
                .step_by(channels)
                .map(|s| s.map(|v| v as f32 * scale))
                .collect::<std::result::Result<Vec<_>, _>>()
                .map_err(wav_err)?
        }
    };
    Ok((samples, spec.sample_rate))
}

struct Voice {
    samples: Arc<[f32]>,
    position: usize,
}

/// Audio-callback side: mixes triggered clips, never allocates.
struct ClipMixer {
    consumer: HeapCons<Arc<[f32]>>,
    voices: Vec<Voice>,
    channels: usize,
    gain: f32,
}

impl ClipMixer {
    fn new(consumer: HeapCons<Arc<[f32]>>, channels: usize, gain: f32) -> Self {
        Self {
            consumer,
            voices: Vec::with_capacity(MAX_VOICES),
            channels: channels.max(1),
            gain,
        }
    }

    fn render(&mut self, data: &mut [f32]) {
        while let Some(samples) = self.consumer.try_pop() {
            if self.voices.len() < MAX_VOICES {
                self.voices.push(Voice {
                    samples,
                    position: 0,
                });
            }
        }

        for frame in data.chunks_mut(self.channels) {
            let mut mixed = 0.0;
            for voice in &mut self.voices {
                if let Some(sample) = voice.samples.get(voice.position) {
                    mixed += sample;
                    voice.position += 1;
                }
            }
            frame.fill((mixed * self.gain).clamp(-1.0, 1.0));
        }

        self.voices.retain(|v| v.position < v.samples.len());
    }
}

/// Plays pitched clips on the default output device.
pub struct CpalClipPlayer {
    clips: PitchedClips,
    producer: HeapProd<Arc<[f32]>>,
    _stream: cpal::Stream,
}

impl CpalClipPlayer {
    pub fn open(path: &Path, factors: &[f32], gain: f32) -> Result<Self> {
        let audio_err = |e: &dyn std::fmt::Display| Error::Audio(e.to_string());

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device".into()))?;
        let config: cpal::StreamConfig = device
            .default_output_config()
            .map_err(|e| audio_err(&e))?
            .into();

        let clips = PitchedClips::from_wav(path, factors, config.sample_rate)?;
        let (producer, consumer) = HeapRb::<Arc<[f32]>>::new(QUEUE_LEN).split();
        let mut mixer = ClipMixer::new(consumer, config.channels as usize, gain);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| mixer.render(data),
                |err| error!("clip stream error: {err}"),
                None,
            )
            .map_err(|e| audio_err(&e))?;
        stream.play().map_err(|e| audio_err(&e))?;
        info!(
            clip = %path.display(),
            variants = clips.len(),
            channels = config.channels,
            "clip player ready"
        );

        Ok(Self {
            clips,
            producer,
            _stream: stream,
        })
    }
}

impl ClipPort for CpalClipPlayer {
    fn variants(&self) -> usize {
        self.clips.len()
    }

    fn play(&mut self, variant: usize) -> Result<()> {
        let clip = self
            .clips
            .variant(variant)
            .ok_or_else(|| Error::Audio(format!("no clip variant {variant}")))?
            .clone();
        self.producer
            .try_push(clip)
            .map_err(|_| Error::Audio("clip queue is full".into()))
    }
}
