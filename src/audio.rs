//! Audio decoding and probing on top of symphonia.

use std::path::Path;

use num_traits::Float;
use symphonia::core::audio::{AudioBufferRef, Signal};
use symphonia::core::codecs::{CODEC_TYPE_NULL, CodecParameters, DecoderOptions};
use symphonia::core::conv::FromSample;
use symphonia::core::formats::FormatReader;

#[derive(Debug, thiserror::Error)]
pub enum AudioError {
    #[error("cannot open audio: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot decode audio: {0}")]
    Decode(#[from] symphonia::core::errors::Error),
    #[error("no supported audio tracks")]
    NoTrack,
    #[error("audio track has no sample rate")]
    UnknownSampleRate,
}

struct OpenedTrack {
    format: Box<dyn FormatReader>,
    track_id: u32,
    params: CodecParameters,
}

fn open_track(audio_path: &Path) -> Result<OpenedTrack, AudioError> {
    let src = std::fs::File::open(audio_path)?;
    let mss = symphonia::core::io::MediaSourceStream::new(Box::new(src), Default::default());

    let mut hint = symphonia::core::probe::Hint::new();
    if let Some(ext) = audio_path.extension().and_then(|e| e.to_str()) {
        hint.with_extension(ext);
    }

    let meta_opts: symphonia::core::meta::MetadataOptions = Default::default();
    let fmt_opts: symphonia::core::formats::FormatOptions = Default::default();
    let probed = symphonia::default::get_probe().format(&hint, mss, &fmt_opts, &meta_opts)?;
    let format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or(AudioError::NoTrack)?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    Ok(OpenedTrack {
        format,
        track_id,
        params,
    })
}

/// Decodes the first channel of `audio_path` as f32 PCM at the file's own rate.
pub fn load_audio(audio_path: &Path) -> Result<(Vec<f32>, u32), AudioError> {
    let OpenedTrack {
        mut format,
        track_id,
        params,
    } = open_track(audio_path)?;

    let dec_opts: DecoderOptions = Default::default();
    let mut decoder = symphonia::default::get_codecs().make(&params, &dec_opts)?;
    let sample_rate = params.sample_rate.ok_or(AudioError::UnknownSampleRate)?;

    let mut pcm_data = Vec::new();
    while let Ok(packet) = format.next_packet() {
        while !format.metadata().is_latest() {
            format.metadata().pop();
        }
        if packet.track_id() != track_id {
            continue;
        }
        match decoder.decode(&packet)? {
            AudioBufferRef::F32(buf) => pcm_data.extend(buf.chan(0)),
            AudioBufferRef::U8(data) => conv(&mut pcm_data, data),
            AudioBufferRef::U16(data) => conv(&mut pcm_data, data),
            AudioBufferRef::U24(data) => conv(&mut pcm_data, data),
            AudioBufferRef::U32(data) => conv(&mut pcm_data, data),
            AudioBufferRef::S8(data) => conv(&mut pcm_data, data),
            AudioBufferRef::S16(data) => conv(&mut pcm_data, data),
            AudioBufferRef::S24(data) => conv(&mut pcm_data, data),
            AudioBufferRef::S32(data) => conv(&mut pcm_data, data),
            AudioBufferRef::F64(data) => conv(&mut pcm_data, data),
        }
    }

    Ok((pcm_data, sample_rate))
}

fn conv<T>(samples: &mut Vec<f32>, data: std::borrow::Cow<symphonia::core::audio::AudioBuffer<T>>)
where
    T: symphonia::core::sample::Sample,
    f32: FromSample<T>,
{
    samples.extend(data.chan(0).iter().map(|v| f32::from_sample(*v)))
}

/// Duration in seconds, from the container header when it carries a frame count.
pub fn probe_duration(audio_path: &Path) -> Result<f64, AudioError> {
    let OpenedTrack {
        mut format,
        track_id,
        params,
    } = open_track(audio_path)?;
    let sample_rate = params.sample_rate.ok_or(AudioError::UnknownSampleRate)?;

    if let Some(n_frames) = params.n_frames {
        return Ok(n_frames as f64 / sample_rate as f64);
    }

    let mut decoder = symphonia::default::get_codecs().make(&params, &Default::default())?;
    let mut frames = 0u64;
    while let Ok(packet) = format.next_packet() {
        if packet.track_id() != track_id {
            continue;
        }
        frames += decoder.decode(&packet)?.frames() as u64;
    }
    Ok(frames as f64 / sample_rate as f64)
}

/// Nearest-sample resampling, adequate for speech recognition input.
pub fn resample(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || from_rate == 0 {
        return samples.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let output_len = (samples.len() as f64 / ratio) as usize;
    let mut resampled = Vec::with_capacity(output_len);

    for i in 0..output_len {
        let src_index = (i as f64 * ratio) as usize;
        if src_index < samples.len() {
            resampled.push(samples[src_index]);
        }
    }

    resampled
}

const MEL_F_SP: f64 = 200.0 / 3.0;
const MEL_MIN_LOG_HZ: f64 = 1000.0;
const MEL_MIN_LOG_MEL: f64 = MEL_MIN_LOG_HZ / MEL_F_SP;

fn mel_logstep() -> f64 {
    6.4f64.ln() / 27.0
}

/// Slaney mel scale.
pub fn hz_to_mel(hz: f64) -> f64 {
    if hz >= MEL_MIN_LOG_HZ {
        MEL_MIN_LOG_MEL + (hz / MEL_MIN_LOG_HZ).ln() / mel_logstep()
    } else {
        hz / MEL_F_SP
    }
}

pub fn mel_to_hz(mel: f64) -> f64 {
    if mel >= MEL_MIN_LOG_MEL {
        MEL_MIN_LOG_HZ * (mel_logstep() * (mel - MEL_MIN_LOG_MEL)).exp()
    } else {
        MEL_F_SP * mel
    }
}

/// Slaney-normalised triangular mel filterbank, row-major `[n_mels][n_fft / 2 + 1]`.
pub fn mel_filters<T: Float>(sample_rate: usize, n_fft: usize, n_mels: usize) -> Vec<T> {
    let n_freqs = n_fft / 2 + 1;
    let fft_freqs: Vec<f64> = (0..n_freqs)
        .map(|k| k as f64 * sample_rate as f64 / n_fft as f64)
        .collect();

    let max_mel = hz_to_mel(sample_rate as f64 / 2.0);
    let mel_points: Vec<f64> = (0..n_mels + 2)
        .map(|i| mel_to_hz(max_mel * i as f64 / (n_mels + 1) as f64))
        .collect();

    let mut filters = Vec::with_capacity(n_mels * n_freqs);
    for m in 0..n_mels {
        let (lo, center, hi) = (mel_points[m], mel_points[m + 1], mel_points[m + 2]);
        let enorm = 2.0 / (hi - lo);
        for &freq in &fft_freqs {
            let lower = (freq - lo) / (center - lo);
            let upper = (hi - freq) / (hi - center);
            let weight = lower.min(upper).max(0.0) * enorm;
            filters.push(T::from(weight).unwrap_or_else(T::zero));
        }
    }
    filters
}
