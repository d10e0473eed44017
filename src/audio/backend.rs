use super::{SynthConfig, ToneHandle, ToneSink, ToneSinkError, Voice, Waveform};
use arc_swap::ArcSwap;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use crossbeam::channel::{self, Receiver, Sender};
use parking_lot::Mutex;
use ringbuf::{
    HeapCons, HeapProd, HeapRb,
    traits::{Consumer, Producer, Split},
};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

const COMMAND_QUEUE_LEN: usize = 1024;
const MAX_VOICES: usize = 64;

enum VoiceCommand {
    Start { handle: ToneHandle, voice: Voice },
    Stop(ToneHandle),
}

/// Plays tones on the default output device.
///
/// The cpal stream lives on its own thread for as long as the sink exists;
/// `play` and `cancel` only push commands into a lock-free queue read by the
/// audio callback.
pub struct CpalToneSink {
    producer: Mutex<HeapProd<VoiceCommand>>,
    config: Arc<ArcSwap<SynthConfig>>,
    sample_rate: f32,
    next_id: AtomicU64,
    _shutdown_tx: Sender<()>,
}

struct AudioState {
    voices: Vec<(ToneHandle, Voice)>,
    consumer: HeapCons<VoiceCommand>,
    config: Arc<ArcSwap<SynthConfig>>,
    sample_rate: f32,
    num_channels: usize,
}

impl CpalToneSink {
    pub fn open(config: SynthConfig) -> Result<Self, ToneSinkError> {
        let config = Arc::new(ArcSwap::from_pointee(config));
        let ring_buffer = HeapRb::<VoiceCommand>::new(COMMAND_QUEUE_LEN);
        let (producer, consumer) = ring_buffer.split();

        let (ready_tx, ready_rx) = channel::bounded(1);
        let (shutdown_tx, shutdown_rx) = channel::bounded::<()>(0);
        let thread_config = config.clone();

        std::thread::Builder::new()
            .name("chordline-audio".into())
            .spawn(move || audio_thread(consumer, thread_config, ready_tx, shutdown_rx))
            .map_err(backend_error)?;

        let sample_rate = ready_rx.recv().map_err(|_| ToneSinkError::Closed)??;

        Ok(Self {
            producer: Mutex::new(producer),
            config,
            sample_rate,
            next_id: AtomicU64::new(1),
            _shutdown_tx: shutdown_tx,
        })
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    /// Affects tones started after the call as well as ones already sounding.
    pub fn set_waveform(&self, waveform: Waveform) {
        let mut next = SynthConfig::clone(&self.config.load());
        next.waveform = waveform;
        self.config.store(Arc::new(next));
    }

    pub fn set_volume(&self, volume: f32) {
        let mut next = SynthConfig::clone(&self.config.load());
        next.volume = volume.clamp(0.0, 1.0);
        self.config.store(Arc::new(next));
    }

    fn push(&self, command: VoiceCommand) -> Result<(), ToneSinkError> {
        self.producer
            .lock()
            .try_push(command)
            .map_err(|_| ToneSinkError::QueueFull)
    }
}

impl ToneSink for CpalToneSink {
    fn play(
        &self,
        frequency_hz: f32,
        duration_seconds: f64,
        velocity: u8,
    ) -> Result<ToneHandle, ToneSinkError> {
        let handle = ToneHandle::from_raw(self.next_id.fetch_add(1, Ordering::Relaxed));
        let voice = Voice::new(frequency_hz, duration_seconds as f32, velocity);
        self.push(VoiceCommand::Start { handle, voice })?;
        Ok(handle)
    }

    fn cancel(&self, handle: ToneHandle) -> Result<(), ToneSinkError> {
        self.push(VoiceCommand::Stop(handle))
    }
}

fn backend_error(e: impl std::fmt::Display) -> ToneSinkError {
    ToneSinkError::Backend(e.to_string())
}

fn audio_thread(
    consumer: HeapCons<VoiceCommand>,
    config: Arc<ArcSwap<SynthConfig>>,
    ready_tx: Sender<Result<f32, ToneSinkError>>,
    shutdown_rx: Receiver<()>,
) {
    match build_stream(consumer, config) {
        Ok((stream, sample_rate)) => {
            let _ = ready_tx.send(Ok(sample_rate));
            // Returns once the sink is dropped.
            let _ = shutdown_rx.recv();
            drop(stream);
            tracing::debug!("audio stream closed");
        }
        Err(e) => {
            let _ = ready_tx.send(Err(e));
        }
    }
}

fn build_stream(
    consumer: HeapCons<VoiceCommand>,
    config: Arc<ArcSwap<SynthConfig>>,
) -> Result<(cpal::Stream, f32), ToneSinkError> {
    let host = cpal::default_host();
    let device = host
        .default_output_device()
        .ok_or_else(|| ToneSinkError::Backend("no output device".into()))?;
    let supported = device.default_output_config().map_err(backend_error)?;
    let stream_config: cpal::StreamConfig = supported.into();

    let sample_rate = stream_config.sample_rate as f32;
    let num_channels = stream_config.channels as usize;
    tracing::info!(
        "audio output: {} channels, {} Hz",
        num_channels,
        sample_rate
    );

    let mut state = AudioState {
        voices: Vec::with_capacity(MAX_VOICES),
        consumer,
        config,
        sample_rate,
        num_channels,
    };

    let stream = device
        .build_output_stream(
            &stream_config,
            move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                audio_callback(data, &mut state);
            },
            |err| tracing::error!("audio stream error: {}", err),
            None,
        )
        .map_err(backend_error)?;

    stream.play().map_err(backend_error)?;

    Ok((stream, sample_rate))
}

fn audio_callback(data: &mut [f32], state: &mut AudioState) {
    while let Some(command) = state.consumer.try_pop() {
        match command {
            VoiceCommand::Start { handle, voice } => {
                if state.voices.len() >= MAX_VOICES {
                    state.voices.remove(0);
                }
                state.voices.push((handle, voice));
            }
            VoiceCommand::Stop(handle) => state.voices.retain(|(h, _)| *h != handle),
        }
    }

    let config = state.config.load();
    for frame in data.chunks_mut(state.num_channels.max(1)) {
        let mut sample = 0.0;
        for (_, voice) in state.voices.iter_mut() {
            sample += voice.render_sample(config.waveform, state.sample_rate);
        }
        frame.fill(sample * config.volume);
    }

    state.voices.retain(|(_, voice)| !voice.is_finished());
}
