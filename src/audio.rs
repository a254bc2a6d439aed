use crate::config::AudioChoice;
use anyhow::Result;
use log::{info, warn};
use std::path::Path;

/// Background track control. Every call is fire-and-forget.
pub(crate) trait AudioBackend {
    fn name(&self) -> &'static str;
    /// Starts looping `path` forever.
    fn play(&mut self, path: &Path) -> Result<()>;
    fn set_volume(&mut self, volume: f32);
    /// Stops playback and releases the device. Must be idempotent.
    fn stop(&mut self);
}

/// Silence.
pub(crate) struct NullAudio;

impl AudioBackend for NullAudio {
    fn name(&self) -> &'static str {
        "none"
    }
    fn play(&mut self, _path: &Path) -> Result<()> {
        Ok(())
    }
    fn set_volume(&mut self, _volume: f32) {}
    fn stop(&mut self) {}
}

/// Picks and starts a backend once at startup. Anything that goes wrong
/// (no asset, no device, audio compiled out) degrades to [`NullAudio`].
pub(crate) fn select(choice: AudioChoice, path: &Path) -> Box<dyn AudioBackend> {
    if choice == AudioChoice::Off {
        info!("audio disabled");
        return Box::new(NullAudio);
    }
    if !path.is_file() {
        warn!("no audio asset at {}, running silent", path.display());
        return Box::new(NullAudio);
    }
    let mut backend = match build(choice) {
        Some(b) => b,
        None => return Box::new(NullAudio),
    };
    match backend.play(path) {
        Ok(()) => {
            info!("audio: {} playing {}", backend.name(), path.display());
            backend
        }
        Err(e) => {
            warn!("audio backend {} unavailable: {e:#}", backend.name());
            Box::new(NullAudio)
        }
    }
}

#[cfg(feature = "audio")]
fn build(choice: AudioChoice) -> Option<Box<dyn AudioBackend>> {
    match choice {
        AudioChoice::Auto | AudioChoice::Sink => Some(Box::new(rodio_backend::SinkAudio::new())),
        AudioChoice::Stream => Some(Box::new(rodio_backend::StreamAudio::new())),
        AudioChoice::Off => None,
    }
}

#[cfg(not(feature = "audio"))]
fn build(choice: AudioChoice) -> Option<Box<dyn AudioBackend>> {
    warn!("built without the `audio` feature, ignoring --audio {choice:?}");
    None
}

#[cfg(feature = "audio")]
mod rodio_backend {
    use super::AudioBackend;
    use anyhow::{anyhow, Context, Result};
    use log::{debug, warn};
    use rodio::buffer::SamplesBuffer;
    use rodio::{Decoder, OutputStream, Sink, Source};
    use std::any::Any;
    use std::fs::File;
    use std::io::BufReader;
    use std::path::{Path, PathBuf};
    use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender, TryRecvError};
    use std::thread::{self, JoinHandle};
    use std::time::Duration;

    fn open(path: &Path) -> Result<Decoder<BufReader<File>>> {
        let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
        Decoder::new(BufReader::new(file)).context("unsupported audio format")
    }

    /* -----------------------------
       Managed: rodio mixes and loops
    ------------------------------ */

    struct Playing {
        // dropping the stream closes the device
        _stream: OutputStream,
        sink: Sink,
    }

    pub(crate) struct SinkAudio {
        playing: Option<Playing>,
        volume: f32,
    }

    impl SinkAudio {
        pub(crate) fn new() -> Self {
            Self {
                playing: None,
                volume: 1.0,
            }
        }
    }

    impl AudioBackend for SinkAudio {
        fn name(&self) -> &'static str {
            "sink"
        }

        fn play(&mut self, path: &Path) -> Result<()> {
            let (stream, handle) =
                OutputStream::try_default().context("no audio output device")?;
            let sink = Sink::try_new(&handle).context("could not open audio sink")?;
            let file = File::open(path).with_context(|| format!("open {}", path.display()))?;
            let source =
                Decoder::new_looped(BufReader::new(file)).context("unsupported audio format")?;
            sink.set_volume(self.volume);
            sink.append(source);
            self.playing = Some(Playing {
                _stream: stream,
                sink,
            });
            Ok(())
        }

        fn set_volume(&mut self, volume: f32) {
            self.volume = volume;
            if let Some(p) = &self.playing {
                p.sink.set_volume(volume);
            }
        }

        fn stop(&mut self) {
            if let Some(p) = self.playing.take() {
                p.sink.stop();
            }
        }
    }

    impl Drop for SinkAudio {
        fn drop(&mut self) {
            self.stop();
        }
    }

    /* -----------------------------
       Manual: chunked decode-and-stream thread
    ------------------------------ */

    /// Frames decoded and queued per iteration.
    const CHUNK_FRAMES: usize = 1024;
    /// Chunks allowed to sit in the sink before the thread waits.
    const QUEUE_DEPTH: usize = 4;
    const BACKOFF: Duration = Duration::from_millis(5);

    enum Command {
        Volume(f32),
        Stop,
    }

    /// A sink plus whatever has to stay alive for it to keep playing.
    struct Output {
        sink: Sink,
        _hold: Box<dyn Any>,
    }

    /// Opens the output on the audio thread.
    type OpenOutput = fn() -> Result<Output>;

    fn device_output() -> Result<Output> {
        let (stream, handle) = OutputStream::try_default().context("no audio output device")?;
        let sink = Sink::try_new(&handle).context("could not open audio sink")?;
        Ok(Output {
            sink,
            _hold: Box::new(stream),
        })
    }

    pub(crate) struct StreamAudio {
        tx: Option<Sender<Command>>,
        worker: Option<JoinHandle<()>>,
        volume: f32,
        output: OpenOutput,
    }

    impl StreamAudio {
        pub(crate) fn new() -> Self {
            Self::with_output(device_output)
        }

        fn with_output(output: OpenOutput) -> Self {
            Self {
                tx: None,
                worker: None,
                volume: 1.0,
                output,
            }
        }
    }

    impl AudioBackend for StreamAudio {
        fn name(&self) -> &'static str {
            "stream"
        }

        fn play(&mut self, path: &Path) -> Result<()> {
            self.stop();
            let (tx, rx) = mpsc::channel();
            let (ready_tx, ready_rx) = mpsc::sync_channel(1);
            let path = path.to_path_buf();
            let volume = self.volume;
            let output = self.output;
            let worker = thread::Builder::new()
                .name("pyre-audio".into())
                .spawn(move || stream_loop(path, volume, rx, ready_tx, output))
                .context("could not spawn audio thread")?;

            // the output stream has to be opened on the thread that owns it
            match ready_rx.recv() {
                Ok(Ok(())) => {
                    self.tx = Some(tx);
                    self.worker = Some(worker);
                    Ok(())
                }
                Ok(Err(msg)) => {
                    let _ = worker.join();
                    Err(anyhow!(msg))
                }
                Err(_) => {
                    let _ = worker.join();
                    Err(anyhow!("audio thread exited during startup"))
                }
            }
        }

        fn set_volume(&mut self, volume: f32) {
            self.volume = volume;
            if let Some(tx) = &self.tx {
                let _ = tx.send(Command::Volume(volume));
            }
        }

        fn stop(&mut self) {
            if let Some(tx) = self.tx.take() {
                let _ = tx.send(Command::Stop);
            }
            if let Some(worker) = self.worker.take() {
                if worker.join().is_err() {
                    warn!("audio thread panicked");
                }
            }
        }
    }

    impl Drop for StreamAudio {
        fn drop(&mut self) {
            self.stop();
        }
    }

    /// Applies queued commands. Returns false once the thread should exit.
    fn drain(rx: &Receiver<Command>, sink: &Sink) -> bool {
        loop {
            match rx.try_recv() {
                Ok(Command::Volume(v)) => sink.set_volume(v),
                Ok(Command::Stop) | Err(TryRecvError::Disconnected) => return false,
                Err(TryRecvError::Empty) => return true,
            }
        }
    }

    fn stream_loop(
        path: PathBuf,
        volume: f32,
        rx: Receiver<Command>,
        ready: mpsc::SyncSender<std::result::Result<(), String>>,
        output: OpenOutput,
    ) {
        let setup = output().and_then(|out| Ok((out, open(&path)?)));
        let (out, decoder) = match setup {
            Ok(parts) => {
                let _ = ready.send(Ok(()));
                parts
            }
            Err(e) => {
                let _ = ready.send(Err(format!("{e:#}")));
                return;
            }
        };
        out.sink.set_volume(volume);
        pump(&out.sink, decoder, &path, &rx);
        out.sink.stop();
        debug!("audio thread exiting");
    }

    /// Decodes `path` into `sink` a chunk at a time, starting over at end of
    /// file, until a stop command arrives or the sender goes away.
    fn pump(
        sink: &Sink,
        mut decoder: Decoder<BufReader<File>>,
        path: &Path,
        rx: &Receiver<Command>,
    ) {
        // set while the decoder has not produced a sample since opening
        let mut fresh = true;
        loop {
            if !drain(rx, sink) {
                return;
            }

            let channels = decoder.channels();
            let rate = decoder.sample_rate();
            let chunk: Vec<i16> = decoder
                .by_ref()
                .take(CHUNK_FRAMES * channels as usize)
                .collect();
            if chunk.is_empty() {
                if fresh {
                    warn!("{} holds no audio frames, not looping it", path.display());
                    return;
                }
                match open(path) {
                    Ok(d) => {
                        decoder = d;
                        fresh = true;
                    }
                    Err(e) => {
                        warn!("audio loop stopped: {e:#}");
                        return;
                    }
                }
                continue;
            }
            fresh = false;
            sink.append(SamplesBuffer::new(channels, rate, chunk));

            while sink.len() > QUEUE_DEPTH {
                match rx.recv_timeout(BACKOFF) {
                    Ok(Command::Volume(v)) => sink.set_volume(v),
                    Ok(Command::Stop) | Err(RecvTimeoutError::Disconnected) => return,
                    Err(RecvTimeoutError::Timeout) => {}
                }
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use std::fs;

        /// Mono 16-bit PCM of `frames` silent samples.
        fn write_wav(path: &Path, frames: u32) {
            let data_len = frames * 2;
            let mut b = Vec::new();
            b.extend_from_slice(b"RIFF");
            b.extend_from_slice(&(36 + data_len).to_le_bytes());
            b.extend_from_slice(b"WAVEfmt ");
            b.extend_from_slice(&16u32.to_le_bytes());
            b.extend_from_slice(&1u16.to_le_bytes()); // PCM
            b.extend_from_slice(&1u16.to_le_bytes()); // channels
            b.extend_from_slice(&8000u32.to_le_bytes());
            b.extend_from_slice(&16000u32.to_le_bytes());
            b.extend_from_slice(&2u16.to_le_bytes());
            b.extend_from_slice(&16u16.to_le_bytes());
            b.extend_from_slice(b"data");
            b.extend_from_slice(&data_len.to_le_bytes());
            b.resize(b.len() + data_len as usize, 0);
            fs::write(path, b).unwrap();
        }

        fn idle_output() -> Result<Output> {
            let (sink, queue) = Sink::new_idle();
            Ok(Output {
                sink,
                _hold: Box::new(queue),
            })
        }

        #[test]
        fn drain_applies_volume_then_stops() {
            let (sink, _queue) = Sink::new_idle();
            let (tx, rx) = mpsc::channel();
            tx.send(Command::Volume(0.3)).unwrap();
            assert!(drain(&rx, &sink));
            assert_eq!(sink.volume(), 0.3);
            assert!(drain(&rx, &sink));

            tx.send(Command::Volume(0.7)).unwrap();
            tx.send(Command::Stop).unwrap();
            assert!(!drain(&rx, &sink));
            assert_eq!(sink.volume(), 0.7);
        }

        #[test]
        fn drain_stops_when_sender_is_gone() {
            let (sink, _queue) = Sink::new_idle();
            let (tx, rx) = mpsc::channel::<Command>();
            drop(tx);
            assert!(!drain(&rx, &sink));
        }

        #[test]
        fn empty_file_ends_the_pump() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("empty.wav");
            write_wav(&path, 0);

            let (sink, _queue) = Sink::new_idle();
            let (_tx, rx) = mpsc::channel();
            pump(&sink, open(&path).unwrap(), &path, &rx);
            assert!(sink.empty());
        }

        #[test]
        fn stop_joins_the_stream_thread() {
            let dir = tempfile::tempdir().unwrap();
            let path = dir.path().join("crackle.wav");
            write_wav(&path, 100);

            let mut audio = StreamAudio::with_output(idle_output);
            audio.play(&path).unwrap();
            assert!(audio.worker.is_some());
            audio.set_volume(0.5);
            audio.stop();
            assert!(audio.worker.is_none());
            audio.stop();
        }

        #[test]
        fn unreadable_asset_fails_play() {
            let mut audio = StreamAudio::with_output(idle_output);
            assert!(audio.play(Path::new("Cargo.toml")).is_err());
            assert!(audio.worker.is_none());
        }
    }
}
