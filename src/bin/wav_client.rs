/// WAV demo client
/// Streams a 16 kHz mono WAV file to the relay at capture cadence and writes
/// the model's audio, placed at its scheduled playback times, to a 24 kHz WAV.
///
/// Usage: wav_client <relay-url> <input.wav> <output.wav>
/// e.g.   wav_client "ws://127.0.0.1:3000/?task=2" question.wav answer.wav
use anyhow::{bail, Context};
use cheesecake_relay::audio::{INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
use cheesecake_relay::client::{ClientEvent, ClientSession, ConnectionStatus, CAPTURE_FRAME_SAMPLES};
use futures_util::{SinkExt, StreamExt};
use std::time::{Duration, Instant};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

/// How long to keep listening after the input ran out and playback went idle.
const IDLE_GRACE: Duration = Duration::from_secs(4);

fn read_input(path: &str) -> anyhow::Result<Vec<f32>> {
    let mut reader = hound::WavReader::open(path).with_context(|| format!("Failed to open {path}"))?;
    let spec = reader.spec();
    if spec.channels != 1 || spec.sample_rate != INPUT_SAMPLE_RATE || spec.bits_per_sample != 16 {
        bail!(
            "{path} must be 16-bit mono at {INPUT_SAMPLE_RATE} Hz (got {} ch, {} Hz, {} bit)",
            spec.channels,
            spec.sample_rate,
            spec.bits_per_sample
        );
    }
    reader
        .samples::<i16>()
        .map(|s| s.map(|v| v as f32 / 32768.0).map_err(anyhow::Error::from))
        .collect()
}

/// Model audio laid out on the playback timeline.
struct Timeline {
    samples: Vec<i16>,
}

impl Timeline {
    fn place(&mut self, start: f64, chunk: &[i16]) {
        let offset = (start * OUTPUT_SAMPLE_RATE as f64).round().max(0.0) as usize;
        let end = offset + chunk.len();
        if self.samples.len() < end {
            self.samples.resize(end, 0);
        }
        self.samples[offset..end].copy_from_slice(chunk);
    }

    fn save(&self, path: &str) -> anyhow::Result<()> {
        let spec = hound::WavSpec {
            channels: 1,
            sample_rate: OUTPUT_SAMPLE_RATE,
            bits_per_sample: 16,
            sample_format: hound::SampleFormat::Int,
        };
        let mut writer = hound::WavWriter::create(path, spec)?;
        for sample in &self.samples {
            writer.write_sample(*sample)?;
        }
        writer.finalize()?;
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args: Vec<String> = std::env::args().collect();
    if args.len() != 4 {
        bail!("usage: wav_client <relay-url> <input.wav> <output.wav>");
    }
    let (url, input_path, output_path) = (&args[1], &args[2], &args[3]);

    let input = read_input(input_path)?;
    info!(
        "Loaded {} ({:.1} s of audio)",
        input_path,
        input.len() as f64 / INPUT_SAMPLE_RATE as f64
    );

    let (ws_stream, _) = connect_async(url.as_str())
        .await
        .with_context(|| format!("Failed to connect to {url}"))?;
    let (mut sink, mut stream) = ws_stream.split();

    let clock = Instant::now();
    let now = || clock.elapsed().as_secs_f64();

    let mut session = ClientSession::new();
    session.on_open();
    info!("Connected to relay at {}", url);

    let mut frames = input.chunks(CAPTURE_FRAME_SAMPLES);
    let mut input_done = false;
    let mut idle_since: Option<Instant> = None;
    let mut timeline = Timeline { samples: Vec::new() };
    let mut ticker = tokio::time::interval(Duration::from_secs_f64(
        CAPTURE_FRAME_SAMPLES as f64 / INPUT_SAMPLE_RATE as f64,
    ));

    while session.status() == ConnectionStatus::Active {
        tokio::select! {
            _ = ticker.tick() => {
                if let Some(frame) = frames.next() {
                    if let Some(json) = session.capture(frame, now())? {
                        sink.send(Message::Text(json.into())).await?;
                    } else {
                        debug!("Capture muted while the model is speaking");
                    }
                } else if !input_done {
                    info!("Input exhausted, waiting for the model to finish");
                    input_done = true;
                }

                if input_done && !session.is_speaking(now()) {
                    let since = *idle_since.get_or_insert_with(Instant::now);
                    if since.elapsed() >= IDLE_GRACE {
                        info!("Playback idle, closing");
                        let _ = sink.send(Message::Close(None)).await;
                        session.on_close();
                    }
                } else {
                    idle_since = None;
                }
            }
            msg = stream.next() => match msg {
                Some(Ok(Message::Text(text))) => handle_frame(&mut session, &mut timeline, text.as_str(), now()),
                Some(Ok(Message::Binary(bytes))) => match std::str::from_utf8(&bytes) {
                    Ok(text) => handle_frame(&mut session, &mut timeline, text, now()),
                    Err(e) => warn!("Ignoring non-UTF-8 binary frame: {}", e),
                },
                Some(Ok(Message::Close(frame))) => {
                    match frame {
                        Some(f) => info!(code = u16::from(f.code), reason = %f.reason.as_str(), "Relay closed the session"),
                        None => info!("Relay closed the session"),
                    }
                    session.on_close();
                }
                None => session.on_close(),
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!("Relay connection error: {}", e);
                    session.on_error();
                }
            },
        }
    }

    timeline.save(output_path)?;
    info!(
        "Wrote {} ({:.1} s, session {:?})",
        output_path,
        timeline.samples.len() as f64 / OUTPUT_SAMPLE_RATE as f64,
        session.status()
    );
    Ok(())
}

fn handle_frame(session: &mut ClientSession, timeline: &mut Timeline, text: &str, now: f64) {
    for event in session.receive(text, now) {
        match event {
            ClientEvent::Playback { start, chunk } => timeline.place(start, chunk.samples()),
            ClientEvent::Transcript(line) => println!("=== COLLECTED INFORMATION ===\n{line}\n"),
        }
    }
}
