use chordplay::audio::output::list_output_devices;
use chordplay::sequencer::timeline::InsertSide;
use chordplay::{
    AudioOutput, ChordStore, DebouncedSaver, FileFetcher, JsonChordStore, MidiOutputManager,
    TimelineEditor, Transport, TransportConfig,
};
use std::error::Error;
use std::path::PathBuf;
use std::time::Instant;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "\
Usage: chordplay <audio> [notes.mid] [options]

Options:
  --session <id>       Chord session to load and save (default: file stem of <audio>)
  --chords <A,B,...>   Replace the session's chords with these labels
  --config <path>      RON configuration file
  --midi-out <port>    Instrument output port (id or name)
  --audio-device <n>   Audio output device name
  --rate <r>           Playback rate
  --start <seconds>    Start position
  --list-ports         List audio and MIDI output ports and exit";

#[derive(Debug, Default)]
struct Args {
    audio: Option<String>,
    notes: Option<String>,
    session: Option<String>,
    chords: Option<String>,
    config: Option<PathBuf>,
    midi_out: Option<String>,
    audio_device: Option<String>,
    rate: Option<f64>,
    start: Option<f64>,
    list_ports: bool,
}

fn parse_args() -> Result<Args, Box<dyn Error>> {
    let mut args = Args::default();
    let mut iter = std::env::args().skip(1);

    while let Some(arg) = iter.next() {
        let mut value = |name: &str| iter.next().ok_or_else(|| format!("{} needs a value", name));
        match arg.as_str() {
            "--session" => args.session = Some(value("--session")?),
            "--chords" => args.chords = Some(value("--chords")?),
            "--config" => args.config = Some(PathBuf::from(value("--config")?)),
            "--midi-out" => args.midi_out = Some(value("--midi-out")?),
            "--audio-device" => args.audio_device = Some(value("--audio-device")?),
            "--rate" => args.rate = Some(value("--rate")?.parse()?),
            "--start" => args.start = Some(value("--start")?.parse()?),
            "--list-ports" => args.list_ports = true,
            "-h" | "--help" => {
                println!("{}", USAGE);
                std::process::exit(0);
            }
            other if other.starts_with("--") => return Err(format!("Unknown option {}", other).into()),
            _ if args.audio.is_none() => args.audio = Some(arg),
            _ if args.notes.is_none() => args.notes = Some(arg),
            _ => return Err(format!("Unexpected argument {}", arg).into()),
        }
    }
    Ok(args)
}

fn list_ports(config: &TransportConfig) {
    println!("Audio outputs:");
    for device in list_output_devices() {
        let marker = if device.is_default { " (default)" } else { "" };
        println!("  {}: {}{}", device.id, device.name, marker);
    }
    println!("MIDI outputs:");
    for port in MidiOutputManager::new(config.midi_client_name.clone()).list_output_ports() {
        println!("  {}: {}", port.id, port.name);
    }
}

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("chordplay=info")),
        )
        .init();

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => TransportConfig::load(path)?,
        None => TransportConfig::default(),
    };

    if args.list_ports {
        list_ports(&config);
        return Ok(());
    }

    let Some(audio) = args.audio.clone() else {
        eprintln!("{}", USAGE);
        std::process::exit(2);
    };
    let session_id = args.session.clone().unwrap_or_else(|| {
        std::path::Path::new(&audio)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("default")
            .to_string()
    });

    let (mut transport, renderer) = Transport::with_system_clock(config.clone());

    // Without an audio device the clock still drives notes and chords
    let _audio_output = match AudioOutput::start_on(args.audio_device.as_deref(), renderer) {
        Ok(output) => Some(output),
        Err(e) => {
            tracing::warn!("{}; continuing without audio", e);
            None
        }
    };

    let info = transport.load_media(&FileFetcher::new(), &audio, args.notes.as_deref())?;
    tracing::info!("Duration {:.2}s, {} notes", info.duration, info.notes.len());

    let store = JsonChordStore::new(config.resolved_store_dir());
    let mut chords = store.load(&session_id)?;
    let mut saver = DebouncedSaver::new(Box::new(store), session_id.clone(), config.save_debounce());

    if let Some(labels) = &args.chords {
        let editor = TimelineEditor::from_config(&config);
        chords.clear();
        for label in labels.split(',').map(str::trim).filter(|l| !l.is_empty()) {
            chords = match chords.len() {
                0 => editor.insert_at_index(&chords, 0, InsertSide::After),
                n => editor.insert_at_index(&chords, n - 1, InsertSide::After),
            };
            chords = editor.set_label(&chords, chords.len() - 1, label);
        }
        saver.request(&chords, Instant::now());
    }
    tracing::info!("Session '{}': {} chords", session_id, chords.len());
    transport.set_chords(chords);

    if let Some(port) = &args.midi_out {
        if let Err(e) = transport.connect_output(port) {
            tracing::warn!("{}", e);
        }
    }

    transport.subscribe_chords(|chord| match chord {
        Some(chord) if !chord.is_placeholder() => tracing::info!("Chord {}", chord.label),
        _ => tracing::debug!("No chord"),
    });

    if let Some(rate) = args.rate {
        transport.set_rate(rate);
    }
    if let Some(start) = args.start {
        transport.seek(start);
    }
    transport.play();

    let tick_interval = config.tick_interval();
    while transport.state().is_playing() {
        transport.tick();
        saver.poll(Instant::now());
        std::thread::sleep(tick_interval);
    }

    saver.flush();
    tracing::info!("Playback finished");
    Ok(())
}
