//! Subcommand implementations

use crate::{Cli, Commands, PersistArgs};
use minihost::plugin::mock::{MockLoader, MockSpec};
use minihost::plugin::{NativeLoader, PinProperties};
use minihost::{
    inspect_path, write_text_dump, BankCodec, CanDo, HostBuilder, MidiEvent, PersistOptions,
    PluginSession, PresetCodec, Result, Support, Vst2Loader,
};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::Arc;

pub fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Commands::Info { plugin } => {
            with_session(cli, plugin, |s| write_info(s, io::stdout().lock()))
        }
        Commands::Dump { plugin, output } => with_session(cli, plugin, |s| {
            match output {
                Some(path) => write_text_dump(s, BufWriter::new(File::create(path)?))?,
                None => write_text_dump(s, io::stdout().lock())?,
            }
            Ok(())
        }),
        Commands::Render {
            plugin,
            note,
            velocity,
            seconds,
            output,
        } => with_session(cli, plugin, |s| {
            let frames = render(s, *note, *velocity, *seconds, output)?;
            println!("Rendered {} frames to {}", frames, output.display());
            Ok(())
        }),
        Commands::SavePreset(args) => with_session(cli, &args.plugin, |s| {
            PresetCodec::new(options(args)).save_to_path(s, &args.file)?;
            println!("Saved program {:?} to {}", s.program_name()?, args.file.display());
            Ok(())
        }),
        Commands::LoadPreset(args) => with_session(cli, &args.plugin, |s| {
            PresetCodec::new(options(args)).load_from_path(s, &args.file)?;
            println!("Loaded {} as {:?}", args.file.display(), s.program_name()?);
            Ok(())
        }),
        Commands::SaveBank(args) => with_session(cli, &args.plugin, |s| {
            BankCodec::new(options(args)).save_to_path(s, &args.file)?;
            println!("Saved {} programs to {}", s.num_programs(), args.file.display());
            Ok(())
        }),
        Commands::LoadBank(args) => with_session(cli, &args.plugin, |s| {
            BankCodec::new(options(args)).load_from_path(s, &args.file)?;
            println!("Loaded bank {}", args.file.display());
            Ok(())
        }),
        Commands::Inspect { file } => {
            let info = inspect_path(file)?;
            println!("{}", info);
            Ok(())
        }
    }
}

fn options(args: &PersistArgs) -> PersistOptions {
    PersistOptions {
        skip_version_check: args.skip_version_check,
    }
}

/// The plugin `--mock` loads: a small stereo synth with three programs.
pub(crate) fn demo_spec() -> MockSpec {
    MockSpec::new("MHdm", "MiniHost Demo")
        .with_parameters(&[0.8, 0.5, 0.25])
        .with_programs(&["Init", "Bright", "Dark"])
        .map_info(|info| info.synth(true).editor(true))
}

fn loader(cli: &Cli, plugin: &Path) -> Arc<dyn NativeLoader> {
    if cli.mock {
        tracing::info!("Using demo plugin instead of {}", plugin.display());
        MockLoader::new(demo_spec())
    } else {
        Vst2Loader::new(plugin)
    }
}

/// Open a session, run `f`, and always close the session afterwards.
fn with_session<T>(
    cli: &Cli,
    plugin: &Path,
    f: impl FnOnce(&PluginSession) -> Result<T>,
) -> Result<T> {
    let session = HostBuilder::new()
        .sample_rate(cli.sample_rate)
        .block_size(cli.block_size)
        .open(loader(cli, plugin))?;
    tracing::info!("Opened {}", session);

    let result = f(&session);
    let closed = session.close();
    let value = result?;
    closed?;
    Ok(value)
}

fn yes_no(flag: bool) -> &'static str {
    if flag {
        "yes"
    } else {
        "no"
    }
}

fn pin_line(pin: &PinProperties) -> String {
    let mut line = format!("  {} {} ({})", pin.index, pin.label, pin.short_label);
    if pin.is_first_in_stereo_pair {
        line.push_str(" stereo");
    }
    if !pin.is_active {
        line.push_str(" inactive");
    }
    line
}

pub(crate) fn write_info<W: Write>(session: &PluginSession, mut out: W) -> Result<()> {
    let info = session.info();
    writeln!(out, "Plugin:      {}", info.name)?;
    writeln!(out, "Vendor:      {}", info.vendor)?;
    writeln!(out, "Product:     {}", info.product)?;
    writeln!(out, "Unique ID:   {}", info.unique_id)?;
    writeln!(out, "VST version: {}", session.vst_version())?;
    writeln!(out, "Version:     {}", info.revision)?;
    writeln!(
        out,
        "Type:        {}",
        if info.is_synth { "instrument" } else { "effect" }
    )?;
    writeln!(
        out,
        "Audio I/O:   {} in, {} out",
        session.num_inputs(),
        session.num_outputs()
    )?;
    writeln!(out, "Latency:     {} samples", session.initial_delay())?;
    writeln!(out, "Parameters:  {}", session.num_parameters())?;
    writeln!(
        out,
        "Programs:    {} (chunks: {})",
        session.num_programs(),
        yes_no(info.programs_are_chunks)
    )?;
    writeln!(out, "Editor:      {}", yes_no(info.has_editor))?;
    writeln!(
        out,
        "Processing:  replacing {}, double {}",
        yes_no(session.can_replacing()),
        yes_no(session.can_double_replacing())
    )?;

    writeln!(out, "Can do:")?;
    for capability in CanDo::ALL {
        let answer = match session.can_do(capability)? {
            Support::Yes => "yes",
            Support::No => "no",
            Support::Maybe => "maybe",
        };
        writeln!(out, "  {}: {}", capability, answer)?;
    }

    writeln!(out, "Programs:")?;
    let current = session.program()?;
    for index in 0..session.num_programs() {
        let name = session
            .program_name_at(index)?
            .unwrap_or_else(|| "?".to_string());
        let marker = if index == current { "*" } else { " " };
        writeln!(out, " {}{} {}", marker, index, name)?;
    }

    writeln!(out, "Inputs:")?;
    for index in 0..session.num_inputs() {
        if let Some(pin) = session.input_properties(index)? {
            writeln!(out, "{}", pin_line(&pin))?;
        }
    }
    writeln!(out, "Outputs:")?;
    for index in 0..session.num_outputs() {
        if let Some(pin) = session.output_properties(index)? {
            writeln!(out, "{}", pin_line(&pin))?;
        }
    }
    out.flush()?;
    Ok(())
}

fn wav_error(e: hound::Error) -> io::Error {
    io::Error::other(e)
}

/// Hold `note` for `seconds` and write the first two outputs as 32-bit float WAV.
///
/// Returns the number of frames written.
pub(crate) fn render(
    session: &PluginSession,
    note: u8,
    velocity: u8,
    seconds: f32,
    path: &Path,
) -> Result<usize> {
    let outputs = session.num_outputs();
    if outputs == 0 {
        return Err(
            io::Error::new(io::ErrorKind::InvalidInput, "plugin has no audio outputs").into(),
        );
    }
    let channels = outputs.min(2);
    let block = session.block_size();
    let total = (seconds.max(0.0) * session.sample_rate()).round() as usize;

    let spec = hound::WavSpec {
        channels: channels as u16,
        sample_rate: session.sample_rate() as u32,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec).map_err(wav_error)?;

    let inputs = vec![vec![0.0f32; block]; session.num_inputs()];
    let mut buffers = vec![vec![0.0f32; block]; outputs];

    session.turn_on()?;
    session.queue_midi(MidiEvent::note_on(0, note, velocity));

    let mut done = 0;
    while done < total {
        let frames = block.min(total - done);
        if done + frames >= total {
            let release = (frames.saturating_sub(1)) as u32;
            session.queue_midi(MidiEvent::note_off(0, note).at_frame(release));
        }
        let input_refs: Vec<&[f32]> = inputs.iter().map(|ch| ch.as_slice()).collect();
        let mut output_refs: Vec<&mut [f32]> =
            buffers.iter_mut().map(|ch| ch.as_mut_slice()).collect();
        session.process_replacing(&input_refs, &mut output_refs, frames)?;

        for frame in 0..frames {
            for channel in buffers.iter().take(channels) {
                writer.write_sample(channel[frame]).map_err(wav_error)?;
            }
        }
        done += frames;
    }

    session.turn_off()?;
    writer.finalize().map_err(wav_error)?;
    tracing::debug!("Rendered note {} for {} frames", note, done);
    Ok(done)
}

#[cfg(test)]
mod tests {
    use super::*;
    use minihost::plugin::SessionConfig;

    fn demo_session() -> PluginSession {
        PluginSession::open(MockLoader::new(demo_spec()), SessionConfig::new(8000.0, 64)).unwrap()
    }

    #[test]
    fn test_write_info() {
        let session = demo_session();
        let mut out = Vec::new();
        write_info(&session, &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.contains("Plugin:      MiniHost Demo"));
        assert!(text.contains("Unique ID:   MHdm"));
        assert!(text.contains("Type:        instrument"));
        assert!(text.contains("Parameters:  3"));
        assert!(text.contains(" *0 Init"));
        assert!(text.contains("  2 Dark"));
        assert!(text.contains("receiveVstMidiEvent: yes"));

        session.close().unwrap();
    }

    #[test]
    fn test_render_writes_wav() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("note.wav");
        let session = demo_session();

        let frames = render(&session, 69, 100, 0.1, &path).unwrap();
        assert_eq!(frames, 800);
        assert!(!session.is_turned_on());

        let reader = hound::WavReader::open(&path).unwrap();
        assert_eq!(reader.spec().channels, 2);
        assert_eq!(reader.spec().sample_rate, 8000);
        assert_eq!(reader.len(), 1600);
        let peak = reader
            .into_samples::<f32>()
            .map(|s| s.unwrap().abs())
            .fold(0.0f32, f32::max);
        assert!(peak > 0.01, "expected audible output, peak {}", peak);

        session.close().unwrap();
    }

    #[test]
    fn test_render_partial_block() {
        let dir = tempfile::tempdir().unwrap();
        let session = demo_session();
        // 80 frames: one full block of 64 and one of 16
        let frames = render(&session, 60, 90, 0.01, &dir.path().join("short.wav")).unwrap();
        assert_eq!(frames, 80);
        session.close().unwrap();
    }
}
