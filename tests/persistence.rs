//! Preset and bank files moved between sessions

mod helpers;

use approx::assert_relative_eq;
use helpers::*;
use minihost::plugin::mock::MockSpec;
use minihost::plugin::ErrorKind;
use minihost::preset::PresetError;
use minihost::prelude::*;
use minihost::preset::text_dump;
use minihost::{inspect_path, FileKind};

fn values(session: &PluginSession) -> Vec<f32> {
    (0..session.num_parameters())
        .map(|i| session.get_parameter(i).unwrap())
        .collect()
}

// =============================================================================
// Presets
// =============================================================================

#[test]
fn test_preset_moves_between_sessions() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("lead.fxp");

    let (source, _) = open(synth_spec());
    source.set_program(2).unwrap();
    source.set_parameter(0, 0.1).unwrap();
    source.set_parameter(3, 1.0).unwrap();
    PresetCodec::default().save_to_path(&source, &path).unwrap();
    source.close().unwrap();

    let (target, probe) = open(synth_spec());
    PresetCodec::default().load_from_path(&target, &path).unwrap();

    assert_eq!(target.program().unwrap(), 0);
    assert_eq!(target.program_name().unwrap(), "Lead");
    assert_eq!(values(&target), vec![0.1, 0.25, 0.75, 1.0]);
    assert_eq!(probe.program_values(1), Some(vec![0.5, 0.25, 0.75, 0.0]));
    target.close().unwrap();
}

#[test]
fn test_preset_for_other_plugin_changes_nothing() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("other.fxp");

    let (other, _) = open(MockSpec::new("Othr", "Other").with_parameters(&[0.9, 0.9, 0.9, 0.9]));
    PresetCodec::default().save_to_path(&other, &path).unwrap();
    other.close().unwrap();

    let (session, probe) = open(synth_spec());
    probe.clear_calls();
    let err = PresetCodec::default()
        .load_from_path(&session, &path)
        .unwrap_err();

    assert!(matches!(err, PresetError::PluginMismatch { .. }));
    assert_eq!(err.kind(), ErrorKind::Validation);
    assert_eq!(probe.count("set_"), 0);
    assert_eq!(values(&session), vec![0.5, 0.25, 0.75, 0.0]);
    session.close().unwrap();
}

#[test]
fn test_newer_revision_needs_lenient_options() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("future.fxp");

    let newer = synth_spec().map_info(|i| i.revision(7));
    let (writer, _) = open(newer);
    writer.set_parameter(1, 0.6).unwrap();
    PresetCodec::default().save_to_path(&writer, &path).unwrap();
    writer.close().unwrap();

    let (session, _) = open(synth_spec());
    let err = PresetCodec::default()
        .load_from_path(&session, &path)
        .unwrap_err();
    assert!(matches!(
        err,
        PresetError::RevisionTooNew { file: 7, plugin: 3 }
    ));

    PresetCodec::new(PersistOptions::lenient())
        .load_from_path(&session, &path)
        .unwrap();
    assert_relative_eq!(session.get_parameter(1).unwrap(), 0.6);
    session.close().unwrap();
}

#[test]
fn test_opaque_preset_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chunk.fxp");

    let (source, _) = open(chunk_spec());
    source.set_parameter(2, 0.2).unwrap();
    source.set_program_name("Warm").unwrap();
    PresetCodec::default().save_to_path(&source, &path).unwrap();
    source.close().unwrap();

    let info = inspect_path(&path).unwrap();
    assert_eq!(info.kind, FileKind::Preset);
    assert!(info.opaque);

    let (target, probe) = open(chunk_spec());
    PresetCodec::default().load_from_path(&target, &path).unwrap();
    assert_eq!(probe.count("set_chunk Program"), 1);
    assert_relative_eq!(target.get_parameter(2).unwrap(), 0.2);
    assert_eq!(target.program_name().unwrap(), "Warm");
    target.close().unwrap();

    let (regular, _) = open(synth_spec());
    let err = PresetCodec::default()
        .load_from_path(&regular, &path)
        .unwrap_err();
    assert!(matches!(err, PresetError::OpaqueNotAccepted));
    regular.close().unwrap();
}

#[test]
fn test_bank_file_rejected_by_preset_codec() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("all.fxb");
    let (session, _) = open(synth_spec());
    BankCodec::default().save_to_path(&session, &path).unwrap();

    let err = PresetCodec::default()
        .load_from_path(&session, &path)
        .unwrap_err();
    assert!(matches!(err, PresetError::WrongFileKind { .. }));
    session.close().unwrap();
}

// =============================================================================
// Banks
// =============================================================================

#[test]
fn test_bank_restores_every_program() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("factory.fxb");

    let (source, _) = open(synth_spec());
    for program in 0..3 {
        source.set_program(program).unwrap();
        source.set_parameter(0, program as f32 * 0.25).unwrap();
    }
    source.set_program(1).unwrap();
    BankCodec::default().save_to_path(&source, &path).unwrap();
    assert_eq!(source.program().unwrap(), 1);
    source.close().unwrap();

    let info = inspect_path(&path).unwrap();
    assert_eq!(info.kind, FileKind::Bank);
    assert_eq!(info.count, 3);
    assert_eq!(info.current_program, Some(1));

    let (target, probe) = open(synth_spec());
    target.set_program(2).unwrap();
    BankCodec::default().load_from_path(&target, &path).unwrap();

    assert_eq!(target.program().unwrap(), 2);
    for program in 0..3 {
        let values = probe.program_values(program).unwrap();
        assert_relative_eq!(values[0], program as f32 * 0.25);
        assert_relative_eq!(values[1], 0.25);
    }
    target.close().unwrap();
}

#[test]
fn test_bank_of_plugin_without_programs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("empty.fxb");
    let spec = || synth_spec().with_programs(&[]);

    let (source, _) = open(spec());
    BankCodec::default().save_to_path(&source, &path).unwrap();
    source.close().unwrap();
    assert_eq!(inspect_path(&path).unwrap().count, 0);

    let (target, plugin) = open(spec());
    plugin.clear_calls();
    BankCodec::default().load_from_path(&target, &path).unwrap();
    assert_eq!(plugin.count("set_program"), 0);
    target.close().unwrap();
}

#[test]
fn test_bank_larger_than_plugin_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("big.fxb");

    let (big, _) = open(synth_spec().with_programs(&["A", "B", "C", "D", "E"]));
    BankCodec::default().save_to_path(&big, &path).unwrap();
    big.close().unwrap();

    let (session, probe) = open(synth_spec());
    probe.clear_calls();
    let err = BankCodec::default()
        .load_from_path(&session, &path)
        .unwrap_err();
    assert!(matches!(
        err,
        PresetError::ProgramCountMismatch { file: 5, plugin: 3 }
    ));
    assert_eq!(probe.count("set_"), 0);
    session.close().unwrap();
}

#[test]
fn test_opaque_bank_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("chunks.fxb");

    let (source, _) = open(chunk_spec());
    source.set_program(1).unwrap();
    source.set_parameter(3, 0.9).unwrap();
    BankCodec::default().save_to_path(&source, &path).unwrap();
    source.close().unwrap();

    let (target, probe) = open(chunk_spec());
    BankCodec::default().load_from_path(&target, &path).unwrap();
    assert_eq!(probe.count("set_chunk Bank"), 1);
    assert_relative_eq!(probe.program_values(1).unwrap()[3], 0.9);
    target.close().unwrap();
}

// =============================================================================
// Text dump
// =============================================================================

#[test]
fn test_text_dump_lists_parameters() {
    let (session, _) = open(synth_spec());
    let dump = text_dump(&session).unwrap();

    let lines: Vec<&str> = dump.lines().collect();
    assert_eq!(lines[0], "Test Synth by minihost");
    assert_eq!(lines.len(), 2 + 4);
    assert_eq!(lines[2], "0 Param 0: 0.5 (50 %)");
    session.close().unwrap();
}
