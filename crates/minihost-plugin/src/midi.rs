//! MIDI events and the per-session pending-event queue.

use crate::error::{HostError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Channel voice message type (status byte high nibble).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum MidiCommand {
    NoteOff = 0x80,
    NoteOn = 0x90,
    PolyPressure = 0xA0,
    ControlChange = 0xB0,
    ProgramChange = 0xC0,
    ChannelPressure = 0xD0,
    PitchBend = 0xE0,
}

impl MidiCommand {
    pub fn from_status(status: u8) -> Option<Self> {
        Some(match status & 0xF0 {
            0x80 => MidiCommand::NoteOff,
            0x90 => MidiCommand::NoteOn,
            0xA0 => MidiCommand::PolyPressure,
            0xB0 => MidiCommand::ControlChange,
            0xC0 => MidiCommand::ProgramChange,
            0xD0 => MidiCommand::ChannelPressure,
            0xE0 => MidiCommand::PitchBend,
            _ => return None,
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MidiEvent {
    pub command: MidiCommand,
    /// 0..16
    pub channel: u8,
    pub data1: u8,
    pub data2: u8,
    /// Sample offset into the next processed block
    pub delta_frames: u32,
    /// Played live rather than from a sequencer track (`kVstMidiEventIsRealtime`).
    #[serde(default = "live")]
    pub realtime: bool,
}

fn live() -> bool {
    true
}

impl MidiEvent {
    /// Builds a realtime event, masking each byte into range.
    ///
    /// Use [`MidiEvent::try_new`] to reject out-of-range input instead.
    pub fn new(command: MidiCommand, channel: u8, data1: u8, data2: u8) -> Self {
        Self {
            command,
            channel: channel & 0x0F,
            data1: data1 & 0x7F,
            data2: data2 & 0x7F,
            delta_frames: 0,
            realtime: true,
        }
    }

    /// Like [`MidiEvent::new`] but fails if the channel is not below 16 or a
    /// data byte is not below 128.
    pub fn try_new(command: MidiCommand, channel: u8, data1: u8, data2: u8) -> Result<Self> {
        if channel > 0x0F {
            return Err(HostError::validation(
                "MIDI channel",
                format!("{} is not in 0..16", channel),
            ));
        }
        for (what, byte) in [("MIDI data1", data1), ("MIDI data2", data2)] {
            if byte > 0x7F {
                return Err(HostError::validation(what, format!("{} is not in 0..128", byte)));
            }
        }
        Ok(Self::new(command, channel, data1, data2))
    }

    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Self::new(MidiCommand::NoteOn, channel, note, velocity)
    }

    pub fn note_off(channel: u8, note: u8) -> Self {
        Self::new(MidiCommand::NoteOff, channel, note, 0)
    }

    pub fn control_change(channel: u8, controller: u8, value: u8) -> Self {
        Self::new(MidiCommand::ControlChange, channel, controller, value)
    }

    pub fn program_change(channel: u8, program: u8) -> Self {
        Self::new(MidiCommand::ProgramChange, channel, program, 0)
    }

    /// 14-bit bend, centre 8192.
    pub fn pitch_bend(channel: u8, bend: u16) -> Self {
        let bend = bend.min(0x3FFF);
        Self::new(
            MidiCommand::PitchBend,
            channel,
            (bend & 0x7F) as u8,
            (bend >> 7) as u8,
        )
    }

    pub fn at_frame(mut self, delta_frames: u32) -> Self {
        self.delta_frames = delta_frames;
        self
    }

    pub fn with_realtime(mut self, realtime: bool) -> Self {
        self.realtime = realtime;
        self
    }

    pub fn to_bytes(&self) -> [u8; 3] {
        [self.command as u8 | self.channel, self.data1, self.data2]
    }

    /// `None` for system messages and running-status data.
    pub fn from_bytes(bytes: [u8; 3], delta_frames: u32) -> Option<Self> {
        let command = MidiCommand::from_status(bytes[0])?;
        Some(Self::new(command, bytes[0] & 0x0F, bytes[1], bytes[2]).at_frame(delta_frames))
    }
}

/// Drained batch; stays on the stack for typical block sizes.
pub type MidiEventVec = SmallVec<[MidiEvent; 16]>;

/// Events queued between processing calls.
///
/// A batch is removed in one critical section, so an event enqueued while a
/// drain is in progress lands in the next batch.
#[derive(Debug, Default)]
pub struct MidiEventQueue {
    pending: Mutex<MidiEventVec>,
}

impl MidiEventQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enqueue(&self, event: MidiEvent) {
        self.pending.lock().push(event);
    }

    pub fn drain_all(&self) -> MidiEventVec {
        std::mem::take(&mut *self.pending.lock())
    }

    pub fn len(&self) -> usize {
        self.pending.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.lock().is_empty()
    }

    pub fn clear(&self) {
        self.pending.lock().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn test_drain_returns_batch_in_order() {
        let queue = MidiEventQueue::new();
        let a = MidiEvent::note_on(0, 60, 100);
        let b = MidiEvent::note_off(0, 60);
        queue.enqueue(a);
        queue.enqueue(b);

        let batch = queue.drain_all();
        assert_eq!(batch.as_slice(), &[a, b]);
        assert!(queue.drain_all().is_empty());
        assert!(queue.is_empty());
    }

    #[test]
    fn test_concurrent_enqueue_never_duplicates() {
        let queue = Arc::new(MidiEventQueue::new());
        let producers: Vec<_> = (0..4)
            .map(|ch| {
                let queue = Arc::clone(&queue);
                std::thread::spawn(move || {
                    for note in 0..100u8 {
                        queue.enqueue(MidiEvent::note_on(ch, note, 1));
                    }
                })
            })
            .collect();

        let mut seen = Vec::new();
        for p in producers {
            seen.extend(queue.drain_all());
            p.join().unwrap();
        }
        seen.extend(queue.drain_all());

        assert_eq!(seen.len(), 400);
        seen.sort_by_key(|e| (e.channel, e.data1));
        seen.dedup();
        assert_eq!(seen.len(), 400);
    }

    #[test]
    fn test_event_bytes() {
        let event = MidiEvent::note_on(3, 64, 90);
        assert_eq!(event.to_bytes(), [0x93, 64, 90]);
        assert_eq!(MidiEvent::from_bytes([0x93, 64, 90], 0), Some(event));
        assert_eq!(MidiEvent::from_bytes([0xF8, 0, 0], 0), None);

        let bend = MidiEvent::pitch_bend(0, 8192);
        assert_eq!(bend.to_bytes(), [0xE0, 0x00, 0x40]);
    }

    #[test]
    fn test_event_masks_out_of_range_bytes() {
        let event = MidiEvent::control_change(17, 200, 255).at_frame(12);
        assert_eq!(event.channel, 1);
        assert_eq!(event.data1, 0x48);
        assert_eq!(event.data2, 0x7F);
        assert_eq!(event.delta_frames, 12);
    }

    #[test]
    fn test_try_new_rejects_out_of_range_bytes() {
        let event = MidiEvent::try_new(MidiCommand::NoteOn, 15, 127, 0).unwrap();
        assert_eq!(event, MidiEvent::note_on(15, 127, 0));

        for (channel, data1, data2, what) in [
            (16, 60, 100, "MIDI channel"),
            (0, 128, 100, "MIDI data1"),
            (0, 60, 200, "MIDI data2"),
        ] {
            let err = MidiEvent::try_new(MidiCommand::NoteOn, channel, data1, data2).unwrap_err();
            assert_eq!(err.kind(), crate::ErrorKind::Validation);
            assert!(err.to_string().contains(what), "{}", err);
        }
    }

    #[test]
    fn test_realtime_flag() {
        let event = MidiEvent::note_on(0, 60, 100);
        assert!(event.realtime);
        assert!(!event.with_realtime(false).realtime);
        assert!(MidiEvent::from_bytes([0x90, 60, 100], 0).unwrap().realtime);

        let json = r#"{"command":"NoteOn","channel":0,"data1":60,"data2":100,"delta_frames":0}"#;
        let parsed: MidiEvent = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, event);

        let recorded = serde_json::to_string(&event.with_realtime(false)).unwrap();
        let parsed: MidiEvent = serde_json::from_str(&recorded).unwrap();
        assert!(!parsed.realtime);
    }
}
