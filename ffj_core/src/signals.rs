//! Named buzzer patterns.

use ffj_traits::AudibleSignal;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Beep {
    pub repeats: u8,
    pub on_ms: u16,
    pub off_ms: u16,
}

const fn beep(repeats: u8, on_ms: u16, off_ms: u16) -> Beep {
    Beep {
        repeats,
        on_ms,
        off_ms,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tone {
    /// Before a mechanical action.
    Start,
    /// After an action or stage.
    End,
    /// Camera relay switched.
    Camera,
    /// Motor power relay switched on.
    PowerOn,
    /// Motor power relay switched off.
    PowerOff,
    /// Pump or chopper switched.
    Actuator,
}

const START: &[Beep] = &[beep(5, 100, 100)];
const END: &[Beep] = &[beep(1, 1000, 300), beep(3, 200, 150), beep(1, 1000, 0)];
const CAMERA: &[Beep] = &[beep(3, 2000, 500)];
const POWER_ON: &[Beep] = &[beep(1, 100, 100), beep(1, 300, 150), beep(1, 600, 0)];
const POWER_OFF: &[Beep] = &[beep(1, 600, 150), beep(1, 300, 100), beep(1, 100, 0)];
const ACTUATOR: &[Beep] = &[beep(1, 3000, 500)];

impl Tone {
    pub fn beeps(self) -> &'static [Beep] {
        match self {
            Tone::Start => START,
            Tone::End => END,
            Tone::Camera => CAMERA,
            Tone::PowerOn => POWER_ON,
            Tone::PowerOff => POWER_OFF,
            Tone::Actuator => ACTUATOR,
        }
    }
}

pub fn play(signal: &mut dyn AudibleSignal, tone: Tone) {
    for b in tone.beeps() {
        signal.pattern(b.repeats, b.on_ms, b.off_ms);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::RecordingBuzzer;

    #[test]
    fn end_tone_plays_three_phrases() {
        let buzzer = RecordingBuzzer::new();
        play(&mut buzzer.clone(), Tone::End);
        assert_eq!(
            buzzer.patterns(),
            vec![(1, 1000, 300), (3, 200, 150), (1, 1000, 0)]
        );
    }

    #[test]
    fn every_tone_has_a_pattern() {
        for tone in [
            Tone::Start,
            Tone::End,
            Tone::Camera,
            Tone::PowerOn,
            Tone::PowerOff,
            Tone::Actuator,
        ] {
            assert!(!tone.beeps().is_empty(), "{tone:?}");
        }
    }
}
