//! Word-level transcript and speaker-turn transitions.
//!
//! A [`Transcript`] is a chronologically ordered list of words, each tagged
//! with a speaker id (`0` = the participant speaking, `> 0` = someone else,
//! i.e. the participant listening).
//!
//! - [`detect_transitions`]: every word whose listening/speaking state differs
//!   from the previous word marks a transition.
//! - [`valid_speak_transitions`] / [`valid_listen_transitions`]: keep only the
//!   transitions with a clean turn on both sides (guard window, default 1 s).
//! - [`listening_probes`]: regularly spaced times inside each listening turn,
//!   used as a steady-state comprehension control.
use crate::config::AnalysisConfig;

/// One transcribed word.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WordEvent {
    pub start_time: f64,
    pub end_time: f64,
    pub speaker_id: u32,
}

impl WordEvent {
    pub fn new(start_time: f64, end_time: f64, speaker_id: u32) -> Self {
        Self { start_time, end_time, speaker_id }
    }

    pub fn is_listening(&self) -> bool {
        self.speaker_id > 0
    }
}

/// Which side of the conversation a word belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SpeakerCondition {
    /// `speaker_id == 0`
    Speaking,
    /// `speaker_id > 0`
    Listening,
}

impl SpeakerCondition {
    pub fn matches(&self, w: &WordEvent) -> bool {
        match self {
            SpeakerCondition::Speaking => !w.is_listening(),
            SpeakerCondition::Listening => w.is_listening(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            SpeakerCondition::Speaking => "self_speech",
            SpeakerCondition::Listening => "other_speech",
        }
    }
}

/// Chronologically ordered words of one participant.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transcript {
    words: Vec<WordEvent>,
}

impl Transcript {
    pub fn new(words: Vec<WordEvent>) -> Self {
        Self { words }
    }

    pub fn words(&self) -> &[WordEvent] {
        &self.words
    }

    pub fn len(&self) -> usize {
        self.words.len()
    }

    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Row indices of the words in `cond`, in transcript order.
    pub fn indices(&self, cond: SpeakerCondition) -> Vec<usize> {
        self.words
            .iter()
            .enumerate()
            .filter(|(_, w)| cond.matches(w))
            .map(|(i, _)| i)
            .collect()
    }

    /// Onset times of the words in `cond`, in transcript order.
    pub fn onsets(&self, cond: SpeakerCondition) -> Vec<f64> {
        self.words
            .iter()
            .filter(|w| cond.matches(w))
            .map(|w| w.start_time)
            .collect()
    }

    /// Speaker ids of words ending in `(t − guard, t]`.
    fn ending_before(&self, t: f64, guard: f64) -> impl Iterator<Item = u32> + '_ {
        self.words
            .iter()
            .filter(move |w| w.end_time > t - guard && w.end_time <= t)
            .map(|w| w.speaker_id)
    }

    /// Speaker ids of words starting in `[t, t + guard)`.
    fn starting_after(&self, t: f64, guard: f64) -> impl Iterator<Item = u32> + '_ {
        self.words
            .iter()
            .filter(move |w| w.start_time >= t && w.start_time < t + guard)
            .map(|w| w.speaker_id)
    }
}

/// Transition times found by [`detect_transitions`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Transitions {
    /// Listening → speaking.
    pub to_speak: Vec<f64>,
    /// Speaking → listening.
    pub to_listen: Vec<f64>,
}

/// Scan the transcript for listening/speaking flips.
pub fn detect_transitions(transcript: &Transcript) -> Transitions {
    let mut out = Transitions::default();
    let Some(first) = transcript.words().first() else {
        return out;
    };
    let mut was_listening = first.is_listening();
    for w in transcript.words() {
        if w.is_listening() != was_listening {
            if w.speaker_id == 0 {
                out.to_speak.push(w.start_time);
            } else {
                out.to_listen.push(w.start_time);
            }
            was_listening = w.is_listening();
        }
    }
    out
}

/// Speak transitions preceded only by other speakers and followed only by the
/// participant within the guard window.
pub fn valid_speak_transitions(
    transcript: &Transcript,
    candidates: &[f64],
    cfg: &AnalysisConfig,
) -> Vec<f64> {
    let g = cfg.transition_guard;
    candidates
        .iter()
        .copied()
        .filter(|&tt| {
            let before = transcript.ending_before(tt, g).min();
            let after = transcript.starting_after(tt, g).max();
            matches!(before, Some(s) if s > 0) && after == Some(0)
        })
        .collect()
}

/// Listen transitions preceded only by the participant and followed only by
/// other speakers within the guard window.
pub fn valid_listen_transitions(
    transcript: &Transcript,
    candidates: &[f64],
    cfg: &AnalysisConfig,
) -> Vec<f64> {
    let g = cfg.transition_guard;
    candidates
        .iter()
        .copied()
        .filter(|&tt| {
            let before = transcript.ending_before(tt, g).max();
            let after = transcript.starting_after(tt, g).min();
            before == Some(0) && matches!(after, Some(s) if s > 0)
        })
        .collect()
}

/// Probe times every `probe_step` seconds through each listening turn that
/// starts at one of `listen_transitions`.
///
/// The turn runs from the word starting at the transition through the last
/// consecutive word with a non-zero speaker id; probes are `T + n·step` for
/// `n = 1, 2, …` while strictly before that word's end time.  Turns whose end
/// time is not finite get no probes.
pub fn listening_probes(
    transcript: &Transcript,
    listen_transitions: &[f64],
    cfg: &AnalysisConfig,
) -> Vec<f64> {
    let words = transcript.words();
    let step = cfg.probe_step;
    let mut probes = Vec::new();
    for &tt in listen_transitions {
        let Some(mut ind) = words.iter().position(|w| w.start_time == tt) else {
            continue;
        };
        while ind + 1 < words.len() && words[ind + 1].speaker_id != 0 {
            ind += 1;
        }
        let turn_end = words[ind].end_time;
        if !turn_end.is_finite() || step.is_nan() || step <= 0.0 {
            continue;
        }
        let mut n = 1u32;
        let mut p = tt + step;
        while p < turn_end {
            probes.push(p);
            n += 1;
            p = tt + step * n as f64;
        }
    }
    probes
}

/// The three event sets compared by the selectivity analysis.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EventClasses {
    pub to_speak: Vec<f64>,
    pub to_listen: Vec<f64>,
    pub control: Vec<f64>,
}

impl EventClasses {
    pub fn from_transcript(transcript: &Transcript, cfg: &AnalysisConfig) -> Self {
        let raw = detect_transitions(transcript);
        let to_speak = valid_speak_transitions(transcript, &raw.to_speak, cfg);
        let to_listen = valid_listen_transitions(transcript, &raw.to_listen, cfg);
        let control = listening_probes(transcript, &to_listen, cfg);
        Self { to_speak, to_listen, control }
    }
}
