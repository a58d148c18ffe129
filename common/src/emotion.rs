use serde::Deserialize;
use std::fmt;

/// The fixed emotion vocabulary used by the classification server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Emotion {
    Angry,
    Disgust,
    Fear,
    Happy,
    Neutral,
    Sad,
    Surprise,
}

impl Emotion {
    /// Canonical display order. Charts and histograms always follow it.
    pub const ALL: [Emotion; 7] = [
        Emotion::Angry,
        Emotion::Disgust,
        Emotion::Fear,
        Emotion::Happy,
        Emotion::Neutral,
        Emotion::Sad,
        Emotion::Surprise,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Emotion::Angry => "angry",
            Emotion::Disgust => "disgust",
            Emotion::Fear => "fear",
            Emotion::Happy => "happy",
            Emotion::Neutral => "neutral",
            Emotion::Sad => "sad",
            Emotion::Surprise => "surprise",
        }
    }
}

impl fmt::Display for Emotion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Per-label counts as returned by the history endpoint. Labels missing
/// from the response body count as zero.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EmotionHistogram {
    #[serde(default)]
    pub angry: u64,
    #[serde(default)]
    pub disgust: u64,
    #[serde(default)]
    pub fear: u64,
    #[serde(default)]
    pub happy: u64,
    #[serde(default)]
    pub neutral: u64,
    #[serde(default)]
    pub sad: u64,
    #[serde(default)]
    pub surprise: u64,
}

impl EmotionHistogram {
    pub fn count(&self, emotion: Emotion) -> u64 {
        match emotion {
            Emotion::Angry => self.angry,
            Emotion::Disgust => self.disgust,
            Emotion::Fear => self.fear,
            Emotion::Happy => self.happy,
            Emotion::Neutral => self.neutral,
            Emotion::Sad => self.sad,
            Emotion::Surprise => self.surprise,
        }
    }

    /// Counts in canonical label order, independent of the key order the
    /// server happened to serialize.
    pub fn values(&self) -> [u64; 7] {
        let mut out = [0u64; 7];
        for (slot, emotion) in out.iter_mut().zip(Emotion::ALL) {
            *slot = self.count(emotion);
        }
        out
    }

    pub fn total(&self) -> u64 {
        self.values().iter().sum()
    }

    /// Most frequent label, or `None` when nothing has been observed.
    /// Ties go to the earlier label in canonical order.
    pub fn dominant(&self) -> Option<Emotion> {
        let mut best: Option<(Emotion, u64)> = None;
        for emotion in Emotion::ALL {
            let count = self.count(emotion);
            if count > 0 && best.map_or(true, |(_, c)| count > c) {
                best = Some((emotion, count));
            }
        }
        best.map(|(emotion, _)| emotion)
    }
}
