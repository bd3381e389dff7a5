//! Keyword mood tagging for synthesized chunks

use crate::messages::Emotion;

const SURPRISED: &[&str] = &[
    "驚いた",
    "びっくり",
    "すごい",
    "信じられない",
    "wow",
    "amazing",
    "unbelievable",
];
const HAPPY: &[&str] = &[
    "嬉しい",
    "楽しい",
    "幸せ",
    "好き",
    "ありがとう",
    "素晴らしい",
    "わくわく",
    "happy",
    "glad",
    "thank",
    "love",
    "great",
];
const SAD: &[&str] = &[
    "悲しい",
    "辛い",
    "嫌い",
    "疲れた",
    "困った",
    "不安",
    "sad",
    "sorry",
    "tired",
    "worried",
];

/// Tag `text` by keyword. Surprise wins over joy, joy over sadness.
pub fn analyze_emotion(text: &str) -> Emotion {
    let lowered = text.to_lowercase();
    let has_any = |words: &[&str]| words.iter().any(|w| lowered.contains(w));

    if has_any(SURPRISED) {
        Emotion::Surprised
    } else if has_any(HAPPY) {
        Emotion::Happy
    } else if has_any(SAD) {
        Emotion::Sad
    } else {
        Emotion::Neutral
    }
}
