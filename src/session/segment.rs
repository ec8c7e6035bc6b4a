//! Sentence segmentation over the streaming LLM output
//!
//! Chunks are accumulated and carved into speakable segments at CJK terminal
//! punctuation. Offsets are counted in characters, not bytes, because chunk
//! boundaries routinely fall inside multi-byte sequences.

use once_cell::sync::Lazy;
use regex::Regex;

/// Punctuation that ends a speakable sentence
const SENTENCE_TERMINATORS: [char; 5] = ['。', '？', '！', '；', '：'];

/// A speakable unit carved from one reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment {
    /// 1-based position within the current reply
    pub text_index: usize,
    /// Sanitized text, ready for synthesis
    pub text: String,
}

/// Accumulates LLM chunks and yields segments at sentence boundaries.
///
/// `processed_chars` tracks how much of the concatenated buffer has already
/// been dispatched; the text index stays dense and increasing for the whole
/// reply, including the final flush.
#[derive(Debug, Default)]
pub struct SegmentAccumulator {
    buffer: Vec<String>,
    processed_chars: usize,
    text_index: usize,
}

impl SegmentAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_chunk(&mut self, chunk: &str) {
        self.buffer.push(chunk.to_string());
    }

    /// Carve the next segment if the pending text contains a terminator.
    ///
    /// The raw prefix is only consumed when sanitizing leaves something to
    /// speak; an all-punctuation prefix stays pending until the final flush
    /// discards it.
    pub fn next_segment(&mut self) -> Option<Segment> {
        let full: String = self.buffer.concat();
        let pending: String = full.chars().skip(self.processed_chars).collect();
        let split = last_terminator_pos(&pending)?;
        let raw: String = pending.chars().take(split + 1).collect();
        let text = sanitize_segment(&raw);
        if text.is_empty() {
            return None;
        }
        self.text_index += 1;
        self.processed_chars += raw.chars().count();
        Some(Segment {
            text_index: self.text_index,
            text,
        })
    }

    /// Flush whatever remains after the stream ends
    pub fn flush(&mut self) -> Option<Segment> {
        let full: String = self.buffer.concat();
        let pending: String = full.chars().skip(self.processed_chars).collect();
        if pending.is_empty() {
            return None;
        }
        self.processed_chars += pending.chars().count();
        let text = sanitize_segment(&pending);
        if text.is_empty() {
            return None;
        }
        self.text_index += 1;
        Some(Segment {
            text_index: self.text_index,
            text,
        })
    }

    /// Everything received so far, concatenated
    pub fn full_text(&self) -> String {
        self.buffer.concat()
    }

    /// Drop buffered text without resetting the text index
    pub fn clear_buffer(&mut self) {
        self.buffer.clear();
        self.processed_chars = 0;
    }

    /// The index the next emitted segment will receive
    pub fn next_index(&self) -> usize {
        self.text_index + 1
    }

    pub fn is_buffer_empty(&self) -> bool {
        self.buffer.iter().all(|c| c.is_empty())
    }
}

/// Rightmost character index of any sentence terminator
pub fn last_terminator_pos(text: &str) -> Option<usize> {
    let mut found = None;
    for (i, c) in text.chars().enumerate() {
        if SENTENCE_TERMINATORS.contains(&c) {
            found = Some(i);
        }
    }
    found
}

/// Strip emoji everywhere and trailing punctuation/whitespace; leading
/// punctuation is part of the text and stays
pub fn sanitize_segment(raw: &str) -> String {
    let without_emoji: String = raw.chars().filter(|c| !is_emoji(*c)).collect();
    without_emoji
        .trim_start()
        .trim_end_matches(|c: char| c.is_whitespace() || is_punctuation(c))
        .to_string()
}

fn is_punctuation(c: char) -> bool {
    c.is_ascii_punctuation()
        || matches!(c,
            '\u{3000}'..='\u{303F}'   // CJK symbols and punctuation
            | '\u{FF01}'..='\u{FF0F}' // fullwidth ASCII punctuation
            | '\u{FF1A}'..='\u{FF20}'
            | '\u{FF3B}'..='\u{FF40}'
            | '\u{FF5B}'..='\u{FF65}'
            | '\u{2012}'..='\u{205E}' // general punctuation
        )
}

fn is_emoji(c: char) -> bool {
    matches!(c as u32,
        0x1F000..=0x1FAFF   // emoji, symbols, pictographs
        | 0x2600..=0x27BF   // misc symbols and dingbats
        | 0xFE0E..=0xFE0F   // variation selectors
        | 0x200D            // zero-width joiner
        | 0x1F1E6..=0x1F1FF // regional indicators
    )
}

static JSON_OBJECT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)\{.*\}").expect("valid regex"));

/// Greedy first-`{` to last-`}` extraction, for tool calls delivered inline
/// in the content stream
pub fn extract_json_object(text: &str) -> Option<&str> {
    JSON_OBJECT.find(text).map(|m| m.as_str())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_terminator_rightmost() {
        assert_eq!(last_terminator_pos("你好。再见！"), Some(5));
        assert_eq!(last_terminator_pos("没有标点"), None);
        // adjacent terminators split on the rightmost
        assert_eq!(last_terminator_pos("结束。！"), Some(3));
    }

    #[test]
    fn test_sanitize_strips_trailing_punctuation_and_emoji() {
        assert_eq!(sanitize_segment("你好呀，很高兴见到你。"), "你好呀，很高兴见到你");
        assert_eq!(sanitize_segment("好的👍！"), "好的");
        assert_eq!(sanitize_segment("。！？"), "");
        assert_eq!(sanitize_segment("  hello!  "), "hello");
        // a leading quote or dash belongs to the text
        assert_eq!(sanitize_segment("“就这样吧”。"), "“就这样吧");
        assert_eq!(sanitize_segment("——好的。"), "——好的");
    }

    #[test]
    fn test_segments_across_chunks() {
        let mut acc = SegmentAccumulator::new();
        acc.push_chunk("你好呀，");
        assert!(acc.next_segment().is_none());
        acc.push_chunk("很高兴见到你。");
        let first = acc.next_segment().unwrap();
        assert_eq!(first.text_index, 1);
        assert_eq!(first.text, "你好呀，很高兴见到你");
        acc.push_chunk("今天过得怎么样？");
        let second = acc.next_segment().unwrap();
        assert_eq!(second.text_index, 2);
        assert_eq!(second.text, "今天过得怎么样");
        assert!(acc.flush().is_none());
    }

    #[test]
    fn test_flush_emits_tail_without_terminator() {
        let mut acc = SegmentAccumulator::new();
        acc.push_chunk("就这样吧");
        assert!(acc.next_segment().is_none());
        let tail = acc.flush().unwrap();
        assert_eq!(tail.text_index, 1);
        assert_eq!(tail.text, "就这样吧");
    }

    #[test]
    fn test_straddling_terminators_split_rightmost() {
        let mut acc = SegmentAccumulator::new();
        acc.push_chunk("太好了。！接下来");
        let seg = acc.next_segment().unwrap();
        assert_eq!(seg.text, "太好了");
        let tail = acc.flush().unwrap();
        assert_eq!(tail.text, "接下来");
        assert_eq!(tail.text_index, 2);
    }

    #[test]
    fn test_empty_stream_yields_nothing() {
        let mut acc = SegmentAccumulator::new();
        assert!(acc.next_segment().is_none());
        assert!(acc.flush().is_none());
        assert_eq!(acc.full_text(), "");
    }

    #[test]
    fn test_clear_buffer_keeps_index() {
        let mut acc = SegmentAccumulator::new();
        acc.push_chunk("第一句。");
        assert_eq!(acc.next_segment().unwrap().text_index, 1);
        acc.clear_buffer();
        assert_eq!(acc.next_index(), 2);
        acc.push_chunk("第二句。");
        assert_eq!(acc.next_segment().unwrap().text_index, 2);
    }

    #[test]
    fn test_extract_json_object() {
        let text = r#"<tool_call>{"name":"x","arguments":{"a":1}}"#;
        assert_eq!(
            extract_json_object(text),
            Some(r#"{"name":"x","arguments":{"a":1}}"#)
        );
        assert!(extract_json_object("no json here").is_none());
    }

    #[test]
    fn test_rejoining_segments_reproduces_prefixes() {
        let chunks = ["你好呀，", "很高兴见到你。", "今天过得怎么样？"];
        let mut acc = SegmentAccumulator::new();
        let mut spoken = Vec::new();
        for chunk in chunks {
            acc.push_chunk(chunk);
            while let Some(seg) = acc.next_segment() {
                spoken.push(seg.text);
            }
        }
        if let Some(seg) = acc.flush() {
            spoken.push(seg.text);
        }
        let full: String = chunks.concat();
        let stripped: String = full
            .chars()
            .filter(|c| !SENTENCE_TERMINATORS.contains(c) && *c != '，')
            .collect();
        let rejoined: String = spoken.join("").chars().filter(|c| *c != '，').collect();
        assert_eq!(rejoined, stripped);
    }
}
