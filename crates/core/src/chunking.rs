use crate::config::IngestionOptions;
use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkingConfig {
    pub chunk_size: usize,
    pub overlap: usize,
}

impl ChunkingConfig {
    pub fn new(chunk_size: usize, overlap: usize) -> Result<Self, ConfigError> {
        if chunk_size == 0 {
            return Err(ConfigError::InvalidChunking(
                "chunk_size must be at least 1".to_string(),
            ));
        }
        if overlap >= chunk_size {
            return Err(ConfigError::InvalidChunking(format!(
                "overlap {overlap} must be smaller than chunk_size {chunk_size}"
            )));
        }
        Ok(Self {
            chunk_size,
            overlap,
        })
    }

    pub fn chunk(&self, text: &str) -> Vec<String> {
        chunk_text(text, self.chunk_size, self.overlap)
    }
}

impl TryFrom<&IngestionOptions> for ChunkingConfig {
    type Error = ConfigError;

    fn try_from(value: &IngestionOptions) -> Result<Self, Self::Error> {
        Self::new(value.chunk_size, value.chunk_overlap)
    }
}

pub fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .replace('\u{a0}', " ")
}

/// Splits `text` into windows of `chunk_size` code points, each starting
/// `chunk_size - overlap` code points after the previous one. The final
/// window is clipped to the end of the text.
///
/// The step is floored at one code point so misconfigured inputs
/// (`overlap >= chunk_size`, `chunk_size == 0`) still terminate.
pub fn chunk_text(text: &str, chunk_size: usize, overlap: usize) -> Vec<String> {
    if text.is_empty() {
        return Vec::new();
    }

    let chars: Vec<char> = text.chars().collect();
    let window = chunk_size.max(1);
    if chars.len() <= window {
        return vec![text.to_string()];
    }

    let step = window.saturating_sub(overlap).max(1);
    let mut chunks = Vec::new();
    let mut start = 0;
    while start < chars.len() {
        let end = (start + window).min(chars.len());
        chunks.push(chars[start..end].iter().collect());
        if end == chars.len() {
            break;
        }
        start += step;
    }

    chunks
}

/// Returns at most `max_chars` leading code points of `text`.
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_index, _)) => &text[..byte_index],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn char_len(value: &str) -> usize {
        value.chars().count()
    }

    #[test]
    fn whitespace_is_normalized() {
        let input = "A  \t  lot\nof   spacing";
        let normalized = normalize_whitespace(input);
        assert_eq!(normalized, "A lot of spacing");
    }

    #[test]
    fn empty_text_yields_no_chunks() {
        assert!(chunk_text("", 10, 2).is_empty());
    }

    #[test]
    fn text_that_fits_is_a_single_chunk() {
        let text = "hydraulic pump";
        let chunks = chunk_text(text, char_len(text), 5);
        assert_eq!(chunks, vec![text.to_string()]);
    }

    #[test]
    fn nine_thousand_code_points_make_three_windows() {
        let text: String = (0..9_000)
            .map(|i| char::from(b'a' + (i % 26) as u8))
            .collect();

        let chunks = chunk_text(&text, 4_000, 200);
        let lengths: Vec<usize> = chunks.iter().map(|chunk| char_len(chunk)).collect();
        assert_eq!(lengths, vec![4_000, 4_000, 1_400]);

        let chars: Vec<char> = text.chars().collect();
        assert_eq!(chunks[1], chars[3_800..7_800].iter().collect::<String>());
        assert_eq!(chunks[2], chars[7_600..9_000].iter().collect::<String>());
    }

    #[test]
    fn consecutive_windows_share_exactly_the_overlap() {
        let text = "The quick brown fox jumps over the lazy dog, again and again.";
        let overlap = 4;
        let chunks = chunk_text(text, 12, overlap);

        for pair in chunks.windows(2) {
            let previous: Vec<char> = pair[0].chars().collect();
            let next: Vec<char> = pair[1].chars().collect();
            assert_eq!(previous.len(), 12);
            let tail: String = previous[previous.len() - overlap..].iter().collect();
            let head: String = next[..overlap.min(next.len())].iter().collect();
            assert_eq!(tail, head);
        }
    }

    #[test]
    fn chunks_cover_the_whole_text_without_gaps() {
        let text = "Ελληνικά κείμενα και 日本語のテキスト mixed with ascii words";
        let (size, overlap) = (7, 3);
        let chunks = chunk_text(text, size, overlap);
        let chars: Vec<char> = text.chars().collect();

        let mut covered = vec![false; chars.len()];
        for (index, chunk) in chunks.iter().enumerate() {
            let start = index * (size - overlap);
            let piece: Vec<char> = chunk.chars().collect();
            assert!(piece.len() <= size);
            assert_eq!(&chars[start..start + piece.len()], piece.as_slice());
            for slot in &mut covered[start..start + piece.len()] {
                *slot = true;
            }
        }
        assert!(covered.into_iter().all(|slot| slot));
    }

    #[test]
    fn no_overlap_round_trips() {
        let text = "Ünïcödé text with ümlauts and straße names splits cleanly.";
        let chunks = chunk_text(text, 5, 0);
        assert_eq!(chunks.concat(), text);
    }

    #[test]
    fn degenerate_step_still_terminates() {
        let chunks = chunk_text("abcdef", 3, 5);
        assert_eq!(chunks, vec!["abc", "bcd", "cde", "def"]);

        let chunks = chunk_text("abc", 0, 0);
        assert_eq!(chunks, vec!["a", "b", "c"]);
    }

    #[test]
    fn config_rejects_overlap_not_below_size() {
        assert!(ChunkingConfig::new(10, 10).is_err());
        assert!(ChunkingConfig::new(0, 0).is_err());
        assert!(ChunkingConfig::new(10, 9).is_ok());
    }

    #[test]
    fn truncation_respects_code_points() {
        assert_eq!(truncate_chars("héllo", 2), "hé");
        assert_eq!(truncate_chars("héllo", 50), "héllo");
        assert_eq!(truncate_chars("", 3), "");
    }
}
