//! Streaming Knuth-Morris-Pratt exact substring search.
//!
//! [`KmpMatcher`] builds the failure function once and then steps a single
//! automaton state across however many chunks the caller feeds it, so a
//! match that straddles a chunk boundary is still found and reported at its
//! correct absolute byte offset.

/// A resumable KMP automaton over a lowercased byte pattern.
pub struct KmpMatcher {
    pattern: Vec<u8>,
    failure: Vec<usize>,
    state: usize,
}

impl KmpMatcher {
    pub fn new(pattern: &[u8]) -> Self {
        let failure = build_failure_function(pattern);
        Self { pattern: pattern.to_vec(), failure, state: 0 }
    }

    /// Feed the next chunk of text, located at absolute offset `chunk_offset`
    /// in the overall stream. Returns the absolute start offsets of every
    /// match found, in order. Matches may span chunks; the automaton state
    /// persists between calls.
    pub fn feed(&mut self, chunk: &[u8], chunk_offset: u64) -> Vec<u64> {
        let mut matches = Vec::new();
        if self.pattern.is_empty() {
            return matches;
        }
        for (i, &byte) in chunk.iter().enumerate() {
            while self.state > 0 && self.pattern[self.state] != byte {
                self.state = self.failure[self.state - 1];
            }
            if self.pattern[self.state] == byte {
                self.state += 1;
            }
            if self.state == self.pattern.len() {
                let abs_i = chunk_offset + i as u64;
                matches.push(abs_i + 1 - self.pattern.len() as u64);
                self.state = self.failure[self.state - 1];
            }
        }
        matches
    }

    /// Reset the automaton state (e.g. after an overlap re-feed would double
    /// count — callers that re-send overlap bytes should feed a fresh
    /// matcher per window instead, which is the approach the searcher uses).
    pub fn reset(&mut self) {
        self.state = 0;
    }
}

fn build_failure_function(pattern: &[u8]) -> Vec<usize> {
    let mut failure = vec![0usize; pattern.len()];
    let mut k = 0;
    for i in 1..pattern.len() {
        while k > 0 && pattern[k] != pattern[i] {
            k = failure[k - 1];
        }
        if pattern[k] == pattern[i] {
            k += 1;
        }
        failure[i] = k;
    }
    failure
}

/// One-shot search for every occurrence of `pattern` in `text`, returning
/// absolute byte offsets. Used by tests to check streaming/whole-string
/// equivalence.
pub fn search_whole(text: &[u8], pattern: &[u8]) -> Vec<u64> {
    let mut m = KmpMatcher::new(pattern);
    m.feed(text, 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_single_match() {
        let hits = search_whole(b"the quick brown fox", b"quick");
        assert_eq!(hits, vec![4]);
    }

    #[test]
    fn finds_overlapping_matches() {
        let hits = search_whole(b"aaaa", b"aa");
        assert_eq!(hits, vec![0, 1, 2]);
    }

    #[test]
    fn no_match() {
        let hits = search_whole(b"hello world", b"xyz");
        assert!(hits.is_empty());
    }

    #[test]
    fn streaming_across_chunk_boundary_finds_split_match() {
        let text = b"the quick brown fox jumps";
        let pattern = b"brown fox";
        let mut m = KmpMatcher::new(pattern);
        let mut hits = Vec::new();
        // split mid-pattern: "...quick br" | "own fox jumps"
        hits.extend(m.feed(&text[0..14], 0));
        hits.extend(m.feed(&text[14..], 14));
        assert_eq!(hits, vec![10]);
    }

    proptest::proptest! {
        #[test]
        fn streaming_equals_whole_string_for_any_partition(
            text in "[a-d]{0,40}",
            pattern in "[a-d]{1,5}",
            split in 0usize..40,
        ) {
            let text = text.as_bytes();
            let pattern = pattern.as_bytes();
            let split = split.min(text.len());

            let whole = search_whole(text, pattern);

            let mut m = KmpMatcher::new(pattern);
            let mut streamed = Vec::new();
            streamed.extend(m.feed(&text[..split], 0));
            streamed.extend(m.feed(&text[split..], split as u64));

            proptest::prop_assert_eq!(whole, streamed);
        }
    }
}
