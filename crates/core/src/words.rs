//! Word and paragraph-break tokenization over a decoded chunk of text.
//!
//! A single left-to-right scan recognizes exactly two token kinds: a
//! paragraph break (a whitespace run containing two or more newlines) and a
//! word (a maximal run of non-whitespace bytes). Each token records its
//! byte offset within the scanned text so callers can map back to absolute
//! origin offsets.

/// One token produced by [`tokenize`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Token<'a> {
    Word { text: &'a str, byte_offset: usize },
    ParagraphBreak { byte_offset: usize },
}

impl<'a> Token<'a> {
    pub fn byte_offset(&self) -> usize {
        match self {
            Token::Word { byte_offset, .. } => *byte_offset,
            Token::ParagraphBreak { byte_offset } => *byte_offset,
        }
    }

    pub fn byte_end(&self) -> usize {
        match self {
            Token::Word { text, byte_offset } => byte_offset + text.len(),
            Token::ParagraphBreak { byte_offset } => *byte_offset,
        }
    }

    pub fn is_word(&self) -> bool {
        matches!(self, Token::Word { .. })
    }
}

/// Tokenize `text` into words and paragraph breaks, recording byte offsets
/// relative to the start of `text`.
pub fn tokenize(text: &str) -> Vec<Token<'_>> {
    let bytes = text.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < bytes.len() {
        if bytes[i].is_ascii_whitespace() {
            let run_start = i;
            let mut newlines = 0usize;
            while i < bytes.len() && bytes[i].is_ascii_whitespace() {
                if bytes[i] == b'\n' {
                    newlines += 1;
                }
                i += 1;
            }
            if newlines >= 2 {
                tokens.push(Token::ParagraphBreak { byte_offset: run_start });
            }
        } else {
            let start = i;
            while i < bytes.len() && !bytes[i].is_ascii_whitespace() {
                i += 1;
            }
            tokens.push(Token::Word { text: &text[start..i], byte_offset: start });
        }
    }

    tokens
}

/// Reassemble the whitespace-separated word sequence from tokenized output
/// (paragraph breaks dropped), for the round-trip law: this must equal
/// `text.split_whitespace().collect::<Vec<_>>().join(" ")`.
pub fn reassemble_words(tokens: &[Token<'_>]) -> String {
    tokens
        .iter()
        .filter_map(|t| match t {
            Token::Word { text, .. } => Some(*text),
            Token::ParagraphBreak { .. } => None,
        })
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_words_and_paragraph_breaks() {
        let text = "hello world\n\nnext paragraph";
        let tokens = tokenize(text);
        assert_eq!(
            tokens,
            vec![
                Token::Word { text: "hello", byte_offset: 0 },
                Token::Word { text: "world", byte_offset: 6 },
                Token::ParagraphBreak { byte_offset: 11 },
                Token::Word { text: "next", byte_offset: 13 },
                Token::Word { text: "paragraph", byte_offset: 18 },
            ]
        );
    }

    #[test]
    fn single_newline_is_not_a_paragraph_break() {
        let tokens = tokenize("a\nb");
        assert!(tokens.iter().all(|t| t.is_word()));
    }

    #[test]
    fn leading_and_trailing_whitespace_produce_no_extra_tokens() {
        let tokens = tokenize("   hi   ");
        assert_eq!(tokens, vec![Token::Word { text: "hi", byte_offset: 3 }]);
    }

    #[test]
    fn round_trip_reassembly() {
        let text = "The quick   brown\nfox\n\njumps over\tthe lazy dog";
        let tokens = tokenize(text);
        let expected = text.split_whitespace().collect::<Vec<_>>().join(" ");
        assert_eq!(reassemble_words(&tokens), expected);
    }

    proptest::proptest! {
        #[test]
        fn round_trip_for_arbitrary_ascii(text in "[a-zA-Z0-9 \t\n]{0,80}") {
            let tokens = tokenize(&text);
            let expected = text.split_whitespace().collect::<Vec<_>>().join(" ");
            proptest::prop_assert_eq!(reassemble_words(&tokens), expected);
        }
    }
}
