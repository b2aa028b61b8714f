/// Group sentences into translation segments.
///
/// Sentences are appended to a running buffer; once its word count goes
/// over `word_budget` the buffer becomes a segment and a new one starts. A
/// single sentence longer than the budget becomes a segment of its own.
pub fn segment<I, S>(sentences: I, word_budget: usize) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut segments = Vec::new();
    let mut buffer = String::new();
    let mut words = 0;

    for sentence in sentences {
        let sentence = sentence.as_ref();
        buffer.push_str(sentence);
        words += sentence.split_whitespace().count();
        if words > word_budget {
            segments.push(std::mem::take(&mut buffer));
            words = 0;
        }
    }

    if !buffer.trim().is_empty() {
        segments.push(buffer);
    }
    segments
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_segment() {
        assert_eq!(segment(["One two.", " Three."], 10), ["One two. Three."]);
    }

    #[test]
    fn flushes_once_budget_is_exceeded() {
        let sentences = ["a b c.", " d e.", " f g h i.", " j."];
        assert_eq!(
            segment(sentences, 4),
            ["a b c. d e.", " f g h i. j."]
        );
    }

    #[test]
    fn reaching_the_budget_exactly_does_not_flush() {
        assert_eq!(segment(["a b.", " c d.", " e."], 4), ["a b. c d. e."]);
    }

    #[test]
    fn no_sentences_no_segments() {
        assert!(segment(Vec::<&str>::new(), 2000).is_empty());
    }

    #[test]
    fn segments_preserve_every_sentence_in_order() {
        let sentences: Vec<String> = (0..50).map(|i| format!(" s{} w w w.", i)).collect();
        let segments = segment(&sentences, 20);
        assert!(segments.len() > 1);
        assert_eq!(segments.concat(), sentences.concat());
    }
}
