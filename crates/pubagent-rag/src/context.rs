use pubagent_core::types::RetrievedChunk;

/// Chunk texts joined by `delimiter` in ranked order, stopping before the
/// text would exceed `max_chars` characters. A top hit that is longer than the
/// whole budget is truncated instead of dropped. `max_chars == 0` means no budget.
///
/// Returns the context and how many hits it includes.
pub fn pack_context(hits: &[RetrievedChunk], delimiter: &str, max_chars: usize) -> (String, usize) {
    let budget = if max_chars == 0 { usize::MAX } else { max_chars };
    let delimiter_len = delimiter.chars().count();
    let mut context = String::new();
    let mut used = 0usize;
    let mut included = 0usize;

    for hit in hits {
        let len = hit.text.chars().count();
        if included == 0 {
            if len > budget {
                context.extend(hit.text.chars().take(budget));
                return (context, 1);
            }
            context.push_str(&hit.text);
            used = len;
        } else {
            if used.saturating_add(delimiter_len).saturating_add(len) > budget {
                break;
            }
            context.push_str(delimiter);
            context.push_str(&hit.text);
            used += delimiter_len + len;
        }
        included += 1;
    }
    (context, included)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(text: &str) -> RetrievedChunk {
        RetrievedChunk {
            chunk_id: text.to_string(),
            text: text.to_string(),
            score: 0.5,
            source_path: "a.txt".to_string(),
            sequence_index: 0,
        }
    }

    #[test]
    fn joins_in_ranked_order() {
        let (ctx, n) = pack_context(&[hit("one"), hit("two"), hit("three")], "|", 0);
        assert_eq!(ctx, "one|two|three");
        assert_eq!(n, 3);
    }

    #[test]
    fn stops_at_budget() {
        let (ctx, n) = pack_context(&[hit("aaaa"), hit("bbbb"), hit("c")], "--", 10);
        assert_eq!(ctx, "aaaa--bbbb");
        assert_eq!(n, 2);
    }

    #[test]
    fn oversized_top_hit_is_truncated_on_char_boundary() {
        let (ctx, n) = pack_context(&[hit("ééééé"), hit("x")], "|", 3);
        assert_eq!(ctx, "ééé");
        assert_eq!(n, 1);
    }

    #[test]
    fn no_hits_is_empty() {
        assert_eq!(pack_context(&[], "|", 10), (String::new(), 0));
    }
}
