//! Output sanitization

/// Replace byte spans with the placeholder; overlapping spans are merged
pub fn replace_spans(content: &str, spans: &[(usize, usize)], placeholder: &str) -> String {
    let mut spans: Vec<(usize, usize)> = spans
        .iter()
        .copied()
        .filter(|(start, end)| start < end && *end <= content.len())
        .collect();
    spans.sort_unstable();

    let mut merged: Vec<(usize, usize)> = Vec::with_capacity(spans.len());
    for (start, end) in spans {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }

    let mut out = String::with_capacity(content.len());
    let mut cursor = 0;
    for (start, end) in merged {
        // Regex match spans are always on char boundaries
        if !content.is_char_boundary(start) || !content.is_char_boundary(end) {
            continue;
        }
        out.push_str(&content[cursor..start]);
        out.push_str(placeholder);
        cursor = end;
    }
    out.push_str(&content[cursor..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replace_single() {
        assert_eq!(
            replace_spans("this is damn annoying", &[(8, 12)], "[oops]"),
            "this is [oops] annoying"
        );
    }

    #[test]
    fn test_overlapping_and_unordered() {
        let text = "aaa bbb ccc";
        assert_eq!(replace_spans(text, &[(8, 11), (0, 3), (2, 5)], "*"), "*bb *");
    }

    #[test]
    fn test_out_of_range_ignored() {
        assert_eq!(replace_spans("abc", &[(1, 10), (2, 2)], "*"), "abc");
    }
}
