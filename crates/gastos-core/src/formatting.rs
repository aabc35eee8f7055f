//! Reply text helpers.

/// `R$` amount with two decimals, period separator (`R$15.50`).
pub fn format_money(amount: f64) -> String {
    format!("R${amount:.2}")
}

/// One line of the `/list` reply.
pub fn format_expense_line(amount: f64, description: &str) -> String {
    format!("{} - {description}", format_money(amount))
}

/// Split a plain-text reply into chunks of at most `limit` bytes.
///
/// Chunks break on line boundaries when possible; a single line longer than
/// the limit is cut at a UTF-8 boundary.
pub fn split_text_chunks(text: &str, limit: usize) -> Vec<String> {
    let limit = limit.max(1);
    if text.len() <= limit {
        return vec![text.to_string()];
    }

    let mut out: Vec<String> = Vec::new();
    let mut chunk = String::new();

    for line in text.split_inclusive('\n') {
        if chunk.len() + line.len() <= limit {
            chunk.push_str(line);
            continue;
        }

        if !chunk.is_empty() {
            out.push(std::mem::take(&mut chunk));
        }

        let mut rest = line;
        while rest.len() > limit {
            let (head, tail) = split_utf8_prefix(rest, limit);
            out.push(head.to_string());
            rest = tail;
        }
        chunk.push_str(rest);
    }

    if !chunk.is_empty() {
        out.push(chunk);
    }
    out
}

fn split_utf8_prefix(s: &str, max_bytes: usize) -> (&str, &str) {
    if s.len() <= max_bytes {
        return (s, "");
    }
    let mut idx = 0usize;
    for (i, _) in s.char_indices() {
        if i > max_bytes {
            break;
        }
        idx = i;
    }
    if idx == 0 {
        // A single char wider than the limit; emit it alone to keep making progress.
        let next = s.char_indices().nth(1).map(|(i, _)| i).unwrap_or(s.len());
        return (&s[..next], &s[next..]);
    }
    (&s[..idx], &s[idx..])
}
