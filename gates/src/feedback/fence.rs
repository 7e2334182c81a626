//! Fenced code block extraction from model responses
//!
//! Models are asked to wrap the script in a labelled fence, but nothing
//! guarantees they comply. The parser works line by line, prefers a block
//! with the requested label, tolerates a missing closing fence, and falls
//! back to the bare response.

const FENCE: &str = "```";

/// A fenced block found in a response.
#[derive(Debug)]
struct Block<'a> {
    /// Info string after the opening fence (e.g. `python`)
    info: &'a str,
    /// Lines between the opening fence and the closing fence (or end of input)
    body: &'a [&'a str],
}

/// Extract source text from a model response.
///
/// `label` is the expected fence info string (e.g. `"python"`).
pub fn extract_source(response: &str, label: &str) -> String {
    let lines: Vec<&str> = response.lines().collect();
    let fence_lines: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| line.trim_start().starts_with(FENCE))
        .map(|(i, _)| i)
        .collect();

    let blocks = pair_blocks(&lines, &fence_lines);

    let chosen = blocks
        .iter()
        .find(|b| label_matches(b.info, label))
        .or_else(|| blocks.first());

    if let Some(block) = chosen {
        let body = tidy(block.body);
        if !body.is_empty() {
            return body;
        }
    }

    // No usable block: treat everything before the first fence line as bare source
    let bare_end = fence_lines.first().copied().unwrap_or(lines.len());
    strip_bare(&lines[..bare_end], label)
}

/// Pair fence lines into (opening, closing) blocks in order of appearance.
fn pair_blocks<'a>(lines: &'a [&'a str], fence_lines: &[usize]) -> Vec<Block<'a>> {
    let mut blocks = Vec::new();
    let mut iter = fence_lines.iter();

    while let Some(&open) = iter.next() {
        let close = iter.next().copied().unwrap_or(lines.len());
        let info = lines[open]
            .trim_start()
            .trim_start_matches('`')
            .trim();
        blocks.push(Block {
            info,
            body: &lines[open + 1..close],
        });
    }

    blocks
}

fn label_matches(info: &str, label: &str) -> bool {
    let tag = info.split_whitespace().next().unwrap_or("");
    if tag.eq_ignore_ascii_case(label) {
        return true;
    }
    label.eq_ignore_ascii_case("python")
        && (tag.eq_ignore_ascii_case("py") || tag.eq_ignore_ascii_case("python3"))
}

/// Handle a response with no fences: drop a lone label line at the top and a
/// dangling closing fence at the bottom.
fn strip_bare(lines: &[&str], label: &str) -> String {
    let mut start = lines
        .iter()
        .position(|l| !l.trim().is_empty())
        .unwrap_or(lines.len());

    if start < lines.len() && lines[start].trim().eq_ignore_ascii_case(label) {
        start += 1;
    }

    let body = tidy(&lines[start..]);
    match body.strip_suffix(FENCE) {
        Some(stripped) => stripped.trim_end().to_string(),
        None => body,
    }
}

/// Join lines, dropping blank lines at both ends and trailing whitespace.
///
/// Leading indentation of the first line is preserved.
fn tidy(lines: &[&str]) -> String {
    let first = lines.iter().position(|l| !l.trim().is_empty());
    let last = lines.iter().rposition(|l| !l.trim().is_empty());

    match (first, last) {
        (Some(first), Some(last)) => lines[first..=last].join("\n").trim_end().to_string(),
        _ => String::new(),
    }
}
