//! Fenced-block extraction from model output.
//!
//! Parsing is line-oriented and never fails: malformed or empty fences are
//! skipped, and a fence left open at end of input yields nothing.

use crate::core::types::Artifact;

/// An artifact together with the prose that precedes it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Segment<'a> {
    pub prose_before: &'a str,
    pub artifact: Artifact,
}

/// Lazy iterator over fenced segments. Cloning restarts from the clone point.
#[derive(Debug, Clone)]
pub struct Segments<'a> {
    text: &'a str,
    pos: usize,
}

/// Lazy iterator over artifacts in source order.
#[derive(Debug, Clone)]
pub struct Artifacts<'a> {
    inner: Segments<'a>,
}

/// Parse `text` into artifacts, left to right.
pub fn parse_artifacts(text: &str) -> Artifacts<'_> {
    Artifacts {
        inner: parse_segments(text),
    }
}

/// Parse `text` into artifacts paired with their preceding prose.
pub fn parse_segments(text: &str) -> Segments<'_> {
    Segments { text, pos: 0 }
}

/// Text outside of any fenced block, joined with newlines.
pub fn prose_text(text: &str) -> String {
    let mut prose = Vec::new();
    let mut segments = parse_segments(text);
    for segment in segments.by_ref() {
        prose.push(segment.prose_before);
    }
    prose.push(&text[segments.pos.min(text.len())..]);
    prose.join("\n")
}

/// Render artifacts back into fenced blocks.
///
/// The fence is widened when the content itself contains a backtick run, so the
/// output always re-parses to the same artifacts.
pub fn render_fenced(artifacts: &[Artifact]) -> String {
    let mut out = String::new();
    for artifact in artifacts {
        let fence = "`".repeat(longest_backtick_run(&artifact.content).max(2) + 1);
        out.push_str(&fence);
        out.push_str(&artifact.language);
        out.push('\n');
        out.push_str(&artifact.content);
        out.push('\n');
        out.push_str(&fence);
        out.push_str("\n\n");
    }
    out
}

impl<'a> Iterator for Segments<'a> {
    type Item = Segment<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let prose_start = self.pos;
            let (open_start, open_end, fence) = find_opening(self.text, self.pos)?;
            let Some((body_end, close_end)) = find_closing(self.text, open_end, &fence) else {
                // Unterminated fence: nothing more can be produced.
                self.pos = self.text.len();
                return None;
            };
            self.pos = close_end;

            let content = trim_body(&self.text[open_end..body_end]);
            if content.trim().is_empty() {
                continue;
            }
            return Some(Segment {
                prose_before: &self.text[prose_start..open_start],
                artifact: Artifact::new(fence.language, content),
            });
        }
    }
}

impl Iterator for Artifacts<'_> {
    type Item = Artifact;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|segment| segment.artifact)
    }
}

#[derive(Debug, Clone)]
struct Fence {
    marker: char,
    len: usize,
    language: String,
}

/// Find the next opening fence at or after `from`.
///
/// Returns the byte offset of the fence line, the offset just past it, and the fence.
fn find_opening(text: &str, from: usize) -> Option<(usize, usize, Fence)> {
    let mut offset = from;
    while offset < text.len() {
        let line_end = next_line_end(text, offset);
        let line = text[offset..line_end].trim_end_matches(['\n', '\r']);
        if let Some(fence) = parse_opening(line) {
            return Some((offset, line_end, fence));
        }
        offset = line_end;
    }
    None
}

/// Find the closing fence for `fence` starting at `from`.
///
/// Returns the offset where the body ends and the offset just past the closing line.
fn find_closing(text: &str, from: usize, fence: &Fence) -> Option<(usize, usize)> {
    let mut offset = from;
    while offset < text.len() {
        let line_end = next_line_end(text, offset);
        let line = text[offset..line_end].trim_end_matches(['\n', '\r']);
        if is_closing(line, fence) {
            return Some((offset, line_end));
        }
        offset = line_end;
    }
    None
}

fn parse_opening(line: &str) -> Option<Fence> {
    let trimmed = line.trim_start();
    let marker = trimmed.chars().next()?;
    if marker != '`' && marker != '~' {
        return None;
    }
    let len = trimmed.chars().take_while(|c| *c == marker).count();
    if len < 3 {
        return None;
    }
    let info = trimmed[len..].trim();
    // A backtick fence's info string may not contain backticks (inline code).
    if marker == '`' && info.contains('`') {
        return None;
    }
    let language = info
        .split(|c: char| c.is_whitespace() || c == '{' || c == ',')
        .next()
        .unwrap_or("")
        .to_string();
    Some(Fence {
        marker,
        len,
        language,
    })
}

fn is_closing(line: &str, fence: &Fence) -> bool {
    let trimmed = line.trim();
    let run = trimmed.chars().take_while(|c| *c == fence.marker).count();
    run >= fence.len && run == trimmed.chars().count()
}

fn next_line_end(text: &str, offset: usize) -> usize {
    text[offset..]
        .find('\n')
        .map(|idx| offset + idx + 1)
        .unwrap_or(text.len())
}

fn trim_body(body: &str) -> String {
    body.strip_suffix('\n')
        .map(|b| b.strip_suffix('\r').unwrap_or(b))
        .unwrap_or(body)
        .to_string()
}

fn longest_backtick_run(content: &str) -> usize {
    let mut longest = 0;
    let mut current = 0;
    for c in content.chars() {
        if c == '`' {
            current += 1;
            longest = longest.max(current);
        } else {
            current = 0;
        }
    }
    longest
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_blocks_in_order_with_language() {
        let text = concat!(
            "Install it:\n```bash\nnpm install\n```\n",
            "Then create `index.js`:\n```javascript\nconsole.log(1);\n```\n",
        );
        let artifacts: Vec<Artifact> = parse_artifacts(text).collect();
        assert_eq!(
            artifacts,
            vec![
                Artifact::new("bash", "npm install"),
                Artifact::new("javascript", "console.log(1);"),
            ]
        );
    }

    #[test]
    fn drops_empty_blocks_and_unterminated_fences() {
        let text = "```js\n\n   \n```\n```sh\nls\n```\n```python\nprint('open')\n";
        let artifacts: Vec<Artifact> = parse_artifacts(text).collect();
        assert_eq!(artifacts, vec![Artifact::new("sh", "ls")]);
    }

    #[test]
    fn untagged_fence_has_empty_language() {
        let artifacts: Vec<Artifact> = parse_artifacts("```\necho hi\n```").collect();
        assert_eq!(artifacts, vec![Artifact::new("", "echo hi")]);
    }

    #[test]
    fn longer_fence_contains_shorter_one() {
        let text = "````markdown\n```bash\nls\n```\n````\n";
        let artifacts: Vec<Artifact> = parse_artifacts(text).collect();
        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].language, "markdown");
        assert_eq!(artifacts[0].content, "```bash\nls\n```");
    }

    #[test]
    fn iterator_is_restartable() {
        let text = "```sh\na\n```\n```sh\nb\n```\n";
        let parsed = parse_artifacts(text);
        let first: Vec<Artifact> = parsed.clone().collect();
        let second: Vec<Artifact> = parsed.collect();
        assert_eq!(first, second);
        assert_eq!(first.len(), 2);
    }

    #[test]
    fn segments_carry_preceding_prose() {
        let text = "Create `a.js`:\n```js\n1\n```\nand `b.js`:\n```js\n2\n```\ntrailing";
        let segments: Vec<Segment<'_>> = parse_segments(text).collect();
        assert_eq!(segments[0].prose_before, "Create `a.js`:\n");
        assert_eq!(segments[1].prose_before, "and `b.js`:\n");
        let prose = prose_text(text);
        assert!(prose.contains("trailing"));
        assert!(!prose.contains("```"));
    }

    #[test]
    fn render_then_parse_is_stable() {
        let inputs = [
            "```bash\nnpm install\n```\ntext\n```json\n{\"a\": 1}\n```",
            "intro\n~~~python\nprint('x')\n~~~\n```\nuntagged\n  indented\n```",
            "````md\n```js\ninner\n```\n````",
        ];
        for input in inputs {
            let first: Vec<Artifact> = parse_artifacts(input).collect();
            let rendered = render_fenced(&first);
            let second: Vec<Artifact> = parse_artifacts(&rendered).collect();
            assert_eq!(first, second, "round trip failed for {input:?}");
        }
    }

    #[test]
    fn handles_crlf_line_endings() {
        let artifacts: Vec<Artifact> = parse_artifacts("```sh\r\nls\r\n```\r\n").collect();
        assert_eq!(artifacts, vec![Artifact::new("sh", "ls")]);
    }
}
