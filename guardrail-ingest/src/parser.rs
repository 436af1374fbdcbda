//! Markdown rule parser (§4.4). A rule block starts with a header line
//! `## PREVENT-<n>: <name>` and is followed by `**<key>:** <value>` metadata
//! lines until the next header or end of input. Unknown keys are ignored;
//! recognised keys are `Pattern`, `Message`, `Severity`, `Category`.

use std::sync::LazyLock;

use guardrail_commons::stable_hash;
use regex::Regex;

static HEADER_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^##\s+(PREVENT-\d+):\s*(.+?)\s*$").expect("header pattern is valid"));

static METADATA_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\*\*([^*:]+):\*\*\s*(.*)$").expect("metadata pattern is valid")
});

static BACKTICK_TOKEN_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"`([^`]*)`").expect("backtick token pattern is valid"));

/// One `## PREVENT-<n>: <name>` block parsed out of a markdown source,
/// before validation/defaulting is applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRuleBlock {
    pub short_id: String,
    pub name: String,
    pub pattern: Option<String>,
    pub message: Option<String>,
    pub severity_raw: Option<String>,
    pub category_raw: Option<String>,
    /// Stable hash of the full block text, used for change detection (§4.4).
    pub block_hash: String,
}

/// Parse every rule block out of `source`. Blocks with no recognised header
/// are not rule blocks and are skipped (markdown may carry prose between
/// rules).
pub fn parse_blocks(source: &str) -> Vec<ParsedRuleBlock> {
    let lines: Vec<&str> = source.lines().collect();
    let mut blocks = Vec::new();

    let mut i = 0;
    while i < lines.len() {
        let Some(header) = HEADER_REGEX.captures(lines[i]) else {
            i += 1;
            continue;
        };

        let short_id = header[1].to_string();
        let name = header[2].to_string();
        let block_start = i;
        i += 1;

        let mut pattern = None;
        let mut message = None;
        let mut severity_raw = None;
        let mut category_raw = None;

        while i < lines.len() && !HEADER_REGEX.is_match(lines[i]) {
            if let Some(meta) = METADATA_REGEX.captures(lines[i]) {
                let key = meta[1].trim().to_ascii_lowercase();
                let value = meta[2].trim().to_string();
                match key.as_str() {
                    "pattern" => {
                        pattern = BACKTICK_TOKEN_REGEX
                            .captures(&value)
                            .map(|c| c[1].to_string())
                            .or(Some(value));
                    }
                    "message" => message = Some(value),
                    "severity" => severity_raw = Some(value),
                    "category" => category_raw = Some(value),
                    _ => {}
                }
            }
            i += 1;
        }

        let block_text = lines[block_start..i].join("\n");
        blocks.push(ParsedRuleBlock {
            short_id,
            name,
            pattern,
            message,
            severity_raw,
            category_raw,
            block_hash: stable_hash(&block_text),
        });
    }

    blocks
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
## PREVENT-001: No Force Push

**Pattern:** `git\\s+push\\s+--force`
**Message:** Force pushing is not allowed on this project.
**Severity:** error
**Category:** git

Some prose that is not metadata.

## PREVENT-002: Avoid eval

**Pattern:** `\\beval\\(`
**Message:** Avoid eval().
**Severity:** warning
**Category:** bash
";

    #[test]
    fn parses_both_blocks() {
        let blocks = parse_blocks(SAMPLE);
        assert_eq!(blocks.len(), 2);
        assert_eq!(blocks[0].short_id, "PREVENT-001");
        assert_eq!(blocks[0].name, "No Force Push");
        assert_eq!(blocks[0].pattern.as_deref(), Some(r"git\s+push\s+--force"));
        assert_eq!(blocks[0].severity_raw.as_deref(), Some("error"));
        assert_eq!(blocks[1].short_id, "PREVENT-002");
    }

    #[test]
    fn ignores_unknown_metadata_keys() {
        let source = "\
## PREVENT-003: Sample

**Pattern:** `foo`
**Owner:** someone
**Message:** msg
**Severity:** warning
**Category:** bash
";
        let blocks = parse_blocks(source);
        assert_eq!(blocks.len(), 1);
        assert_eq!(blocks[0].pattern.as_deref(), Some("foo"));
    }

    #[test]
    fn identical_blocks_hash_identically() {
        let blocks_a = parse_blocks(SAMPLE);
        let blocks_b = parse_blocks(SAMPLE);
        assert_eq!(blocks_a[0].block_hash, blocks_b[0].block_hash);
    }

    #[test]
    fn prose_outside_headers_is_not_a_block() {
        let blocks = parse_blocks("Just some prose.\n\nNo headers here.\n");
        assert!(blocks.is_empty());
    }

    #[test]
    fn pattern_without_backticks_falls_back_to_raw_value() {
        let source = "\
## PREVENT-004: Sample

**Pattern:** bare-pattern-no-backticks
**Message:** msg
**Severity:** warning
**Category:** bash
";
        let blocks = parse_blocks(source);
        assert_eq!(blocks[0].pattern.as_deref(), Some("bare-pattern-no-backticks"));
    }
}
