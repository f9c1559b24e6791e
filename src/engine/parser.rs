//! Line parser for hosted block lists.
//!
//! Two formats are understood, and may be mixed in one document:
//!
//! * hosts-file lines, `0.0.0.0 ads.example.com` or `127.0.0.1 ads.example.com`
//! * plain domain lists, one domain per line
//!
//! Blank lines and `#` comments are ignored. Any other shape is dropped and
//! counted, including lines whose first field is not a null-route address
//! (`10.0.0.1 host`, `ads.example.com CNAME x`). Whether those should be
//! salvaged is an open product question, so they stay dropped.
//! No DNS syntax check happens here: a bare `1.2.3.4` is passed through as a
//! "domain".

const NULL_ROUTES: [&str; 2] = ["0.0.0.0", "127.0.0.1"];

/// Classification of a single input line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Line {
    Domain(String),
    /// Blank line or comment.
    Ignored,
    /// A line with an unsupported shape.
    Dropped,
}

pub fn parse_line(line: &str) -> Line {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return Line::Ignored;
    }

    let mut fields = line.split_whitespace();
    match (fields.next(), fields.next()) {
        (Some(domain), None) => Line::Domain(domain.to_lowercase()),
        (Some(addr), Some(domain)) if NULL_ROUTES.contains(&addr) => {
            Line::Domain(domain.to_lowercase())
        }
        _ => Line::Dropped,
    }
}

/// Lazily classifies each line of `text`. Re-invoke on the same text to restart.
pub fn parse_lines(text: &str) -> impl Iterator<Item = Line> + '_ {
    text.lines().map(parse_line)
}

/// Parsed domains of one document plus counts of what was discarded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedList {
    pub domains: Vec<String>,
    pub ignored: usize,
    pub dropped: usize,
}

/// Drains `parse_lines` into domains plus discard counts.
pub fn parse_list(text: &str) -> ParsedList {
    let mut parsed = ParsedList::default();
    for line in parse_lines(text) {
        match line {
            Line::Domain(domain) => parsed.domains.push(domain),
            Line::Ignored => parsed.ignored += 1,
            Line::Dropped => parsed.dropped += 1,
        }
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hosts_line() {
        assert_eq!(
            parse_line("0.0.0.0 ads.example.com"),
            Line::Domain("ads.example.com".to_string())
        );
        assert_eq!(
            parse_line("  127.0.0.1\tTracker.Example.org  "),
            Line::Domain("tracker.example.org".to_string())
        );
        // trailing annotations are tolerated
        assert_eq!(
            parse_line("0.0.0.0 ads.example.com # ad server"),
            Line::Domain("ads.example.com".to_string())
        );
    }

    #[test]
    fn test_parse_plain_line() {
        assert_eq!(
            parse_line("tracker.example.net"),
            Line::Domain("tracker.example.net".to_string())
        );
        assert_eq!(parse_line("1.2.3.4"), Line::Domain("1.2.3.4".to_string()));
    }

    #[test]
    fn test_comments_and_blanks_are_ignored() {
        for line in ["", "   ", "\t", "# comment", "   # indented comment", "#0.0.0.0 x.com"] {
            assert_eq!(parse_line(line), Line::Ignored, "line {:?}", line);
        }
    }

    #[test]
    fn test_unsupported_shapes_are_dropped() {
        for line in [
            "10.0.0.1 intranet.example.com",
            "ads.example.com CNAME sink.example.com",
            "::1 localhost",
        ] {
            assert_eq!(parse_line(line), Line::Dropped, "line {:?}", line);
        }
    }

    #[test]
    fn test_parse_list_counts_discards() {
        let content = "
        # Title: mixed list
        0.0.0.0 ads.example.com
        127.0.0.1 metrics.example.com
        tracker.example.net

        192.168.1.1 router.lan
        ";

        let parsed = parse_list(content);
        assert_eq!(
            parsed.domains,
            vec!["ads.example.com", "metrics.example.com", "tracker.example.net"]
        );
        assert_eq!(parsed.dropped, 1);
        // leading/trailing blank lines, the comment and the inner blank line
        assert_eq!(parsed.ignored, 4);
    }

    #[test]
    fn test_line_iterator_is_lazy_and_restartable() {
        let content = "a.com\n# skip\n0.0.0.0 b.com\n";
        let mut lines = parse_lines(content);
        assert_eq!(lines.next(), Some(Line::Domain("a.com".to_string())));

        let all: Vec<_> = parse_lines(content).collect();
        assert_eq!(
            all,
            vec![
                Line::Domain("a.com".to_string()),
                Line::Ignored,
                Line::Domain("b.com".to_string()),
            ]
        );
        assert_eq!(parse_lines(content).collect::<Vec<_>>(), all);
    }

    #[test]
    fn test_duplicates_are_kept() {
        let parsed = parse_list("a.com\na.com\n");
        assert_eq!(parsed.domains.len(), 2);
    }
}
