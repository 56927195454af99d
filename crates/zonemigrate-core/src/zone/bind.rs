//! BIND master-file dialect
//!
//! Handles `$ORIGIN`, quote-aware tokenizing and `;` comments, optional TTL
//! and class fields, owner inheritance for indented lines, and skips
//! parenthesized multi-line records (in practice the SOA). NS records at the
//! apex are dropped.

use super::{DEFAULT_TTL, infer_origin};
use crate::record::{APEX, CanonicalRecord, RecordType, absolutize, normalize_name, relativize};
use tracing::debug;

/// Record line before owner names are made relative
struct RawEntry {
    owner: String,
    line_origin: Option<String>,
    record_type: RecordType,
    ttl: u32,
    value: String,
}

/// Parse BIND-style text into `(origin, records)`
pub(crate) fn parse(text: &str, default_origin: Option<&str>) -> (String, Vec<CanonicalRecord>) {
    let mut entries = Vec::new();
    let mut declared_origin: Option<String> = None;
    let mut line_origin: Option<String> = default_origin.map(str::to_string);
    let mut soa_owner: Option<String> = None;
    let mut last_owner: Option<String> = None;
    let mut depth: i32 = 0;

    for (idx, raw_line) in text.lines().enumerate() {
        let line = strip_comment(raw_line);

        if depth > 0 {
            depth = (depth + paren_delta(line)).max(0);
            continue;
        }

        if line.trim().is_empty() {
            continue;
        }

        let tokens = tokenize(line);
        let Some(first) = tokens.first() else {
            continue;
        };

        if first.starts_with('$') {
            if first.eq_ignore_ascii_case("$ORIGIN")
                && let Some(origin) = tokens.get(1)
            {
                let origin = normalize_name(origin);
                declared_origin.get_or_insert_with(|| origin.clone());
                line_origin = Some(origin);
            }
            continue;
        }

        let inherits_owner = raw_line.starts_with([' ', '\t']);
        let owner = if inherits_owner {
            last_owner.clone()
        } else {
            Some(first.clone())
        };
        let fields = if inherits_owner { &tokens[..] } else { &tokens[1..] };

        let delta = paren_delta(line);
        if delta > 0 {
            // Multi-line record; only the owner of an SOA is of interest.
            depth = delta;
            if let Some(owner) = &owner {
                if fields.iter().any(|t| t.eq_ignore_ascii_case("SOA")) && owner.ends_with('.') {
                    soa_owner.get_or_insert_with(|| owner.clone());
                }
                last_owner = Some(owner.clone());
            }
            continue;
        }

        let Some(owner) = owner else {
            debug!("Line {}: indented record without a previous owner, skipping", idx + 1);
            continue;
        };
        last_owner = Some(owner.clone());

        match parse_fields(fields) {
            Some((record_type, ttl, value)) => {
                if record_type == RecordType::Soa && owner.ends_with('.') {
                    soa_owner.get_or_insert_with(|| owner.clone());
                }
                entries.push(RawEntry {
                    owner,
                    line_origin: line_origin.clone(),
                    record_type,
                    ttl: ttl.unwrap_or(DEFAULT_TTL),
                    value,
                });
            }
            None => debug!("Line {}: not a supported record, skipping", idx + 1),
        }
    }

    let origin = declared_origin
        .or_else(|| default_origin.map(str::to_string))
        .or(soa_owner.map(|o| normalize_name(&o)))
        .or_else(|| {
            entries
                .iter()
                .find(|e| e.owner.ends_with('.'))
                .and_then(|e| infer_origin(&e.owner))
        })
        .unwrap_or_default();

    let records = entries
        .into_iter()
        .filter_map(|entry| {
            let name = resolve_owner(&entry.owner, entry.line_origin.as_deref(), &origin);
            if entry.record_type == RecordType::Ns && name == APEX {
                return None;
            }
            Some(CanonicalRecord::new(
                name,
                entry.record_type,
                entry.ttl,
                entry.value,
            ))
        })
        .collect();

    (origin, records)
}

/// Split the fields after the owner into `(type, ttl, value)`
///
/// TTL and class are both optional and may come in either order.
fn parse_fields(fields: &[String]) -> Option<(RecordType, Option<u32>, String)> {
    let mut ttl = None;
    let mut idx = 0;

    while idx < fields.len() && idx < 2 {
        let token = &fields[idx];
        if ttl.is_none()
            && let Some(parsed) = parse_ttl(token)
        {
            ttl = Some(parsed);
            idx += 1;
        } else if is_class(token) {
            idx += 1;
        } else {
            break;
        }
    }

    let record_type: RecordType = fields.get(idx)?.parse().ok()?;
    let value = fields[idx + 1..]
        .iter()
        .map(|t| t.trim_matches(|c| c == '(' || c == ')'))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    if value.is_empty() {
        return None;
    }
    Some((record_type, ttl, value))
}

fn resolve_owner(owner: &str, line_origin: Option<&str>, zone_origin: &str) -> String {
    if owner == APEX {
        return match line_origin {
            Some(origin) => relativize(origin, zone_origin),
            None => APEX.to_string(),
        };
    }
    if owner.ends_with('.') {
        return relativize(owner, zone_origin);
    }
    match line_origin {
        Some(origin) => relativize(&absolutize(owner, origin), zone_origin),
        None => normalize_name(owner),
    }
}

fn is_class(token: &str) -> bool {
    ["IN", "CH", "HS", "CS"]
        .iter()
        .any(|c| token.eq_ignore_ascii_case(c))
}

/// Parse a TTL, accepting a single unit suffix (s, m, h, d, w)
pub(crate) fn parse_ttl(token: &str) -> Option<u32> {
    if token.is_empty() {
        return None;
    }
    if token.bytes().all(|b| b.is_ascii_digit()) {
        return token.parse().ok();
    }

    let (number, unit) = token.split_at(token.len() - 1);
    if number.is_empty() || !number.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let multiplier = match unit.to_ascii_lowercase().as_str() {
        "s" => 1,
        "m" => 60,
        "h" => 3600,
        "d" => 86_400,
        "w" => 604_800,
        _ => return None,
    };
    number.parse::<u32>().ok()?.checked_mul(multiplier)
}

/// Truncate a line at the first `;` outside a quoted string
pub(crate) fn strip_comment(line: &str) -> &str {
    let mut in_quotes = false;
    let mut escaped = false;
    for (i, c) in line.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            ';' if !in_quotes => return &line[..i],
            _ => {}
        }
    }
    line
}

/// Net parenthesis depth change of a line, ignoring quoted text
fn paren_delta(line: &str) -> i32 {
    let mut in_quotes = false;
    let mut escaped = false;
    let mut delta = 0;
    for c in line.chars() {
        match c {
            _ if escaped => escaped = false,
            '\\' => escaped = true,
            '"' => in_quotes = !in_quotes,
            '(' if !in_quotes => delta += 1,
            ')' if !in_quotes => delta -= 1,
            _ => {}
        }
    }
    delta
}

/// Whitespace tokenizer that keeps quoted spans (quotes included) together
pub(crate) fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut escaped = false;

    for c in line.chars() {
        if escaped {
            current.push(c);
            escaped = false;
            continue;
        }
        match c {
            '\\' => {
                current.push(c);
                escaped = true;
            }
            '"' => {
                current.push(c);
                in_quotes = !in_quotes;
            }
            c if c.is_whitespace() && !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse_text(text: &str) -> (String, Vec<CanonicalRecord>) {
        parse(text, None)
    }

    #[test]
    fn test_tokenize_quotes() {
        let tokens = tokenize(r#"@ 300 IN TXT "v=spf1 include:_spf.example.com ~all""#);
        assert_eq!(tokens.len(), 5);
        assert_eq!(tokens[4], r#""v=spf1 include:_spf.example.com ~all""#);
    }

    #[test]
    fn test_strip_comment_outside_quotes() {
        assert_eq!(strip_comment("www 300 IN A 1.2.3.4 ; web"), "www 300 IN A 1.2.3.4 ");
        assert_eq!(strip_comment(r#"@ TXT "a;b" ; c"#), r#"@ TXT "a;b" "#);
    }

    #[test]
    fn test_parse_ttl_units() {
        assert_eq!(parse_ttl("300"), Some(300));
        assert_eq!(parse_ttl("1h"), Some(3600));
        assert_eq!(parse_ttl("2D"), Some(172_800));
        assert_eq!(parse_ttl("IN"), None);
        assert_eq!(parse_ttl("h"), None);
    }

    #[test]
    fn test_multiline_soa_skipped() {
        let text = "\
$ORIGIN example.com.
@ 3600 IN SOA ns1.example.com. admin.example.com. (
        2024010101 ; serial
        7200       ; refresh
        3600 )
@ 3600 IN NS ns1.example.com.
www 300 IN A 192.0.2.10
";
        let (origin, records) = parse_text(text);
        assert_eq!(origin, "example.com");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "www");
        assert_eq!(records[0].value, "192.0.2.10");
    }

    #[test]
    fn test_root_ns_dropped_sub_ns_kept() {
        let text = "\
$ORIGIN example.com.
example.com. 86400 IN NS ns1.dns.net.
dev 86400 IN NS ns1.other.net.
";
        let (_, records) = parse_text(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].name, "dev");
        assert_eq!(records[0].record_type, RecordType::Ns);
    }

    #[test]
    fn test_optional_ttl_and_class() {
        let text = "\
$ORIGIN example.com.
a IN A 10.0.0.1
b 60 A 10.0.0.2
c IN 120 A 10.0.0.3
";
        let (_, records) = parse_text(text);
        assert_eq!(records.len(), 3);
        assert_eq!(records[0].ttl, DEFAULT_TTL);
        assert_eq!(records[1].ttl, 60);
        assert_eq!(records[2].ttl, 120);
    }

    #[test]
    fn test_owner_inheritance() {
        let text = "\
$ORIGIN example.com.
www 300 IN A 10.0.0.1
    300 IN A 10.0.0.2
";
        let (_, records) = parse_text(text);
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.name == "www"));
    }

    #[test]
    fn test_fqdn_names_relativized_and_origin_inferred() {
        let text = "\
www.example.net. 300 IN A 10.0.0.1
example.net. 300 IN MX 10 mail.example.net.
";
        let (origin, records) = parse_text(text);
        assert_eq!(origin, "example.net");
        assert_eq!(records[0].name, "www");
        assert_eq!(records[1].name, "@");
        assert_eq!(records[1].value, "10 mail.example.net.");
    }

    #[test]
    fn test_nested_origin() {
        let text = "\
$ORIGIN example.com.
www 300 IN A 10.0.0.1
$ORIGIN lab.example.com.
db 300 IN A 10.0.1.1
@ 300 IN A 10.0.1.2
";
        let (origin, records) = parse_text(text);
        assert_eq!(origin, "example.com");
        let names: Vec<&str> = records.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["www", "db.lab", "lab"]);
    }

    #[test]
    fn test_malformed_and_unsupported_lines_skipped() {
        let text = "\
$ORIGIN example.com.
$TTL 3600
garbage
host 300 IN PTR something.
mail 300 IN MX
ok 300 IN AAAA 2001:db8::1
";
        let (_, records) = parse_text(text);
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].record_type, RecordType::Aaaa);
    }

    #[test]
    fn test_txt_keeps_quotes_and_multiple_strings() {
        let text = r#"$ORIGIN example.com.
@ 300 IN TXT "part one" "part two"
"#;
        let (_, records) = parse_text(text);
        assert_eq!(records[0].value, r#""part one" "part two""#);
    }

    #[test]
    fn test_single_line_soa_sets_origin() {
        let text = "example.org. 3600 IN SOA ns.example.org. host.example.org. ( 1 2 3 4 5 )\nwww.example.org. 60 IN A 10.1.1.1\n";
        let (origin, records) = parse_text(text);
        assert_eq!(origin, "example.org");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].record_type, RecordType::Soa);
        assert!(!records[0].is_migratable());
    }
}
