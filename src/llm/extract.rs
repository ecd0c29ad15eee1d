//! Payload extraction from free-text model output.
//!
//! Models wrap their answers in prose, markdown fences, and trailing
//! commentary even when told not to. Each pipeline stage has exactly one
//! extraction function here with a defined fallback chain; when nothing
//! matches, the caller reports `UnparsableResponse` rather than guessing.

/// Extract a single SQL statement from model output.
///
/// Preference order: a fenced ```sql block, any fenced block that starts
/// with SELECT/WITH, then a raw scan for the first SELECT/WITH line through
/// the end of the statement. The trailing semicolon is dropped so repeated
/// validation of the same statement compares equal.
pub fn extract_sql(text: &str) -> Option<String> {
    if let Some(block) = fenced_blocks(text)
        .into_iter()
        .find(|b| starts_with_query_keyword(b))
    {
        return Some(normalize_sql(&block));
    }

    // Raw scan: first SELECT/WITH line through ';' or a blank line.
    let mut lines = Vec::new();
    let mut in_sql = false;
    for line in text.lines() {
        let trimmed = line.trim();
        if !in_sql {
            if starts_with_query_keyword(trimmed) {
                in_sql = true;
            } else {
                continue;
            }
        } else if trimmed.is_empty() {
            break;
        }
        if let Some(pos) = trimmed.find(';') {
            lines.push(&trimmed[..=pos]);
            break;
        }
        lines.push(trimmed);
    }

    if lines.is_empty() {
        return None;
    }
    Some(normalize_sql(&lines.join("\n")))
}

/// Extract the table list from the schema-selection stage output.
///
/// Preference order: the first JSON string array found in the text, then
/// bullet lines (`- name` / `* name`). Names are unquoted and lowercased.
pub fn extract_table_list(text: &str) -> Option<Vec<String>> {
    if let Some(start) = text.find('[') {
        if let Some(end_rel) = text[start..].find(']') {
            let candidate = &text[start..start + end_rel + 1];
            if let Ok(names) = serde_json::from_str::<Vec<String>>(candidate) {
                let cleaned = clean_names(names);
                if !cleaned.is_empty() {
                    return Some(cleaned);
                }
            }
        }
    }

    let bullets: Vec<String> = text
        .lines()
        .filter_map(|line| {
            let trimmed = line.trim();
            trimmed
                .strip_prefix("- ")
                .or_else(|| trimmed.strip_prefix("* "))
                .map(|rest| {
                    rest.split_whitespace()
                        .next()
                        .unwrap_or(rest)
                        .to_string()
                })
        })
        .collect();

    let cleaned = clean_names(bullets);
    if cleaned.is_empty() { None } else { Some(cleaned) }
}

/// Extract the validation stage payload: the (possibly corrected) SQL and
/// the rationale text around it.
pub fn extract_validation(text: &str) -> Option<(String, String)> {
    let sql = extract_sql(text)?;

    // Rationale: everything outside fenced blocks, collapsed.
    let mut notes = String::new();
    let mut in_fence = false;
    for line in text.lines() {
        if line.trim_start().starts_with("```") {
            in_fence = !in_fence;
            continue;
        }
        if in_fence {
            continue;
        }
        let trimmed = line.trim();
        if trimmed.is_empty() || starts_with_query_keyword(trimmed) {
            continue;
        }
        if !notes.is_empty() {
            notes.push(' ');
        }
        notes.push_str(trimmed);
    }

    if notes.is_empty() {
        notes.push_str("Validated without changes.");
    }

    Some((sql, notes))
}

/// Contents of all fenced code blocks, language tags stripped.
fn fenced_blocks(text: &str) -> Vec<String> {
    let mut blocks = Vec::new();
    let mut rest = text;
    while let Some(start) = rest.find("```") {
        let after = &rest[start + 3..];
        let Some(end) = after.find("```") else { break };
        let mut block = &after[..end];
        // Drop a leading language tag line like "sql"
        if let Some(newline) = block.find('\n') {
            let first = block[..newline].trim();
            if !first.is_empty() && first.chars().all(|c| c.is_ascii_alphanumeric()) {
                block = &block[newline + 1..];
            }
        }
        blocks.push(block.trim().to_string());
        rest = &after[end + 3..];
    }
    blocks
}

fn starts_with_query_keyword(s: &str) -> bool {
    let upper = s.trim_start().to_uppercase();
    upper.starts_with("SELECT") || upper.starts_with("WITH")
}

fn normalize_sql(sql: &str) -> String {
    sql.trim().trim_end_matches(';').trim_end().to_string()
}

fn clean_names(names: Vec<String>) -> Vec<String> {
    names
        .into_iter()
        .map(|n| {
            let unquoted = n
                .trim()
                .trim_matches(|c| c == '"' || c == '\'' || c == '`' || c == ',')
                .to_lowercase();
            // "public.catchments" and "catchments" name the same table
            unquoted
                .rsplit('.')
                .next()
                .unwrap_or(&unquoted)
                .to_string()
        })
        .filter(|n| {
            !n.is_empty() && n.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        })
        .collect()
}
