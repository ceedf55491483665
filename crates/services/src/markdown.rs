//! Minimal markdown → HTML rendering for the `html_content` response field.
//!
//! Covers what generated minutes actually use: ATX headings, paragraphs with
//! hard line breaks, unordered/ordered lists, pipe tables, bold/italic and
//! inline code.

/// Renders markdown to HTML. Input is trusted LLM output; text nodes are
/// still entity-escaped so stray angle brackets cannot break the page.
pub fn render_html(markdown: &str) -> String {
    let mut html = String::with_capacity(markdown.len() * 2);
    let lines: Vec<&str> = markdown.lines().collect();
    let mut i = 0;

    while i < lines.len() {
        let line = lines[i].trim_end();

        if line.trim().is_empty() {
            i += 1;
            continue;
        }

        if let Some((level, text)) = parse_heading(line) {
            html.push_str(&format!("<h{}>{}</h{}>\n", level, inline(text), level));
            i += 1;
            continue;
        }

        if is_table_row(line) && i + 1 < lines.len() && is_table_separator(lines[i + 1]) {
            i = render_table(&lines, i, &mut html);
            continue;
        }

        if is_list_item(line) {
            i = render_list(&lines, i, &mut html);
            continue;
        }

        // Paragraph: consecutive non-empty, non-structural lines with <br>
        // between them (nl2br behavior).
        let mut parts = Vec::new();
        while i < lines.len() {
            let current = lines[i].trim_end();
            if current.trim().is_empty()
                || parse_heading(current).is_some()
                || is_list_item(current)
                || is_table_row(current)
            {
                break;
            }
            parts.push(inline(current.trim()));
            i += 1;
        }
        html.push_str(&format!("<p>{}</p>\n", parts.join("<br>")));
    }

    html
}

fn parse_heading(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let level = trimmed.chars().take_while(|c| *c == '#').count();
    if level == 0 || level > 6 {
        return None;
    }
    let rest = &trimmed[level..];
    rest.strip_prefix(' ').map(|text| (level, text.trim()))
}

fn is_list_item(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("- ")
        || trimmed.starts_with("* ")
        || ordered_item_text(trimmed).is_some()
}

fn ordered_item_text(trimmed: &str) -> Option<&str> {
    let digits = trimmed.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    trimmed[digits..]
        .strip_prefix(". ")
        .or_else(|| trimmed[digits..].strip_prefix(".\t"))
}

fn render_list(lines: &[&str], mut i: usize, html: &mut String) -> usize {
    let ordered = ordered_item_text(lines[i].trim_start()).is_some();
    let tag = if ordered { "ol" } else { "ul" };
    html.push_str(&format!("<{}>\n", tag));
    while i < lines.len() && is_list_item(lines[i]) {
        let trimmed = lines[i].trim_start();
        let text = ordered_item_text(trimmed)
            .or_else(|| trimmed.strip_prefix("- "))
            .or_else(|| trimmed.strip_prefix("* "))
            .unwrap_or(trimmed);
        html.push_str(&format!("<li>{}</li>\n", inline(text.trim())));
        i += 1;
    }
    html.push_str(&format!("</{}>\n", tag));
    i
}

fn is_table_row(line: &str) -> bool {
    let trimmed = line.trim();
    trimmed.starts_with('|') && trimmed.len() > 1
}

fn is_table_separator(line: &str) -> bool {
    let trimmed = line.trim();
    is_table_row(trimmed)
        && trimmed
            .chars()
            .all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

fn table_cells(line: &str) -> Vec<String> {
    line.trim()
        .trim_matches('|')
        .split('|')
        .map(|cell| inline(cell.trim()))
        .collect()
}

fn render_table(lines: &[&str], mut i: usize, html: &mut String) -> usize {
    html.push_str("<table>\n<thead>\n<tr>");
    for cell in table_cells(lines[i]) {
        html.push_str(&format!("<th>{}</th>", cell));
    }
    html.push_str("</tr>\n</thead>\n<tbody>\n");
    i += 2; // skip header and separator

    while i < lines.len() && is_table_row(lines[i]) {
        html.push_str("<tr>");
        for cell in table_cells(lines[i]) {
            html.push_str(&format!("<td>{}</td>", cell));
        }
        html.push_str("</tr>\n");
        i += 1;
    }
    html.push_str("</tbody>\n</table>\n");
    i
}

/// Escapes entities, then applies `**bold**`, `*italic*`, and `` `code` ``.
fn inline(text: &str) -> String {
    let escaped = text
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;");

    let with_code = replace_pairs(&escaped, "`", "<code>", "</code>");
    let with_bold = replace_pairs(&with_code, "**", "<strong>", "</strong>");
    replace_pairs(&with_bold, "*", "<em>", "</em>")
}

fn replace_pairs(text: &str, delim: &str, open: &str, close: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    loop {
        let Some(start) = rest.find(delim) else {
            out.push_str(rest);
            return out;
        };
        let after = &rest[start + delim.len()..];
        let Some(end) = after.find(delim) else {
            out.push_str(rest);
            return out;
        };
        out.push_str(&rest[..start]);
        out.push_str(open);
        out.push_str(&after[..end]);
        out.push_str(close);
        rest = &after[end + delim.len()..];
    }
}
