/// Largest string a single xlsx cell will hold.
pub const MAX_CELL_CHARS: usize = 32_767;

const BLOCK_TAGS: &[&str] = &["br", "p", "div", "li", "tr", "h1", "h2", "h3", "h4", "h5", "h6"];

/// Flatten the HTML that Azure DevOps stores in rich-text fields into plain text.
///
/// Tags are dropped, block-level tags become line breaks, the common entities
/// are decoded and runs of whitespace collapse to a single space per line.
/// Returns `None` when nothing readable is left.
pub fn flatten_html(html: &str) -> Option<String> {
    let mut text = String::with_capacity(html.len());
    let mut chars = html.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            '<' => {
                let mut tag = String::new();
                for t in chars.by_ref() {
                    if t == '>' {
                        break;
                    }
                    tag.push(t);
                }
                if BLOCK_TAGS.contains(&tag_name(&tag).as_str()) {
                    text.push('\n');
                }
            }
            '&' => {
                let mut entity = String::new();
                while let Some(&e) = chars.peek() {
                    if !(e.is_ascii_alphanumeric() || e == '#') || entity.len() > 8 {
                        break;
                    }
                    entity.push(e);
                    chars.next();
                }
                if chars.peek() == Some(&';') {
                    chars.next();
                    match decode_entity(&entity) {
                        Some(decoded) => text.push(decoded),
                        None => {
                            text.push('&');
                            text.push_str(&entity);
                            text.push(';');
                        }
                    }
                } else {
                    text.push('&');
                    text.push_str(&entity);
                }
            }
            _ => text.push(c),
        }
    }

    let lines: Vec<String> = text
        .lines()
        .map(|line| line.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|line| !line.is_empty())
        .collect();

    if lines.is_empty() {
        None
    } else {
        Some(truncate_chars(&lines.join("\n"), MAX_CELL_CHARS))
    }
}

pub fn truncate_chars(text: &str, max: usize) -> String {
    text.chars().take(max).collect()
}

fn tag_name(tag: &str) -> String {
    tag.trim_start_matches('/')
        .split(|c: char| c.is_whitespace() || c == '/')
        .next()
        .unwrap_or_default()
        .to_ascii_lowercase()
}

fn decode_entity(entity: &str) -> Option<char> {
    match entity {
        "amp" => Some('&'),
        "lt" => Some('<'),
        "gt" => Some('>'),
        "quot" => Some('"'),
        "apos" => Some('\''),
        "nbsp" => Some(' '),
        _ => {
            let code = if let Some(hex) = entity.strip_prefix("#x").or(entity.strip_prefix("#X")) {
                u32::from_str_radix(hex, 16).ok()?
            } else {
                entity.strip_prefix('#')?.parse().ok()?
            };
            char::from_u32(code)
        }
    }
}
