//! Low-level HTML helpers: block scanning, text flattening, entity decoding.
//!
//! This is not a general HTML parser. It understands just enough markup to
//! cut a listing page into cards and to turn each card into the lines a
//! browser would render.

use regex::Regex;

use crate::Result;

// ─── Patterns ────────────────────────────────────────────────────────────────

/// Compiled patterns shared by every page parse.
pub(crate) struct Patterns {
  li_tag:       Regex,
  class_attr:   Regex,
  invisible:    Regex,
  line_break:   Regex,
  any_tag:      Regex,
  img_tag:      Regex,
  anchor_tag:   Regex,
  src_attr:     Regex,
  href_attr:    Regex,
}

impl Patterns {
  pub(crate) fn new() -> Result<Self> {
    Ok(Self {
      li_tag:     Regex::new(r"(?i)<(/?)li\b([^>]*)>")?,
      class_attr: Regex::new(r#"(?i)\bclass\s*=\s*["']([^"']*)["']"#)?,
      invisible:  Regex::new(r"(?is)<(script|style|noscript)\b.*?</(script|style|noscript)\s*>")?,
      line_break: Regex::new(
        r"(?i)</?(br|p|div|h[1-6]|li|ul|ol|dl|dt|dd|tr|header|footer|section|article|figure|figcaption|hr)\b[^>]*>",
      )?,
      any_tag:    Regex::new(r"(?s)<[^>]*>")?,
      img_tag:    Regex::new(r"(?i)<img\b([^>]*)>")?,
      anchor_tag: Regex::new(r"(?i)<a\b([^>]*)>")?,
      src_attr:   Regex::new(r#"(?i)\bsrc\s*=\s*["']([^"']*)["']"#)?,
      href_attr:  Regex::new(r#"(?i)\bhref\s*=\s*["']([^"']*)["']"#)?,
    })
  }

  /// Byte ranges of every `<li>` element carrying `class_token`, including
  /// nested list items in the range of their parent card.
  pub(crate) fn blocks_with_class(
    &self,
    html: &str,
    class_token: &str,
  ) -> Vec<(usize, usize)> {
    let mut blocks = Vec::new();
    let mut pos = 0;

    while let Some(open) = self.li_tag.captures_at(html, pos) {
      let whole = open.get(0).map_or(pos..pos, |m| m.range());
      pos = whole.end;

      let is_close = open.get(1).is_some_and(|m| !m.as_str().is_empty());
      let attrs = open.get(2).map_or("", |m| m.as_str());
      if is_close || !self.has_class(attrs, class_token) {
        continue;
      }

      let end = self.matching_li_end(html, whole.end);
      blocks.push((whole.start, end));
      pos = end;
    }

    blocks
  }

  /// Offset just past the `</li>` closing the element opened before `from`,
  /// or the end of input when unclosed.
  fn matching_li_end(&self, html: &str, from: usize) -> usize {
    let mut depth = 1usize;
    for cap in self.li_tag.captures_iter(&html[from..]) {
      let Some(m) = cap.get(0) else { continue };
      if cap.get(1).is_some_and(|c| !c.as_str().is_empty()) {
        depth -= 1;
        if depth == 0 {
          return from + m.end();
        }
      } else {
        depth += 1;
      }
    }
    html.len()
  }

  fn has_class(&self, attrs: &str, token: &str) -> bool {
    self
      .class_attr
      .captures(attrs)
      .and_then(|c| c.get(1))
      .is_some_and(|v| v.as_str().split_whitespace().any(|t| t == token))
  }

  /// Rendered text lines of a fragment: trimmed, non-empty, entity-decoded.
  pub(crate) fn text_lines(&self, fragment: &str) -> Vec<String> {
    let visible = self.invisible.replace_all(fragment, "");
    let broken = self.line_break.replace_all(&visible, "\n");
    let text = self.any_tag.replace_all(&broken, "");
    decode_entities(&text)
      .lines()
      .map(collapse_whitespace)
      .filter(|l| !l.is_empty())
      .collect()
  }

  /// `src` of the first `<img>` in the fragment.
  pub(crate) fn first_img_src(&self, fragment: &str) -> Option<String> {
    self
      .img_tag
      .captures_iter(fragment)
      .filter_map(|c| attr_value(&self.src_attr, c.get(1)?.as_str()))
      .next()
  }

  /// `href` of the first `<a>` carrying `class_token`.
  pub(crate) fn anchor_href_with_class(
    &self,
    fragment: &str,
    class_token: &str,
  ) -> Option<String> {
    self
      .anchor_tag
      .captures_iter(fragment)
      .filter_map(|c| {
        let attrs = c.get(1)?.as_str();
        if !self.has_class(attrs, class_token) {
          return None;
        }
        attr_value(&self.href_attr, attrs)
      })
      .next()
  }
}

fn attr_value(pattern: &Regex, attrs: &str) -> Option<String> {
  let raw = pattern.captures(attrs)?.get(1)?.as_str().trim();
  if raw.is_empty() {
    return None;
  }
  Some(decode_entities(raw))
}

// ─── Text helpers ────────────────────────────────────────────────────────────

/// Collapse runs of whitespace (including non-breaking spaces) to one space.
pub(crate) fn collapse_whitespace(s: &str) -> String {
  s.split(|c: char| c.is_whitespace() || c == '\u{a0}')
    .filter(|w| !w.is_empty())
    .collect::<Vec<_>>()
    .join(" ")
}

/// Decode the handful of named entities listing pages use, plus numeric
/// references. Unknown entities are left as written.
pub(crate) fn decode_entities(s: &str) -> String {
  if !s.contains('&') {
    return s.to_owned();
  }

  let mut out = String::with_capacity(s.len());
  let mut rest = s;
  while let Some(amp) = rest.find('&') {
    out.push_str(&rest[..amp]);
    let tail = &rest[amp..];
    let decoded = tail
      .find(';')
      .filter(|&semi| semi <= 10)
      .and_then(|semi| Some((decode_entity(&tail[1..semi])?, semi)));
    match decoded {
      Some((c, semi)) => {
        out.push(c);
        rest = &tail[semi + 1..];
      }
      None => {
        out.push('&');
        rest = &tail[1..];
      }
    }
  }
  out.push_str(rest);
  out
}

fn decode_entity(name: &str) -> Option<char> {
  match name {
    "amp" => Some('&'),
    "lt" => Some('<'),
    "gt" => Some('>'),
    "quot" => Some('"'),
    "apos" => Some('\''),
    "nbsp" => Some('\u{a0}'),
    _ => {
      let num = name.strip_prefix('#')?;
      let code = match num.strip_prefix(['x', 'X']) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => num.parse().ok()?,
      };
      char::from_u32(code)
    }
  }
}

/// Resolve a root-relative or protocol-relative URL against `origin`.
pub(crate) fn absolutize(url: &str, origin: &str) -> String {
  if let Some(rest) = url.strip_prefix("//") {
    let scheme = origin.split_once("://").map_or("https", |(s, _)| s);
    format!("{scheme}://{rest}")
  } else if url.starts_with('/') {
    format!("{}{url}", origin.trim_end_matches('/'))
  } else {
    url.to_owned()
  }
}

// ─── Tests ────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn entities_decode() {
    assert_eq!(decode_entities("Tom &amp; Jerry"), "Tom & Jerry");
    assert_eq!(decode_entities("O&#39;Neil &#x41;"), "O'Neil A");
    assert_eq!(decode_entities("AT&T rocks"), "AT&T rocks");
    assert_eq!(decode_entities("&bogus;"), "&bogus;");
  }

  #[test]
  fn absolutize_handles_relative_forms() {
    let origin = "https://www.example.gov";
    assert_eq!(
      absolutize("/img/a.jpg", origin),
      "https://www.example.gov/img/a.jpg"
    );
    assert_eq!(
      absolutize("//cdn.example.gov/a.jpg", origin),
      "https://cdn.example.gov/a.jpg"
    );
    assert_eq!(absolutize("https://x.test/a", origin), "https://x.test/a");
  }

  #[test]
  fn nested_list_items_stay_inside_their_card() {
    let p = Patterns::new().unwrap();
    let html = r#"<ul>
      <li class="usa-card"><ul><li>inner</li></ul>one</li>
      <li class="other">skip</li>
      <li class="usa-card tile">two</li>
    </ul>"#;
    let blocks = p.blocks_with_class(html, "usa-card");
    assert_eq!(blocks.len(), 2);
    let first = &html[blocks[0].0..blocks[0].1];
    assert!(first.contains("inner") && first.ends_with("one</li>"));
    assert!(html[blocks[1].0..blocks[1].1].contains("two"));
  }

  #[test]
  fn class_token_must_match_exactly() {
    let p = Patterns::new().unwrap();
    let html = r#"<li class="usa-card__body">x</li>"#;
    assert!(p.blocks_with_class(html, "usa-card").is_empty());
  }

  #[test]
  fn text_lines_follow_block_elements() {
    let p = Patterns::new().unwrap();
    let html = "<div>MEXICO</div><p>Name:<br/>Juan  &nbsp;Perez</p>\
                <script>var x = 1;</script><span>a</span><span>b</span>";
    assert_eq!(p.text_lines(html), vec!["MEXICO", "Name:", "Juan Perez", "ab"]);
  }
}
