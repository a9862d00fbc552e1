//! Field extraction from the rendered lines of one card.

use listwatch_core::record::{Attributes, RawRecord};

/// Cards whose text is shorter than this are placeholders or ads.
pub(crate) const MIN_CARD_TEXT: usize = 20;

/// First lines at least this long are headlines, not an origin banner.
const MAX_ORIGIN_LEN: usize = 30;

const CHARGE_MARKERS: [&str; 2] = ["CONVICTED OF:", "ARRESTED FOR:"];
const LOCATION_MARKER: &str = "ARRESTED:";
const NAME_MARKER: &str = "NAME:";
const NAME_TERMINATOR: &str = ">>";

/// Parse the text lines of one card. Returns `None` for cards that are too
/// short or carry no name.
pub(crate) fn parse_lines(
  lines: &[String],
  image_url: Option<String>,
  detail_url: Option<String>,
) -> Option<RawRecord> {
  let text_len: usize = lines.iter().map(|l| l.chars().count()).sum::<usize>()
    + lines.len().saturating_sub(1);
  if text_len < MIN_CARD_TEXT {
    return None;
  }

  let charge_idx = lines.iter().position(|l| {
    let upper = l.to_uppercase();
    CHARGE_MARKERS.iter().any(|m| upper.contains(m))
  });
  let location_idx = position_exact(lines, LOCATION_MARKER);
  let name_idx = position_exact(lines, NAME_MARKER);

  let name = name_idx
    .map(|i| {
      lines[i + 1..]
        .iter()
        .take_while(|l| l.as_str() != NAME_TERMINATOR)
        .map(String::as_str)
        .collect::<Vec<_>>()
        .join(" ")
    })
    .filter(|n| !n.is_empty())?;

  let charge = match (charge_idx, location_idx) {
    (Some(c), Some(a)) if c < a => {
      let mut parts = Vec::new();
      if let Some(rest) = inline_remainder(&lines[c]) {
        parts.push(rest);
      }
      parts.extend(lines[c + 1..a].iter().map(String::as_str));
      join_nonempty(&parts)
    }
    _ => None,
  };

  let location = match (location_idx, name_idx) {
    (Some(a), Some(n)) if a < n => {
      join_nonempty(&lines[a + 1..n].iter().map(String::as_str).collect::<Vec<_>>())
    }
    _ => None,
  };

  let origin = lines
    .first()
    .filter(|l| is_upper(l) && l.chars().count() < MAX_ORIGIN_LEN)
    .cloned();

  Some(RawRecord {
    name:       Some(name),
    attributes: Attributes {
      origin,
      charge,
      location,
      image_url,
      detail_url,
    },
  })
}

fn position_exact(lines: &[String], marker: &str) -> Option<usize> {
  lines.iter().position(|l| l.trim().eq_ignore_ascii_case(marker))
}

/// Text following the charge marker on its own line, e.g.
/// `Convicted of: Homicide`.
fn inline_remainder(line: &str) -> Option<&str> {
  let upper = line.to_ascii_uppercase();
  CHARGE_MARKERS.iter().find_map(|m| {
    let at = upper.find(m)? + m.len();
    let rest = line.get(at..)?.trim();
    (!rest.is_empty()).then_some(rest)
  })
}

fn join_nonempty(parts: &[&str]) -> Option<String> {
  let joined = parts
    .iter()
    .map(|p| p.trim())
    .filter(|p| !p.is_empty())
    .collect::<Vec<_>>()
    .join(" ");
  (!joined.is_empty()).then_some(joined)
}

/// At least one cased character and no lowercase ones.
fn is_upper(s: &str) -> bool {
  s.chars().any(char::is_uppercase) && !s.chars().any(char::is_lowercase)
}
