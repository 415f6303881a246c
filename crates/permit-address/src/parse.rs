//! Token pipeline behind [`AddressNormalizer::parse`].
//!
//!   raw &str
//!     └─ tokenize()               upper-case, collapse whitespace
//!          └─ suffix_index()      first whole-token suffix, or fail
//!               └─ trim_range()   `123-125` → `123`
//!                    └─ drop_apartment() / drop_trailing_letter()
//!                         └─ house number + street name

use crate::{
  AddressNormalizer, ParsedAddress,
  error::{Error, Result},
};

pub(crate) fn parse_address(raw: &str, normalizer: &AddressNormalizer) -> Result<ParsedAddress> {
  let mut tokens = tokenize(raw);

  if suffix_index(&tokens, normalizer).is_none() {
    return Err(Error::MissingSuffix(raw.to_owned()));
  }

  trim_range(&mut tokens);
  drop_apartment(&mut tokens);
  drop_trailing_letter(&mut tokens);

  // The removals above never introduce a suffix, but may remove one.
  let suffix_at =
    suffix_index(&tokens, normalizer).ok_or_else(|| Error::MissingSuffix(raw.to_owned()))?;

  let (house_at, house_number) =
    house_number(&tokens).ok_or_else(|| Error::MissingHouseNumber(raw.to_owned()))?;

  let street_name = tokens[..suffix_at]
    .iter()
    .enumerate()
    .rev()
    .find(|(i, t)| *i != house_at && is_street_name(t))
    .map(|(_, t)| strip_leading_zeros(t))
    .ok_or_else(|| Error::MissingStreetName(raw.to_owned()))?;

  Ok(ParsedAddress {
    house_number,
    street_name,
    street_suffix: tokens[suffix_at].clone(),
  })
}

// ─── Steps ───────────────────────────────────────────────────────────────────

/// Upper-case and split on whitespace, shedding list punctuation that exports
/// leave attached to tokens (`"AVE,"`, `"N."`).
fn tokenize(raw: &str) -> Vec<String> {
  raw
    .to_uppercase()
    .split_whitespace()
    .map(|t| t.trim_matches(|c| matches!(c, ',' | '.' | ';' | ':')).to_owned())
    .filter(|t| !t.is_empty())
    .collect()
}

fn suffix_index(tokens: &[String], normalizer: &AddressNormalizer) -> Option<usize> {
  tokens.iter().position(|t| normalizer.is_suffix(t))
}

/// Keep the left side of a hyphenated house-number range in the first token.
fn trim_range(tokens: &mut Vec<String>) {
  let Some(first) = tokens.first_mut() else { return };
  if let Some((left, _)) = first.split_once('-') {
    if left.is_empty() {
      tokens.remove(0);
    } else {
      *first = left.to_owned();
    }
  }
}

/// Remove the first `APT <unit>` pair.
fn drop_apartment(tokens: &mut Vec<String>) {
  let found = tokens.windows(2).position(|pair| {
    pair[0] == "APT" && pair[1].chars().all(|c| c.is_alphanumeric() || c == '#')
  });
  if let Some(i) = found {
    tokens.drain(i..i + 2);
  }
}

/// Remove a trailing one-character non-digit token (heading or unit letter).
fn drop_trailing_letter(tokens: &mut Vec<String>) {
  let is_letter = tokens.last().is_some_and(|t| {
    let mut chars = t.chars();
    matches!((chars.next(), chars.next()), (Some(c), None) if !c.is_ascii_digit())
  });
  if is_letter {
    tokens.pop();
  }
}

/// Index of the first digit-prefixed token and its leading digit run.
fn house_number(tokens: &[String]) -> Option<(usize, String)> {
  tokens.iter().enumerate().find_map(|(i, t)| {
    let digits: String = t.chars().take_while(char::is_ascii_digit).collect();
    (!digits.is_empty()).then_some((i, digits))
  })
}

fn is_street_name(token: &str) -> bool {
  token.chars().count() >= 3
    && token.chars().all(char::is_alphanumeric)
    && token.chars().any(char::is_alphabetic)
}

fn strip_leading_zeros(token: &str) -> String { token.trim_start_matches('0').to_owned() }

#[cfg(test)]
mod tests {
  use crate::{AddressNormalizer, DEFAULT_SUFFIXES, Error, ParsedAddress};

  fn parse(raw: &str) -> Result<ParsedAddress, Error> {
    AddressNormalizer::new(DEFAULT_SUFFIXES).unwrap().parse(raw)
  }

  fn triple(raw: &str) -> (String, String, String) {
    let p = parse(raw).unwrap_or_else(|e| panic!("{raw:?}: {e}"));
    (p.house_number, p.street_name, p.street_suffix)
  }

  fn t(n: &str, name: &str, suffix: &str) -> (String, String, String) {
    (n.into(), name.into(), suffix.into())
  }

  #[test]
  fn hyphenated_range_and_case() {
    assert_eq!(triple("1611-1613 raymond ave"), t("1611", "RAYMOND", "AVE"));
    let parsed = parse("1611-1613 raymond ave").unwrap();
    assert_eq!(parsed.like_pattern(), "1611 %RAYMOND%");
  }

  #[test]
  fn apartment_and_trailing_heading_are_removed() {
    assert_eq!(triple("200 OAK ST APT 4B"), t("200", "OAK", "ST"));
    assert_eq!(triple("200 OAK ST N"), t("200", "OAK", "ST"));
    assert_eq!(triple("200   oak   st,  apt  12"), t("200", "OAK", "ST"));
  }

  #[test]
  fn directional_prefix_is_skipped_for_street_name() {
    assert_eq!(triple("1611 N RAYMOND AVE"), t("1611", "RAYMOND", "AVE"));
    assert_eq!(triple("10 W 3RD ST"), t("10", "3RD", "ST"));
  }

  #[test]
  fn leading_zeros_are_stripped_from_street_name() {
    assert_eq!(triple("45 03RD ST"), t("45", "3RD", "ST"));
  }

  #[test]
  fn suffix_must_be_a_whole_token() {
    // "STREET" and "WAYNE" contain suffixes but are not suffix tokens.
    assert!(matches!(parse("12 WAYNE STREET"), Err(Error::MissingSuffix(_))));
    assert_eq!(triple("12 WAYNE ST"), t("12", "WAYNE", "ST"));
  }

  #[test]
  fn first_suffix_occurrence_wins() {
    assert_eq!(triple("9 PARK LN CT"), t("9", "PARK", "LN"));
  }

  #[test]
  fn house_number_is_leading_digit_run() {
    assert_eq!(triple("12B ELM DR"), t("12", "ELM", "DR"));
  }

  #[test]
  fn unparsable_inputs() {
    for raw in ["", "   ", "MAIN STREET", "ELM ST", "12 ST", "12 NE ST"] {
      let err = parse(raw).unwrap_err();
      assert!(err.is_unparsable(), "{raw:?} → {err}");
    }
    assert!(matches!(parse("ELM ST"), Err(Error::MissingHouseNumber(_))));
    assert!(matches!(parse("12 NE ST"), Err(Error::MissingStreetName(_))));
  }

  #[test]
  fn pure_function() {
    assert_eq!(parse("7 Bay Rd").unwrap(), parse("7 Bay Rd").unwrap());
  }
}
