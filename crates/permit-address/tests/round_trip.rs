// Property tests for the address normalizer.
// CI: 256 cases (default). Soak: PROPTEST_CASES=10000 cargo test --release

use permit_address::{AddressNormalizer, DEFAULT_SUFFIXES};
use proptest::prelude::*;

fn config() -> ProptestConfig {
  ProptestConfig {
    cases: std::env::var("PROPTEST_CASES")
      .ok()
      .and_then(|s| s.parse().ok())
      .unwrap_or(256),
    failure_persistence: None,
    ..ProptestConfig::default()
  }
}

fn arb_house_number() -> impl Strategy<Value = String> { r"[1-9][0-9]{0,4}" }

/// Alphabetic street names that cannot be mistaken for a suffix or an
/// apartment designator.
fn arb_street_name() -> impl Strategy<Value = String> {
  r"[A-Z]{3,12}".prop_filter("reserved word", |name| {
    name != "APT" && !DEFAULT_SUFFIXES.contains(&name.as_str())
  })
}

fn arb_suffix() -> impl Strategy<Value = String> {
  prop::sample::select(DEFAULT_SUFFIXES).prop_map(str::to_owned)
}

proptest! {
  #![proptest_config(config())]

  #[test]
  fn canonical_addresses_parse_to_their_parts(
    n in arb_house_number(),
    name in arb_street_name(),
    suffix in arb_suffix(),
  ) {
    let normalizer = AddressNormalizer::new(DEFAULT_SUFFIXES).unwrap();
    let parsed = normalizer.parse(&format!("{n} {name} {suffix}")).unwrap();
    prop_assert_eq!(parsed.house_number, n);
    prop_assert_eq!(parsed.street_name, name);
    prop_assert_eq!(parsed.street_suffix, suffix);
  }

  #[test]
  fn case_and_spacing_do_not_matter(
    n in arb_house_number(),
    name in arb_street_name(),
    suffix in arb_suffix(),
    pad in r" {1,4}",
  ) {
    let normalizer = AddressNormalizer::new(DEFAULT_SUFFIXES).unwrap();
    let canonical = normalizer.parse(&format!("{n} {name} {suffix}")).unwrap();
    let messy = format!("{pad}{n}{pad}{}{pad}{}{pad}", name.to_lowercase(), suffix.to_lowercase());
    prop_assert_eq!(normalizer.parse(&messy).unwrap(), canonical);
  }
}
