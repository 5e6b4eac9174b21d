//! The recipient's displayed-badges record.
//!
//! On the wire the set is a replaceable record of kind 30008 whose tag list
//! starts with the `d = profile_badges` discriminator followed by
//! interleaved `a` (definition) / `e` (award) tags, one pair per badge.

use serde::{Deserialize, Serialize};

use crate::constants::{PROFILE_BADGES_DISCRIMINATOR, PROFILE_BADGES_KIND};
use crate::record::SignedRecord;
use crate::types::BadgePair;

/// Ordered, duplicate-free set of displayed badges owned by one key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BadgeSet {
    owner_key: String,
    pairs: Vec<BadgePair>,
}

impl BadgeSet {
    /// Build a set, dropping later duplicates while keeping first-seen order.
    pub fn new(owner_key: impl Into<String>, pairs: impl IntoIterator<Item = BadgePair>) -> Self {
        Self {
            owner_key: owner_key.into(),
            pairs: dedup_pairs(pairs),
        }
    }

    pub fn owner_key(&self) -> &str {
        &self.owner_key
    }

    pub fn pairs(&self) -> &[BadgePair] {
        &self.pairs
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn kind(&self) -> u32 {
        PROFILE_BADGES_KIND
    }

    /// Tag list for publishing; `relay_hint` is appended to every `e` tag.
    pub fn to_tags(&self, relay_hint: Option<&str>) -> Vec<Vec<String>> {
        let mut tags = Vec::with_capacity(1 + self.pairs.len() * 2);
        tags.push(vec!["d".to_string(), PROFILE_BADGES_DISCRIMINATOR.to_string()]);
        for pair in &self.pairs {
            tags.push(vec!["a".to_string(), pair.definition.clone()]);
            let mut e_tag = vec!["e".to_string(), pair.award.clone()];
            if let Some(hint) = relay_hint {
                e_tag.push(hint.to_string());
            }
            tags.push(e_tag);
        }
        tags
    }

    /// Human readable content string.
    pub fn content(&self) -> String {
        format!("Profile badges: {} badges displayed", self.pairs.len())
    }
}

/// Extract (definition, award) pairs from a displayed-badges tag list.
///
/// An `a` tag not immediately followed by an `e` tag yields a pair with an
/// empty award reference, left for validation to reject. Stray `e` tags and
/// unrelated tags are ignored.
pub fn parse_pairs(tags: &[Vec<String>]) -> Vec<BadgePair> {
    let mut pairs = Vec::new();
    let mut i = 0;
    while i < tags.len() {
        if tag_name(&tags[i]) == Some("a") {
            let definition = tags[i].get(1).cloned().unwrap_or_default();
            let mut award = String::new();
            if let Some(next) = tags.get(i + 1) {
                if tag_name(next) == Some("e") {
                    award = next.get(1).cloned().unwrap_or_default();
                    i += 1;
                }
            }
            pairs.push(BadgePair { definition, award });
        }
        i += 1;
    }
    pairs
}

/// Pairs of a fetched record, without validation or deduplication.
pub fn pairs_from_record(record: &SignedRecord) -> Vec<BadgePair> {
    parse_pairs(&record.tags)
}

/// Deduplicate by structural equality, preserving first-seen order.
pub fn dedup_pairs(pairs: impl IntoIterator<Item = BadgePair>) -> Vec<BadgePair> {
    let mut seen = std::collections::HashSet::new();
    let mut out = Vec::new();
    for pair in pairs {
        if seen.insert(pair.clone()) {
            out.push(pair);
        }
    }
    out
}

fn tag_name(tag: &[String]) -> Option<&str> {
    tag.first().map(String::as_str)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(id: &str, award: char) -> BadgePair {
        BadgePair::new(
            format!("30009:{}:{id}", "a".repeat(64)),
            award.to_string().repeat(64),
        )
    }

    fn tag(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_tags_roundtrip_through_parse() {
        let set = BadgeSet::new("owner", vec![pair("one", 'b'), pair("two", 'c')]);
        let tags = set.to_tags(Some("wss://relay.example"));

        assert_eq!(tags[0], tag(&["d", "profile_badges"]));
        assert_eq!(tags[2], tag(&["e", &"b".repeat(64), "wss://relay.example"]));
        assert_eq!(parse_pairs(&tags), set.pairs());
        assert_eq!(set.content(), "Profile badges: 2 badges displayed");
    }

    #[test]
    fn test_parse_missing_award_yields_empty_reference() {
        let tags = vec![
            tag(&["d", "profile_badges"]),
            tag(&["a", "def-one"]),
            tag(&["a", "def-two"]),
            tag(&["e", "award-two"]),
        ];
        let pairs = parse_pairs(&tags);
        assert_eq!(
            pairs,
            vec![
                BadgePair::new("def-one", ""),
                BadgePair::new("def-two", "award-two"),
            ]
        );
    }

    #[test]
    fn test_parse_ignores_stray_tags() {
        let tags = vec![
            tag(&["e", "orphan"]),
            tag(&["p", "someone"]),
            tag(&["a", "def"]),
            tag(&["e", "award"]),
            tag(&["a"]),
        ];
        let pairs = parse_pairs(&tags);
        assert_eq!(
            pairs,
            vec![BadgePair::new("def", "award"), BadgePair::new("", "")]
        );
    }

    #[test]
    fn test_new_deduplicates_in_order() {
        let set = BadgeSet::new(
            "owner",
            vec![pair("one", 'b'), pair("two", 'c'), pair("one", 'b')],
        );
        assert_eq!(set.pairs(), &[pair("one", 'b'), pair("two", 'c')]);
    }
}
