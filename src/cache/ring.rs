//! Consistent-hash ring over the static member list.
//!
//! Every member places a fixed number of virtual points on a 64-bit ring;
//! a key belongs to the member owning the first point at or after the
//! key's hash. All group members build the ring from the same sorted
//! list, so ownership decisions agree across the cluster without any
//! coordination.

use std::collections::BTreeMap;

use sha2::{Digest, Sha256};

const VIRTUAL_POINTS: usize = 50;

pub(crate) struct HashRing {
    points: BTreeMap<u64, usize>,
    members: Vec<String>,
}

impl HashRing {
    /// Build the ring. `members` must be non-empty; the cache always
    /// includes the local node.
    pub(crate) fn new(members: Vec<String>) -> Self {
        assert!(!members.is_empty(), "hash ring requires at least one member");
        let mut points = BTreeMap::new();
        for (index, member) in members.iter().enumerate() {
            for replica in 0..VIRTUAL_POINTS {
                points.insert(ring_point(&format!("{member}#{replica}")), index);
            }
        }
        Self { points, members }
    }

    pub(crate) fn owner(&self, key: &str) -> &str {
        let hash = ring_point(key);
        let index = self
            .points
            .range(hash..)
            .next()
            .or_else(|| self.points.iter().next())
            .map(|(_, &index)| index)
            .expect("ring has points for every member");
        &self.members[index]
    }
}

fn ring_point(value: &str) -> u64 {
    let digest = Sha256::digest(value.as_bytes());
    u64::from_be_bytes(digest[..8].try_into().expect("digest is 32 bytes"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn three_members() -> Vec<String> {
        vec![
            "10.0.0.1:8441".to_string(),
            "10.0.0.2:8441".to_string(),
            "10.0.0.3:8441".to_string(),
        ]
    }

    #[test]
    fn ownership_is_deterministic() {
        let a = HashRing::new(three_members());
        let b = HashRing::new(three_members());
        for i in 0..64 {
            let key = format!("PNG:diagram-{i}");
            assert_eq!(a.owner(&key), b.owner(&key));
        }
    }

    #[test]
    fn keys_spread_across_members() {
        let ring = HashRing::new(three_members());
        let mut seen = std::collections::HashSet::new();
        for i in 0..256 {
            seen.insert(ring.owner(&format!("SVG:diagram-{i}")).to_string());
        }
        assert_eq!(seen.len(), 3, "every member should own some keys");
    }

    #[test]
    fn single_member_owns_everything() {
        let ring = HashRing::new(vec!["127.0.0.1:8441".to_string()]);
        assert_eq!(ring.owner("PNG:anything"), "127.0.0.1:8441");
    }
}
