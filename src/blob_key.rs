//! §4.2 blob-store key derivation: split a UUID into its canonical fields
//! and join them with `/`, lowercase hex. §8 property 8 requires this to
//! be a bijection on valid UUIDs, which only holds if every one of the
//! UUID's 32 hex digits survives the split -- the worked example in §4.2
//! (`550e8400/e29b/41d4/a7/16446655440000`) shows the 4th canonical group
//! (`a716`) split in half, with its trailing two hex digits folded into
//! the 12-hex node group rather than dropped, giving a final 14-hex field.
//! That's the derivation implemented here.

use uuid::Uuid;

/// `550e8400-e29b-41d4-a716-446655440000` -> `550e8400/e29b/41d4/a7/16446655440000`.
pub fn derive_key(id: Uuid) -> String {
    let hyphenated = id.hyphenated().to_string();
    let groups: Vec<&str> = hyphenated.split('-').collect();
    debug_assert_eq!(groups.len(), 5);
    let (clock_seq_head, clock_seq_tail) = groups[3].split_at(2);
    format!(
        "{}/{}/{}/{}/{}{}",
        groups[0], groups[1], groups[2], clock_seq_head, clock_seq_tail, groups[4]
    )
}

/// Accepts either a raw UUID string or an already-derived slash path.
/// Unparseable input yields `None` (§4.2: "unparseable UUIDs yield absent").
pub fn parse_key(key: &str) -> Option<Uuid> {
    if let Ok(id) = Uuid::parse_str(key) {
        return Some(id);
    }

    let parts: Vec<&str> = key.split('/').collect();
    if parts.len() != 5 {
        return None;
    }
    let (a, b, c, clock_seq_head, tail) = (parts[0], parts[1], parts[2], parts[3], parts[4]);
    if clock_seq_head.len() != 2 || tail.len() != 14 {
        return None;
    }
    let (clock_seq_tail, node) = tail.split_at(2);
    let hyphenated = format!("{a}-{b}-{c}-{clock_seq_head}{clock_seq_tail}-{node}");
    Uuid::parse_str(&hyphenated).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_worked_example() {
        let id = Uuid::parse_str("550e8400-e29b-41d4-a716-446655440000").unwrap();
        assert_eq!(derive_key(id), "550e8400/e29b/41d4/a7/16446655440000");
    }

    #[test]
    fn test_derived_key_matches_expected_shape() {
        let id = Uuid::new_v4();
        let key = derive_key(id);
        let re_matches = key
            .split('/')
            .map(|s| s.len())
            .collect::<Vec<_>>();
        assert_eq!(re_matches, vec![8, 4, 4, 2, 14]);
        assert!(key.chars().all(|c| c.is_ascii_hexdigit() || c == '/'));
    }

    #[test]
    fn test_bijection_on_random_uuids() {
        for _ in 0..256 {
            let id = Uuid::new_v4();
            let key = derive_key(id);
            assert_eq!(parse_key(&key), Some(id));
        }
    }

    #[test]
    fn test_raw_uuid_is_also_accepted() {
        let id = Uuid::new_v4();
        assert_eq!(parse_key(&id.to_string()), Some(id));
    }

    #[test]
    fn test_unparseable_input_is_absent() {
        assert_eq!(parse_key("not-a-uuid"), None);
        assert_eq!(parse_key("550e8400/e29b/41d4/zz/16446655440000"), None);
    }
}
