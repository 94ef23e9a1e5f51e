//! Distinguished name grammar
//!
//! A DN is a `/`-delimited path of RN segments, e.g. `uni/tn-demo/ap-web`.
//! Segments may embed bracketed predicates that themselves contain `/`
//! (`uni/tn-demo/ap-web/epg-app/rspathAtt-[topology/pod-1/paths-101/pathep-[eth1/1]]`),
//! so splitting only happens on separators outside of `[...]`.

/// Parent value denoting the root of the tree
pub const TOP_ROOT: &str = "topRoot";

/// Separator between RN segments
pub const SEPARATOR: char = '/';

/// Byte offsets of every top-level separator in `dn`
fn separator_offsets(dn: &str) -> Vec<usize> {
    let mut depth = 0usize;
    let mut offsets = Vec::new();
    for (i, c) in dn.char_indices() {
        match c {
            '[' => depth += 1,
            ']' => depth = depth.saturating_sub(1),
            SEPARATOR if depth == 0 => offsets.push(i),
            _ => {}
        }
    }
    offsets
}

/// Split a DN into its RN segments
pub fn split(dn: &str) -> Vec<&str> {
    let mut segments = Vec::new();
    let mut start = 0;
    for offset in separator_offsets(dn) {
        segments.push(&dn[start..offset]);
        start = offset + 1;
    }
    segments.push(&dn[start..]);
    segments.retain(|s| !s.is_empty());
    segments
}

/// Last RN segment of a DN
pub fn rn(dn: &str) -> &str {
    match separator_offsets(dn).last() {
        Some(&offset) => &dn[offset + 1..],
        None => dn,
    }
}

/// DN of the containing object
///
/// Single-segment DNs (e.g. `uni`) sit directly below the root and return
/// [`TOP_ROOT`].
pub fn parent(dn: &str) -> &str {
    match separator_offsets(dn).last() {
        Some(&offset) => &dn[..offset],
        None => TOP_ROOT,
    }
}

/// Join a parent DN and an RN
pub fn join(parent_dn: &str, rn: &str) -> String {
    format!("{}{}{}", parent_dn, SEPARATOR, rn)
}

/// True if `dn` equals `ancestor` or lies below it
pub fn is_descendant_or_self(dn: &str, ancestor: &str) -> bool {
    dn == ancestor
        || (dn.len() > ancestor.len()
            && dn.starts_with(ancestor)
            && dn[ancestor.len()..].starts_with(SEPARATOR))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PATH_DN: &str =
        "uni/tn-demo/ap-web/epg-app/rspathAtt-[topology/pod-1/paths-101/pathep-[eth1/1]]";

    #[test]
    fn test_split_plain_dn() {
        assert_eq!(split("uni/tn-demo/ap-web"), vec!["uni", "tn-demo", "ap-web"]);
        assert_eq!(split("uni"), vec!["uni"]);
    }

    #[test]
    fn test_split_keeps_bracketed_predicates_whole() {
        let segments = split(PATH_DN);
        assert_eq!(segments.len(), 5);
        assert_eq!(
            segments[4],
            "rspathAtt-[topology/pod-1/paths-101/pathep-[eth1/1]]"
        );
    }

    #[test]
    fn test_rn_and_parent() {
        assert_eq!(rn("uni/tn-demo"), "tn-demo");
        assert_eq!(parent("uni/tn-demo"), "uni");
        assert_eq!(parent(PATH_DN), "uni/tn-demo/ap-web/epg-app");
        assert_eq!(
            rn(PATH_DN),
            "rspathAtt-[topology/pod-1/paths-101/pathep-[eth1/1]]"
        );
    }

    #[test]
    fn test_single_segment_parent_is_root() {
        assert_eq!(parent("uni"), TOP_ROOT);
        assert_eq!(rn("uni"), "uni");
    }

    #[test]
    fn test_join_and_descendant() {
        let dn = join("uni", "tn-demo");
        assert_eq!(dn, "uni/tn-demo");
        assert!(is_descendant_or_self("uni/tn-demo/ap-web", &dn));
        assert!(is_descendant_or_self("uni/tn-demo", &dn));
        assert!(!is_descendant_or_self("uni/tn-demo2", &dn));
    }
}
