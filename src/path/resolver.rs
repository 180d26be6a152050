pub const SEPARATOR: char = '/';

const PARENT_SEGMENT: &str = "..";
const CURRENT_SEGMENT: &str = ".";

/// Resolves `relative` against the absolute `base` path.
///
/// Absolute inputs are returned unchanged. Otherwise `up_levels` parent
/// segments are prepended to `relative` (zero or negative adds none), the
/// result is joined onto `base` and every `..` consumes the segment before it.
/// A `..` with nothing left to consume stays in the output.
pub fn resolve(base: &str, relative: &str, up_levels: i32) -> String {
    if relative.starts_with(SEPARATOR) {
        return relative.to_string();
    }

    let traversal = format!("{PARENT_SEGMENT}{SEPARATOR}").repeat(up_levels.max(0) as usize);
    let joined = format!("{base}{SEPARATOR}{traversal}{relative}");

    let mut segments: Vec<&str> = Vec::new();
    for segment in joined
        .split(SEPARATOR)
        .filter(|segment| !segment.is_empty() && *segment != CURRENT_SEGMENT)
    {
        match segments.last() {
            Some(&previous) if segment == PARENT_SEGMENT && previous != PARENT_SEGMENT => {
                segments.pop();
            }
            _ => segments.push(segment),
        }
    }

    format!("{SEPARATOR}{}", segments.join("/"))
}

/// Splits a path into its parent path and final name.
///
/// Returns `None` when either half would be empty, e.g. for `/name` or `/parent/`.
pub fn split_parent(path: &str) -> Option<(&str, &str)> {
    let (parent, name) = path.rsplit_once(SEPARATOR)?;
    (!parent.is_empty() && !name.is_empty()).then_some((parent, name))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::*;

    #[rstest]
    #[case("/a/b", "/x/y", 0)]
    #[case("/", "/content", 3)]
    #[case("/a", "/../odd/./path", -1)]
    fn absolute_paths_are_returned_unchanged(
        #[case] base: &str,
        #[case] absolute: &str,
        #[case] up_levels: i32,
    ) {
        assert_eq!(resolve(base, absolute, up_levels), absolute);
    }

    #[rstest]
    #[case("/a/b", "../c", "/a/c")]
    #[case("/a", "b/../c", "/a/c")]
    #[case("/a", "./b/./c", "/a/b/c")]
    #[case("/a", "b//c", "/a/b/c")]
    #[case("/", "content", "/content")]
    #[case("/content/dam", "", "/content/dam")]
    #[case("/a/b/c", "../../d", "/a/d")]
    fn relative_paths_are_canonicalized(
        #[case] base: &str,
        #[case] relative: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(resolve(base, relative, 0), expected);
    }

    #[test]
    fn dangling_parent_segment_is_preserved() {
        assert_eq!(resolve("/", "../x", 0), "/../x");
        assert_eq!(resolve("/a", "../../x", 0), "/../x");
    }

    #[test]
    fn up_levels_prepend_parent_segments() {
        assert_eq!(resolve("/a/b", "renamed", 1), "/a/renamed");
        assert_eq!(resolve("/a/b/c", "d", 2), "/a/d");
    }

    #[test]
    fn negative_up_levels_add_no_traversal() {
        assert_eq!(resolve("/a/b", "c", -1), "/a/b/c");
    }

    #[test]
    fn resolved_paths_resolve_to_themselves() {
        let resolved = resolve("/content/dam", "../site/./en", 0);
        assert_eq!(resolve("/elsewhere", &resolved, 2), resolved);
    }

    #[rstest]
    #[case("/content/dam/x.png", Some(("/content/dam", "x.png")))]
    #[case("/content/x", Some(("/content", "x")))]
    #[case("/x.png", None)]
    #[case("/content/", None)]
    #[case("nameonly", None)]
    fn split_parent_requires_both_halves(
        #[case] path: &str,
        #[case] expected: Option<(&str, &str)>,
    ) {
        assert_eq!(split_parent(path), expected);
    }
}
