/// Collapses `/x/../` components out of a path string, repeatedly, until
/// none remain. Mirrors `filename_sanitize` in the original tool: a purely
/// textual cleanup (no filesystem access), used on the paths `addr2line`
/// reports so reports don't show paths like `build/../src/foo.c`.
pub fn sanitize(path: &str) -> String {
    let mut s = path.to_string();
    loop {
        let Some(dotdot) = s.find("/../") else {
            break;
        };
        let Some(prev_slash) = s[..dotdot].rfind('/') else {
            // No earlier component to collapse into; just drop the `../`.
            s.replace_range(dotdot..dotdot + 4, "/");
            continue;
        };
        s.replace_range(prev_slash..dotdot + 4, "/");
    }
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn collapses_single_dotdot() {
        assert_eq!(sanitize("/a/b/../c.c"), "/a/c.c");
    }

    #[test]
    fn collapses_repeated_dotdot() {
        assert_eq!(sanitize("/a/b/c/../../d.c"), "/a/d.c");
    }

    #[test]
    fn leaves_clean_paths_alone() {
        assert_eq!(sanitize("/a/b/c.c"), "/a/b/c.c");
    }

    #[test]
    fn no_earlier_component_just_drops() {
        assert_eq!(sanitize("/../c.c"), "/c.c");
    }
}
