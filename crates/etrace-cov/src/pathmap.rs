//! Source filename remapping for GCOV output, mirroring
//! `gcov_map_srcfilename`: strip a leading prefix, add a replacement
//! prefix, then either replace or append a suffix.

/// Applies the strip/prefix/suffix chain to `src`, mirroring
/// `gcov_map_srcfilename(src, strip, prefix, remove_suffix, new_suffix)`.
///
/// `strip`, if `src` starts with it, is removed from the front (match must
/// land on a path separator or the end of the string). `prefix`, if
/// non-empty, is then prepended with a `/` separator. If `remove_suffix` is
/// set, the existing extension (everything from the last `.` onward) is
/// dropped first; `new_suffix` is then appended either way.
///
/// Returns `None` where the original returns `NULL`: `remove_suffix` was
/// requested but `src` has no `.` to anchor on, or `strip`'s length alone
/// (regardless of whether it actually matched) is at least as long as the
/// pre-suffix portion of `src` — both straight ports of the original's
/// early-exit checks.
pub fn map_source_filename(
    src: &str,
    strip: Option<&str>,
    prefix: Option<&str>,
    remove_suffix: bool,
    new_suffix: &str,
) -> Option<String> {
    let strip = strip.unwrap_or("");
    let prefix = prefix.unwrap_or("");

    let mut endpos = src.len();
    if remove_suffix {
        endpos = src.rfind('.')?;
        if endpos == 0 {
            return None;
        }
    }

    if strip.len() >= endpos {
        return None;
    }

    let body = if let Some(rest) = src.strip_prefix(strip) {
        rest
    } else {
        src
    };
    // Re-derive endpos relative to the (possibly) stripped body: the
    // original computes endpos once against the full string and then
    // slices `f` (post-strip) by `endpos - strip_len`.
    let body_endpos = endpos.saturating_sub(if src.starts_with(strip) { strip.len() } else { 0 });
    let body = &body[..body_endpos.min(body.len())];

    let mut out = String::with_capacity(prefix.len() + body.len() + new_suffix.len() + 1);
    if !prefix.is_empty() {
        out.push_str(prefix.trim_end_matches('/'));
    }
    out.push_str(body);
    out.push_str(new_suffix);
    Some(out)
}
