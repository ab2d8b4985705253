//! POSIX flavoured text algebra for topic paths.
//!
//! Nothing here looks at a routing tree; these functions only rewrite strings.

use itertools::Itertools;

pub const SEP: &str = "/";
pub const CURDIR: &str = ".";
pub const PARDIR: &str = "..";

/// Joins segments the way `posixpath.join` does: a segment starting with `/`
/// restarts the path, empty segments leave a trailing separator.
pub fn join<S: AsRef<str>>(segments: &[S]) -> String {
    let mut path = String::new();
    for seg in segments {
        let seg = seg.as_ref();
        if seg.starts_with(SEP) {
            path.clear();
            path.push_str(seg);
        } else if path.is_empty() || path.ends_with(SEP) {
            path.push_str(seg);
        } else {
            path.push_str(SEP);
            path.push_str(seg);
        }
    }
    path
}

/// Collapses empty, `.` and `..` components. The empty path normalizes to `.`.
pub fn normpath(path: &str) -> String {
    let absolute = path.starts_with(SEP);
    let mut comps: Vec<&str> = Vec::new();
    for comp in path.split(SEP) {
        if comp.is_empty() || comp == CURDIR {
            continue;
        }
        if comp != PARDIR || (!absolute && comps.is_empty()) || comps.last() == Some(&PARDIR) {
            comps.push(comp);
        } else if !comps.is_empty() {
            comps.pop();
        }
    }
    let body = comps.iter().join(SEP);
    match (absolute, body.is_empty()) {
        (true, _) => format!("{}{}", SEP, body),
        (false, true) => CURDIR.into(),
        (false, false) => body,
    }
}

/// Components of an already normalized path. A leading separator is kept as
/// its own component, `.` stays `.`.
pub fn parts(normalized: &str) -> Vec<String> {
    let mut out = Vec::new();
    let rest = match normalized.strip_prefix(SEP) {
        Some(rest) => {
            out.push(SEP.to_owned());
            rest
        }
        None => normalized,
    };
    out.extend(rest.split(SEP).filter(|p| !p.is_empty()).map(str::to_owned));
    out
}

/// Relative path from `start` to `path`, both taken relative to the same anchor.
pub fn relpath(path: &str, start: &str) -> String {
    fn comps(p: &str) -> Vec<String> {
        parts(&normpath(p)).into_iter().filter(|c| c != CURDIR && c != SEP).collect()
    }
    let path_list = comps(path);
    let start_list = comps(start);
    let common = path_list.iter().zip(start_list.iter()).take_while(|(a, b)| a == b).count();

    let rel = std::iter::repeat(PARDIR)
        .take(start_list.len() - common)
        .chain(path_list[common..].iter().map(String::as_str))
        .join(SEP);
    if rel.is_empty() {
        CURDIR.into()
    } else {
        rel
    }
}
