//! URL normalisation and link-rewriting helpers for the site explorer,
//! per spec.md §4.3. Pure functions, grounded on the teacher's
//! `machine_pool.rs` preference for small free functions over methods
//! when no shared state is involved.

/// Removes everything from the first `#` onward.
pub fn strip_fragment(url: &str) -> String {
    match url.find('#') {
        Some(idx) => url[..idx].to_string(),
        None => url.to_string(),
    }
}

/// Removes a leading `www.` from a host.
pub fn strip_www(host: &str) -> &str {
    host.strip_prefix("www.").unwrap_or(host)
}

/// Splits an absolute `http://host[:port]/path...` URL into its host
/// and path+query portion (path defaults to `/`).
pub fn split_host_path(absolute: &str) -> Option<(&str, &str)> {
    let rest = absolute.strip_prefix("http://").or_else(|| absolute.strip_prefix("https://"))?;
    match rest.find('/') {
        Some(idx) => Some((&rest[..idx], &rest[idx..])),
        None => Some((rest, "/")),
    }
}

/// Resolves `link`, found on a page served from `host`, to an absolute
/// `http://...` URL, per spec.md §4.3's resolution rules:
/// 1. already absolute (`http(s)://...`) → unchanged
/// 2. starts with `/` → `http://<host><link>`
/// 3. already carries `host` (modulo `www.`) as a textual prefix → unchanged
/// 4. otherwise → `http://<host>/<link>`
///
/// The fragment is stripped from the result in every case.
pub fn resolve_absolute(link: &str, host: &str) -> String {
    let resolved = if link.starts_with("http://") || link.starts_with("https://") {
        link.to_string()
    } else if let Some(rest) = link.strip_prefix('/') {
        format!("http://{host}/{rest}")
    } else if strip_www(link).starts_with(strip_www(host)) {
        link.to_string()
    } else {
        format!("http://{host}/{link}")
    };
    strip_fragment(&resolved)
}

/// True iff `a` and `b` are the same host once a leading `www.` is
/// stripped from each.
pub fn same_host(a: &str, b: &str) -> bool {
    strip_www(a) == strip_www(b)
}

/// Extracts every `href="..."` attribute value from `body`, in
/// document order. This is the "spider" mode's candidate-link source.
pub fn extract_href_links(body: &str) -> Vec<String> {
    extract_attr_values(body, "href")
}

/// Extracts every `href="..."` or `src="..."` attribute value from
/// `body`, in document order. This is "mirror" mode's candidate-link
/// source (links and asset references both).
pub fn extract_mirror_links(body: &str) -> Vec<String> {
    let mut links = extract_attr_values(body, "href");
    links.extend(extract_attr_values(body, "src"));
    links
}

/// A byte-level scan for `attr="value"` occurrences. Not a full HTML
/// parser — mirrors spec.md §4.3's "regex-level extraction" phrasing,
/// matching any quoted attribute value regardless of surrounding tag.
fn extract_attr_values(body: &str, attr: &str) -> Vec<String> {
    let needle = format!("{attr}=\"");
    let mut out = Vec::new();
    let mut rest = body;
    while let Some(start) = rest.find(&needle) {
        let after = &rest[start + needle.len()..];
        match after.find('"') {
            Some(end) => {
                out.push(after[..end].to_string());
                rest = &after[end + 1..];
            }
            None => break,
        }
    }
    out
}

/// Derives the filesystem path a node's body should be written to,
/// relative to the mirror output directory, per spec.md §4.3's "Mirror
/// write" rule.
pub fn mirror_file_path(url_path: &str, content_type: &str) -> String {
    let mut path = url_path.to_string();
    let basename_empty = path.ends_with('/') || path.is_empty();
    if basename_empty {
        if !path.ends_with('/') {
            path.push('/');
        }
        path.push_str("index.html");
    } else if content_type == "text/html" && !has_extension(&path) {
        path.push_str(".html");
    }
    path
}

/// Rewrites a `/`-rooted link into a path relative to `current`, per
/// spec.md §4.3's `relative_url`: a literal count of `/` characters in
/// `current` determines how many `../` segments to prepend. `current`
/// is the fetched page's URL path with its leading `/` already
/// stripped (e.g. `"c/d"` for a page fetched from `http://h/c/d`) —
/// matching scenario 6 in spec.md §8, where a page at `/c/d` rewrites
/// a `/a/b` link with exactly one `../`. Kept bug-for-bug for URLs
/// with query strings or trailing slashes — see DESIGN.md's
/// open-question notes.
pub fn relative_url(link: &str, current: &str) -> String {
    let mut target = if let Some(rest) = link.strip_prefix('/') {
        let ups = "../".repeat(current.matches('/').count());
        format!("{ups}{rest}")
    } else {
        link.to_string()
    };

    if target.is_empty() || target.ends_with('/') {
        target.push_str("index.html");
    } else if !has_extension(&target) {
        target.push_str(".html");
    }
    target
}

fn has_extension(path: &str) -> bool {
    match path.rsplit('/').next() {
        Some(basename) => basename.contains('.'),
        None => false,
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn strip_fragment_removes_suffix() {
        assert_eq!(strip_fragment("http://h/a#frag"), "http://h/a");
        assert_eq!(strip_fragment("http://h/a"), "http://h/a");
    }

    #[test]
    fn strip_www_removes_prefix_only() {
        assert_eq!(strip_www("www.h"), "h");
        assert_eq!(strip_www("h"), "h");
    }

    #[test]
    fn resolve_absolute_handles_all_four_cases() {
        assert_eq!(resolve_absolute("http://other/x", "h"), "http://other/x");
        assert_eq!(resolve_absolute("/a", "h"), "http://h/a");
        assert_eq!(resolve_absolute("h/a", "h"), "h/a");
        assert_eq!(resolve_absolute("a", "h"), "http://h/a");
    }

    #[test]
    fn same_host_ignores_www() {
        assert!(same_host("www.h", "h"));
        assert!(!same_host("h", "other"));
    }

    #[test]
    fn extract_href_links_ignores_src() {
        let body = r#"<a href="/a">x</a><img src="/b.png">"#;
        assert_eq!(extract_href_links(body), vec!["/a".to_string()]);
    }

    #[test]
    fn extract_mirror_links_includes_src() {
        let body = r#"<a href="/a">x</a><img src="/b.png">"#;
        assert_eq!(extract_mirror_links(body), vec!["/a".to_string(), "/b.png".to_string()]);
    }

    #[test]
    fn mirror_file_path_defaults_to_index() {
        assert_eq!(mirror_file_path("/", "text/html"), "/index.html");
    }

    #[test]
    fn mirror_file_path_appends_html_extension() {
        assert_eq!(mirror_file_path("/c/d", "text/html"), "/c/d.html");
    }

    #[test]
    fn mirror_file_path_leaves_non_html_alone() {
        assert_eq!(mirror_file_path("/b.png", "image/png"), "/b.png");
    }

    #[test]
    fn relative_url_counts_slashes_in_current() {
        // spec.md scenario 6: page fetched from http://h/c/d, link /a/b
        // rewrites to "../a/b.html" under out/c/d.html.
        assert_eq!(relative_url("/a/b", "c/d"), "../a/b.html");
    }

    #[test]
    fn relative_url_leaves_non_rooted_links_alone_modulo_extension() {
        assert_eq!(relative_url("a/b", "c/d"), "a/b.html");
    }
}
