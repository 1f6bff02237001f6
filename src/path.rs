use std::borrow::Cow;

/// Returns the canonical form of `path`, eliminating `.` and `..` elements
/// and collapsing repeated slashes.
///
/// The following rules are applied iteratively until no further processing
/// can be done:
///
/// 1. Replace multiple slashes with a single slash.
/// 2. Eliminate each `.` path name element (the current directory).
/// 3. Eliminate each inner `..` path name element (the parent directory)
///    along with the non-`..` element that precedes it.
/// 4. Eliminate `..` elements that begin a rooted path, that is, replace
///    `/..` by `/` at the beginning of a path.
///
/// The returned path always begins with a slash, and a meaningful trailing
/// slash is preserved. If the input is already clean, it is returned as-is
/// without allocating.
///
/// ```
/// use pathrouter::clean;
///
/// assert_eq!(clean("/abc//def"), "/abc/def");
/// assert_eq!(clean("/abc/def/.."), "/abc");
/// assert_eq!(clean("FOO"), "/FOO");
/// assert_eq!(clean(""), "/");
/// ```
pub fn clean(path: &str) -> Cow<'_, str> {
    if path.is_empty() {
        return Cow::Borrowed("/");
    }

    let p = path.as_bytes();
    let n = p.len();

    // The output is written lazily: while it would be byte-identical to the
    // input prefix, no buffer exists and `w` indexes into the input itself.
    let mut buf: Option<Vec<u8>> = None;

    // r is the index of the next byte to process, w of the next byte to write
    let mut r = 1;
    let mut w = 1;

    if p[0] != b'/' {
        r = 0;
        let mut b = vec![0; n + 1];
        b[0] = b'/';
        buf = Some(b);
    }

    let mut trailing = n > 1 && p[n - 1] == b'/';

    while r < n {
        match p[r] {
            // empty path element, trailing slash is added below
            b'/' => r += 1,
            // . element
            b'.' if r + 1 == n => {
                trailing = true;
                r += 1;
            }
            b'.' if p[r + 1] == b'/' => r += 2,
            // .. element: remove to the last /
            b'.' if p[r + 1] == b'.' && (r + 2 == n || p[r + 2] == b'/') => {
                r += 3;
                if w > 1 {
                    w -= 1;
                    match &buf {
                        None => {
                            while w > 1 && p[w] != b'/' {
                                w -= 1;
                            }
                        }
                        Some(b) => {
                            while w > 1 && b[w] != b'/' {
                                w -= 1;
                            }
                        }
                    }
                }
            }
            _ => {
                // real path element: add a slash if needed
                if w > 1 {
                    buf_app(&mut buf, p, w, b'/');
                    w += 1;
                }
                while r < n && p[r] != b'/' {
                    buf_app(&mut buf, p, w, p[r]);
                    w += 1;
                    r += 1;
                }
            }
        }
    }

    // re-append the trailing slash
    if trailing && w > 1 {
        buf_app(&mut buf, p, w, b'/');
        w += 1;
    }

    match buf {
        None => Cow::Borrowed(&path[..w]),
        Some(mut b) => {
            b.truncate(w);
            // only whole elements of the input were copied, so the buffer
            // stays valid UTF-8
            Cow::Owned(String::from_utf8(b).expect("clean output is valid utf-8"))
        }
    }
}

// Writes a byte to the lazily allocated buffer. As long as the output matches
// the input at the write position the buffer stays unallocated.
fn buf_app(buf: &mut Option<Vec<u8>>, p: &[u8], w: usize, c: u8) {
    let b = match buf {
        Some(b) => b,
        None => {
            if p[w] == c {
                return;
            }
            let mut b = vec![0; p.len()];
            b[..w].copy_from_slice(&p[..w]);
            buf.insert(b)
        }
    };
    b[w] = c;
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLEAN_TESTS: &[(&str, &str)] = &[
        // already clean
        ("/", "/"),
        ("/abc", "/abc"),
        ("/a/b/c", "/a/b/c"),
        ("/abc/", "/abc/"),
        ("/a/b/c/", "/a/b/c/"),
        // missing root
        ("", "/"),
        ("a/", "/a/"),
        ("abc", "/abc"),
        ("abc/def", "/abc/def"),
        ("a/b/c", "/a/b/c"),
        // remove doubled slash
        ("//", "/"),
        ("/abc//", "/abc/"),
        ("/abc/def//", "/abc/def/"),
        ("/abc//def//ghi", "/abc/def/ghi"),
        ("//abc", "/abc"),
        ("///abc", "/abc"),
        ("//abc//", "/abc/"),
        // remove . elements
        (".", "/"),
        ("./", "/"),
        ("/abc/./def", "/abc/def"),
        ("/./abc/def", "/abc/def"),
        ("/abc/.", "/abc/"),
        // remove .. elements
        ("..", "/"),
        ("../", "/"),
        ("../../", "/"),
        ("../..", "/"),
        ("../../abc", "/abc"),
        ("/abc/def/ghi/../jkl", "/abc/def/jkl"),
        ("/abc/def/../ghi/../jkl", "/abc/jkl"),
        ("/abc/def/..", "/abc"),
        ("/abc/def/../..", "/"),
        ("/abc/def/../../..", "/"),
        ("/abc/def/../../../ghi/jkl/../../../mno", "/mno"),
        // combinations
        ("abc/./../def", "/def"),
        ("abc//./../def", "/def"),
        ("abc/../../././../def", "/def"),
    ];

    #[test]
    fn test_clean() {
        for (input, expected) in CLEAN_TESTS {
            assert_eq!(clean(input), *expected, "clean({input:?})");
        }
    }

    #[test]
    fn test_clean_idempotent() {
        for (_, cleaned) in CLEAN_TESTS {
            assert_eq!(clean(cleaned), *cleaned, "clean({cleaned:?})");
        }
    }

    #[test]
    fn test_clean_borrows_when_unchanged() {
        for input in ["/", "/abc", "/a/b/c/", "/no/change"] {
            assert!(matches!(clean(input), Cow::Borrowed(_)), "clean({input:?})");
        }
        assert!(matches!(clean("//a"), Cow::Owned(_)));
    }
}
