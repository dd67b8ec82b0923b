// Copyright 2024 Wladimir Palant
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
// http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Tokenizers turning raw host and path strings into segment lists.

/// A single host label or path segment.
pub type Token = Vec<u8>;

/// Splits a host name into its labels, rightmost label first.
///
/// The reversed order is what host patterns are matched against, so that a
/// trailing wildcard in an authored pattern naturally absorbs subdomains. An
/// empty host produces an empty list and a single trailing dot is tolerated.
///
/// Returns `None` if the host contains an empty label anywhere else, e.g. for
/// `a..b` or `.a`.
pub fn split_host(host: &(impl AsRef<[u8]> + ?Sized)) -> Option<Vec<Token>> {
    let host = host.as_ref();
    if host.is_empty() {
        return Some(Vec::new());
    }

    let labels: Vec<&[u8]> = host.split(|b| *b == b'.').collect();
    let mut tokens = Vec::with_capacity(labels.len());
    for (i, label) in labels.iter().enumerate() {
        if label.is_empty() {
            if i + 1 == labels.len() {
                continue;
            }
            return None;
        }
        tokens.push(label.to_vec());
    }
    tokens.reverse();
    Some(tokens)
}

/// Splits a request path into percent-decoded segments.
///
/// The path has to begin with a slash. Empty segments in the middle are
/// preserved, a trailing slash produces no segment.
///
/// Returns `None` if the path doesn't begin with a slash or contains an
/// invalid percent escape.
pub fn split_path(path: &(impl AsRef<[u8]> + ?Sized)) -> Option<Vec<Token>> {
    let path = path.as_ref();
    if path.first() != Some(&b'/') {
        return None;
    }

    let path = &path[1..];
    if path.is_empty() {
        return Some(Vec::new());
    }

    let segments: Vec<&[u8]> = path.split(|b| *b == b'/').collect();
    let mut tokens = Vec::with_capacity(segments.len());
    for (i, segment) in segments.iter().enumerate() {
        if segment.is_empty() && i + 1 == segments.len() {
            break;
        }
        tokens.push(urldecode(segment)?);
    }
    Some(tokens)
}

/// Decodes `%XX` escapes and `+` within a single path segment.
fn urldecode(segment: &[u8]) -> Option<Token> {
    let mut decoded = Vec::with_capacity(segment.len());
    let mut i = 0;
    while i < segment.len() {
        match segment[i] {
            b'%' => {
                let high = hex_digit(*segment.get(i + 1)?)?;
                let low = hex_digit(*segment.get(i + 2)?)?;
                decoded.push(high << 4 | low);
                i += 3;
            }
            b'+' => {
                decoded.push(b' ');
                i += 1;
            }
            b => {
                decoded.push(b);
                i += 1;
            }
        }
    }
    Some(decoded)
}

fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(list: &[&str]) -> Option<Vec<Token>> {
        Some(list.iter().map(|s| s.as_bytes().to_vec()).collect())
    }

    #[test]
    fn host_splitting() {
        assert_eq!(split_host(""), tokens(&[]));
        assert_eq!(split_host("localhost"), tokens(&["localhost"]));
        assert_eq!(split_host("a.b.c"), tokens(&["c", "b", "a"]));
        assert_eq!(split_host("a.b.c.d"), tokens(&["d", "c", "b", "a"]));
        assert_eq!(
            split_host("www.example.com"),
            tokens(&["com", "example", "www"])
        );
        assert_eq!(split_host("example.com."), tokens(&["com", "example"]));
    }

    #[test]
    fn host_empty_labels() {
        assert_eq!(split_host("."), None);
        assert_eq!(split_host(".example.com"), None);
        assert_eq!(split_host("example..com"), None);
        assert_eq!(split_host("example.com.."), None);
    }

    #[test]
    fn path_splitting() {
        assert_eq!(split_path("/"), tokens(&[]));
        assert_eq!(split_path("/abc"), tokens(&["abc"]));
        assert_eq!(
            split_path("/path/to/resource"),
            tokens(&["path", "to", "resource"])
        );
        assert_eq!(
            split_path("/path/to/resource/"),
            tokens(&["path", "to", "resource"])
        );
        assert_eq!(split_path("/a//b"), tokens(&["a", "", "b"]));
        assert_eq!(split_path("//a"), tokens(&["", "a"]));
    }

    #[test]
    fn path_requires_slash() {
        assert_eq!(split_path(""), None);
        assert_eq!(split_path("abc"), None);
        assert_eq!(split_path("*"), None);
    }

    #[test]
    fn path_decoding() {
        assert_eq!(split_path("/hello%21"), tokens(&["hello!"]));
        assert_eq!(split_path("/hello+world"), tokens(&["hello world"]));
        assert_eq!(split_path("/a%2Fb"), tokens(&["a/b"]));
        assert_eq!(split_path("/%e2%82%ac"), tokens(&["€"]));
        assert_eq!(split_path("/bad%"), None);
        assert_eq!(split_path("/bad%2"), None);
        assert_eq!(split_path("/bad%zz"), None);
    }
}
