//! `key=value` query-string encoding.

use crate::codec::params::Params;

/// Encode parameters as `a=1&b=x+y`, without the leading `?`.
pub fn encode(params: &Params) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(params.iter())
        .finish()
}

/// Decode a search string, with or without its leading `?`.
///
/// When a key repeats, the last occurrence wins.
pub fn decode(search: &str) -> Params {
    let search = search.strip_prefix('?').unwrap_or(search);
    form_urlencoded::parse(search.as_bytes())
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_escapes_reserved_characters() {
        let mut params = Params::new();
        params.insert("q".into(), "a b&c".into());
        params.insert("bar".into(), "4".into());
        assert_eq!(encode(&params), "bar=4&q=a+b%26c");
    }

    #[test]
    fn decode_strips_question_mark() {
        let params = decode("?bar=4&q=a+b%26c");
        assert_eq!(params.get("bar").map(String::as_str), Some("4"));
        assert_eq!(params.get("q").map(String::as_str), Some("a b&c"));
    }

    #[test]
    fn decode_empty_search() {
        assert!(decode("").is_empty());
        assert!(decode("?").is_empty());
    }
}
