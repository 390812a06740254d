/// Named entities tex4ht emits that a strict XML reader rejects, with their
/// numeric character references.
const XML_UNSAFE_ENTITIES: [(&str, &str); 4] = [
    ("&ldquo;", "&#8220;"),
    ("&rdquo;", "&#8221;"),
    ("&lsquo;", "&#8216;"),
    ("&rsquo;", "&#8217;"),
];

/// Rewrite the curly-quote entities into character references so the raw
/// hypertext parses as XML. Runs on text, before parsing.
pub fn normalize_entities(raw: &str) -> String {
    let mut s = String::from(raw);
    for (named, numeric) in XML_UNSAFE_ENTITIES {
        if s.contains(named) {
            s = s.replace(named, numeric);
        }
    }
    s
}
