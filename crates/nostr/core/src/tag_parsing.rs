//! Lookup helpers over `Vec<Vec<String>>` tag lists.

pub fn tag_name(tag: &[String]) -> Option<&str> {
    tag.first().map(String::as_str)
}

pub fn tag_field(tag: &[String], index: usize) -> Option<&str> {
    tag.get(index).map(String::as_str)
}

pub fn is_tag(tag: &[String], name: &str) -> bool {
    matches!(tag_name(tag), Some(tag_name) if tag_name == name)
}

/// First tag with the given name that carries a value.
pub fn find_tag<'a>(tags: &'a [Vec<String>], name: &str) -> Option<&'a [String]> {
    tags.iter()
        .find(|tag| is_tag(tag, name) && tag_field(tag, 1).is_some())
        .map(Vec::as_slice)
}

pub fn find_tag_value<'a>(tags: &'a [Vec<String>], name: &str) -> Option<&'a str> {
    find_tag(tags, name).and_then(|tag| tag_field(tag, 1))
}

pub fn collect_tag_values(tags: &[Vec<String>], name: &str) -> Vec<String> {
    tags.iter()
        .filter(|tag| is_tag(tag, name))
        .filter_map(|tag| tag_field(tag, 1).map(str::to_owned))
        .collect()
}

/// Referenced event id (`e` tag).
pub fn referenced_event(tags: &[Vec<String>]) -> Option<&str> {
    find_tag_value(tags, "e")
}

/// Referenced pubkeys (`p` tags) in tag order.
pub fn referenced_pubkeys(tags: &[Vec<String>]) -> Vec<String> {
    collect_tag_values(tags, "p")
}

/// Builds a tag from string-like parts.
pub fn tag<I, S>(parts: I) -> Vec<String>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    parts.into_iter().map(Into::into).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn finds_first_valued_tag() {
        let tags = vec![
            tag(["e"]),
            tag(["e", "abc", "", "reply"]),
            tag(["p", "def"]),
            tag(["p", "123", "", "mention"]),
        ];

        assert_eq!(referenced_event(&tags), Some("abc"));
        assert_eq!(referenced_pubkeys(&tags), vec!["def", "123"]);
        assert_eq!(find_tag_value(&tags, "d"), None);
    }
}
