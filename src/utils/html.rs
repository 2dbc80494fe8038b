use url::Url;
use validator::ValidationError;

/// Clean user-supplied text (descriptions, comments, bios) with ammonia.
///
/// Whitelist-based: safe inline tags survive, `<script>`, `<iframe>` and
/// event-handler attributes are stripped together with their content.
pub fn clean_html(input: &str) -> String {
    ammonia::clean(input)
}

/// Same as [`clean_html`] but keeps `None` and drops values that end up empty.
pub fn clean_optional(input: Option<String>) -> Option<String> {
    input
        .map(|text| clean_html(text.trim()))
        .filter(|text| !text.is_empty())
}

/// Media references must be absolute http(s) URLs with a host.
pub fn validate_media_url(value: &str) -> Result<(), ValidationError> {
    let parsed = Url::parse(value).map_err(|_| ValidationError::new("invalid_media_url"))?;

    match parsed.scheme() {
        "http" | "https" if parsed.host_str().is_some() => Ok(()),
        _ => Err(ValidationError::new("invalid_media_url")),
    }
}

pub fn validate_media_urls(values: &[String]) -> Result<(), ValidationError> {
    values.iter().try_for_each(|value| validate_media_url(value))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_scripts() {
        assert_eq!(clean_html("hi<script>alert(1)</script>"), "hi");
    }

    #[test]
    fn empty_after_cleaning_is_none() {
        assert_eq!(clean_optional(Some("   ".to_string())), None);
        assert_eq!(clean_optional(Some(" campus ".to_string())), Some("campus".to_string()));
    }

    #[test]
    fn media_urls() {
        assert!(validate_media_url("https://cdn.campus.test/a.jpg").is_ok());
        assert!(validate_media_url("ftp://cdn.campus.test/a.jpg").is_err());
        assert!(validate_media_url("not a url").is_err());
    }
}
