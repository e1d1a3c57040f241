//! Rule-level type definitions for the converter
//!
//! The bit masks mirror the modifiers accepted by URL filter rules and are
//! shared between the parser (which sets them) and the emitter (which maps
//! them onto Safari trigger fields).

// =============================================================================
// Content Types (bit mask for $type modifiers)
// =============================================================================

bitflags::bitflags! {
    /// Content type mask of a URL filter rule.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ContentType: u32 {
        const OTHER = 1 << 0;
        const SCRIPT = 1 << 1;
        const IMAGE = 1 << 2;
        const STYLESHEET = 1 << 3;
        const OBJECT = 1 << 4;
        const SUBDOCUMENT = 1 << 5;  // iframe/frame
        const XMLHTTPREQUEST = 1 << 6;
        const OBJECT_SUBREQUEST = 1 << 7;
        const MEDIA = 1 << 8;
        const FONT = 1 << 9;
        const WEBSOCKET = 1 << 10;
        const WEBRTC = 1 << 11;
        const DOCUMENT = 1 << 12;    // main document

        /// All content types
        const ALL = Self::OTHER.bits()
            | Self::SCRIPT.bits()
            | Self::IMAGE.bits()
            | Self::STYLESHEET.bits()
            | Self::OBJECT.bits()
            | Self::SUBDOCUMENT.bits()
            | Self::XMLHTTPREQUEST.bits()
            | Self::OBJECT_SUBREQUEST.bits()
            | Self::MEDIA.bits()
            | Self::FONT.bits()
            | Self::WEBSOCKET.bits()
            | Self::WEBRTC.bits()
            | Self::DOCUMENT.bits();
    }
}

impl ContentType {
    /// Parse a content type modifier name (without the `~` prefix).
    pub fn from_option_name(name: &str) -> Option<Self> {
        let ty = match name {
            "other" => Self::OTHER,
            "script" => Self::SCRIPT,
            "image" => Self::IMAGE,
            "stylesheet" => Self::STYLESHEET,
            "object" => Self::OBJECT,
            "subdocument" => Self::SUBDOCUMENT,
            "xmlhttprequest" => Self::XMLHTTPREQUEST,
            "object-subrequest" | "object_subrequest" => Self::OBJECT_SUBREQUEST,
            "media" => Self::MEDIA,
            "font" => Self::FONT,
            "websocket" => Self::WEBSOCKET,
            "webrtc" => Self::WEBRTC,
            "document" => Self::DOCUMENT,
            _ => return None,
        };
        Some(ty)
    }
}

// =============================================================================
// Rule Options (bit mask for behavior modifiers)
// =============================================================================

bitflags::bitflags! {
    /// Behavior modifiers of a URL filter rule.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct RuleOptions: u32 {
        /// $elemhide - disables element hiding on the page
        const ELEMHIDE = 1 << 0;
        /// $third-party - load type restriction
        const THIRD_PARTY = 1 << 1;
        /// $generichide - disables generic element hiding
        const GENERICHIDE = 1 << 2;
        /// $genericblock - disables generic URL blocking
        const GENERICBLOCK = 1 << 3;
        /// $jsinject - disables script injection
        const JSINJECT = 1 << 4;
        /// $urlblock - disables URL blocking
        const URLBLOCK = 1 << 5;
        /// $content - disables content (HTML) filtering
        const CONTENT = 1 << 6;
        /// $popup
        const BLOCK_POPUPS = 1 << 7;
        /// $empty
        const EMPTY_RESPONSE = 1 << 8;
        /// $match-case
        const MATCH_CASE = 1 << 9;
        /// $csp
        const CSP_RULE = 1 << 10;

        /// Options set by `$document` on an exception rule
        const DOCUMENT_WHITELIST = Self::ELEMHIDE.bits()
            | Self::URLBLOCK.bits()
            | Self::JSINJECT.bits()
            | Self::CONTENT.bits();
        /// Options that only exception rules may enable
        const WHITELIST_ONLY = Self::ELEMHIDE.bits()
            | Self::JSINJECT.bits()
            | Self::CONTENT.bits()
            | Self::GENERICHIDE.bits()
            | Self::GENERICBLOCK.bits();
        /// Options that only blocking rules may enable
        const BLACKLIST_ONLY = Self::EMPTY_RESPONSE.bits();
        /// Options that restrict the rule to the document content type
        const DOCUMENT_LEVEL = Self::JSINJECT.bits()
            | Self::ELEMHIDE.bits()
            | Self::CONTENT.bits()
            | Self::URLBLOCK.bits()
            | Self::BLOCK_POPUPS.bits()
            | Self::GENERICBLOCK.bits()
            | Self::GENERICHIDE.bits();
    }
}

// =============================================================================
// Rule Markers
// =============================================================================

/// Which rule family a marker introduces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    Css,
    Script,
}

/// A cosmetic or script rule separator such as `##` or `#@%#`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuleMarker {
    pub text: &'static str,
    pub kind: MarkerKind,
    /// `@` - exception marker
    pub exception: bool,
    /// `?` - extended CSS marker
    pub extended: bool,
    /// `$` - CSS injection marker
    pub inject: bool,
}

const fn css(text: &'static str, exception: bool, extended: bool, inject: bool) -> RuleMarker {
    RuleMarker { text, kind: MarkerKind::Css, exception, extended, inject }
}

const fn script(text: &'static str, exception: bool) -> RuleMarker {
    RuleMarker { text, kind: MarkerKind::Script, exception, extended: false, inject: false }
}

/// Known markers, longest first so that prefixes never shadow longer markers.
pub const RULE_MARKERS: [RuleMarker; 10] = [
    css("#@$?#", true, true, true),
    css("#@$#", true, false, true),
    css("#@?#", true, true, false),
    css("#$?#", false, true, true),
    script("#@%#", true),
    css("#@#", true, false, false),
    css("#?#", false, true, false),
    css("#$#", false, false, true),
    script("#%#", false),
    css("##", false, false, false),
];

/// Find the marker of a cosmetic or script rule.
///
/// Markers are only looked for at the first `#` of the rule text. Returns
/// the byte index of the marker together with its description.
pub fn find_rule_marker(rule_text: &str) -> Option<(usize, &'static RuleMarker)> {
    let start = rule_text.find('#')?;
    let tail = &rule_text[start..];
    RULE_MARKERS
        .iter()
        .find(|marker| tail.starts_with(marker.text))
        .map(|marker| (start, marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_covers_every_type() {
        assert_eq!(ContentType::ALL, ContentType::all());
        assert!(ContentType::ALL.contains(ContentType::DOCUMENT));
    }

    #[test]
    fn test_content_type_names() {
        assert_eq!(ContentType::from_option_name("image"), Some(ContentType::IMAGE));
        assert_eq!(
            ContentType::from_option_name("object-subrequest"),
            Some(ContentType::OBJECT_SUBREQUEST)
        );
        assert_eq!(ContentType::from_option_name("network"), None);
    }

    #[test]
    fn test_option_groups() {
        assert!(RuleOptions::WHITELIST_ONLY.contains(RuleOptions::GENERICHIDE));
        assert!(!RuleOptions::WHITELIST_ONLY.contains(RuleOptions::DOCUMENT_WHITELIST));
        assert!(RuleOptions::DOCUMENT_LEVEL.contains(RuleOptions::BLOCK_POPUPS));
    }

    #[test]
    fn test_find_rule_marker_prefers_longest() {
        let (idx, marker) = find_rule_marker("example.org#@$?#.banner { display: none }").unwrap();
        assert_eq!(idx, 11);
        assert_eq!(marker.text, "#@$?#");
        assert!(marker.exception && marker.extended && marker.inject);

        let (_, marker) = find_rule_marker("example.org#@#.banner").unwrap();
        assert_eq!(marker.text, "#@#");

        let (_, marker) = find_rule_marker("example.org#@%#window.x = 1;").unwrap();
        assert_eq!(marker.kind, MarkerKind::Script);
        assert!(marker.exception);

        let (idx, marker) = find_rule_marker("###banner").unwrap();
        assert_eq!(idx, 0);
        assert_eq!(marker.text, "##");
    }

    #[test]
    fn test_find_rule_marker_none() {
        assert!(find_rule_marker("||example.org^").is_none());
        assert!(find_rule_marker("||example.org/page#anchor").is_none());
    }
}
