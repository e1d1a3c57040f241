//! Error types for rule parsing and conversion

/// Broad category of a [`RuleError`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The rule text is malformed or uses an unsupported construct.
    Parse,
    /// The converted rule violates a Safari content blocker constraint.
    Validation,
}

/// Error raised for a single rule. A rule error never aborts a conversion.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    // Parse errors
    #[error("Unsupported rule: {0}")]
    Unsupported(String),
    #[error("Unknown option: {0}")]
    UnknownOption(String),
    #[error("{0} cannot be applied to this type of rule")]
    OptionNotApplicable(String),
    #[error("$replace rules are ignored")]
    ReplaceNotSupported,
    #[error("Invalid $CSP rule: CSP directive must not be empty")]
    EmptyCspDirective,
    #[error("Forbidden CSP directive: {0}")]
    ForbiddenCspDirective(String),
    #[error("Illegal regexp rule: {0}")]
    IllegalRegexp(String),
    #[error("Too wide basic rule: {0}")]
    TooWideRule(String),
    #[error("Empty CSS selector")]
    EmptySelector,
    #[error("Invalid CSS injection: {0}")]
    InvalidCssInjection(String),
    #[error("Invalid scriptlet: {0}")]
    InvalidScriptlet(String),

    // Validation errors
    #[error("CSP rules are not supported")]
    CspNotSupported,
    #[error("${0} content type is not yet supported")]
    UnsupportedContentType(&'static str),
    #[error("Safari doesn't support {0} in regular expressions")]
    UnsafeRegexp(&'static str),
    #[error("Safari does not support both permitted and restricted domains")]
    MixedDomains,
    #[error("Document blocking rules are allowed only along with third-party or if-domain modifiers")]
    UnrestrictedDocumentBlocking,
    #[error("Urls are not allowed in css styles")]
    UrlInCss,
    #[error("Composite rules are converted through their parts")]
    CompositeRule,
}

impl RuleError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Unsupported(_)
            | Self::UnknownOption(_)
            | Self::OptionNotApplicable(_)
            | Self::ReplaceNotSupported
            | Self::EmptyCspDirective
            | Self::ForbiddenCspDirective(_)
            | Self::IllegalRegexp(_)
            | Self::TooWideRule(_)
            | Self::EmptySelector
            | Self::InvalidCssInjection(_)
            | Self::InvalidScriptlet(_) => ErrorKind::Parse,
            Self::CspNotSupported
            | Self::UnsupportedContentType(_)
            | Self::UnsafeRegexp(_)
            | Self::MixedDomains
            | Self::UnrestrictedDocumentBlocking
            | Self::UrlInCss
            | Self::CompositeRule => ErrorKind::Validation,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_name_the_problem() {
        assert_eq!(RuleError::UnknownOption("NETWORK".into()).to_string(), "Unknown option: NETWORK");
        assert_eq!(
            RuleError::UnsupportedContentType("object").to_string(),
            "$object content type is not yet supported"
        );
        assert_eq!(
            RuleError::UnsafeRegexp("'{digit}'").to_string(),
            "Safari doesn't support '{digit}' in regular expressions"
        );
    }

    #[test]
    fn kinds() {
        assert_eq!(RuleError::TooWideRule("/.*/".into()).kind(), ErrorKind::Parse);
        assert_eq!(RuleError::MixedDomains.kind(), ErrorKind::Validation);
    }
}
