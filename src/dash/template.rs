//! `$identifier$` substitution for SegmentTemplate URI templates.
//
// From https://dashif.org/docs/DASH-IF-IOP-v4.3.pdf: "only %0[width]d is permitted and no other
// identifiers" -- though real-world templates also use the o/x/X radix letters, so those are
// accepted too. Instead of pulling in a printf reimplementation we expand the format directly.
//
// Example template: "$RepresentationID$/$Number%06d$.m4s"

use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::warn;

static TEMPLATE_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$(RepresentationID|Number|Bandwidth|Time|)(?:%0(\d+)([diuoxX]))?\$").unwrap()
});

/// The values available for substitution. `None` values leave the token in place (with a
/// warning), which callers surface as a malformed-URL fetch error rather than a parse failure.
#[derive(Debug, Default, Clone)]
pub struct TemplateValues<'a> {
    pub representation_id: Option<&'a str>,
    pub number: Option<u64>,
    pub bandwidth: Option<u64>,
    pub time: Option<u64>,
}

/// Expand every `$...$` token in `template`. `$$` is an escaped dollar sign.
pub fn fill(template: &str, values: &TemplateValues) -> String {
    TEMPLATE_REGEX
        .replace_all(template, |caps: &Captures| {
            let token = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
            if token.is_empty() {
                // "$$" escape
                return "$".to_string();
            }
            let width: Option<usize> = caps.get(2).map(|m| m.as_str().parse().unwrap());
            let radix = caps.get(3).map(|m| m.as_str()).unwrap_or("d");

            if token == "RepresentationID" {
                if width.is_some() {
                    warn!("RepresentationID does not accept a width specifier; ignoring it");
                }
                return match values.representation_id {
                    Some(id) => id.to_string(),
                    None => preserve(caps),
                };
            }

            let value = match token {
                "Number" => values.number,
                "Bandwidth" => values.bandwidth,
                "Time" => values.time,
                _ => None,
            };
            let Some(value) = value else {
                return preserve(caps);
            };

            let digits = match radix {
                "o" => format!("{value:o}"),
                "x" => format!("{value:x}"),
                "X" => format!("{value:X}"),
                // d, i, u are all plain decimal
                _ => format!("{value}"),
            };
            match width {
                Some(w) => format!("{digits:0>w$}"),
                None => digits,
            }
        })
        .to_string()
}

fn preserve(caps: &Captures) -> String {
    let literal = caps.get(0).unwrap().as_str();
    warn!(token = literal, "no substitution available for template token");
    literal.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn values() -> TemplateValues<'static> {
        TemplateValues {
            representation_id: Some("r1"),
            number: Some(7),
            bandwidth: Some(1000),
            time: Some(3600),
        }
    }

    #[test]
    fn test_fill() {
        assert_eq!(fill("$Number%05d$-$Time$.m4s", &values()), "00007-3600.m4s");
        assert_eq!(
            fill("$RepresentationID$/seg_$Number$.m4s", &values()),
            "r1/seg_7.m4s"
        );
        assert_eq!(fill("$Bandwidth$/x", &values()), "1000/x");
    }

    #[test]
    fn test_radix_letters() {
        let v = TemplateValues {
            number: Some(255),
            ..Default::default()
        };
        assert_eq!(fill("$Number%02x$", &v), "ff");
        assert_eq!(fill("$Number%04X$", &v), "00FF");
        assert_eq!(fill("$Number%04o$", &v), "0377");
        assert_eq!(fill("$Number%04u$", &v), "0255");
    }

    #[test]
    fn test_missing_value_preserves_token() {
        let v = TemplateValues::default();
        assert_eq!(fill("seg_$Number$.m4s", &v), "seg_$Number$.m4s");
    }

    #[test]
    fn test_representation_id_rejects_width() {
        assert_eq!(fill("$RepresentationID%05d$.m4s", &values()), "r1.m4s");
    }

    #[test]
    fn test_dollar_escape() {
        assert_eq!(fill("a$$b", &values()), "a$b");
    }
}
