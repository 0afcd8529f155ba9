//! Version interpolation for artifact URLs.
//!
//! Manifests publish download locations as templates so that a version bump
//! only touches the `version` field. [`expand_url`] is a pure function; the
//! [`UrlTemplate`] newtype checks placeholder syntax when a manifest is
//! parsed so that expansion at execution time can only fail on the URL shape.
//!
//! Supported placeholders:
//!
//! | Placeholder              | `2.004`  | `1.2,345` |
//! |--------------------------|----------|-----------|
//! | `{version}`              | `2.004`  | `1.2,345` |
//! | `{version.major}`        | `2`      | `1`       |
//! | `{version.minor}`        | `004`    | `2`       |
//! | `{version.no_dots}`      | `2004`   | `12,345`  |
//! | `{version.before_comma}` | `2.004`  | `1.2`     |
//! | `{version.after_comma}`  | (empty)  | `345`     |

use super::error::{ManifestError, Result};
use super::version::Version;
use serde::{Deserialize, Serialize};
use std::fmt;

const SCHEMES: [&str; 3] = ["https", "http", "file"];

/// A URL template whose placeholders have been validated.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct UrlTemplate(String);

impl UrlTemplate {
    /// Return the raw template text.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Expand the template for `version`.
    ///
    /// # Errors
    ///
    /// Returns [`ManifestError::InvalidUrl`] when the expanded string is not
    /// an absolute URL with a supported scheme.
    pub fn expand(&self, version: &Version) -> Result<String> {
        expand_url(&self.0, version)
    }
}

impl TryFrom<&str> for UrlTemplate {
    type Error = ManifestError;

    fn try_from(value: &str) -> Result<Self> {
        render(value, |_| Some(String::new()))?;
        Ok(Self(value.to_owned()))
    }
}

impl TryFrom<String> for UrlTemplate {
    type Error = ManifestError;

    fn try_from(value: String) -> Result<Self> {
        render(&value, |_| Some(String::new()))?;
        Ok(Self(value))
    }
}

impl From<UrlTemplate> for String {
    fn from(value: UrlTemplate) -> Self {
        value.0
    }
}

impl fmt::Display for UrlTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Expand `template` for `version` and check that the result is an
/// absolute URL.
///
/// # Errors
///
/// Returns [`ManifestError::InvalidUrlTemplate`] for unknown placeholders or
/// unbalanced braces, and [`ManifestError::InvalidUrl`] when the expansion is
/// not an absolute `http`, `https`, or `file` URL.
///
/// # Examples
///
/// ```
/// use caskwright_installer::manifest::{Version, expand_url};
///
/// let version = Version::try_from("2.004").expect("valid version");
/// let url = expand_url(
///     "http://www.gust.org.pl/projects/e-foundry/latin-modern/download/lm{version}otf.zip",
///     &version,
/// )
/// .expect("template expands");
/// assert!(url.ends_with("/lm2.004otf.zip"));
/// ```
pub fn expand_url(template: &str, version: &Version) -> Result<String> {
    let url = render(template, |name| placeholder_value(name, version))?;
    validate_absolute_url(&url)?;
    Ok(url)
}

fn placeholder_value(name: &str, version: &Version) -> Option<String> {
    let value = match name {
        "version" => version.as_str().to_owned(),
        "version.major" => version.major().to_owned(),
        "version.minor" => version.minor().to_owned(),
        "version.no_dots" => version.no_dots(),
        "version.before_comma" => version.before_comma().to_owned(),
        "version.after_comma" => version.after_comma().to_owned(),
        _ => return None,
    };
    Some(value)
}

/// Substitute every `{name}` in `template` using `lookup`.
fn render(template: &str, lookup: impl Fn(&str) -> Option<String>) -> Result<String> {
    let invalid = |reason: String| ManifestError::InvalidUrlTemplate {
        template: template.to_owned(),
        reason,
    };

    let mut output = String::with_capacity(template.len());
    let mut rest = template;
    while let Some(open) = rest.find(['{', '}']) {
        let (literal, tail) = rest.split_at(open);
        output.push_str(literal);
        if tail.starts_with('}') {
            return Err(invalid("unmatched '}'".to_owned()));
        }
        let Some(close) = tail.find('}') else {
            return Err(invalid("unterminated placeholder".to_owned()));
        };
        let name = tail.get(1..close).unwrap_or_default();
        let value = lookup(name).ok_or_else(|| invalid(format!("unknown placeholder {{{name}}}")))?;
        output.push_str(&value);
        rest = tail.get(close + 1..).unwrap_or_default();
    }
    output.push_str(rest);
    Ok(output)
}

fn validate_absolute_url(url: &str) -> Result<()> {
    let invalid = |reason: &str| ManifestError::InvalidUrl {
        url: url.to_owned(),
        reason: reason.to_owned(),
    };

    let (scheme, remainder) = url
        .split_once("://")
        .ok_or_else(|| invalid("missing scheme"))?;
    if !SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) {
        return Err(invalid("scheme must be http, https, or file"));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(invalid("URL must not contain whitespace"));
    }
    let authority = remainder.split(['/', '?', '#']).next().unwrap_or_default();
    if scheme.eq_ignore_ascii_case("file") {
        if !remainder.contains('/') {
            return Err(invalid("file URL must carry an absolute path"));
        }
    } else if authority.is_empty() {
        return Err(invalid("URL must name a host"));
    }
    Ok(())
}
