//! Output formatting for `caskwright list`.
//!
//! Installed records are shown either as an indented human listing or as
//! JSON for scripting.

use crate::state::InstalledRecord;
use serde::Serialize;

/// Format installed records for human-readable output.
///
/// # Examples
///
/// ```
/// use caskwright_installer::list_output::format_human;
///
/// let output = format_human(&[]);
/// assert!(output.contains("Nothing installed"));
/// ```
#[must_use]
pub fn format_human(records: &[InstalledRecord]) -> String {
    if records.is_empty() {
        return String::from(
            "Nothing installed.\n\nRun `caskwright install <MANIFEST>` to install a package.",
        );
    }

    let mut output = String::from("Installed packages:\n");

    for record in records {
        let count = record.files.len();
        let noun = if count == 1 { "file" } else { "files" };
        output.push_str(&format!(
            "\n{} {} ({count} {noun}, installed at {})\n",
            record.id,
            record.version,
            record.installed_at.unix_seconds()
        ));
        for file in &record.files {
            output.push_str(&format!("  - {file}\n"));
        }
    }

    output
}

/// Format installed records as JSON.
///
/// # Examples
///
/// ```
/// use caskwright_installer::list_output::format_json;
///
/// let json = format_json(&[]);
/// assert!(json.contains("\"packages\""));
/// ```
#[must_use]
pub fn format_json(records: &[InstalledRecord]) -> String {
    let json_data = InstalledJson {
        packages: records.iter().map(PackageEntry::from).collect(),
    };

    serde_json::to_string_pretty(&json_data).unwrap_or_else(|_| "{}".to_owned())
}

/// JSON-serialisable listing of installed packages.
#[derive(Debug, Serialize)]
pub struct InstalledJson<'a> {
    /// One entry per installed identifier.
    pub packages: Vec<PackageEntry<'a>>,
}

/// JSON entry for one installed package.
#[derive(Debug, Serialize)]
pub struct PackageEntry<'a> {
    /// Manifest identifier.
    pub id: &'a str,
    /// Installed version.
    pub version: &'a str,
    /// Installation time in Unix seconds.
    pub installed_at: u64,
    /// Installed file paths.
    pub files: Vec<&'a str>,
}

impl<'a> From<&'a InstalledRecord> for PackageEntry<'a> {
    fn from(record: &'a InstalledRecord) -> Self {
        Self {
            id: record.id.as_str(),
            version: record.version.as_str(),
            installed_at: record.installed_at.unix_seconds(),
            files: record.files.iter().map(|file| file.as_str()).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::installed_record;

    fn sample_records() -> Vec<InstalledRecord> {
        vec![installed_record(
            "font-latin-modern",
            "2.004",
            &["/fonts/lmroman10-regular.otf", "/fonts/lmmono10-regular.otf"],
        )]
    }

    #[test]
    fn format_human_empty_shows_hint() {
        let output = format_human(&[]);
        assert!(output.contains("Nothing installed"));
        assert!(output.contains("caskwright install"));
    }

    #[test]
    fn format_human_lists_packages_and_files() {
        let output = format_human(&sample_records());

        assert!(output.contains("Installed packages:"));
        assert!(output.contains("font-latin-modern 2.004 (2 files, installed at 1700000000)"));
        assert!(output.contains("  - /fonts/lmroman10-regular.otf"));
    }

    #[test]
    fn format_json_empty_has_empty_packages() {
        let json = format_json(&[]);

        assert!(json.contains("\"packages\": []"));
    }

    #[test]
    fn format_json_includes_all_fields() {
        let json = format_json(&sample_records());

        let parsed: serde_json::Value = serde_json::from_str(&json).expect("should be valid JSON");
        let package = parsed
            .get("packages")
            .and_then(|packages| packages.get(0))
            .expect("one package");
        assert_eq!(package.get("id"), Some(&serde_json::json!("font-latin-modern")));
        assert_eq!(package.get("version"), Some(&serde_json::json!("2.004")));
        assert_eq!(package.get("installed_at"), Some(&serde_json::json!(1_700_000_000)));
        assert_eq!(
            package.get("files").and_then(serde_json::Value::as_array).map(Vec::len),
            Some(2)
        );
    }
}
