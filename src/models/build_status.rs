//! Build status values shared by images, commits, installers, repos and
//! update transactions, and the rule that folds sub-statuses into an
//! image's final status.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a build entity. `Success` and `Error` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum BuildStatus {
    Created,
    Building,
    Success,
    Error,
}

impl BuildStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildStatus::Created => "CREATED",
            BuildStatus::Building => "BUILDING",
            BuildStatus::Success => "SUCCESS",
            BuildStatus::Error => "ERROR",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "CREATED" => Some(BuildStatus::Created),
            "BUILDING" => Some(BuildStatus::Building),
            "SUCCESS" => Some(BuildStatus::Success),
            "ERROR" => Some(BuildStatus::Error),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildStatus::Success | BuildStatus::Error)
    }
}

impl std::fmt::Display for BuildStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Read a persisted status column. Unknown values are treated as `Error`
/// so that a corrupted row can never be reported as a success.
pub fn status_of(raw: &str) -> BuildStatus {
    BuildStatus::parse(raw).unwrap_or(BuildStatus::Error)
}

/// Artifacts an image build can be asked to produce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputType {
    Commit,
    Installer,
}

impl OutputType {
    pub fn as_str(&self) -> &'static str {
        match self {
            OutputType::Commit => "commit",
            OutputType::Installer => "installer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "commit" => Some(OutputType::Commit),
            "installer" => Some(OutputType::Installer),
            _ => None,
        }
    }
}

impl std::fmt::Display for OutputType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Final image status: SUCCESS iff every requested output succeeded.
///
/// The commit is always required since every image owns one and the
/// installer is built from it. A requested installer that was never
/// created counts as failed.
pub fn final_image_status(
    output_types: &[OutputType],
    commit: BuildStatus,
    installer: Option<BuildStatus>,
) -> BuildStatus {
    if commit != BuildStatus::Success {
        return BuildStatus::Error;
    }

    if output_types.contains(&OutputType::Installer) && installer != Some(BuildStatus::Success) {
        return BuildStatus::Error;
    }

    BuildStatus::Success
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trips_through_strings() {
        for status in [
            BuildStatus::Created,
            BuildStatus::Building,
            BuildStatus::Success,
            BuildStatus::Error,
        ] {
            assert_eq!(BuildStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(BuildStatus::parse("building"), Some(BuildStatus::Building));
        assert_eq!(BuildStatus::parse("nope"), None);
    }

    #[test]
    fn test_unknown_status_reads_as_error() {
        assert_eq!(status_of("garbage"), BuildStatus::Error);
        assert_eq!(status_of("SUCCESS"), BuildStatus::Success);
    }

    #[test]
    fn test_terminal_statuses() {
        assert!(!BuildStatus::Created.is_terminal());
        assert!(!BuildStatus::Building.is_terminal());
        assert!(BuildStatus::Success.is_terminal());
        assert!(BuildStatus::Error.is_terminal());
    }

    #[test]
    fn test_commit_only_image_follows_commit() {
        let outputs = [OutputType::Commit];
        assert_eq!(
            final_image_status(&outputs, BuildStatus::Success, None),
            BuildStatus::Success
        );
        assert_eq!(
            final_image_status(&outputs, BuildStatus::Error, None),
            BuildStatus::Error
        );
    }

    #[test]
    fn test_installer_failure_fails_image() {
        let outputs = [OutputType::Commit, OutputType::Installer];
        assert_eq!(
            final_image_status(&outputs, BuildStatus::Success, Some(BuildStatus::Error)),
            BuildStatus::Error
        );
        assert_eq!(
            final_image_status(&outputs, BuildStatus::Success, None),
            BuildStatus::Error
        );
        assert_eq!(
            final_image_status(&outputs, BuildStatus::Success, Some(BuildStatus::Success)),
            BuildStatus::Success
        );
    }

    #[test]
    fn test_unrequested_installer_is_ignored() {
        let outputs = [OutputType::Commit];
        assert_eq!(
            final_image_status(&outputs, BuildStatus::Success, Some(BuildStatus::Error)),
            BuildStatus::Success
        );
    }

    #[test]
    fn test_output_type_serde_is_lowercase() {
        let json = serde_json::to_string(&vec![OutputType::Commit, OutputType::Installer]).unwrap();
        assert_eq!(json, r#"["commit","installer"]"#);
    }
}
