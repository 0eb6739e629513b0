//! Build context attached to every computed result.
//!
//! A [`BuildInfo`] names the exact source commit and build that produced a
//! result. Capturing it is a separate tool's job (it reads source-control
//! state at build time and emits the record); this library only threads the
//! value through the tracker and into result records.
//!
//! Build info is deliberately *not* process-global state: the tracker owns
//! the current build info and hands it to the resolution engine, so two
//! trackers in one process can carry different builds.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The full build context record stored under `builds/<buildId>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfo {
    /// Source-control commit the build was produced from.
    pub commit_id: String,

    /// Identifier of the build itself (CI run, timestamp tag, or similar).
    pub build_id: String,

    /// When the build was produced.
    pub build_time: DateTime<Utc>,

    /// Name of the version-control system the commit id refers to.
    pub vcs: String,
}

impl BuildInfo {
    /// Creates a build info record with a `git` vcs tag.
    pub fn new(
        commit_id: impl Into<String>,
        build_id: impl Into<String>,
        build_time: DateTime<Utc>,
    ) -> Self {
        Self {
            commit_id: commit_id.into(),
            build_id: build_id.into(),
            build_time,
            vcs: "git".to_string(),
        }
    }

    /// The two-field form embedded in result records.
    #[must_use]
    pub fn brief(&self) -> BuildInfoBrief {
        BuildInfoBrief {
            commit_id: self.commit_id.clone(),
            build_id: self.build_id.clone(),
        }
    }
}

/// The commit/build identifier pair carried by each result record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildInfoBrief {
    /// Source-control commit the build was produced from.
    pub commit_id: String,

    /// Identifier of the build itself.
    pub build_id: String,
}

impl BuildInfoBrief {
    /// Creates a brief build identity.
    pub fn new(commit_id: impl Into<String>, build_id: impl Into<String>) -> Self {
        Self {
            commit_id: commit_id.into(),
            build_id: build_id.into(),
        }
    }
}

impl From<&BuildInfo> for BuildInfoBrief {
    fn from(info: &BuildInfo) -> Self {
        info.brief()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn brief_carries_both_identifiers() {
        let info = BuildInfo::new("deadbeef", "build-42", Utc::now());
        let brief = info.brief();
        assert_eq!(brief.commit_id, "deadbeef");
        assert_eq!(brief.build_id, "build-42");
    }

    #[test]
    fn wire_fields_are_camel_case() {
        let brief = BuildInfoBrief::new("c1", "b1");
        let json = serde_json::to_value(&brief).unwrap();
        assert_eq!(json["commitId"], "c1");
        assert_eq!(json["buildId"], "b1");
    }
}
