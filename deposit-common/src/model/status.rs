//! Status vocabularies carried by the persisted entities

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Status of a single [Submission, Repository] deposit attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DepositStatus {
    /// Package bytes reached the remote endpoint; remote acceptance pending
    Submitted,
    /// Remote repository accessioned the content
    Accepted,
    /// Remote repository refused the content
    Rejected,
    /// Deposit could not be carried out
    Failed,
}

/// Submission-level status derived from all of its deposits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AggregatedDepositStatus {
    NotStarted,
    InProgress,
    Accepted,
    Rejected,
    Failed,
    Cancelled,
}

/// Status of the copy held by a remote repository
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum CopyStatus {
    InProgress,
    Complete,
    Accepted,
    Rejected,
    Stalled,
}

/// How a repository participates in deposits
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum IntegrationType {
    /// Content is transferred and the repository reports status back
    Full,
    /// Content is transferred, no status is reported back
    OneWay,
    /// Informational link only; nothing is transferred
    WebLink,
}

/// Role a file plays within a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FileRole {
    Manuscript,
    Supplemental,
    Figure,
    Table,
}

/// Origin of a submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SubmissionSource {
    /// Created interactively by a user of the institutional repository
    Pass,
    /// Created by some other agent (harvesters, imports)
    Other,
}

macro_rules! kebab_display {
    ($($ty:ty => { $($variant:ident = $text:literal),+ $(,)? }),+ $(,)?) => {
        $(
            impl $ty {
                /// Wire name of this value
                pub fn as_str(&self) -> &'static str {
                    match self {
                        $(Self::$variant => $text),+
                    }
                }
            }

            impl fmt::Display for $ty {
                fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                    f.write_str(self.as_str())
                }
            }

            impl FromStr for $ty {
                type Err = String;

                fn from_str(s: &str) -> Result<Self, Self::Err> {
                    match s.trim().to_ascii_lowercase().replace('_', "-").as_str() {
                        $($text => Ok(Self::$variant),)+
                        other => Err(format!(
                            "unknown {} value '{}'",
                            stringify!($ty),
                            other
                        )),
                    }
                }
            }
        )+
    };
}

kebab_display! {
    DepositStatus => {
        Submitted = "submitted",
        Accepted = "accepted",
        Rejected = "rejected",
        Failed = "failed",
    },
    AggregatedDepositStatus => {
        NotStarted = "not-started",
        InProgress = "in-progress",
        Accepted = "accepted",
        Rejected = "rejected",
        Failed = "failed",
        Cancelled = "cancelled",
    },
    CopyStatus => {
        InProgress = "in-progress",
        Complete = "complete",
        Accepted = "accepted",
        Rejected = "rejected",
        Stalled = "stalled",
    },
    IntegrationType => {
        Full = "full",
        OneWay = "one-way",
        WebLink = "web-link",
    },
    FileRole => {
        Manuscript = "manuscript",
        Supplemental = "supplemental",
        Figure = "figure",
        Table = "table",
    },
    SubmissionSource => {
        Pass = "pass",
        Other = "other",
    },
}
