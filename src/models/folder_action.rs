//! Folder actions and the AI escalation flag, with fallible parsers that
//! normalize a handful of legacy spellings that still show up in older rule
//! files.

use std::fmt;
use std::str::FromStr;

/// What the path synthesizer should do with a directory's name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FolderAction {
    /// Preserve this directory and everything below it verbatim.
    Keep,
    /// A marker inside this directory forces its *parent* to be kept.
    KeepParent,
    /// Keep this directory's name, but allow an explicit descendant to
    /// re-disaggregate from that point on.
    KeepExcept,
    /// Drop this directory's name; its files are distributed by category.
    Disaggregate,
}

impl FolderAction {
    pub fn as_str(self) -> &'static str {
        match self {
            FolderAction::Keep => "keep",
            FolderAction::KeepParent => "keep_parent",
            FolderAction::KeepExcept => "keep_except",
            FolderAction::Disaggregate => "disaggregate",
        }
    }
}

impl fmt::Display for FolderAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown FolderAction: {0:?}. Valid: keep, keep_parent, keep_except, disaggregate")]
pub struct UnknownFolderAction(pub String);

impl FromStr for FolderAction {
    type Err = UnknownFolderAction;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_lowercase();
        match normalized.as_str() {
            "move_as_unit" | "moveasunit" | "unit" | "keep" => Ok(FolderAction::Keep),
            "strip" | "disaggregate" => Ok(FolderAction::Disaggregate),
            "keep_parent" | "keepparent" | "parent" => Ok(FolderAction::KeepParent),
            "keep_except" | "keepexcept" => Ok(FolderAction::KeepExcept),
            _ => Err(UnknownFolderAction(value.to_string())),
        }
    }
}

/// Whether a rule's classification is final or merely advisory to the AI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequiresAI {
    /// The rule's category/action is authoritative; skip the AI entirely.
    Final,
    /// The rule's category/action is only a hint; still consult the AI.
    Ai,
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("unknown RequiresAI: {0:?}. Valid: final, ai")]
pub struct UnknownRequiresAI(pub String);

impl FromStr for RequiresAI {
    type Err = UnknownRequiresAI;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "final" => Ok(RequiresAI::Final),
            "ai" => Ok(RequiresAI::Ai),
            _ => Err(UnknownRequiresAI(value.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn folder_action_accepts_legacy_aliases() {
        assert_eq!("unit".parse::<FolderAction>().unwrap(), FolderAction::Keep);
        assert_eq!("moveAsUnit".parse::<FolderAction>().unwrap(), FolderAction::Keep);
        assert_eq!("strip".parse::<FolderAction>().unwrap(), FolderAction::Disaggregate);
        assert_eq!("KeepParent".parse::<FolderAction>().unwrap(), FolderAction::KeepParent);
        assert_eq!("keep_except".parse::<FolderAction>().unwrap(), FolderAction::KeepExcept);
    }

    #[test]
    fn folder_action_rejects_garbage() {
        assert!("whatever".parse::<FolderAction>().is_err());
    }

    #[test]
    fn requires_ai_has_no_aliases() {
        assert_eq!("final".parse::<RequiresAI>().unwrap(), RequiresAI::Final);
        assert_eq!("ai".parse::<RequiresAI>().unwrap(), RequiresAI::Ai);
        assert!("".parse::<RequiresAI>().is_err());
    }
}
