//! Panel view identifiers.

use strum::{AsRefStr, Display};

/// Which screen the single panel message currently shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Display, AsRefStr)]
#[strum(serialize_all = "snake_case")]
pub enum PanelView {
    #[default]
    MainMenu,
    UserList,
    AddUserPrompt,
    DeleteUserConfirm,
    RuleList,
    AddRulePrompt,
    DeleteRuleConfirm,
    ExportConfigPrompt,
}

impl PanelView {
    /// Views that read the next text message as input.
    pub fn is_prompt(self) -> bool {
        matches!(
            self,
            Self::AddUserPrompt | Self::AddRulePrompt | Self::ExportConfigPrompt
        )
    }

    /// Header line shown on the panel.
    pub fn title(self) -> &'static str {
        match self {
            Self::MainMenu => "TrustTunnel admin",
            Self::UserList => "Users",
            Self::AddUserPrompt => "Add user",
            Self::DeleteUserConfirm => "Delete user",
            Self::RuleList => "Access rules",
            Self::AddRulePrompt => "Add rule",
            Self::DeleteRuleConfirm => "Delete rule",
            Self::ExportConfigPrompt => "Export config",
        }
    }
}
