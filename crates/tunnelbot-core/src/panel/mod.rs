// ── Chat panel ──
//
// One editable "panel" message per admin conversation. Events move the
// panel between views; results that are not the panel (credentials,
// exported files, long rule dumps) go out as separate messages.

mod action;
mod machine;
mod render;
mod sessions;
mod state;
mod surface;
mod view;
mod workers;

pub use action::{Callback, MAX_CALLBACK_BYTES, PanelEvent};
pub use machine::PanelMachine;
pub use render::{
    Button, MAX_INLINE_RULES, MAX_INLINE_USERS, MAX_TEXT_CHARS, Rendered, ViewData, render,
};
pub use sessions::PanelSessions;
pub use state::{ConversationId, MessageHandle, Notice, PanelState, Target};
pub use surface::{ChatSurface, EditResult};
pub use view::PanelView;
pub use workers::ConversationWorkers;
