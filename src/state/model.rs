use serde::Serialize;

/// Which representation is authoritative for an element.
///
/// `Idle` means the Transform is the source of truth; `Editing` and
/// `Dragging` mean the session Bounds are.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    Idle,
    Editing,
    Dragging,
}

impl SessionMode {
    pub const fn is_editing(self) -> bool {
        matches!(self, Self::Editing | Self::Dragging)
    }

    pub const fn is_dragging(self) -> bool {
        matches!(self, Self::Dragging)
    }
}
