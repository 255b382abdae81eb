use std::fmt;

use serde::{Deserialize, Serialize};

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub i64);

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

id_newtype!(RequestId);
id_newtype!(TableId);
id_newtype!(WaiterId);

/// Lifecycle of a table request. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestStatus {
    #[serde(rename = "PENDIENTE", alias = "PENDING")]
    Pending,
    #[serde(rename = "EN_CAMINO", alias = "IN_PROGRESS")]
    InProgress,
    #[serde(rename = "COMPLETADO", alias = "DONE")]
    Done,
}

impl RequestStatus {
    pub const ALL: [RequestStatus; 3] = [Self::Pending, Self::InProgress, Self::Done];

    /// The only status a locally issued command may move to from `self`.
    pub fn successor(self) -> Option<RequestStatus> {
        match self {
            Self::Pending => Some(Self::InProgress),
            Self::InProgress => Some(Self::Done),
            Self::Done => None,
        }
    }

    pub fn is_terminal(self) -> bool {
        self.successor().is_none()
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Done => "done",
        };
        f.write_str(label)
    }
}

/// Merge precedence of a status: `Pending < InProgress < Done`.
pub fn status_rank(status: RequestStatus) -> u8 {
    match status {
        RequestStatus::Pending => 0,
        RequestStatus::InProgress => 1,
        RequestStatus::Done => 2,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RequestKind {
    #[serde(rename = "MENU")]
    Menu,
    #[serde(rename = "CUENTA")]
    Bill,
    #[serde(rename = "SERVILLETAS")]
    Napkins,
    #[serde(rename = "CUBIERTOS")]
    Cutlery,
    #[serde(rename = "SALSAS")]
    Condiments,
    #[serde(rename = "RETIRAR_PLATOS")]
    ClearPlates,
    #[serde(rename = "LIMPIAR_MESA")]
    CleanTable,
    // Categories the store adds later still land on the board.
    #[serde(rename = "OTRO", other)]
    Other,
}

impl RequestKind {
    pub const ALL: [RequestKind; 8] = [
        Self::Menu,
        Self::Bill,
        Self::Napkins,
        Self::Cutlery,
        Self::Condiments,
        Self::ClearPlates,
        Self::CleanTable,
        Self::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Menu => "menu",
            Self::Bill => "bill",
            Self::Napkins => "napkins",
            Self::Cutlery => "cutlery",
            Self::Condiments => "condiments",
            Self::ClearPlates => "clear-plates",
            Self::CleanTable => "clean-table",
            Self::Other => "other",
        }
    }
}

impl fmt::Display for RequestKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for RequestKind {
    type Err = String;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let normalized = raw.trim().to_ascii_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|kind| kind.as_str() == normalized)
            .ok_or_else(|| format!("unknown request type '{raw}'"))
    }
}
