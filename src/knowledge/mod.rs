//! Lifecycle of the named knowledge bases served to chat requests.

mod base;
mod error;
mod manager;

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::corpus::Corpus;

pub use base::KnowledgeBase;
pub use error::KnowledgeError;
pub use manager::{KnowledgeBaseManager, KnowledgeBaseSnapshot, KnowledgeBaseState, RebuildReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KnowledgeBaseName {
    Faq,
    Tickets,
}

impl KnowledgeBaseName {
    /// Build and rebuild order.
    pub const ALL: [KnowledgeBaseName; 2] = [KnowledgeBaseName::Faq, KnowledgeBaseName::Tickets];

    pub fn as_str(&self) -> &'static str {
        match self {
            KnowledgeBaseName::Faq => "faq",
            KnowledgeBaseName::Tickets => "tickets",
        }
    }

    pub fn corpus(&self) -> Corpus {
        match self {
            KnowledgeBaseName::Faq => Corpus::Faq,
            KnowledgeBaseName::Tickets => Corpus::Ticket,
        }
    }
}

impl fmt::Display for KnowledgeBaseName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
