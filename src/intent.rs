use std::fmt::{Display, Formatter};

use log::info;
use tabled::{Style, Table, Tabled};

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum IntentType {
    Keep,
    Delete,
}

impl Display for IntentType {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            IntentType::Keep => write!(f, "======"),
            IntentType::Delete => write!(f, "------"),
        }
    }
}

#[derive(Debug, Tabled, Clone, PartialEq, Eq)]
pub struct Intent {
    pub intent: IntentType,
    #[tabled(rename = "#")]
    pub position: usize,
    pub version: String,
}

/// How many of `total` versions exceed `limit`. Never more than `total`.
pub fn excess(total: usize, limit: i64) -> usize {
    if limit < 0 {
        return total;
    }
    match usize::try_from(limit) {
        Ok(limit) => total.saturating_sub(limit),
        Err(_) => 0,
    }
}

/// Listed versions, oldest first, each marked keep or delete.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Plan {
    pub intents: Vec<Intent>,
}

impl Plan {
    /// Marks the oldest excess versions for deletion. `versions` must already
    /// be ordered by deployment time, oldest first; the order is kept as is.
    pub fn new(versions: Vec<String>, limit: i64) -> Self {
        let delete = excess(versions.len(), limit);
        let intents = versions
            .into_iter()
            .enumerate()
            .map(|(position, version)| Intent {
                intent: if position < delete {
                    IntentType::Delete
                } else {
                    IntentType::Keep
                },
                position: position + 1,
                version,
            })
            .collect();

        Plan { intents }
    }

    pub fn to_delete(&self) -> Vec<String> {
        self.intents
            .iter()
            .filter(|i| i.intent == IntentType::Delete)
            .map(|i| i.version.clone())
            .collect()
    }

    pub fn kept(&self) -> usize {
        self.intents
            .iter()
            .filter(|i| i.intent == IntentType::Keep)
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }

    pub fn print_tabled(&self) {
        if self.is_empty() {
            info!("no non-serving versions found");
            return;
        }
        let table = Table::new(&self.intents).with(Style::modern()).to_string();
        info!("\n{}", table);
    }
}
