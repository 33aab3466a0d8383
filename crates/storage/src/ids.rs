use std::fmt;

use snafu::ResultExt;
use uuid::Uuid;

use super::error::{InvalidIdSnafu, StoreResult};

/// Store-assigned message id. Time-sortable, so it also breaks `created_at` ties.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct MessageId(pub Uuid);

impl MessageId {
    pub fn new(raw: Uuid) -> Self {
        Self(raw)
    }

    pub fn new_v7() -> Self {
        Self(Uuid::now_v7())
    }

    /// Reads an id back from a stored row.
    pub fn parse(raw: &str) -> StoreResult<Self> {
        Uuid::parse_str(raw).map(Self).context(InvalidIdSnafu {
            stage: "parse-message-id",
            raw,
        })
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(formatter)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_form_reads_back() {
        let id = MessageId::new_v7();
        assert_eq!(MessageId::parse(&id.to_string()).unwrap(), id);
    }

    #[test]
    fn malformed_row_id_reports_its_stage() {
        let error = MessageId::parse("not-a-uuid").unwrap_err();
        assert_eq!(error.stage(), "parse-message-id");
    }

    #[test]
    fn later_ids_sort_after_earlier_ones() {
        let first = MessageId::new_v7();
        std::thread::sleep(std::time::Duration::from_millis(2));
        assert!(MessageId::new_v7() > first);
    }
}
