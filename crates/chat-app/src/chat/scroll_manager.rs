/// Where the message list should be positioned on the next render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ScrollPosition {
    /// A scroll-to-latest was requested since the previous render.
    pub snap_to_latest: bool,
    /// Rows the user has scrolled up from the newest message.
    pub rows_from_latest: usize,
}

/// Tracks follow-latest behavior independent from message content.
#[derive(Debug, Clone)]
pub struct ScrollManager {
    pending_scroll_to_latest: bool,
    follow_latest: bool,
    rows_from_latest: usize,
}

impl ScrollManager {
    pub fn new() -> Self {
        Self {
            pending_scroll_to_latest: false,
            follow_latest: true,
            rows_from_latest: 0,
        }
    }

    pub fn is_following_latest(&self) -> bool {
        self.follow_latest
    }

    /// Unconditional jump, used after the user's own send.
    pub fn request_scroll_to_latest(&mut self) {
        self.pending_scroll_to_latest = true;
        self.follow_latest = true;
    }

    /// Jump only if the user has not scrolled away from the tail.
    pub fn request_scroll_to_latest_if_following(&mut self) {
        if self.follow_latest {
            self.pending_scroll_to_latest = true;
        }
    }

    pub fn scroll_up(&mut self, rows: usize, total_rows: usize) {
        let max_rows = total_rows.saturating_sub(1);
        self.rows_from_latest = self.rows_from_latest.saturating_add(rows).min(max_rows);
        // Follow pauses only when the user actually moved away from the tail.
        if self.rows_from_latest > 0 {
            self.follow_latest = false;
        }
    }

    pub fn scroll_down(&mut self, rows: usize) {
        self.rows_from_latest = self.rows_from_latest.saturating_sub(rows);
        if self.rows_from_latest == 0 {
            self.follow_latest = true;
        }
    }

    pub fn reset(&mut self) {
        self.rows_from_latest = 0;
        self.follow_latest = true;
        self.pending_scroll_to_latest = true;
    }

    /// Consumes the pending request for one render.
    pub fn take_position(&mut self) -> ScrollPosition {
        let snap_to_latest = self.pending_scroll_to_latest;
        if snap_to_latest {
            self.rows_from_latest = 0;
        }
        self.pending_scroll_to_latest = false;

        ScrollPosition {
            snap_to_latest,
            rows_from_latest: self.rows_from_latest,
        }
    }
}

impl Default for ScrollManager {
    fn default() -> Self {
        Self::new()
    }
}
