use std::collections::VecDeque;

use crate::constants::{NOTIFICATION_EXIT_MS, NOTIFICATION_TTL_MS};
use crate::types::{NotificationSlot, NotificationView};

#[derive(Clone, Copy, Debug)]
pub struct NotificationOptions {
    pub ttl_ms: u64,
    pub exit_ms: u64,
}

impl Default for NotificationOptions {
    fn default() -> Self {
        Self {
            ttl_ms: NOTIFICATION_TTL_MS,
            exit_ms: NOTIFICATION_EXIT_MS,
        }
    }
}

#[derive(Clone, Debug)]
struct Notification {
    id: u64,
    message: String,
    created_at_ms: u64,
}

/// Newest-first message stack. The front entry occupies the primary slot,
/// older ones are stacked below it. Each entry leaves `ttl_ms` after it was
/// pushed and is gone `exit_ms` later. Length is not capped.
#[derive(Clone, Debug)]
pub struct NotificationQueue {
    options: NotificationOptions,
    entries: VecDeque<Notification>,
    next_id: u64,
}

impl Default for NotificationQueue {
    fn default() -> Self {
        Self::new(NotificationOptions::default())
    }
}

impl NotificationQueue {
    pub fn new(options: NotificationOptions) -> Self {
        Self {
            options,
            entries: VecDeque::new(),
            next_id: 1,
        }
    }

    pub fn push(&mut self, message: impl Into<String>, now_ms: u64) -> u64 {
        self.prune(now_ms);
        let id = self.next_id;
        self.next_id += 1;
        self.entries.push_front(Notification {
            id,
            message: message.into(),
            created_at_ms: now_ms,
        });
        id
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn primary(&self) -> Option<&str> {
        self.entries.front().map(|entry| entry.message.as_str())
    }

    pub fn snapshot(&mut self, now_ms: u64) -> Vec<NotificationView> {
        self.prune(now_ms);
        self.entries
            .iter()
            .enumerate()
            .map(|(index, entry)| NotificationView {
                id: entry.id,
                message: entry.message.clone(),
                slot: if index == 0 {
                    NotificationSlot::Primary
                } else {
                    NotificationSlot::Secondary
                },
                depth: index,
                leaving: now_ms >= entry.created_at_ms + self.options.ttl_ms,
            })
            .collect()
    }

    pub fn prune(&mut self, now_ms: u64) {
        let lifetime = self.options.ttl_ms + self.options.exit_ms;
        self.entries
            .retain(|entry| now_ms < entry.created_at_ms.saturating_add(lifetime));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn newest_message_takes_primary_slot() {
        let mut queue = NotificationQueue::default();
        queue.push("first", 0);
        queue.push("second", 100);

        let views = queue.snapshot(200);
        assert_eq!(views.len(), 2);
        assert_eq!(views[0].message, "second");
        assert_eq!(views[0].slot, NotificationSlot::Primary);
        assert_eq!(views[1].message, "first");
        assert_eq!(views[1].slot, NotificationSlot::Secondary);
        assert_eq!(views[1].depth, 1);
    }

    #[test]
    fn entries_leave_then_disappear() {
        let mut queue = NotificationQueue::default();
        queue.push("fading", 1_000);

        let views = queue.snapshot(5_999);
        assert!(!views[0].leaving);

        let views = queue.snapshot(6_000);
        assert!(views[0].leaving);

        let views = queue.snapshot(6_499);
        assert_eq!(views.len(), 1);

        assert!(queue.snapshot(6_500).is_empty());
    }

    #[test]
    fn expired_entries_drop_out_of_the_stack() {
        let mut queue = NotificationQueue::default();
        queue.push("older", 0);
        queue.push("newer", 2_000);

        let views = queue.snapshot(5_600);
        assert_eq!(views.len(), 1);
        assert_eq!(views[0].message, "newer");
        assert_eq!(views[0].slot, NotificationSlot::Primary);

        let views = queue.snapshot(6_000);
        assert_eq!(views[0].message, "newer");
        assert_eq!(views.len(), 1);
    }

    #[test]
    fn queue_length_is_not_capped() {
        let mut queue = NotificationQueue::default();
        for index in 0..50 {
            queue.push(format!("message {index}"), 10);
        }
        assert_eq!(queue.len(), 50);
        assert_eq!(queue.primary(), Some("message 49"));
    }
}
