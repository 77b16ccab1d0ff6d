use std::collections::VecDeque;

use taskdeck_core::Task;

/// Bounded record of finished tasks. Oldest entries are evicted first.
#[derive(Debug)]
pub struct TaskHistory {
    capacity: usize,
    entries: VecDeque<Task>,
}

impl TaskHistory {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Appends a finished task and returns the entry evicted to make room, if any.
    pub fn push(&mut self, task: Task) -> Option<Task> {
        let evicted = if self.entries.len() >= self.capacity {
            self.entries.pop_front()
        } else {
            None
        };
        self.entries.push_back(task);
        evicted
    }

    /// The last `limit` entries, oldest first, optionally restricted to one task type.
    pub fn recent(&self, task_type: Option<&str>, limit: usize) -> Vec<Task> {
        let mut selected: Vec<Task> = self
            .entries
            .iter()
            .rev()
            .filter(|task| task_type.map_or(true, |t| task.task_type == t))
            .take(limit)
            .cloned()
            .collect();
        selected.reverse();
        selected
    }

    /// Most recent entry with the given id.
    pub fn find(&self, task_id: &str) -> Option<&Task> {
        self.entries.iter().rev().find(|task| task.id == task_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskdeck_core::TaskParams;

    fn finished(id: &str, task_type: &str) -> Task {
        let mut task = Task::new(id, task_type, TaskParams::new());
        task.start().unwrap();
        task.succeed(serde_json::Value::Null).unwrap();
        task
    }

    #[test]
    fn test_capacity_bound_evicts_oldest() {
        let mut history = TaskHistory::new(3);
        for i in 0..5 {
            let evicted = history.push(finished(&format!("t{i}"), "echo"));
            if i < 3 {
                assert!(evicted.is_none());
            } else {
                assert_eq!(evicted.unwrap().id, format!("t{}", i - 3));
            }
            assert!(history.len() <= 3);
        }

        let ids: Vec<String> = history.recent(None, 10).into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec!["t2", "t3", "t4"]);
    }

    #[test]
    fn test_recent_filters_and_limits() {
        let mut history = TaskHistory::new(10);
        history.push(finished("a1", "scrape"));
        history.push(finished("b1", "sync"));
        history.push(finished("a2", "scrape"));
        history.push(finished("a3", "scrape"));

        let ids: Vec<String> = history
            .recent(Some("scrape"), 2)
            .into_iter()
            .map(|t| t.id)
            .collect();
        assert_eq!(ids, vec!["a2", "a3"]);
        assert!(history.recent(None, 0).is_empty());
        assert!(history.recent(Some("missing"), 5).is_empty());
    }

    #[test]
    fn test_find_and_zero_capacity() {
        let mut history = TaskHistory::new(0);
        assert_eq!(history.capacity(), 1);
        history.push(finished("x", "echo"));
        assert!(history.find("x").is_some());
        history.push(finished("y", "echo"));
        assert!(history.find("x").is_none());
        assert!(!history.is_empty());
    }
}
