//! Pending task queue.
//!
//! Ordered by priority rank with FIFO order inside each priority level. The
//! orchestrator owns the queue; it is not synchronized on its own.

use crate::types::{Task, TaskStatus};
use std::collections::VecDeque;

/// Priority-ordered queue of pending tasks.
#[derive(Debug, Default)]
pub struct TaskQueue {
    entries: VecDeque<Task>,
}

impl TaskQueue {
    pub fn new() -> Self {
        Self {
            entries: VecDeque::new(),
        }
    }

    /// Insert before the first entry with a strictly greater priority rank,
    /// keeping submission order within a level.
    pub fn push(&mut self, task: Task) {
        let rank = task.priority.rank();
        match self.entries.iter().position(|t| t.priority.rank() > rank) {
            Some(index) => self.entries.insert(index, task),
            None => self.entries.push_back(task),
        }
    }

    /// Pop the highest-priority task.
    pub fn pop_front(&mut self) -> Option<Task> {
        self.entries.pop_front()
    }

    /// Remove a task by id.
    pub fn remove(&mut self, task_id: &str) -> Option<Task> {
        let index = self.entries.iter().position(|t| t.id == task_id)?;
        self.entries.remove(index)
    }

    /// Look up a queued task.
    pub fn get(&self, task_id: &str) -> Option<&Task> {
        self.entries.iter().find(|t| t.id == task_id)
    }

    /// Iterate in queue order.
    pub fn iter(&self) -> impl Iterator<Item = &Task> {
        self.entries.iter()
    }

    /// Snapshot of pending tasks in queue order.
    pub fn pending(&self) -> Vec<Task> {
        self.entries
            .iter()
            .filter(|t| t.status == TaskStatus::Pending)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskPriority;

    fn task(name: &str, priority: TaskPriority) -> Task {
        let mut task = Task::new("test", serde_json::Value::Null).with_priority(priority);
        task.id = name.to_string();
        task
    }

    #[test]
    fn test_priority_ordering_with_stable_fifo() {
        let mut queue = TaskQueue::new();

        queue.push(task("n1", TaskPriority::Normal));
        queue.push(task("h1", TaskPriority::High));
        queue.push(task("n2", TaskPriority::Normal));
        queue.push(task("c1", TaskPriority::Critical));

        let order: Vec<&str> = queue.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(order, vec!["c1", "h1", "n1", "n2"]);
    }

    #[test]
    fn test_ranks_never_decrease_along_queue() {
        let mut queue = TaskQueue::new();

        for (i, priority) in [
            TaskPriority::Low,
            TaskPriority::Critical,
            TaskPriority::Normal,
            TaskPriority::High,
            TaskPriority::Normal,
            TaskPriority::Critical,
        ]
        .into_iter()
        .enumerate()
        {
            queue.push(task(&format!("t{i}"), priority));
        }

        let ranks: Vec<u8> = queue.iter().map(|t| t.priority.rank()).collect();
        assert!(ranks.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn test_pop_front_takes_highest_priority() {
        let mut queue = TaskQueue::new();

        queue.push(task("low", TaskPriority::Low));
        queue.push(task("critical", TaskPriority::Critical));

        assert_eq!(queue.pop_front().unwrap().id, "critical");
        assert_eq!(queue.pop_front().unwrap().id, "low");
        assert!(queue.pop_front().is_none());
    }

    #[test]
    fn test_remove_by_id() {
        let mut queue = TaskQueue::new();

        queue.push(task("a", TaskPriority::Normal));
        queue.push(task("b", TaskPriority::Normal));

        assert!(queue.remove("a").is_some());
        assert!(queue.remove("a").is_none());
        assert_eq!(queue.len(), 1);
        assert!(queue.get("b").is_some());
    }
}
