//! Operator commands waiting to be picked up by stations

use dashmap::DashMap;
use evfleet_types::StationCommand;
use std::collections::VecDeque;

/// Per-station FIFO of commands
#[derive(Debug, Default)]
pub struct CommandQueue {
    queues: DashMap<String, VecDeque<StationCommand>>,
}

impl CommandQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue `command` for `cp_id`, returning how many are now waiting
    pub fn push(&self, cp_id: &str, command: StationCommand) -> usize {
        let mut queue = self.queues.entry(cp_id.to_string()).or_default();
        queue.push_back(command);
        queue.len()
    }

    /// Oldest waiting command for `cp_id`. A drained queue is dropped.
    pub fn pop(&self, cp_id: &str) -> Option<StationCommand> {
        let command = self.queues.get_mut(cp_id)?.pop_front();
        self.queues.remove_if(cp_id, |_, queue| queue.is_empty());
        command
    }
}
