// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Cycle detection for the task dependency graph (Kahn's algorithm).

use crate::task::TaskId;
use std::collections::{HashMap, VecDeque};

/// An error indicating that the dependency graph contains a cycle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CycleError;

/// Verifies that the dependency graph is acyclic.
///
/// The graph is defined by the attached task ids and the directed
/// `(dependent, dependency)` edges between them. Gating a task on its
/// dependencies only terminates when no task is, transitively, gated on
/// itself, so the kernel runs this check before accepting a new edge.
///
/// Edges that mention unknown ids (stale dependencies on removed tasks) are
/// ignored, matching how the scheduler treats them.
pub(crate) fn check_acyclic(
    nodes: &[TaskId],
    edges: impl IntoIterator<Item = (TaskId, TaskId)>,
) -> Result<(), CycleError> {
    if nodes.is_empty() {
        return Ok(());
    }

    let mut dependents: HashMap<TaskId, Vec<TaskId>> = HashMap::new();
    let mut in_degree: HashMap<TaskId, usize> = nodes.iter().map(|id| (*id, 0)).collect();

    // 1. Build the reverse adjacency and in-degree counts from the edges.
    for (dependent, dependency) in edges {
        if !in_degree.contains_key(&dependent) || !in_degree.contains_key(&dependency) {
            continue;
        }
        dependents.entry(dependency).or_default().push(dependent);
        if let Some(degree) = in_degree.get_mut(&dependent) {
            *degree += 1;
        }
    }

    // 2. Seed the queue with tasks that depend on nothing.
    let mut queue: VecDeque<TaskId> = VecDeque::new();
    for &node in nodes {
        if in_degree.get(&node).copied().unwrap_or(0) == 0 {
            queue.push_back(node);
        }
    }

    // 3. Peel resolved tasks off the graph.
    let mut resolved = 0;
    while let Some(dependency) = queue.pop_front() {
        resolved += 1;
        if let Some(waiting) = dependents.get(&dependency) {
            for &dependent in waiting {
                if let Some(degree) = in_degree.get_mut(&dependent) {
                    *degree -= 1;
                    if *degree == 0 {
                        queue.push_back(dependent);
                    }
                }
            }
        }
    }

    // 4. Anything left unresolved sits on a cycle.
    if resolved != nodes.len() {
        Err(CycleError)
    } else {
        Ok(())
    }
}
