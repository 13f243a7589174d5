// ABOUTME: Per-stack diff results of one comparison run.
// ABOUTME: Any stack with changes marks the whole comparison as changed.

use std::fmt;

use crate::diff::TemplateDiff;
use crate::types::StackName;

#[derive(Debug, Clone)]
pub struct StackDiff {
    pub stack: StackName,
    pub diff: TemplateDiff,
}

#[derive(Debug, Clone, Default)]
pub struct DiffReport {
    pub stacks: Vec<StackDiff>,
}

impl DiffReport {
    pub fn has_changes(&self) -> bool {
        self.stacks.iter().any(|s| s.diff.has_changes())
    }

    /// Stacks whose desired template differs from the current one.
    pub fn changed_stacks(&self) -> Vec<&StackName> {
        self.stacks
            .iter()
            .filter(|s| s.diff.has_changes())
            .map(|s| &s.stack)
            .collect()
    }
}

impl fmt::Display for DiffReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for stack in &self.stacks {
            if stack.diff.has_changes() {
                writeln!(f, "stack {} has changes:", stack.stack)?;
                write!(f, "{}", stack.diff)?;
            } else {
                writeln!(f, "stack {} is unchanged", stack.stack)?;
            }
        }
        Ok(())
    }
}
